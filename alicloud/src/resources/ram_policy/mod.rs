//! `st-alicloud_ram_policy`: attaches a list of RAM policies to a user by
//! combining their statements into as few generated policies as possible

pub mod fetcher;
pub mod model;
pub mod packer;
pub mod reconciler;

use async_trait::async_trait;
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ImportedResource,
    ReadResourceRequest, ReadResourceResponse, Resource, UpdateResourceRequest,
    UpdateResourceResponse, UpgradeResourceStateRequest, UpgradeResourceStateResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::types::{Diagnostic, DynamicValue};

use crate::provider_data::AlicloudProviderData;
use model::{RamPolicyPlan, RamPolicyState, SCHEMA_VERSION};
use reconciler::{Outcome, Reconciler};

pub const TYPE_NAME: &str = "st-alicloud_ram_policy";

const DETAIL_FIELDS: [&str; 3] = ["policy_name", "policy_document", "policy_type"];

#[derive(Default)]
pub struct RamPolicyResource {
    provider_data: Option<AlicloudProviderData>,
}

impl RamPolicyResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn not_configured() -> Diagnostic {
        Diagnostic::error(
            "Provider not configured",
            "Provider data was not properly configured",
        )
    }

    fn encode(
        state: Option<RamPolicyState>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<DynamicValue> {
        let state = state?;
        match DynamicValue::from_model(&state) {
            Ok(value) => Some(value),
            Err(e) => {
                diagnostics.push(Diagnostic::error("Failed to encode state", e.to_string()));
                None
            }
        }
    }

    /// Persist an outcome, keeping `fallback` when nothing new was produced
    fn respond(outcome: Outcome, fallback: DynamicValue) -> (DynamicValue, Vec<Diagnostic>) {
        let mut diagnostics = outcome.diagnostics;
        let state = Self::encode(outcome.state, &mut diagnostics).unwrap_or(fallback);
        (state, diagnostics)
    }
}

#[async_trait]
impl Resource for RamPolicyResource {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        SchemaBuilder::new()
            .version(SCHEMA_VERSION)
            .description(
                "Attaches RAM policies to a user, combining their statements into as few \
                 policies as possible to stay under the per-user attachment limit",
            )
            .attribute(
                AttributeBuilder::new(
                    "attached_policies",
                    AttributeType::List(Box::new(AttributeType::String)),
                )
                .description("Names of the policies to combine and attach")
                .required()
                .build(),
            )
            .attribute(
                AttributeBuilder::new("user_name", AttributeType::String)
                    .description("The RAM user to attach the combined policies to")
                    .required()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new(
                    "attached_policies_detail",
                    AttributeType::list_of_string_objects(&DETAIL_FIELDS),
                )
                .description("The source policies as they were when last combined")
                .computed()
                .build(),
            )
            .attribute(
                AttributeBuilder::new(
                    "combined_policies_detail",
                    AttributeType::list_of_string_objects(&DETAIL_FIELDS),
                )
                .description("The generated policies attached to the user")
                .computed()
                .build(),
            )
            .attribute(
                AttributeBuilder::new(
                    "excluded_policies_detail",
                    AttributeType::list_of_string_objects(&DETAIL_FIELDS),
                )
                .description("Source policies too large to combine, attached directly")
                .computed()
                .build(),
            )
            .build()
    }

    async fn configure(&mut self, request: ConfigureResourceRequest) -> ConfigureResourceResponse {
        let mut diagnostics = vec![];

        if let Some(data) = request.provider_data {
            if let Some(provider_data) = data.downcast_ref::<AlicloudProviderData>() {
                self.provider_data = Some(provider_data.clone());
            } else {
                diagnostics.push(Diagnostic::error(
                    "Invalid provider data",
                    "Failed to extract AlicloudProviderData from provider data",
                ));
            }
        } else {
            diagnostics.push(Diagnostic::error(
                "No provider data",
                "No provider data was provided to the resource",
            ));
        }

        ConfigureResourceResponse { diagnostics }
    }

    async fn create(&self, request: CreateResourceRequest) -> CreateResourceResponse {
        let provider_data = match &self.provider_data {
            Some(data) => data,
            None => {
                return CreateResourceResponse {
                    new_state: request.planned_state,
                    diagnostics: vec![Self::not_configured()],
                }
            }
        };

        let plan: RamPolicyPlan = match request.config.to_model() {
            Ok(plan) => plan,
            Err(e) => {
                return CreateResourceResponse {
                    new_state: request.planned_state,
                    diagnostics: vec![Diagnostic::error("Invalid configuration", e.to_string())],
                }
            }
        };

        let outcome = Reconciler::new(&provider_data.ram).create(&plan).await;
        let (new_state, diagnostics) = Self::respond(outcome, DynamicValue::null());

        CreateResourceResponse {
            new_state,
            diagnostics,
        }
    }

    async fn read(&self, request: ReadResourceRequest) -> ReadResourceResponse {
        let provider_data = match &self.provider_data {
            Some(data) => data,
            None => {
                return ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics: vec![Self::not_configured()],
                }
            }
        };

        let prior: RamPolicyState = match request.current_state.to_model() {
            Ok(state) => state,
            Err(e) => {
                return ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics: vec![Diagnostic::error("Invalid state", e.to_string())],
                }
            }
        };

        let outcome = Reconciler::new(&provider_data.ram).read(&prior).await;
        let (new_state, diagnostics) = Self::respond(outcome, request.current_state);

        ReadResourceResponse {
            new_state: Some(new_state),
            diagnostics,
        }
    }

    async fn update(&self, request: UpdateResourceRequest) -> UpdateResourceResponse {
        let provider_data = match &self.provider_data {
            Some(data) => data,
            None => {
                return UpdateResourceResponse {
                    new_state: request.prior_state,
                    diagnostics: vec![Self::not_configured()],
                }
            }
        };

        let decoded = request
            .prior_state
            .to_model::<RamPolicyState>()
            .and_then(|prior| Ok((prior, request.config.to_model::<RamPolicyPlan>()?)));
        let (prior, plan) = match decoded {
            Ok(pair) => pair,
            Err(e) => {
                return UpdateResourceResponse {
                    new_state: request.prior_state,
                    diagnostics: vec![Diagnostic::error("Invalid configuration", e.to_string())],
                }
            }
        };

        let outcome = Reconciler::new(&provider_data.ram)
            .update(&prior, &plan)
            .await;
        let (new_state, diagnostics) = Self::respond(outcome, request.prior_state);

        UpdateResourceResponse {
            new_state,
            diagnostics,
        }
    }

    async fn delete(&self, request: DeleteResourceRequest) -> DeleteResourceResponse {
        let provider_data = match &self.provider_data {
            Some(data) => data,
            None => {
                return DeleteResourceResponse {
                    diagnostics: vec![Self::not_configured()],
                }
            }
        };

        let prior: RamPolicyState = match request.prior_state.to_model() {
            Ok(state) => state,
            Err(e) => {
                return DeleteResourceResponse {
                    diagnostics: vec![Diagnostic::error("Invalid state", e.to_string())],
                }
            }
        };

        let outcome = Reconciler::new(&provider_data.ram).delete(&prior).await;

        DeleteResourceResponse {
            diagnostics: outcome.diagnostics,
        }
    }

    async fn import_state(&self, request: ImportResourceStateRequest) -> ImportResourceStateResponse {
        let provider_data = match &self.provider_data {
            Some(data) => data,
            None => {
                return ImportResourceStateResponse {
                    imported_resources: vec![],
                    diagnostics: vec![Self::not_configured()],
                }
            }
        };

        let outcome = Reconciler::new(&provider_data.ram)
            .import(&request.id)
            .await;
        let mut diagnostics = outcome.diagnostics;
        let imported_resources = Self::encode(outcome.state, &mut diagnostics)
            .map(|state| ImportedResource {
                type_name: request.type_name,
                state,
            })
            .into_iter()
            .collect();

        ImportResourceStateResponse {
            imported_resources,
            diagnostics,
        }
    }

    async fn upgrade_state(
        &self,
        request: UpgradeResourceStateRequest,
    ) -> UpgradeResourceStateResponse {
        let raw = match request.raw_state.json.as_deref() {
            Some(json) => serde_json::from_slice(json),
            None => Ok(serde_json::Value::Null),
        };

        let upgraded = raw
            .map_err(|e| tfplug::TfplugError::DecodingError(e.to_string()))
            .and_then(|raw| model::upgrade_state(request.version, raw))
            .and_then(|state| DynamicValue::from_model(&state));

        match upgraded {
            Ok(upgraded_state) => UpgradeResourceStateResponse {
                upgraded_state,
                diagnostics: vec![],
            },
            Err(e) => UpgradeResourceStateResponse {
                upgraded_state: DynamicValue::null(),
                diagnostics: vec![Diagnostic::error("Failed to upgrade state", e.to_string())],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_helpers::FakeRam;
    use crate::api::PolicyType;
    use serde_json::json;
    use std::sync::Arc;
    use tfplug::types::{AttributePath, Dynamic, RawState};
    use tfplug::DiagnosticsExt;

    const DOC: &str = r#"{"Version":"1","Statement":[{"Action":"oss:GetObject","Effect":"Allow","Resource":"*"}]}"#;

    async fn configured(ram: &Arc<FakeRam>) -> RamPolicyResource {
        let mut resource = RamPolicyResource::new();
        let data = AlicloudProviderData {
            ram: ram.gateway(),
            region: Some("cn-hangzhou".to_string()),
        };
        let response = resource
            .configure(ConfigureResourceRequest {
                provider_data: Some(Arc::new(data)),
            })
            .await;
        assert!(response.diagnostics.is_empty());
        resource
    }

    fn config(user: &str, names: &[&str]) -> DynamicValue {
        DynamicValue::new(Dynamic::from_json(json!({
            "user_name": user,
            "attached_policies": names,
            "attached_policies_detail": null,
            "combined_policies_detail": null,
            "excluded_policies_detail": null,
        })))
    }

    #[test]
    fn schema_declares_current_version_and_computed_details() {
        let schema = RamPolicyResource::new().schema();

        assert_eq!(schema.version, 1);
        assert!(schema.attribute("user_name").unwrap().required);
        assert!(schema.attribute("attached_policies").unwrap().required);
        for detail in [
            "attached_policies_detail",
            "combined_policies_detail",
            "excluded_policies_detail",
        ] {
            assert!(schema.attribute(detail).unwrap().computed, "{}", detail);
        }
    }

    #[tokio::test]
    async fn configure_rejects_foreign_provider_data() {
        let mut resource = RamPolicyResource::new();

        let response = resource
            .configure(ConfigureResourceRequest {
                provider_data: Some(Arc::new("not provider data")),
            })
            .await;
        assert_eq!(response.diagnostics[0].summary, "Invalid provider data");

        let response = resource
            .configure(ConfigureResourceRequest {
                provider_data: None,
            })
            .await;
        assert_eq!(response.diagnostics[0].summary, "No provider data");
    }

    #[tokio::test]
    async fn unconfigured_resource_reports_error() {
        let resource = RamPolicyResource::new();

        let response = resource
            .create(CreateResourceRequest {
                type_name: TYPE_NAME.to_string(),
                planned_state: config("alice", &["p1"]),
                config: config("alice", &["p1"]),
            })
            .await;

        assert_eq!(response.diagnostics[0].summary, "Provider not configured");
    }

    #[tokio::test]
    async fn lifecycle_through_dynamic_values() {
        let ram = FakeRam::new();
        ram.insert_policy("p1", PolicyType::Custom, DOC);
        let resource = configured(&ram).await;

        let created = resource
            .create(CreateResourceRequest {
                type_name: TYPE_NAME.to_string(),
                planned_state: config("alice", &["p1"]),
                config: config("alice", &["p1"]),
            })
            .await;
        assert!(created.diagnostics.is_empty(), "{:?}", created.diagnostics);
        let path = AttributePath::new("combined_policies_detail")
            .index(0)
            .attribute("policy_name");
        assert_eq!(created.new_state.get_string(&path).unwrap(), "alice-1");

        let read = resource
            .read(ReadResourceRequest {
                type_name: TYPE_NAME.to_string(),
                current_state: created.new_state.clone(),
            })
            .await;
        assert!(read.diagnostics.is_empty());
        assert_eq!(read.new_state.unwrap(), created.new_state);

        let deleted = resource
            .delete(DeleteResourceRequest {
                type_name: TYPE_NAME.to_string(),
                prior_state: created.new_state,
            })
            .await;
        assert!(deleted.diagnostics.is_empty());
        assert!(!ram.has_policy("alice-1"));
    }

    #[tokio::test]
    async fn read_nulls_attached_policies_on_drift() {
        let ram = FakeRam::new();
        ram.insert_policy("p1", PolicyType::Custom, DOC);
        let resource = configured(&ram).await;

        let created = resource
            .create(CreateResourceRequest {
                type_name: TYPE_NAME.to_string(),
                planned_state: config("alice", &["p1"]),
                config: config("alice", &["p1"]),
            })
            .await;
        ram.set_document("p1", r#"{"Version":"1","Statement":[]}"#);

        let read = resource
            .read(ReadResourceRequest {
                type_name: TYPE_NAME.to_string(),
                current_state: created.new_state,
            })
            .await;

        assert!(!read.diagnostics.has_errors());
        assert_eq!(read.diagnostics.warnings().len(), 1);
        assert!(read
            .new_state
            .unwrap()
            .is_attribute_null(&AttributePath::new("attached_policies")));
    }

    #[tokio::test]
    async fn failed_create_without_progress_returns_null_state() {
        let ram = FakeRam::new();
        let resource = configured(&ram).await;

        let created = resource
            .create(CreateResourceRequest {
                type_name: TYPE_NAME.to_string(),
                planned_state: config("alice", &["missing"]),
                config: config("alice", &["missing"]),
            })
            .await;

        assert!(created.diagnostics.has_errors());
        assert!(created.new_state.is_null());
    }

    #[tokio::test]
    async fn import_produces_state_and_warning() {
        let ram = FakeRam::new();
        ram.insert_policy("alice-1", PolicyType::Custom, DOC);
        ram.attach("alice", "alice-1");
        let resource = configured(&ram).await;

        let response = resource
            .import_state(ImportResourceStateRequest {
                type_name: TYPE_NAME.to_string(),
                id: "alice-1".to_string(),
            })
            .await;

        assert!(!response.diagnostics.has_errors());
        assert_eq!(response.diagnostics.warnings().len(), 1);
        assert_eq!(response.imported_resources.len(), 1);
        let state: RamPolicyState = response.imported_resources[0].state.to_model().unwrap();
        assert_eq!(state.user_name, "alice");
        assert_eq!(state.combined_policies_detail[0].policy_name, "alice-1");
    }

    #[tokio::test]
    async fn upgrade_moves_v0_combined_policies() {
        let raw = json!({
            "user_name": "alice",
            "attached_policies": ["p1"],
            "combined_policies": [{"policy_name": "alice-1", "policy_document": DOC}],
            "policies": null,
            "attached_policies_detail": [{"policy_name": "p1", "policy_document": DOC}]
        });

        let response = RamPolicyResource::new()
            .upgrade_state(UpgradeResourceStateRequest {
                type_name: TYPE_NAME.to_string(),
                version: 0,
                raw_state: RawState {
                    json: Some(serde_json::to_vec(&raw).unwrap()),
                },
            })
            .await;

        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        let state: RamPolicyState = response.upgraded_state.to_model().unwrap();
        assert_eq!(state.combined_policies_detail[0].policy_name, "alice-1");
        assert!(state.excluded_policies_detail.is_empty());
    }

    #[tokio::test]
    async fn upgrade_rejects_unknown_version() {
        let response = RamPolicyResource::new()
            .upgrade_state(UpgradeResourceStateRequest {
                type_name: TYPE_NAME.to_string(),
                version: 5,
                raw_state: RawState {
                    json: Some(b"{}".to_vec()),
                },
            })
            .await;

        assert!(response.diagnostics.has_errors());
    }
}
