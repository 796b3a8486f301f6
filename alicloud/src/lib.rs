pub mod api;
pub mod logging;
pub mod provider_data;
pub mod resources;

pub use logging::{init_logging, try_init_logging};
pub use provider_data::AlicloudProviderData;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tfplug::provider::{ConfigureProviderRequest, ConfigureProviderResponse, Provider};
use tfplug::resource::{Resource, ResourceFactory};
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, DynamicValue};

pub const PROVIDER_TYPE_NAME: &str = "st-alicloud";

#[derive(Default)]
pub struct AlicloudProvider {
    provider_data: Option<AlicloudProviderData>,
}

impl AlicloudProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider_data(&self) -> Option<&AlicloudProviderData> {
        self.provider_data.as_ref()
    }
}

/// Attribute value, or the environment variable when unset or empty
fn setting(config: &DynamicValue, attribute: &str, env_var: &str) -> Option<String> {
    config
        .get_string(&AttributePath::new(attribute))
        .ok()
        .filter(|value| !value.is_empty())
        .or_else(|| std::env::var(env_var).ok().filter(|value| !value.is_empty()))
}

fn required_setting(
    config: &DynamicValue,
    attribute: &str,
    env_var: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<String> {
    let value = setting(config, attribute, env_var);
    if value.is_none() {
        diagnostics.push(
            Diagnostic::error(
                format!(
                    "{} is required (set in provider config or {} env var)",
                    attribute, env_var
                ),
                "",
            )
            .with_attribute(AttributePath::new(attribute)),
        );
    }
    value
}

fn ram_policy_resource() -> Box<dyn Resource> {
    Box::new(resources::RamPolicyResource::new())
}

#[async_trait]
impl Provider for AlicloudProvider {
    fn type_name(&self) -> &str {
        PROVIDER_TYPE_NAME
    }

    fn schema(&self) -> Schema {
        SchemaBuilder::new()
            .version(0)
            .description("Opinionated AliCloud provider")
            .attribute(
                AttributeBuilder::new("region", AttributeType::String)
                    .description("Region of the AliCloud account, informational since RAM is global")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("access_key", AttributeType::String)
                    .description("Access key ID used to sign API requests")
                    .optional()
                    .sensitive()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("secret_key", AttributeType::String)
                    .description("Access key secret used to sign API requests")
                    .optional()
                    .sensitive()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("ram_endpoint", AttributeType::String)
                    .description("RAM API endpoint, defaults to https://ram.aliyuncs.com")
                    .optional()
                    .build(),
            )
            .build()
    }

    async fn configure(&mut self, request: ConfigureProviderRequest) -> ConfigureProviderResponse {
        let config = &request.config;
        let mut diagnostics = vec![];

        let region = setting(config, "region", "ALICLOUD_REGION");
        let access_key =
            required_setting(config, "access_key", "ALICLOUD_ACCESS_KEY", &mut diagnostics);
        let secret_key =
            required_setting(config, "secret_key", "ALICLOUD_SECRET_KEY", &mut diagnostics);
        let endpoint = setting(config, "ram_endpoint", "ALICLOUD_RAM_ENDPOINT")
            .unwrap_or_else(|| api::DEFAULT_RAM_ENDPOINT.to_string());

        let (Some(access_key), Some(secret_key)) = (access_key, secret_key) else {
            return ConfigureProviderResponse {
                diagnostics,
                provider_data: None,
            };
        };

        match api::Client::new(&endpoint, &access_key, &secret_key) {
            Ok(client) => {
                tracing::info!(
                    "Configured provider for region {} ({})",
                    region.as_deref().unwrap_or("<unset>"),
                    endpoint
                );
                let data = AlicloudProviderData::new(client, region);
                self.provider_data = Some(data.clone());
                ConfigureProviderResponse {
                    diagnostics,
                    provider_data: Some(Arc::new(data)),
                }
            }
            Err(e) => {
                diagnostics.push(Diagnostic::error(
                    "Failed to create API client",
                    e.to_string(),
                ));
                ConfigureProviderResponse {
                    diagnostics,
                    provider_data: None,
                }
            }
        }
    }

    fn resources(&self) -> HashMap<String, ResourceFactory> {
        let mut factories: HashMap<String, ResourceFactory> = HashMap::new();
        factories.insert(
            resources::ram_policy::TYPE_NAME.to_string(),
            ram_policy_resource,
        );
        factories
    }
}
