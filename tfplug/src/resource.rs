//! Resource trait and related types
//!
//! This module defines the lifecycle a managed resource implements. Terraform
//! invokes one lifecycle method at a time per resource instance.

use crate::schema::Schema;
use crate::types::{Diagnostic, DynamicValue, RawState};
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

/// Base trait for resources - implement CRUD operations
/// Type name should be constant and match the key in Provider::resources()
#[async_trait]
pub trait Resource: Send + Sync {
    /// Type name should be constant (e.g., "st-alicloud_ram_policy")
    fn type_name(&self) -> &str;

    /// Called to get resource schema
    fn schema(&self) -> Schema;

    /// Called immediately after the factory creates the resource
    /// Use this to store API clients from the provider
    async fn configure(&mut self, request: ConfigureResourceRequest) -> ConfigureResourceResponse;

    /// Called to create a new resource
    /// MUST populate all attributes in response.new_state (including computed)
    async fn create(&self, request: CreateResourceRequest) -> CreateResourceResponse;

    /// Called to refresh state
    /// MUST return accurate current state or None if resource doesn't exist
    async fn read(&self, request: ReadResourceRequest) -> ReadResourceResponse;

    /// Called to update an existing resource
    async fn update(&self, request: UpdateResourceRequest) -> UpdateResourceResponse;

    /// Called to delete a resource
    async fn delete(&self, request: DeleteResourceRequest) -> DeleteResourceResponse;

    /// Called during "terraform import"
    async fn import_state(&self, request: ImportResourceStateRequest) -> ImportResourceStateResponse {
        ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![Diagnostic::error(
                "Import not supported",
                format!("Resource type {} does not support import", request.type_name),
            )],
        }
    }

    /// Called when the stored state was written with another schema version
    /// Without an override, only states of the current version are accepted
    async fn upgrade_state(
        &self,
        request: UpgradeResourceStateRequest,
    ) -> UpgradeResourceStateResponse {
        let current = self.schema().version;
        if request.version != current {
            return UpgradeResourceStateResponse {
                upgraded_state: DynamicValue::null(),
                diagnostics: vec![Diagnostic::error(
                    "Unsupported state version",
                    format!(
                        "{} cannot upgrade state from version {} to {}",
                        request.type_name, request.version, current
                    ),
                )],
            };
        }

        match request
            .raw_state
            .json
            .as_deref()
            .map(DynamicValue::decode_json)
            .unwrap_or_else(|| Ok(DynamicValue::null()))
        {
            Ok(upgraded_state) => UpgradeResourceStateResponse {
                upgraded_state,
                diagnostics: vec![],
            },
            Err(e) => UpgradeResourceStateResponse {
                upgraded_state: DynamicValue::null(),
                diagnostics: vec![Diagnostic::error("Invalid stored state", e.to_string())],
            },
        }
    }
}

/// Factory used by providers to hand out fresh resource instances
pub type ResourceFactory = fn() -> Box<dyn Resource>;

pub struct ConfigureResourceRequest {
    /// Data from ConfigureProviderResponse.provider_data
    /// Downcast to your provider's specific type
    pub provider_data: Option<Arc<dyn Any + Send + Sync>>,
}

pub struct ConfigureResourceResponse {
    pub diagnostics: Vec<Diagnostic>,
}

pub struct CreateResourceRequest {
    pub type_name: String,
    pub planned_state: DynamicValue,
    pub config: DynamicValue,
}

pub struct CreateResourceResponse {
    pub new_state: DynamicValue,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ReadResourceRequest {
    pub type_name: String,
    pub current_state: DynamicValue,
}

pub struct ReadResourceResponse {
    pub new_state: Option<DynamicValue>,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct UpdateResourceRequest {
    pub type_name: String,
    pub prior_state: DynamicValue,
    pub planned_state: DynamicValue,
    pub config: DynamicValue,
}

pub struct UpdateResourceResponse {
    pub new_state: DynamicValue,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct DeleteResourceRequest {
    pub type_name: String,
    pub prior_state: DynamicValue,
}

pub struct DeleteResourceResponse {
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ImportResourceStateRequest {
    pub type_name: String,
    pub id: String,
}

pub struct ImportResourceStateResponse {
    pub imported_resources: Vec<ImportedResource>,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ImportedResource {
    pub type_name: String,
    pub state: DynamicValue,
}

pub struct UpgradeResourceStateRequest {
    pub type_name: String,
    pub version: i64,
    pub raw_state: RawState,
}

pub struct UpgradeResourceStateResponse {
    pub upgraded_state: DynamicValue,
    pub diagnostics: Vec<Diagnostic>,
}
