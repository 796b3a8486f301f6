//! Provider trait and related types

use crate::resource::ResourceFactory;
use crate::schema::Schema;
use crate::types::{Diagnostic, DynamicValue};
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// A provider configures shared clients and hands out resources
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider type name, used as the prefix of every resource type
    fn type_name(&self) -> &str;

    /// Schema of the provider configuration block
    fn schema(&self) -> Schema;

    /// Called once with the provider block
    /// Anything in provider_data is passed to every resource's configure
    async fn configure(&mut self, request: ConfigureProviderRequest) -> ConfigureProviderResponse;

    /// Resource factories keyed by resource type name
    fn resources(&self) -> HashMap<String, ResourceFactory>;
}

pub struct ConfigureProviderRequest {
    pub terraform_version: String,
    pub config: DynamicValue,
}

pub struct ConfigureProviderResponse {
    pub diagnostics: Vec<Diagnostic>,
    pub provider_data: Option<Arc<dyn Any + Send + Sync>>,
}
