//! tfplug - Terraform plugin interface for Rust providers
//!
//! The types a provider is written against: dynamic values and diagnostics,
//! schemas, and the provider/resource lifecycle traits. Wire-protocol
//! plumbing lives outside this crate.

pub mod error;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod types;

// Re-exports for convenience
pub use error::{Result, TfplugError};
pub use provider::{ConfigureProviderRequest, ConfigureProviderResponse, Provider};
pub use resource::{Resource, ResourceFactory};
pub use schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
pub use types::{
    AttributePath, Diagnostic, DiagnosticSeverity, DiagnosticsExt, Dynamic, DynamicValue,
};
