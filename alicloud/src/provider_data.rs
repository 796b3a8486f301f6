//! Provider data handed to every resource

use crate::api::{Client, RamGateway};
use std::sync::Arc;

#[derive(Clone)]
pub struct AlicloudProviderData {
    pub ram: RamGateway,
    /// Recorded for log context only; RAM is a global service
    pub region: Option<String>,
}

impl AlicloudProviderData {
    pub fn new(client: Client, region: Option<String>) -> Self {
        Self {
            ram: RamGateway::new(Arc::new(client)),
            region,
        }
    }
}
