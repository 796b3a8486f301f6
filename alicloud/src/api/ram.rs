//! RAM (Resource Access Management) operations
//!
//! [`RamApi`] is the single-attempt surface, implemented by [`Client`] over
//! the RPC protocol. [`RamGateway`] is what the resource code talks to: every
//! operation goes through the bounded backoff in [`super::retry`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::client::Client;
use super::error::ApiError;
use super::retry::{retry, Backoff, RetryError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyType {
    #[default]
    Custom,
    System,
}

impl PolicyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyType::Custom => "Custom",
            PolicyType::System => "System",
        }
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Custom" => Ok(PolicyType::Custom),
            "System" => Ok(PolicyType::System),
            other => Err(format!("unknown policy type '{}'", other)),
        }
    }
}

/// A policy as stored in RAM, with the document of its default version
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    pub name: String,
    pub policy_type: PolicyType,
    pub document: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyEntities {
    pub users: Vec<String>,
}

#[async_trait]
pub trait RamApi: Send + Sync {
    async fn get_policy(&self, name: &str, policy_type: PolicyType) -> Result<Policy, ApiError>;

    async fn create_policy(&self, name: &str, document: &str) -> Result<(), ApiError>;

    async fn delete_policy(&self, name: &str) -> Result<(), ApiError>;

    async fn attach_policy_to_user(
        &self,
        name: &str,
        policy_type: PolicyType,
        user: &str,
    ) -> Result<(), ApiError>;

    async fn detach_policy_from_user(
        &self,
        name: &str,
        policy_type: PolicyType,
        user: &str,
    ) -> Result<(), ApiError>;

    async fn list_entities_for_policy(
        &self,
        name: &str,
        policy_type: PolicyType,
    ) -> Result<PolicyEntities, ApiError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetPolicyResponse {
    policy: PolicyInfo,
    default_policy_version: PolicyVersion,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PolicyInfo {
    policy_name: String,
    policy_type: PolicyType,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PolicyVersion {
    policy_document: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListEntitiesResponse {
    #[serde(default)]
    users: UserList,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UserList {
    #[serde(default)]
    user: Vec<UserEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UserEntry {
    user_name: String,
}

/// Any action whose body we don't read beyond the request id
#[derive(Debug, Deserialize)]
struct Acknowledged {}

#[async_trait]
impl RamApi for Client {
    async fn get_policy(&self, name: &str, policy_type: PolicyType) -> Result<Policy, ApiError> {
        let response: GetPolicyResponse = self
            .call(
                "GetPolicy",
                &[("PolicyName", name), ("PolicyType", policy_type.as_str())],
            )
            .await?;

        Ok(Policy {
            name: response.policy.policy_name,
            policy_type: response.policy.policy_type,
            document: response.default_policy_version.policy_document,
        })
    }

    async fn create_policy(&self, name: &str, document: &str) -> Result<(), ApiError> {
        let _: Acknowledged = self
            .call(
                "CreatePolicy",
                &[("PolicyName", name), ("PolicyDocument", document)],
            )
            .await?;
        Ok(())
    }

    async fn delete_policy(&self, name: &str) -> Result<(), ApiError> {
        let _: Acknowledged = self.call("DeletePolicy", &[("PolicyName", name)]).await?;
        Ok(())
    }

    async fn attach_policy_to_user(
        &self,
        name: &str,
        policy_type: PolicyType,
        user: &str,
    ) -> Result<(), ApiError> {
        let _: Acknowledged = self
            .call(
                "AttachPolicyToUser",
                &[
                    ("PolicyName", name),
                    ("PolicyType", policy_type.as_str()),
                    ("UserName", user),
                ],
            )
            .await?;
        Ok(())
    }

    async fn detach_policy_from_user(
        &self,
        name: &str,
        policy_type: PolicyType,
        user: &str,
    ) -> Result<(), ApiError> {
        let _: Acknowledged = self
            .call(
                "DetachPolicyFromUser",
                &[
                    ("PolicyName", name),
                    ("PolicyType", policy_type.as_str()),
                    ("UserName", user),
                ],
            )
            .await?;
        Ok(())
    }

    async fn list_entities_for_policy(
        &self,
        name: &str,
        policy_type: PolicyType,
    ) -> Result<PolicyEntities, ApiError> {
        let response: ListEntitiesResponse = self
            .call(
                "ListEntitiesForPolicy",
                &[("PolicyName", name), ("PolicyType", policy_type.as_str())],
            )
            .await?;

        Ok(PolicyEntities {
            users: response
                .users
                .user
                .into_iter()
                .map(|entry| entry.user_name)
                .collect(),
        })
    }
}

/// Retry-wrapped access to RAM, shared by every resource instance
#[derive(Clone)]
pub struct RamGateway {
    api: Arc<dyn RamApi>,
    backoff: Backoff,
}

impl RamGateway {
    pub fn new(api: Arc<dyn RamApi>) -> Self {
        Self::with_backoff(api, Backoff::default())
    }

    pub fn with_backoff(api: Arc<dyn RamApi>, backoff: Backoff) -> Self {
        Self { api, backoff }
    }

    pub async fn get_policy(
        &self,
        name: &str,
        policy_type: PolicyType,
    ) -> Result<Policy, RetryError> {
        retry(&self.backoff, "GetPolicy", ApiError::class, || {
            self.api.get_policy(name, policy_type)
        })
        .await
    }

    pub async fn create_policy(&self, name: &str, document: &str) -> Result<(), RetryError> {
        tracing::debug!("Creating policy {}", name);
        retry(&self.backoff, "CreatePolicy", ApiError::class, || {
            self.api.create_policy(name, document)
        })
        .await
    }

    pub async fn delete_policy(&self, name: &str) -> Result<(), RetryError> {
        tracing::debug!("Deleting policy {}", name);
        retry(&self.backoff, "DeletePolicy", ApiError::class, || {
            self.api.delete_policy(name)
        })
        .await
    }

    pub async fn attach_policy_to_user(
        &self,
        name: &str,
        policy_type: PolicyType,
        user: &str,
    ) -> Result<(), RetryError> {
        tracing::debug!("Attaching {} policy {} to {}", policy_type, name, user);
        retry(&self.backoff, "AttachPolicyToUser", ApiError::class, || {
            self.api.attach_policy_to_user(name, policy_type, user)
        })
        .await
    }

    pub async fn detach_policy_from_user(
        &self,
        name: &str,
        policy_type: PolicyType,
        user: &str,
    ) -> Result<(), RetryError> {
        tracing::debug!("Detaching {} policy {} from {}", policy_type, name, user);
        retry(&self.backoff, "DetachPolicyFromUser", ApiError::class, || {
            self.api.detach_policy_from_user(name, policy_type, user)
        })
        .await
    }

    pub async fn list_entities_for_policy(
        &self,
        name: &str,
        policy_type: PolicyType,
    ) -> Result<PolicyEntities, RetryError> {
        retry(&self.backoff, "ListEntitiesForPolicy", ApiError::class, || {
            self.api.list_entities_for_policy(name, policy_type)
        })
        .await
    }
}
