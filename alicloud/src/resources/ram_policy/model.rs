//! Typed plan and state of `st-alicloud_ram_policy`, plus state upgrades

use serde::{Deserialize, Deserializer, Serialize};
use tfplug::TfplugError;

use crate::api::{Policy, PolicyType};

pub const SCHEMA_VERSION: i64 = 1;

/// Null, unknown and missing lists all decode as empty
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<Vec<T>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

fn null_as_default_type<'de, D>(deserializer: D) -> Result<PolicyType, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<PolicyType>::deserialize(deserializer).map(Option::unwrap_or_default)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDetail {
    pub policy_name: String,
    pub policy_document: String,
    #[serde(default, deserialize_with = "null_as_default_type")]
    pub policy_type: PolicyType,
}

impl PolicyDetail {
    pub fn new(name: impl Into<String>, document: impl Into<String>, policy_type: PolicyType) -> Self {
        Self {
            policy_name: name.into(),
            policy_document: document.into(),
            policy_type,
        }
    }
}

impl From<Policy> for PolicyDetail {
    fn from(policy: Policy) -> Self {
        Self {
            policy_name: policy.name,
            policy_document: policy.document,
            policy_type: policy.policy_type,
        }
    }
}

/// What the user declared
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RamPolicyPlan {
    pub user_name: String,
    pub attached_policies: Vec<String>,
}

/// What gets persisted between runs
///
/// `attached_policies` is `None` when a read found drift or missing policies;
/// the resulting diff against the configuration schedules an update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RamPolicyState {
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub attached_policies: Option<Vec<String>>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub attached_policies_detail: Vec<PolicyDetail>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub combined_policies_detail: Vec<PolicyDetail>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub excluded_policies_detail: Vec<PolicyDetail>,
}

impl RamPolicyState {
    /// Source policy names to refresh: the declared list, or what was last
    /// recorded when the declared list has been nulled out
    pub fn source_policy_names(&self) -> Vec<String> {
        match &self.attached_policies {
            Some(names) => names.clone(),
            None => self
                .attached_policies_detail
                .iter()
                .map(|detail| detail.policy_name.clone())
                .collect(),
        }
    }
}

pub fn combined_policy_name(user_name: &str, index: usize) -> String {
    format!("{}-{}", user_name, index)
}

/// True for `<user_name>-<n>`, the names generated for combined policies
pub fn is_combined_policy_name(user_name: &str, policy_name: &str) -> bool {
    policy_name
        .strip_prefix(user_name)
        .and_then(|rest| rest.strip_prefix('-'))
        .map(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}

/// Layout written before the detail lists were split
#[derive(Debug, Deserialize)]
struct StateV0 {
    #[serde(default)]
    user_name: String,
    #[serde(default)]
    attached_policies: Option<Vec<String>>,
    #[serde(default, deserialize_with = "null_as_empty")]
    policies: Vec<PolicyDetail>,
    #[serde(default, deserialize_with = "null_as_empty")]
    combined_policies: Vec<PolicyDetail>,
    #[serde(default, deserialize_with = "null_as_empty")]
    attached_policies_detail: Vec<PolicyDetail>,
}

/// Bring a stored state of any known schema version to the current one
pub fn upgrade_state(version: i64, raw: serde_json::Value) -> tfplug::Result<RamPolicyState> {
    match version {
        0 => {
            let old: StateV0 = serde_json::from_value(raw)
                .map_err(|e| TfplugError::UpgradeFailed(format!("version 0 state: {}", e)))?;

            let generated = if old.combined_policies.is_empty() {
                old.policies
            } else {
                old.combined_policies
            };

            let (combined, excluded): (Vec<_>, Vec<_>) = generated
                .into_iter()
                .partition(|detail| is_combined_policy_name(&old.user_name, &detail.policy_name));

            Ok(RamPolicyState {
                user_name: old.user_name,
                attached_policies: old.attached_policies,
                attached_policies_detail: old.attached_policies_detail,
                combined_policies_detail: combined,
                excluded_policies_detail: excluded,
            })
        }
        SCHEMA_VERSION => serde_json::from_value(raw)
            .map_err(|e| TfplugError::UpgradeFailed(format!("version 1 state: {}", e))),
        other => Err(TfplugError::UpgradeFailed(format!(
            "unsupported state version {}",
            other
        ))),
    }
}
