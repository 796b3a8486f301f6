//! In-memory RAM used by resource tests

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::error::ApiError;
use super::ram::{Policy, PolicyEntities, PolicyType, RamApi, RamGateway};
use super::retry::Backoff;

#[derive(Default)]
struct FakeState {
    policies: BTreeMap<String, Policy>,
    /// user -> attached policy names
    attachments: BTreeMap<String, BTreeSet<String>>,
    /// (action, policy name) -> errors returned before the call succeeds
    failures: HashMap<(String, String), VecDeque<ApiError>>,
    calls: Vec<String>,
}

#[derive(Default)]
pub struct FakeRam {
    state: Mutex<FakeState>,
}

pub fn fast_backoff() -> Backoff {
    Backoff {
        initial_interval: Duration::from_millis(1),
        multiplier: 2.0,
        max_interval: Duration::from_millis(5),
        max_elapsed_time: Duration::from_millis(200),
    }
}

impl FakeRam {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn gateway(self: &Arc<Self>) -> RamGateway {
        RamGateway::with_backoff(self.clone(), fast_backoff())
    }

    pub fn insert_policy(&self, name: &str, policy_type: PolicyType, document: &str) {
        self.lock().policies.insert(
            name.to_string(),
            Policy {
                name: name.to_string(),
                policy_type,
                document: document.to_string(),
            },
        );
    }

    /// Out-of-band deletion, attachments included
    pub fn remove_policy(&self, name: &str) {
        let mut state = self.lock();
        state.policies.remove(name);
        for attached in state.attachments.values_mut() {
            attached.remove(name);
        }
    }

    pub fn set_document(&self, name: &str, document: &str) {
        if let Some(policy) = self.lock().policies.get_mut(name) {
            policy.document = document.to_string();
        }
    }

    pub fn attach(&self, user: &str, name: &str) {
        self.lock()
            .attachments
            .entry(user.to_string())
            .or_default()
            .insert(name.to_string());
    }

    pub fn document(&self, name: &str) -> Option<String> {
        self.lock().policies.get(name).map(|p| p.document.clone())
    }

    pub fn has_policy(&self, name: &str) -> bool {
        self.lock().policies.contains_key(name)
    }

    pub fn attached(&self, user: &str) -> Vec<String> {
        self.lock()
            .attachments
            .get(user)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Queue an error for the next `action` call on `name`
    pub fn fail_next(&self, action: &str, name: &str, err: ApiError) {
        self.lock()
            .failures
            .entry((action.to_string(), name.to_string()))
            .or_default()
            .push_back(err);
    }

    /// Calls made so far, as `Action:PolicyName`
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn count_calls(&self, action: &str) -> usize {
        let prefix = format!("{}:", action);
        self.lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    fn begin(&self, state: &mut FakeState, action: &str, name: &str) -> Result<(), ApiError> {
        state.calls.push(format!("{}:{}", action, name));
        match state
            .failures
            .get_mut(&(action.to_string(), name.to_string()))
            .and_then(VecDeque::pop_front)
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn get_sync(&self, name: &str, policy_type: PolicyType) -> Result<Policy, ApiError> {
        let mut state = self.lock();
        self.begin(&mut state, "GetPolicy", name)?;
        match state.policies.get(name) {
            Some(policy) if policy.policy_type == policy_type => Ok(policy.clone()),
            _ => Err(not_found_policy(name)),
        }
    }

    fn create_sync(&self, name: &str, document: &str) -> Result<(), ApiError> {
        let mut state = self.lock();
        self.begin(&mut state, "CreatePolicy", name)?;
        if state.policies.contains_key(name) {
            return Err(ApiError::service(
                409,
                "EntityAlreadyExists.Policy",
                format!("The policy {} already exists.", name),
            ));
        }
        if serde_json::from_str::<serde_json::Value>(document).is_err() {
            return Err(ApiError::service(
                400,
                "InvalidParameter.PolicyDocument",
                "The policy document is not valid JSON.",
            ));
        }
        state.policies.insert(
            name.to_string(),
            Policy {
                name: name.to_string(),
                policy_type: PolicyType::Custom,
                document: document.to_string(),
            },
        );
        Ok(())
    }

    fn delete_sync(&self, name: &str) -> Result<(), ApiError> {
        let mut state = self.lock();
        self.begin(&mut state, "DeletePolicy", name)?;
        if !state.policies.contains_key(name) {
            return Err(not_found_policy(name));
        }
        if state.attachments.values().any(|names| names.contains(name)) {
            return Err(ApiError::service(
                409,
                "DeleteConflict.Policy.User",
                format!("The policy {} is still attached to a user.", name),
            ));
        }
        state.policies.remove(name);
        Ok(())
    }

    fn attach_sync(&self, name: &str, policy_type: PolicyType, user: &str) -> Result<(), ApiError> {
        let mut state = self.lock();
        self.begin(&mut state, "AttachPolicyToUser", name)?;
        match state.policies.get(name) {
            Some(policy) if policy.policy_type == policy_type => {}
            _ => return Err(not_found_policy(name)),
        }
        let attached = state.attachments.entry(user.to_string()).or_default();
        if !attached.insert(name.to_string()) {
            return Err(ApiError::service(
                409,
                "EntityAlreadyExists.User.Policy",
                format!("The policy {} is already attached to {}.", name, user),
            ));
        }
        Ok(())
    }

    fn detach_sync(&self, name: &str, user: &str) -> Result<(), ApiError> {
        let mut state = self.lock();
        self.begin(&mut state, "DetachPolicyFromUser", name)?;
        let removed = state
            .attachments
            .get_mut(user)
            .map(|names| names.remove(name))
            .unwrap_or(false);
        if !removed {
            return Err(ApiError::service(
                404,
                "EntityNotExist.User.Policy",
                format!("The policy {} is not attached to {}.", name, user),
            ));
        }
        Ok(())
    }

    fn list_sync(&self, name: &str, policy_type: PolicyType) -> Result<PolicyEntities, ApiError> {
        let mut state = self.lock();
        self.begin(&mut state, "ListEntitiesForPolicy", name)?;
        match state.policies.get(name) {
            Some(policy) if policy.policy_type == policy_type => {}
            _ => return Err(not_found_policy(name)),
        }
        Ok(PolicyEntities {
            users: state
                .attachments
                .iter()
                .filter(|(_, names)| names.contains(name))
                .map(|(user, _)| user.clone())
                .collect(),
        })
    }
}

fn not_found_policy(name: &str) -> ApiError {
    ApiError::service(
        404,
        "EntityNotExist.Policy",
        format!("The policy {} does not exist.", name),
    )
}

#[async_trait]
impl RamApi for FakeRam {
    async fn get_policy(&self, name: &str, policy_type: PolicyType) -> Result<Policy, ApiError> {
        self.get_sync(name, policy_type)
    }

    async fn create_policy(&self, name: &str, document: &str) -> Result<(), ApiError> {
        self.create_sync(name, document)
    }

    async fn delete_policy(&self, name: &str) -> Result<(), ApiError> {
        self.delete_sync(name)
    }

    async fn attach_policy_to_user(
        &self,
        name: &str,
        policy_type: PolicyType,
        user: &str,
    ) -> Result<(), ApiError> {
        self.attach_sync(name, policy_type, user)
    }

    async fn detach_policy_from_user(
        &self,
        name: &str,
        _policy_type: PolicyType,
        user: &str,
    ) -> Result<(), ApiError> {
        self.detach_sync(name, user)
    }

    async fn list_entities_for_policy(
        &self,
        name: &str,
        policy_type: PolicyType,
    ) -> Result<PolicyEntities, ApiError> {
        self.list_sync(name, policy_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn gateway_retries_scripted_throttling() {
        let ram = FakeRam::new();
        ram.insert_policy("base", PolicyType::Custom, "{}");
        ram.fail_next(
            "GetPolicy",
            "base",
            ApiError::service(400, "Throttling.User", "slow down"),
        );
        ram.fail_next(
            "GetPolicy",
            "base",
            ApiError::service(503, "ServiceUnavailable", "busy"),
        );

        let policy = ram
            .gateway()
            .get_policy("base", PolicyType::Custom)
            .await
            .unwrap();

        assert_eq!(policy.document, "{}");
        assert_eq!(ram.count_calls("GetPolicy"), 3);
    }

    #[tokio::test]
    async fn delete_refuses_attached_policies() {
        let ram = FakeRam::new();
        ram.insert_policy("alice-1", PolicyType::Custom, "{}");
        ram.attach("alice", "alice-1");

        let err = ram.gateway().delete_policy("alice-1").await.unwrap_err();
        assert_eq!(err.code(), Some("DeleteConflict.Policy.User"));

        ram.gateway()
            .detach_policy_from_user("alice-1", PolicyType::Custom, "alice")
            .await
            .unwrap();
        ram.gateway().delete_policy("alice-1").await.unwrap();
        assert!(!ram.has_policy("alice-1"));
    }
}
