//! Create/read/update/delete/import of the combined policies of one user
//!
//! Each step takes what it needs by reference and hands back a new state
//! fragment; only the lifecycle methods assemble a full [`RamPolicyState`].

use tfplug::Diagnostic;

use super::fetcher::{describe, fetch_policies, CANDIDATE_TYPES};
use super::model::{
    combined_policy_name, is_combined_policy_name, PolicyDetail, RamPolicyPlan, RamPolicyState,
};
use super::packer::{self, Packing};
use crate::api::error::POLICY_ALREADY_ATTACHED;
use crate::api::{PolicyType, RamGateway, RetryError};

pub const CREATE_FAILED: &str = "[API ERROR] Failed to Create the Policy.";
pub const UPDATE_FAILED: &str = "[API ERROR] Failed to Update the Policy.";
pub const ATTACH_FAILED: &str = "[API ERROR] Failed to Attach Policy to User.";
pub const READ_COMBINED_FAILED: &str = "[API ERROR] Failed to Read Combined Policy";
pub const READ_ATTACHED_FAILED: &str = "[API ERROR] Failed to Read Attached Policy";
pub const DELETE_FAILED: &str = "[API ERROR] Failed to Delete Policy";
pub const IMPORT_FAILED: &str = "[API ERROR] Failed to Import Policy";

/// State to persist (if any) plus what to tell the user
#[derive(Debug)]
pub struct Outcome {
    pub state: Option<RamPolicyState>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Outcome {
    fn ok(state: Option<RamPolicyState>) -> Self {
        Self {
            state,
            diagnostics: vec![],
        }
    }

    fn failed(state: Option<RamPolicyState>, diagnostic: Diagnostic) -> Self {
        Self {
            state,
            diagnostics: vec![diagnostic],
        }
    }
}

#[derive(Debug, Default)]
pub struct CombinedRefresh {
    pub live: Vec<PolicyDetail>,
    /// Deleted outside of Terraform
    pub missing: Vec<String>,
    pub drifted: Vec<String>,
    pub failures: Vec<String>,
}

/// Names of recorded policies whose live document differs
pub fn detect_drift(recorded: &[PolicyDetail], live: &[PolicyDetail]) -> Vec<String> {
    recorded
        .iter()
        .filter(|old| {
            live.iter().any(|current| {
                current.policy_name == old.policy_name
                    && current.policy_document != old.policy_document
            })
        })
        .map(|old| old.policy_name.clone())
        .collect()
}

fn tolerate_not_found(result: Result<(), RetryError>) -> Result<(), RetryError> {
    match result {
        Err(e) if e.is_not_found() => {
            tracing::debug!("Ignoring {}", e);
            Ok(())
        }
        other => other,
    }
}

pub struct Reconciler<'a> {
    gateway: &'a RamGateway,
}

impl<'a> Reconciler<'a> {
    pub fn new(gateway: &'a RamGateway) -> Self {
        Self { gateway }
    }

    pub async fn create(&self, plan: &RamPolicyPlan) -> Outcome {
        tracing::info!("Creating combined policies for user {}", plan.user_name);

        let report = fetch_policies(self.gateway, &plan.attached_policies, &CANDIDATE_TYPES).await;
        if !report.is_complete() {
            return Outcome::failed(
                None,
                Diagnostic::error(CREATE_FAILED, report.describe_failures()),
            );
        }

        let packing = match packer::combine(&report.details) {
            Ok(packing) => packing,
            Err(e) => return Outcome::failed(None, Diagnostic::error(CREATE_FAILED, e.to_string())),
        };

        self.provision(plan, report.details, packing, CREATE_FAILED)
            .await
    }

    pub async fn read(&self, prior: &RamPolicyState) -> Outcome {
        let mut state = prior.clone();
        let mut diagnostics = vec![];

        let refresh = self.refresh_combined(&prior.combined_policies_detail).await;
        if !refresh.failures.is_empty() {
            return Outcome::failed(
                Some(prior.clone()),
                Diagnostic::error(READ_COMBINED_FAILED, refresh.failures.join("\n")),
            );
        }

        if !refresh.missing.is_empty() {
            tracing::warn!(
                "Combined policies of {} are gone: {}",
                prior.user_name,
                refresh.missing.join(", ")
            );
            diagnostics.push(Diagnostic::warning(
                "Combined Policies could not be found.",
                format!(
                    "The combined policies attached to the user may be deleted due to human \
                     mistake or API error. This resource will be re-created.\n\n{}",
                    refresh.missing.join(", ")
                ),
            ));
            state.attached_policies = None;
        }

        if !refresh.drifted.is_empty() {
            tracing::warn!("Combined policies drifted: {}", refresh.drifted.join(", "));
            diagnostics.push(Diagnostic::warning(
                "Combined Policy Drift Detected.",
                format!(
                    "The following combined policies were modified outside of Terraform and \
                     will be re-created: {}.",
                    refresh.drifted.join(", ")
                ),
            ));
            state.attached_policies = None;
        }
        state.combined_policies_detail = refresh.live;

        let report =
            fetch_policies(self.gateway, &prior.source_policy_names(), &CANDIDATE_TYPES).await;
        if !report.unexpected.is_empty() {
            return Outcome::failed(
                Some(prior.clone()),
                Diagnostic::error(READ_ATTACHED_FAILED, describe(&report.unexpected)),
            );
        }

        if !report.not_found.is_empty() {
            tracing::warn!(
                "Attached policies of {} are gone: {}",
                prior.user_name,
                report.not_found_names().join(", ")
            );
            diagnostics.push(Diagnostic::warning(
                "One (or more) of the Attached Policy could not be found.",
                format!(
                    "The policy used for Combined Policies may be deleted due to human mistake \
                     or API error.\n\n{}",
                    describe(&report.not_found)
                ),
            ));
            state.attached_policies = None;
        } else {
            let drifted = detect_drift(&prior.attached_policies_detail, &report.details);
            if !drifted.is_empty() {
                tracing::warn!("Attached policies drifted: {}", drifted.join(", "));
                diagnostics.push(Diagnostic::warning(
                    "Policy Drift Detected.",
                    format!(
                        "The following policies have drifted: {}. It may be caused by \
                         modifying the .json file outside of Terraform.",
                        drifted.join(", ")
                    ),
                ));
                state.attached_policies = None;
            }
        }

        state.excluded_policies_detail = prior
            .excluded_policies_detail
            .iter()
            .map(|excluded| {
                report
                    .details
                    .iter()
                    .find(|fresh| fresh.policy_name == excluded.policy_name)
                    .unwrap_or(excluded)
                    .clone()
            })
            .collect();
        state.attached_policies_detail = report.details;

        Outcome {
            state: Some(state),
            diagnostics,
        }
    }

    /// Rebuild the combined policies from `plan`
    ///
    /// The new inputs are fetched and packed before anything recorded in
    /// `prior` is torn down.
    pub async fn update(&self, prior: &RamPolicyState, plan: &RamPolicyPlan) -> Outcome {
        tracing::info!("Updating combined policies for user {}", plan.user_name);

        let report = fetch_policies(self.gateway, &plan.attached_policies, &CANDIDATE_TYPES).await;
        if !report.is_complete() {
            return Outcome::failed(
                Some(prior.clone()),
                Diagnostic::error(READ_ATTACHED_FAILED, report.describe_failures()),
            );
        }

        let packing = match packer::combine(&report.details) {
            Ok(packing) => packing,
            Err(e) => {
                return Outcome::failed(
                    Some(prior.clone()),
                    Diagnostic::error(UPDATE_FAILED, e.to_string()),
                )
            }
        };

        if let Err(detail) = self.cleanup(prior).await {
            return Outcome::failed(
                Some(prior.clone()),
                Diagnostic::error(DELETE_FAILED, detail),
            );
        }

        let mut outcome = self
            .provision(plan, report.details, packing, UPDATE_FAILED)
            .await;
        if outcome.state.is_none() {
            // nothing is left from the prior state
            outcome.state = Some(RamPolicyState {
                user_name: plan.user_name.clone(),
                ..Default::default()
            });
        }
        outcome
    }

    pub async fn delete(&self, prior: &RamPolicyState) -> Outcome {
        tracing::info!("Deleting combined policies for user {}", prior.user_name);

        match self.cleanup(prior).await {
            Ok(()) => Outcome::ok(None),
            Err(detail) => Outcome::failed(None, Diagnostic::error(DELETE_FAILED, detail)),
        }
    }

    /// Import from a comma-separated list of policy names
    pub async fn import(&self, id: &str) -> Outcome {
        let names: Vec<String> = id
            .split(',')
            .map(|name| name.replace(' ', ""))
            .filter(|name| !name.is_empty())
            .collect();

        if names.is_empty() {
            return Outcome::failed(
                None,
                Diagnostic::error(
                    "Invalid Import ID",
                    format!(
                        "Expected a comma-separated list of policy names, got '{}'",
                        id
                    ),
                ),
            );
        }

        let report = fetch_policies(self.gateway, &names, &CANDIDATE_TYPES).await;
        if !report.is_complete() {
            return Outcome::failed(
                None,
                Diagnostic::error(IMPORT_FAILED, report.describe_failures()),
            );
        }

        let mut user_name = None;
        let mut failures = vec![];
        for detail in &report.details {
            match self
                .gateway
                .list_entities_for_policy(&detail.policy_name, detail.policy_type)
                .await
            {
                Ok(entities) => {
                    if let Some(user) = entities.users.last() {
                        user_name = Some(user.clone());
                    }
                }
                Err(e) => failures.push(format!("{}: {}", detail.policy_name, e)),
            }
        }

        if !failures.is_empty() {
            return Outcome::failed(None, Diagnostic::error(IMPORT_FAILED, failures.join("\n")));
        }

        let Some(user_name) = user_name else {
            return Outcome::failed(
                None,
                Diagnostic::error(
                    IMPORT_FAILED,
                    format!("None of the policies {} is attached to a user.", names.join(", ")),
                ),
            );
        };

        let (combined, excluded): (Vec<_>, Vec<_>) = report
            .details
            .into_iter()
            .partition(|detail| is_combined_policy_name(&user_name, &detail.policy_name));

        tracing::info!(
            "Imported {} combined and {} excluded policies of user {}",
            combined.len(),
            excluded.len(),
            user_name
        );

        Outcome {
            state: Some(RamPolicyState {
                user_name,
                attached_policies: None,
                attached_policies_detail: vec![],
                combined_policies_detail: combined,
                excluded_policies_detail: excluded,
            }),
            diagnostics: vec![Diagnostic::warning(
                "Unable to Set the attached_policies Attribute",
                "After running terraform import, Terraform will not automatically set the \
                 attached_policies attributes. To ensure that all attributes defined in the \
                 Terraform configuration are set, you need to run terraform apply. This command \
                 will apply the changes and set the desired attributes according to your \
                 configuration.",
            )],
        }
    }

    /// Create, attach and confirm the combined policies of `packing`
    ///
    /// On failure the returned state records whatever was created so far, with
    /// `attached_policies` left null so the next plan reconciles it.
    async fn provision(
        &self,
        plan: &RamPolicyPlan,
        sources: Vec<PolicyDetail>,
        packing: Packing,
        summary: &str,
    ) -> Outcome {
        let mut state = RamPolicyState {
            user_name: plan.user_name.clone(),
            attached_policies: None,
            attached_policies_detail: sources,
            combined_policies_detail: vec![],
            excluded_policies_detail: packing.excluded,
        };

        for (i, document) in packing.combined.into_iter().enumerate() {
            let name = combined_policy_name(&plan.user_name, i + 1);
            if let Err(e) = self.gateway.create_policy(&name, &document).await {
                let partial = if state.combined_policies_detail.is_empty() {
                    None
                } else {
                    Some(state)
                };
                return Outcome::failed(
                    partial,
                    Diagnostic::error(summary, format!("{}: {}", name, e)),
                );
            }
            state
                .combined_policies_detail
                .push(PolicyDetail::new(name, document, PolicyType::Custom));
        }

        if let Err(detail) = self.attach_all(&state).await {
            return Outcome::failed(Some(state), Diagnostic::error(ATTACH_FAILED, detail));
        }

        let refresh = self.refresh_combined(&state.combined_policies_detail).await;
        if !refresh.failures.is_empty() {
            return Outcome::failed(
                Some(state),
                Diagnostic::error(READ_COMBINED_FAILED, refresh.failures.join("\n")),
            );
        }

        if !refresh.missing.is_empty() {
            tracing::warn!(
                "Created policies not readable yet, recording them as created: {}",
                refresh.missing.join(", ")
            );
        }
        state.combined_policies_detail = state
            .combined_policies_detail
            .iter()
            .map(|created| {
                refresh
                    .live
                    .iter()
                    .find(|live| live.policy_name == created.policy_name)
                    .unwrap_or(created)
                    .clone()
            })
            .collect();
        state.attached_policies = Some(plan.attached_policies.clone());

        tracing::info!(
            "User {} has {} combined and {} directly attached policies",
            state.user_name,
            state.combined_policies_detail.len(),
            state.excluded_policies_detail.len()
        );

        Outcome::ok(Some(state))
    }

    async fn attach_all(&self, state: &RamPolicyState) -> Result<(), String> {
        let policies = state
            .combined_policies_detail
            .iter()
            .chain(&state.excluded_policies_detail);

        for detail in policies {
            match self
                .gateway
                .attach_policy_to_user(&detail.policy_name, detail.policy_type, &state.user_name)
                .await
            {
                Ok(()) => {}
                Err(e) if e.code() == Some(POLICY_ALREADY_ATTACHED) => {
                    tracing::debug!(
                        "{} is already attached to {}",
                        detail.policy_name,
                        state.user_name
                    );
                }
                Err(e) => return Err(format!("{}: {}", detail.policy_name, e)),
            }
        }

        Ok(())
    }

    /// Re-read recorded combined policies
    pub async fn refresh_combined(&self, recorded: &[PolicyDetail]) -> CombinedRefresh {
        let mut refresh = CombinedRefresh::default();

        for detail in recorded {
            match self
                .gateway
                .get_policy(&detail.policy_name, PolicyType::Custom)
                .await
            {
                Ok(policy) => {
                    if policy.document != detail.policy_document {
                        refresh.drifted.push(detail.policy_name.clone());
                    }
                    refresh.live.push(PolicyDetail::from(policy));
                }
                Err(e) if e.is_not_found() => refresh.missing.push(detail.policy_name.clone()),
                Err(e) => refresh
                    .failures
                    .push(format!("{}: {}", detail.policy_name, e)),
            }
        }

        refresh
    }

    /// Detach and delete combined policies, detach excluded ones
    ///
    /// Anything already detached or deleted counts as done.
    async fn cleanup(&self, state: &RamPolicyState) -> Result<(), String> {
        let user = &state.user_name;

        for detail in &state.combined_policies_detail {
            let name = &detail.policy_name;
            tolerate_not_found(
                self.gateway
                    .detach_policy_from_user(name, PolicyType::Custom, user)
                    .await,
            )
            .map_err(|e| format!("{}: {}", name, e))?;
            tolerate_not_found(self.gateway.delete_policy(name).await)
                .map_err(|e| format!("{}: {}", name, e))?;
        }

        for detail in &state.excluded_policies_detail {
            let name = &detail.policy_name;
            tolerate_not_found(
                self.gateway
                    .detach_policy_from_user(name, detail.policy_type, user)
                    .await,
            )
            .map_err(|e| format!("{}: {}", name, e))?;
        }

        Ok(())
    }
}
