use std::fmt;

use super::model::PolicyDetail;
use crate::api::{PolicyType, RamGateway, RetryError};

/// Lookup order for source policies
pub const CANDIDATE_TYPES: [PolicyType; 2] = [PolicyType::Custom, PolicyType::System];

#[derive(Debug)]
pub struct FetchFailure {
    pub policy_name: String,
    pub error: RetryError,
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.policy_name, self.error)
    }
}

#[derive(Debug, Default)]
pub struct FetchReport {
    pub details: Vec<PolicyDetail>,
    /// Not found under any candidate type
    pub not_found: Vec<FetchFailure>,
    pub unexpected: Vec<FetchFailure>,
}

impl FetchReport {
    pub fn is_complete(&self) -> bool {
        self.not_found.is_empty() && self.unexpected.is_empty()
    }

    /// Every failure, not-found first, one per line
    pub fn describe_failures(&self) -> String {
        self.not_found
            .iter()
            .chain(&self.unexpected)
            .map(FetchFailure::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn not_found_names(&self) -> Vec<&str> {
        self.not_found
            .iter()
            .map(|failure| failure.policy_name.as_str())
            .collect()
    }
}

pub fn describe(failures: &[FetchFailure]) -> String {
    failures
        .iter()
        .map(FetchFailure::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fetch every named policy, trying each candidate type in order
///
/// Failures are collected rather than short-circuited so one missing policy
/// doesn't hide the others.
pub async fn fetch_policies(
    gateway: &RamGateway,
    names: &[String],
    candidate_types: &[PolicyType],
) -> FetchReport {
    let mut report = FetchReport::default();

    'names: for name in names {
        for (i, policy_type) in candidate_types.iter().enumerate() {
            let last = i + 1 == candidate_types.len();

            match gateway.get_policy(name, *policy_type).await {
                Ok(policy) => {
                    report.details.push(PolicyDetail::from(policy));
                    continue 'names;
                }
                Err(error) if error.is_not_found() && !last => {
                    tracing::debug!("Policy {} is not a {} policy", name, policy_type);
                }
                Err(error) if error.is_not_found() => {
                    report.not_found.push(FetchFailure {
                        policy_name: name.clone(),
                        error,
                    });
                }
                Err(error) => {
                    report.unexpected.push(FetchFailure {
                        policy_name: name.clone(),
                        error,
                    });
                    continue 'names;
                }
            }
        }
    }

    report
}
