//! Greedy packing of policy statements into combined documents
//!
//! RAM caps both the length of a policy document and the number of policies
//! attached to one user. Statements from the source policies are merged, in
//! input order, into as few documents as a single open bin allows. Policies
//! that cannot fit a document on their own are passed through untouched and
//! attached directly.

use serde_json::Value;
use thiserror::Error;

use super::model::PolicyDetail;

/// Maximum length of a RAM policy document
pub const MAX_DOCUMENT_LENGTH: usize = 6144;

/// Length of the `{"Version":"1","Statement":[` + `]}` wrapper
pub const KEYWORD_OVERHEAD: usize = 30;

#[derive(Debug, Error, PartialEq)]
pub enum PackError {
    #[error("policy {policy_name} has a malformed document: {reason}")]
    MalformedDocument { policy_name: String, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Packing {
    /// Combined documents, in the order they are named `<user>-1`, `<user>-2`, ...
    pub combined: Vec<String>,
    pub excluded: Vec<PolicyDetail>,
}

pub fn wrap_statements(statements: &str) -> String {
    format!(r#"{{"Version":"1","Statement":[{}]}}"#, statements)
}

/// Compact statement list of a document without the surrounding brackets
pub fn statement_fragment(detail: &PolicyDetail) -> Result<String, PackError> {
    let malformed = |reason: String| PackError::MalformedDocument {
        policy_name: detail.policy_name.clone(),
        reason,
    };

    let document: Value =
        serde_json::from_str(&detail.policy_document).map_err(|e| malformed(e.to_string()))?;

    let statements = match document.get("Statement") {
        Some(Value::Array(statements)) => statements,
        Some(_) => return Err(malformed("Statement is not an array".to_string())),
        None => return Err(malformed("Statement is missing".to_string())),
    };

    let mut parts = Vec::with_capacity(statements.len());
    for statement in statements {
        parts.push(serde_json::to_string(statement).map_err(|e| malformed(e.to_string()))?);
    }
    Ok(parts.join(","))
}

/// Pack `details` into combined documents
///
/// Every combined document is at most [`MAX_DOCUMENT_LENGTH`] long. A
/// malformed source document fails the whole batch.
pub fn combine(details: &[PolicyDetail]) -> Result<Packing, PackError> {
    let mut packing = Packing::default();
    let mut current = String::new();

    for detail in details {
        if detail.policy_document.len() > MAX_DOCUMENT_LENGTH {
            tracing::debug!(
                "Policy {} is {} characters long, attaching it directly",
                detail.policy_name,
                detail.policy_document.len()
            );
            packing.excluded.push(detail.clone());
            continue;
        }

        let fragment = statement_fragment(detail)?;
        if fragment.is_empty() {
            continue;
        }

        if fragment.len() + KEYWORD_OVERHEAD > MAX_DOCUMENT_LENGTH {
            packing.excluded.push(detail.clone());
            continue;
        }

        // +1 for the separating comma
        if !current.is_empty()
            && KEYWORD_OVERHEAD + current.len() + 1 + fragment.len() > MAX_DOCUMENT_LENGTH
        {
            packing.combined.push(wrap_statements(&current));
            current.clear();
        }

        if !current.is_empty() {
            current.push(',');
        }
        current.push_str(&fragment);
    }

    if !current.is_empty() {
        packing.combined.push(wrap_statements(&current));
    }

    Ok(packing)
}
