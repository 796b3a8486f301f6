use thiserror::Error;

/// Error codes AliCloud returns for transient conditions
pub const RETRYABLE_ERROR_CODES: &[&str] = &[
    "Throttling",
    "Throttling.User",
    "Throttling.Api",
    "Throttling.Concurrent",
    "ServiceUnavailable",
    "SystemBusy",
    "InternalError",
    "ServiceTimeout",
];

/// Prefix shared by every "entity does not exist" code
/// (`EntityNotExist.Policy`, `EntityNotExist.User.Policy`, ...)
pub const NOT_FOUND_CODE_PREFIX: &str = "EntityNotExist";

pub const POLICY_NOT_FOUND: &str = "EntityNotExist.Policy";
pub const POLICY_ALREADY_ATTACHED: &str = "EntityAlreadyExists.User.Policy";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("{code}: {message} (HTTP {status}, RequestId: {})", .request_id.as_deref().unwrap_or("-"))]
    Service {
        status: u16,
        code: String,
        message: String,
        request_id: Option<String>,
    },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// How a failed call should be treated by the retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    Permanent,
    NotFound,
}

/// Classify an AliCloud error code
pub fn classify(code: &str) -> ErrorClass {
    if RETRYABLE_ERROR_CODES.contains(&code) {
        ErrorClass::Retryable
    } else if code.starts_with(NOT_FOUND_CODE_PREFIX) {
        ErrorClass::NotFound
    } else {
        ErrorClass::Permanent
    }
}

impl ApiError {
    pub fn service(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Service {
            status,
            code: code.into(),
            message: message.into(),
            request_id: None,
        }
    }

    /// The AliCloud error code, if the service answered with one
    pub fn code(&self) -> Option<&str> {
        match self {
            ApiError::Service { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ApiError::Service { status, code, .. } => match classify(code) {
                ErrorClass::Permanent if *status == 429 || *status == 503 => ErrorClass::Retryable,
                class => class,
            },
            ApiError::RequestError(e) if e.is_timeout() || e.is_connect() => ErrorClass::Retryable,
            _ => ErrorClass::Permanent,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.class() == ErrorClass::NotFound
    }
}
