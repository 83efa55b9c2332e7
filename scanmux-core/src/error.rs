use scanmux_model::{ClientId, FailureReason};
use thiserror::Error;

/// Client-facing description for requests that cannot run right now.
pub(crate) const NOT_AVAILABLE: &str = "not available";
/// Client-facing description for malformed or unschedulable requests.
pub(crate) const BAD_REQUEST: &str = "bad request";
/// Client-facing description for PNO without offload or software fallback.
pub(crate) const NOT_SUPPORTED: &str = "not supported";

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Unknown client: {0}")]
    UnknownClient(ClientId),

    #[error("Result channel already registered")]
    DuplicateClient,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Duplicate request: {0}")]
    DuplicateRequest(String),

    #[error("Not available: {0}")]
    NotAvailable(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Unschedulable background request: {0}")]
    Unschedulable(String),

    #[error("Scan service stopped")]
    ServiceStopped,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScanError {
    /// Reason code reported to the caller when this error terminates a request.
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            ScanError::InvalidRequest(_)
            | ScanError::Unschedulable(_)
            | ScanError::NotSupported(_) => FailureReason::InvalidRequest,
            ScanError::DuplicateRequest(_) | ScanError::DuplicateClient => {
                FailureReason::DuplicateRequest
            }
            _ => FailureReason::Unspecified,
        }
    }

    /// Description carried by the failure event. Detail stays in the logs.
    pub fn client_description(&self) -> String {
        match self {
            ScanError::InvalidRequest(_) | ScanError::Unschedulable(_) => BAD_REQUEST.to_string(),
            ScanError::NotAvailable(_) => NOT_AVAILABLE.to_string(),
            ScanError::NotSupported(_) => NOT_SUPPORTED.to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
