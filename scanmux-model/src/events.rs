use crate::results::{ScanData, ScanResult};

/// Why a request was refused or terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FailureReason {
    Unspecified,
    InvalidRequest,
    NotAuthorized,
    DuplicateRequest,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Unspecified => "unspecified",
            FailureReason::InvalidRequest => "invalid_request",
            FailureReason::NotAuthorized => "not_authorized",
            FailureReason::DuplicateRequest => "duplicate_request",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a caller's result channel can receive.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum ClientEvent {
    /// Request admitted.
    Success,
    /// Request refused or terminated.
    Failure {
        reason: FailureReason,
        description: String,
    },
    Results { scans: Vec<ScanData> },
    FullResult { result: ScanResult },
    /// Terminal marker sent after the results of a single scan.
    SingleScanCompleted,
    PnoNetworkFound { results: Vec<ScanResult> },
}

impl ClientEvent {
    pub fn failure(reason: FailureReason, description: impl Into<String>) -> Self {
        ClientEvent::Failure {
            reason,
            description: description.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ClientEvent::Failure { .. })
    }
}
