use std::fmt;

use crate::config::ConfigError;
use crate::hierarchy::HierarchyError;

/// Machine-readable error codes for scripted callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigurationIncomplete,
    ConfigParseError,
    Unauthorized,
    NotFound,
    HttpFailure,
    TransportFailure,
    DecodeFailure,
    MissingField,
    WaveLimitExceeded,
    CycleDetected,
    Cancelled,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigurationIncomplete => "E1001",
            Self::ConfigParseError => "E1002",
            Self::Unauthorized => "E2001",
            Self::NotFound => "E2002",
            Self::HttpFailure => "E2003",
            Self::TransportFailure => "E2004",
            Self::DecodeFailure => "E3001",
            Self::MissingField => "E3002",
            Self::WaveLimitExceeded => "E4001",
            Self::CycleDetected => "E4002",
            Self::Cancelled => "E5001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigurationIncomplete => "Connection settings incomplete",
            Self::ConfigParseError => "Config file error",
            Self::Unauthorized => "Access denied",
            Self::NotFound => "Project or resource not found",
            Self::HttpFailure => "Request failed",
            Self::TransportFailure => "Network error",
            Self::DecodeFailure => "Unexpected response shape",
            Self::MissingField => "Work item is missing a required field",
            Self::WaveLimitExceeded => "Relation traversal did not converge",
            Self::CycleDetected => "Hierarchy contains a cycle",
            Self::Cancelled => "Operation cancelled",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigurationIncomplete => Some(
                "Set organization, project and PAT with `dva config set` or the ADO_* environment variables.",
            ),
            Self::ConfigParseError => Some("Fix the syntax of the config file and retry."),
            Self::Unauthorized => Some(
                "Verify the personal access token is valid and has Work Items (Read & Write) scope.",
            ),
            Self::NotFound => Some("Check the organization and project names."),
            Self::HttpFailure | Self::TransportFailure => Some("Retry once the service is reachable."),
            Self::DecodeFailure | Self::MissingField => None,
            Self::WaveLimitExceeded => {
                Some("Raise `fetch.max_waves` or inspect the parent/child links for loops.")
            }
            Self::CycleDetected => Some("Remove the parent/child link that closes the loop."),
            Self::Cancelled => None,
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Every failure the engine can surface to a caller.
///
/// Nothing is retried. Partial results are never returned alongside an error.
#[derive(Debug, thiserror::Error)]
pub enum DevOpsError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// HTTP 401/403.
    #[error("access denied (HTTP {status}){}: verify the personal access token and its permissions", detail_suffix(.detail))]
    Unauthorized { status: u16, detail: Option<String> },

    /// HTTP 404.
    #[error("project or resource not found{}", detail_suffix(.detail))]
    NotFound { detail: Option<String> },

    /// Any other non-success status.
    #[error("request failed: {status} {reason}{}", detail_suffix(.detail))]
    Http {
        status: u16,
        reason: String,
        detail: Option<String>,
    },

    #[error("network error: {0}")]
    Transport(String),

    #[error("could not decode {0}")]
    Decode(String),

    #[error("work item {id} has no usable '{field}' field")]
    MissingField { id: u32, field: &'static str },

    #[error("relation traversal still had {pending} ids pending after {waves} waves")]
    WaveLimitExceeded { waves: usize, pending: usize },

    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("a fetch worker panicked")]
    WorkerPanicked,
}

impl DevOpsError {
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Config(ConfigError::Incomplete { .. }) => ErrorCode::ConfigurationIncomplete,
            Self::Config(_) => ErrorCode::ConfigParseError,
            Self::Unauthorized { .. } => ErrorCode::Unauthorized,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Http { .. } => ErrorCode::HttpFailure,
            Self::Transport(_) => ErrorCode::TransportFailure,
            Self::Decode(_) => ErrorCode::DecodeFailure,
            Self::MissingField { .. } => ErrorCode::MissingField,
            Self::WaveLimitExceeded { .. } => ErrorCode::WaveLimitExceeded,
            Self::Hierarchy(_) => ErrorCode::CycleDetected,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::WorkerPanicked => ErrorCode::InternalUnexpected,
        }
    }

    /// Remediation hint for this error, if any.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        self.error_code().hint()
    }
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map_or_else(String::new, |message| format!(" ({message})"))
}
