use thiserror::Error;

/// Errors raised before the first cycle runs. Any of these aborts the run.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("The strategy parameter definitions could not be read: {reason}")]
    DefinitionsUnavailable { reason: String },

    #[error("The current strategy parameter values could not be read")]
    CurrentValuesUnavailable,

    #[error("There are no parameters to optimize")]
    EmptyParameterSpace,

    #[error("Parameter \"{name}\" has no candidate values")]
    EmptyParameterValues { name: String },

    #[error("Invalid range for \"{name}\": {reason}")]
    InvalidRange { name: String, reason: String },

    #[error("Invalid optimization settings: {reason}")]
    InvalidConfig { reason: String },

    #[error("The baseline report has no \"{metric}\" value")]
    BaselineUnavailable { metric: String },
}

/// Failures reported by a host adapter while interacting with the charting host.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HostError {
    #[error("Element not found: {what}")]
    ElementNotFound { what: String },

    #[error("Host timed out after {duration_ms}ms while {during}")]
    Timeout { during: String, duration_ms: u64 },

    #[error("Host is still loading: {reason}")]
    Transient { reason: String },

    #[error("Permission denied: {reason}")]
    PermissionDenied { reason: String },

    #[error("Operation not supported by the host: {operation}")]
    Unsupported { operation: String },

    #[error("Host interaction failed: {reason}")]
    Interaction { reason: String },

    #[error("The strategy parameters cannot be set")]
    ParametersNotApplied,
}

const RETRYABLE_MARKERS: [&str; 8] = [
    "element not found",
    "selector",
    "null",
    "undefined",
    "timeout",
    "network",
    "loading",
    "can't get performance",
];

const FATAL_MARKERS: [&str; 6] = [
    "permission denied",
    "access denied",
    "unauthorized",
    "forbidden",
    "not supported",
    "invalid selector",
];

impl HostError {
    /// Maps a free-form host failure message onto a typed error.
    pub fn classify(message: &str) -> Self {
        let lowered = message.to_lowercase();
        if FATAL_MARKERS.iter().any(|m| lowered.contains(m)) {
            if lowered.contains("not supported") {
                return HostError::Unsupported {
                    operation: message.to_string(),
                };
            }
            return HostError::PermissionDenied {
                reason: message.to_string(),
            };
        }
        if lowered.contains("timeout") {
            return HostError::Timeout {
                during: message.to_string(),
                duration_ms: 0,
            };
        }
        if lowered.contains("element not found") || lowered.contains("selector") {
            return HostError::ElementNotFound {
                what: message.to_string(),
            };
        }
        if RETRYABLE_MARKERS.iter().any(|m| lowered.contains(m)) {
            return HostError::Transient {
                reason: message.to_string(),
            };
        }
        HostError::Interaction {
            reason: message.to_string(),
        }
    }

    /// Whether a failed host call is worth repeating after a backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HostError::ElementNotFound { .. } | HostError::Timeout { .. } | HostError::Transient { .. }
        )
    }
}

/// Failures of the report parser once its retries are exhausted.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Can't get performance headers after {attempts} attempt(s): {reason}")]
    HeadersUnavailable { attempts: u32, reason: String },

    #[error("Can't get performance rows after {attempts} attempt(s): {reason}")]
    RowsUnavailable { attempts: u32, reason: String },
}

/// The host never became reachable while a session was being set up.
#[derive(Debug, Error)]
#[error("The charting host is not available after {waited_ms}ms: {reason}")]
pub struct AdapterUnavailableError {
    pub waited_ms: u64,
    pub reason: String,
}

/// Anything that ends an optimization run early.
#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}
