//! Error types for the uiscout domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level [`Error`]
//! wraps them all.

use thiserror::Error;

/// The top-level error type for all uiscout operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Decision oracle errors ---
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    // --- Device errors ---
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    // --- Cache errors ---
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    // --- Action validation ---
    #[error("Action validation error: {0}")]
    Validation(#[from] ActionValidationError),

    // --- Prompt templates ---
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    // --- External tools ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Scenario graph / project model ---
    #[error("Scenario error: {0}")]
    Scenario(String),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Execution cancelled")]
    Cancelled,

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error came from the device port.
    pub fn is_device_error(&self) -> bool {
        matches!(self, Self::Device(_))
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum OracleError {
    #[error("Rate limited by oracle: {0}")]
    RateLimited(String),

    #[error("Oracle output could not be parsed: {0}")]
    ParseFailure(String),

    #[error("Oracle request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Oracle operation not supported: {0}")]
    NotSupported(String),

    #[error("Retry limit of {max_retries} exceeded: {last_error}")]
    RetriesExhausted { max_retries: u32, last_error: String },

    #[error("Oracle call cancelled")]
    Cancelled,
}

impl OracleError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    /// Worth another attempt when a call has a retry budget.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited(_) | Self::ParseFailure(_) | Self::Network(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500,
            Self::NotSupported(_) | Self::RetriesExhausted { .. } | Self::Cancelled => false,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    #[error("Device command failed: {command}: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("Device is closed")]
    Closed,

    #[error("Screenshot capture failed: {0}")]
    Screenshot(String),

    #[error("UI tree dump failed: {0}")]
    TreeDump(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache storage error: {0}")]
    Storage(String),

    #[error("Corrupted cache entry {key}: {reason}")]
    Corrupted { key: String, reason: String },
}

/// Rejection of oracle output by the action dispatcher.
///
/// These are never fatal: the agent records them as a failed step and
/// keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionValidationError {
    #[error("Unknown action '{name}'. Available actions: {}", .available.join(", "))]
    UnknownAction { name: String, available: Vec<String> },

    #[error("Unknown tool '{name}'. Available tools: {}", available_or_none(.available))]
    UnknownTool { name: String, available: Vec<String> },

    #[error("Action {action} requires a non-empty '{argument}' argument")]
    MissingArgument { action: String, argument: String },

    #[error("Invalid '{argument}' argument for {action}: {reason}")]
    InvalidArgument { action: String, argument: String, reason: String },

    #[error("Element index {index} is out of bounds ({count} elements on screen)")]
    IndexOutOfBounds { index: usize, count: usize },

    #[error("Malformed decision payload: {0}")]
    MalformedPayload(String),
}

fn available_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("Prompt template is missing required placeholder(s): {}", .0.join(", "))]
    MissingPlaceholders(Vec<String>),

    #[error("Prompt template contains unsupported placeholder(s): {}", .0.join(", "))]
    UnknownPlaceholders(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oracle_error_displays_correctly() {
        let err = Error::Oracle(OracleError::ApiError {
            status_code: 500,
            message: "Internal Server Error".into(),
        });
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("Internal Server Error"));
    }

    #[test]
    fn unknown_action_lists_available_actions() {
        let err = ActionValidationError::UnknownAction {
            name: "Teleport".into(),
            available: vec!["ClickWithText".into(), "BackPress".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("Teleport"));
        assert!(msg.contains("ClickWithText, BackPress"));
    }

    #[test]
    fn unknown_tool_without_tools_says_none() {
        let err = ActionValidationError::UnknownTool {
            name: "search".into(),
            available: vec![],
        };
        assert!(err.to_string().contains("(none)"));
    }

    #[test]
    fn template_error_names_placeholders() {
        let err = TemplateError::UnknownPlaceholders(vec!["{{TOOLS}}".into()]);
        assert!(err.to_string().contains("{{TOOLS}}"));
    }

    #[test]
    fn rate_limit_detection() {
        assert!(OracleError::RateLimited("429".into()).is_rate_limit());
        assert!(!OracleError::ParseFailure("bad json".into()).is_rate_limit());
        assert!(Error::Device(DeviceError::Closed).is_device_error());
    }
}
