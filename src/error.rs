/**
 * Error Handling Module
 *
 * DESIGN DECISION: Centralized error enum using thiserror, kinds independent of
 * transport
 * WHY: every component (pattern engine, gateway, pipeline, decomposition engine)
 * needs the same eight-way taxonomy so callers can make one recoverability
 * decision regardless of which component raised the error
 *
 * PATTERN: Rust error handling best practices
 */

use thiserror::Error;

/// Primary error type, covering every failure mode surfaced across the engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Schema violation, path escape, or an out-of-range request field.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A referenced project, task, file, or session does not exist.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// The LLM provider or the external code-map generator could not be reached,
    /// or failed after exhausting retries.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// An operation exceeded its configured deadline.
    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// The model returned output that could not be parsed as the requested format.
    #[error("invalid model output: {0}")]
    InvalidModelOutput(String),

    /// Parsed model output violated the schema or a post-parse invariant.
    #[error("schema violation: {0}")]
    SchemaViolation(String),

    /// The operation was cancelled via its cancellation token.
    #[error("cancelled")]
    Cancelled,

    /// Unexpected internal error; should not occur in normal operation.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The eight error kinds named in the error-handling design, independent of the
/// payload each variant carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    ResourceNotFound,
    ProviderUnavailable,
    Timeout,
    InvalidModelOutput,
    SchemaViolation,
    Cancelled,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::ResourceNotFound(_) => ErrorKind::ResourceNotFound,
            Error::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::InvalidModelOutput(_) => ErrorKind::InvalidModelOutput,
            Error::SchemaViolation(_) => ErrorKind::SchemaViolation,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// `invalid_input`, `resource_not_found`, and `timeout` are recoverable: a
    /// retry with altered input is sensible. `internal` and `schema_violation`
    /// are not. The remaining kinds are left to the caller's retry policy
    /// (the gateway already retries `provider_unavailable` internally, so by
    /// the time it reaches a caller the budget is exhausted).
    pub fn recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidInput | ErrorKind::ResourceNotFound | ErrorKind::Timeout
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidModelOutput(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout(std::time::Duration::from_secs(0))
        } else {
            Error::ProviderUnavailable(err.to_string())
        }
    }
}

/// User-visible message formatting: a single line prefixed with an emoji marker.
/// Kept separate from `Display` so internal logs stay plain while handler
/// responses get the marker.
pub fn format_user_message(result: &Result<String>) -> String {
    match result {
        Ok(text) => format!("\u{2705} {text}"),
        Err(err) if err.recoverable() => format!("\u{274c} {err}"),
        Err(err) => format!("\u{274c} {err}"),
    }
}

pub fn format_in_progress(text: &str) -> String {
    format!("\u{23f3} {text}")
}

pub fn format_info(text: &str) -> String {
    format!("\u{2139}\u{fe0f} {text}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ResourceNotFound("task-123".to_string());
        assert_eq!(err.to_string(), "resource not found: task-123");
    }

    #[test]
    fn test_recoverable_rules() {
        assert!(Error::InvalidInput("x".into()).recoverable());
        assert!(Error::ResourceNotFound("x".into()).recoverable());
        assert!(Error::Timeout(std::time::Duration::from_secs(1)).recoverable());
        assert!(!Error::Internal("x".into()).recoverable());
        assert!(!Error::SchemaViolation("x".into()).recoverable());
        assert!(!Error::Cancelled.recoverable());
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(
            Error::ProviderUnavailable("x".into()).kind(),
            ErrorKind::ProviderUnavailable
        );
    }

    #[test]
    fn test_json_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: Error = json_err.into();
        assert_eq!(err.kind(), ErrorKind::InvalidModelOutput);
    }

    #[test]
    fn test_format_user_message() {
        let ok: Result<String> = Ok("done".to_string());
        assert!(format_user_message(&ok).starts_with('\u{2705}'));

        let err: Result<String> = Err(Error::Internal("boom".to_string()));
        assert!(format_user_message(&err).starts_with('\u{274c}'));
    }
}
