//! Error handling in [`spectre`][crate]

use thiserror::Error;

/// Possible errors when working with Spectre components
///
/// Variants follow the workspace-wide taxonomy: validation, transient IO,
/// corruption, external dependency, not-found, insufficient analysis history,
/// and conflicting concurrent operations. Components wrap their own failures
/// into these variants so callers can branch on kind rather than on source.
#[derive(Error, Debug)]
pub enum Error {
    /// A request or input failed validation
    #[error("ValidationError: {0}")]
    Validation(String),

    /// A retriable failure (IO, timeout, transient backend error)
    #[error("TransientError: {0}")]
    Transient(String),

    /// Stored data could not be decoded
    ///
    /// The append log treats corruption as local: a bad block is counted and
    /// skipped, scanning continues. This variant surfaces only when a caller
    /// asked for the corrupt range explicitly.
    #[error("CorruptionError: {0}")]
    Corruption(String),

    /// An external system (graph engine, dashboard provider) is unavailable
    #[error("DependencyError: {0}")]
    Dependency(String),

    /// The referenced entity does not exist
    #[error("NotFound: {0}")]
    NotFound(String),

    /// An analysis pre-condition failed
    ///
    /// Carries the observed and required history so callers can report both.
    #[error("InsufficientData: have {available_hours}h of history, need {required_hours}h")]
    InsufficientData {
        /// Hours of history that were available
        available_hours: u64,
        /// Hours of history the computation requires
        required_hours: u64,
    },

    /// A concurrent operation holds the resource (e.g. a sync already running)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Serialization or deserialization failed
    #[error("Error deserializing payload: {0}")]
    Serde(#[from] serde_json::Error),

    /// Underlying IO error
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable error codes exposed at transport boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Request shape or parameters invalid (400)
    InvalidRequest,
    /// A single parameter failed validation (400)
    InvalidParameter,
    /// Entity not found (404)
    NotFound,
    /// Method not allowed (405)
    MethodNotAllowed,
    /// Query execution failed (500)
    QueryFailed,
    /// Analysis execution failed (500)
    AnalysisFailed,
    /// Unclassified internal failure (500)
    InternalError,
}

impl ErrorCode {
    /// The HTTP status this code maps to at transport boundaries
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::InvalidRequest | ErrorCode::InvalidParameter => 400,
            ErrorCode::NotFound => 404,
            ErrorCode::MethodNotAllowed => 405,
            ErrorCode::QueryFailed | ErrorCode::AnalysisFailed | ErrorCode::InternalError => 500,
        }
    }

    /// The canonical wire name of this code
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::InvalidParameter => "INVALID_PARAMETER",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            ErrorCode::QueryFailed => "QUERY_FAILED",
            ErrorCode::AnalysisFailed => "ANALYSIS_FAILED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl Error {
    /// Map this error onto the stable boundary code
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Validation(_) => ErrorCode::InvalidRequest,
            Error::NotFound(_) => ErrorCode::NotFound,
            Error::InsufficientData { .. } => ErrorCode::AnalysisFailed,
            Error::Transient(_) | Error::Dependency(_) => ErrorCode::QueryFailed,
            Error::Corruption(_) | Error::Serde(_) | Error::Io(_) | Error::Conflict(_) => {
                ErrorCode::InternalError
            }
        }
    }

    /// Whether a retry with backoff may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_) | Error::Dependency(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_to_expected_statuses() {
        assert_eq!(Error::Validation("bad".into()).code().http_status(), 400);
        assert_eq!(Error::NotFound("x".into()).code().http_status(), 404);
        assert_eq!(
            Error::Transient("graph timeout".into()).code().as_str(),
            "QUERY_FAILED"
        );
    }

    #[test]
    fn insufficient_data_carries_both_horizons() {
        let err = Error::InsufficientData {
            available_hours: 12,
            required_hours: 24,
        };
        assert_eq!(err.to_string(), "InsufficientData: have 12h of history, need 24h");
        assert_eq!(err.code(), ErrorCode::AnalysisFailed);
    }
}
