//! # Error Handling
//!
//! Two error families live here:
//!
//! - [`RelayError`]: failures inside the session relay engine. None of these
//!   ever reach a caller on the phone; the engine logs them and either drops
//!   the message, drops the utterance or tears the session down.
//! - [`AppError`]: failures of the HTTP surface, converted into JSON error
//!   responses through actix's [`ResponseError`] trait.
//!
//! ## Error policy in the relay:
//! | Variant              | Policy                                              |
//! |----------------------|-----------------------------------------------------|
//! | `SessionNotFound`    | drop the message silently                           |
//! | `LegUnavailable`     | drop the utterance                                  |
//! | `TranslationFailure` | log, abort the current utterance, keep the session  |
//! | `TransportFailure`   | swallowed by teardown, never propagated past it     |
//! | `DuplicateSession`   | reject session creation (HTTP 409)                  |
//! | `CallPlacement`      | tear the new session down (HTTP 502)                |

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Errors produced by the relay engine and its collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayError {
    /// A message arrived for a session id that is not in the registry
    SessionNotFound(String),

    /// The destination leg of a relay has no attached transport
    LegUnavailable(String),

    /// The translation service failed, timed out or ended its stream abnormally
    TranslationFailure(String),

    /// Sending to, receiving from or closing a transport failed
    TransportFailure(String),

    /// A session with the same id already exists
    DuplicateSession(String),

    /// The carrier refused or failed to place an outbound call
    CallPlacement(String),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::SessionNotFound(id) => write!(f, "Session not found: {}", id),
            RelayError::LegUnavailable(msg) => write!(f, "Leg unavailable: {}", msg),
            RelayError::TranslationFailure(msg) => write!(f, "Translation failed: {}", msg),
            RelayError::TransportFailure(msg) => write!(f, "Transport failure: {}", msg),
            RelayError::DuplicateSession(id) => write!(f, "Session already exists: {}", id),
            RelayError::CallPlacement(msg) => write!(f, "Call placement failed: {}", msg),
        }
    }
}

impl std::error::Error for RelayError {}

/// Custom error types for the HTTP surface.
///
/// ## Error Categories:
/// - **Internal**: Server-side problems (500 errors)
/// - **BadRequest**: Client sent invalid data (400 errors)
/// - **NotFound**: Requested resource doesn't exist (404 errors)
/// - **Conflict**: Resource already exists (409 errors)
/// - **BadGateway**: An upstream service (carrier, translator) failed (502 errors)
/// - **ConfigError**: Configuration problems (500 errors)
/// - **ValidationError**: Data validation failed (400 errors)
///
/// ## Usage Example:
/// ```rust
/// return Err(AppError::BadRequest("Missing required fields".to_string()));
/// ```
#[derive(Debug, PartialEq)]
pub enum AppError {
    /// Internal server errors
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// Requested resource was not found
    NotFound(String),

    /// Resource already exists
    Conflict(String),

    /// An upstream service failed
    BadGateway(String),

    /// Configuration file or environment variable problems
    ConfigError(String),

    /// User input failed validation rules
    ValidationError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::BadGateway(msg) => write!(f, "Upstream failure: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

/// Converts errors into JSON HTTP responses.
///
/// All errors share one body shape:
/// ```json
/// {
///   "error": {
///     "type": "conflict",
///     "message": "Session already exists: session_1700000000_15550001_15550002",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;

        match self {
            AppError::Internal(_) | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error_type, message) = match self {
            AppError::Internal(msg) => ("internal_error", msg),
            AppError::BadRequest(msg) => ("bad_request", msg),
            AppError::NotFound(msg) => ("not_found", msg),
            AppError::Conflict(msg) => ("conflict", msg),
            AppError::BadGateway(msg) => ("bad_gateway", msg),
            AppError::ConfigError(msg) => ("config_error", msg),
            AppError::ValidationError(msg) => ("validation_error", msg),
        };

        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// Relay failures that surface through HTTP handlers (session creation,
/// call placement, TwiML lookups).
impl From<RelayError> for AppError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::DuplicateSession(_) => AppError::Conflict(err.to_string()),
            RelayError::SessionNotFound(_) => AppError::NotFound(err.to_string()),
            RelayError::CallPlacement(_) | RelayError::TranslationFailure(_) => {
                AppError::BadGateway(err.to_string())
            }
            RelayError::LegUnavailable(_) | RelayError::TransportFailure(_) => {
                AppError::Internal(err.to_string())
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// JSON parsing errors are almost always the client's fault, so they map to 400.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;

/// Shorthand for `Result<T, RelayError>`.
pub type RelayResult<T> = Result<T, RelayError>;
