use axum::http::StatusCode;
use std::fmt;

/// Crate-wide error type. Variants map onto the SCIM 1.0 error taxonomy;
/// `status()` gives the HTTP status each one is reported with.
#[derive(Debug)]
pub enum ScimError {
    /// Malformed SCIM URI (bad path shape, unparseable query parameter).
    InvalidUri(String),
    /// The request names an endpoint no registered resource exposes.
    UnknownEndpoint(String),
    /// The filter expression could not be parsed.
    InvalidFilter(String),
    /// The request body could not be parsed as a resource.
    InvalidResource(String),
    /// The resource violates its schema (missing required attribute,
    /// value not matching the declared data type).
    SchemaViolation(String),
    /// A typed accessor was used against a value of a different data type.
    InvalidAttributeValue(String),
    Unauthorized,
    Forbidden(String),
    NotFound(String),
    /// Uniqueness violation on create.
    Conflict(String),
    /// Version mismatch on update.
    PreconditionFailed,
    /// Backend fault (LDAP unreachable, search failure). The description is
    /// generic; directory internals are logged, never surfaced.
    Backend(String),
    Configuration(String),
    /// Client-side: the exchange was interrupted before completion.
    Interrupted(String),
    /// Client-side: the exchange deadline expired.
    Expired(String),
    /// Client-side: the exchange failed outright (connect error, bad response).
    ExchangeFailure(String),
    NotImplemented(String),
}

impl fmt::Display for ScimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScimError::InvalidUri(e) => write!(f, "Invalid SCIM URI: {}", e),
            ScimError::UnknownEndpoint(e) => write!(f, "Unknown endpoint: {}", e),
            ScimError::InvalidFilter(e) => write!(f, "Invalid filter: {}", e),
            ScimError::InvalidResource(e) => write!(f, "Invalid resource: {}", e),
            ScimError::SchemaViolation(e) => write!(f, "Schema violation: {}", e),
            ScimError::InvalidAttributeValue(e) => {
                write!(f, "Invalid attribute value access: {}", e)
            }
            ScimError::Unauthorized => write!(f, "Authentication required"),
            ScimError::Forbidden(e) => write!(f, "Forbidden: {}", e),
            ScimError::NotFound(e) => write!(f, "Resource not found: {}", e),
            ScimError::Conflict(e) => write!(f, "Conflict: {}", e),
            ScimError::PreconditionFailed => write!(f, "Resource version mismatch"),
            ScimError::Backend(e) => write!(f, "Backend error: {}", e),
            ScimError::Configuration(e) => write!(f, "Configuration error: {}", e),
            ScimError::Interrupted(e) => write!(f, "Request interrupted: {}", e),
            ScimError::Expired(e) => write!(f, "Request expired: {}", e),
            ScimError::ExchangeFailure(e) => write!(f, "Exchange failure: {}", e),
            ScimError::NotImplemented(e) => write!(f, "Not implemented: {}", e),
        }
    }
}

impl std::error::Error for ScimError {}

impl From<serde_json::Error> for ScimError {
    fn from(err: serde_json::Error) -> Self {
        ScimError::InvalidResource(err.to_string())
    }
}

impl From<quick_xml::Error> for ScimError {
    fn from(err: quick_xml::Error) -> Self {
        ScimError::InvalidResource(err.to_string())
    }
}

impl From<std::io::Error> for ScimError {
    fn from(err: std::io::Error) -> Self {
        ScimError::Backend(err.to_string())
    }
}

pub type ScimResult<T> = Result<T, ScimError>;

impl ScimError {
    /// HTTP status code this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            ScimError::InvalidUri(_)
            | ScimError::InvalidFilter(_)
            | ScimError::InvalidResource(_)
            | ScimError::SchemaViolation(_)
            | ScimError::InvalidAttributeValue(_) => StatusCode::BAD_REQUEST,
            ScimError::Unauthorized => StatusCode::UNAUTHORIZED,
            ScimError::Forbidden(_) => StatusCode::FORBIDDEN,
            ScimError::UnknownEndpoint(_) | ScimError::NotFound(_) => StatusCode::NOT_FOUND,
            ScimError::Conflict(_) => StatusCode::CONFLICT,
            ScimError::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            ScimError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            ScimError::Backend(_)
            | ScimError::Configuration(_)
            | ScimError::Interrupted(_)
            | ScimError::Expired(_)
            | ScimError::ExchangeFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Description carried in the SCIM Errors envelope. Backend faults are
    /// reported generically so that directory internals never leak.
    pub fn public_description(&self) -> String {
        match self {
            ScimError::Backend(e) => {
                tracing::error!("backend error: {}", e);
                "The server encountered an internal error".to_string()
            }
            ScimError::Configuration(e) => {
                tracing::error!("configuration error: {}", e);
                "The server encountered an internal error".to_string()
            }
            other => other.to_string(),
        }
    }
}
