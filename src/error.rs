use crate::transport::ResponseMeta;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "base_url", "retry.max_attempts")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "client_builder", "resilience_config")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Tag identifying the category of an [`Error`].
///
/// Kinds form a small hierarchy so that retry and circuit breaker
/// configuration can name a broad category and still match its refinements:
///
/// ```text
/// Api ─┬─ Connection ── Timeout
///      ├─ BadRequest | Authentication | PermissionDenied | NotFound
///      ├─ Conflict | UnprocessableEntity | RateLimit | InternalServer
///      ├─ CircuitOpen
///      └─ StepTimeout
/// ```
///
/// Local failures (configuration, serialization, I/O) sit outside the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Api,
    Connection,
    Timeout,
    BadRequest,
    Authentication,
    PermissionDenied,
    NotFound,
    Conflict,
    UnprocessableEntity,
    RateLimit,
    InternalServer,
    CircuitOpen,
    StepTimeout,
    Configuration,
    Validation,
    Serialization,
    Io,
}

impl ErrorKind {
    /// The immediate parent kind, if any.
    pub fn parent(self) -> Option<ErrorKind> {
        match self {
            ErrorKind::Timeout => Some(ErrorKind::Connection),
            ErrorKind::Connection
            | ErrorKind::BadRequest
            | ErrorKind::Authentication
            | ErrorKind::PermissionDenied
            | ErrorKind::NotFound
            | ErrorKind::Conflict
            | ErrorKind::UnprocessableEntity
            | ErrorKind::RateLimit
            | ErrorKind::InternalServer
            | ErrorKind::CircuitOpen
            | ErrorKind::StepTimeout => Some(ErrorKind::Api),
            ErrorKind::Api
            | ErrorKind::Configuration
            | ErrorKind::Validation
            | ErrorKind::Serialization
            | ErrorKind::Io => None,
        }
    }

    /// Returns true if `self` is `ancestor` or one of its refinements.
    pub fn is_a(self, ancestor: ErrorKind) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == ancestor {
                return true;
            }
            current = kind.parent();
        }
        false
    }

    /// Kind used for an HTTP status the API answered with.
    pub fn from_status(status: u16) -> ErrorKind {
        match status {
            400 => ErrorKind::BadRequest,
            401 => ErrorKind::Authentication,
            403 => ErrorKind::PermissionDenied,
            404 => ErrorKind::NotFound,
            409 => ErrorKind::Conflict,
            422 => ErrorKind::UnprocessableEntity,
            429 => ErrorKind::RateLimit,
            s if s >= 500 => ErrorKind::InternalServer,
            _ => ErrorKind::Api,
        }
    }
}

/// Unified error type for the client.
#[derive(Debug, Error)]
pub enum Error {
    /// No response was obtained (DNS, connect, reset, timeout).
    #[error("{message}")]
    Connection {
        message: String,
        timeout: bool,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// The API answered with a non-success status.
    #[error("{status} {message}")]
    Api {
        kind: ErrorKind,
        status: u16,
        message: String,
        code: Option<String>,
        request_id: Option<String>,
        endpoint: Option<String>,
        response: Option<ResponseMeta>,
    },

    /// The circuit breaker refused the request before any I/O happened.
    #[error("Circuit breaker is open; request to {endpoint} was not attempted")]
    CircuitOpen { endpoint: String },

    #[error("Step \"{step_id}\" timed out after {}ms", .timeout.as_millis())]
    StepTimeout { step_id: String, timeout: Duration },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// A connection failure with no underlying transport error attached.
    pub fn connection(message: impl Into<String>) -> Self {
        Error::Connection {
            message: message.into(),
            timeout: false,
            source: None,
        }
    }

    /// A timeout with no underlying transport error attached.
    pub fn timeout(message: impl Into<String>) -> Self {
        Error::Connection {
            message: message.into(),
            timeout: true,
            source: None,
        }
    }

    /// Classify a reqwest failure that happened before a response was read.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Connection {
                message: "Request timed out.".to_string(),
                timeout: true,
                source: Some(err),
            }
        } else {
            Error::Connection {
                message: format!("Connection error. {}", err),
                timeout: false,
                source: Some(err),
            }
        }
    }

    /// A generic API error with a status but no response attached.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Error::Api {
            kind: ErrorKind::from_status(status),
            status,
            message: message.into(),
            code: None,
            request_id: None,
            endpoint: None,
            response: None,
        }
    }

    /// Build the error for a non-success response from its metadata and raw body.
    ///
    /// The message is taken from `error.message`, then `error`, then the raw
    /// body; an empty body yields "status code (no body)".
    pub fn from_response(response: ResponseMeta, body: &str, endpoint: Option<&str>) -> Self {
        let status = response.status.as_u16();
        let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();

        let error_value = match &parsed {
            Some(serde_json::Value::Object(map)) if map.contains_key("error") => map.get("error"),
            Some(v) => Some(v),
            None => None,
        };

        let code = error_value
            .and_then(|e| e.get("code"))
            .and_then(|c| c.as_str())
            .map(str::to_string);

        let message = match error_value {
            Some(serde_json::Value::Object(map)) if map.contains_key("message") => {
                match &map["message"] {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                }
            }
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None if body.trim().is_empty() => {
                "status code (no body)".to_string()
            }
            Some(other) => other.to_string(),
            None => body.trim().to_string(),
        };

        Error::Api {
            kind: ErrorKind::from_status(status),
            status,
            message,
            code,
            request_id: response.request_id(),
            endpoint: endpoint.map(str::to_string),
            response: Some(response),
        }
    }

    /// Create a new validation error with structured context
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// The kind tag used by retry and circuit breaker matching.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection { timeout: true, .. } => ErrorKind::Timeout,
            Error::Connection { .. } => ErrorKind::Connection,
            Error::Api { kind, .. } => *kind,
            Error::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Error::StepTimeout { .. } => ErrorKind::StepTimeout,
            Error::Configuration { .. } => ErrorKind::Configuration,
            Error::Validation { .. } => ErrorKind::Validation,
            Error::Serialization(_) | Error::Yaml(_) => ErrorKind::Serialization,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    /// Returns true if this error's kind is `kind` or one of its refinements.
    pub fn is_kind(&self, kind: ErrorKind) -> bool {
        self.kind().is_a(kind)
    }

    /// HTTP status, if the API answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Response metadata, if the API answered.
    pub fn response(&self) -> Option<&ResponseMeta> {
        match self {
            Error::Api { response, .. } => response.as_ref(),
            _ => None,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } | Error::Validation { context, .. } => {
                Some(context)
            }
            _ => None,
        }
    }
}
