//! Error types for tendril operations.
//!
//! Validation errors carry the offending field and a structured error code so
//! callers (and the REST layer) can report precisely what was rejected.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for tendril operations.
pub type TendrilResult<T> = Result<T, TendrilError>;

/// Main error type for all tendril operations.
#[derive(Error, Debug)]
pub enum TendrilError {
    /// Charge outside the configured bounds.
    #[error("Invalid {field}: {value} is outside [{min}, {max}]")]
    InvalidCharge {
        field: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },

    /// Probe intent text was blank.
    #[error("Empty intent: field '{field}' must not be blank")]
    EmptyIntent { field: &'static str },

    /// No probe with the given id.
    #[error("Probe not found: {id}")]
    UnknownProbe { id: Uuid },

    /// Generic input validation failure.
    #[error("Validation error on '{field}': {message}")]
    Validation {
        message: String,
        field: &'static str,
    },

    /// A stored probe record is unusable for scoring.
    #[error("Malformed probe {id}: {reason}")]
    MalformedProbe { id: Uuid, reason: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Feed polling failed.
    #[error("Feed '{feed_id}' error: {message}")]
    Feed { feed_id: String, message: String },

    /// Preservation sink delivery failed.
    #[error("Preservation sink '{sink}' error: {message}")]
    Preservation { sink: String, message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Validation (VAL_xxx)
    ValInvalidCharge,
    ValEmptyIntent,
    ValInvalidInput,

    // Probe (PRB_xxx)
    PrbNotFound,
    PrbMalformed,

    // Collaborators
    FeedFailed,
    SinkFailed,

    // Configuration / serialization
    ConfigInvalid,
    IoFailed,
    ParseInvalidJson,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValInvalidCharge => "VAL_001",
            ErrorCode::ValEmptyIntent => "VAL_002",
            ErrorCode::ValInvalidInput => "VAL_003",
            ErrorCode::PrbNotFound => "PRB_001",
            ErrorCode::PrbMalformed => "PRB_002",
            ErrorCode::FeedFailed => "FEED_001",
            ErrorCode::SinkFailed => "SINK_001",
            ErrorCode::ConfigInvalid => "CFG_001",
            ErrorCode::IoFailed => "IO_001",
            ErrorCode::ParseInvalidJson => "PARSE_001",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl TendrilError {
    /// Create a validation error for a named field.
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field,
        }
    }

    /// Create an unknown-probe error.
    pub fn unknown_probe(id: Uuid) -> Self {
        Self::UnknownProbe { id }
    }

    /// Create a malformed-probe error.
    pub fn malformed(id: Uuid, reason: impl Into<String>) -> Self {
        Self::MalformedProbe {
            id,
            reason: reason.into(),
        }
    }

    /// Create a feed error.
    pub fn feed(feed_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Feed {
            feed_id: feed_id.into(),
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidCharge { .. } => ErrorCode::ValInvalidCharge,
            Self::EmptyIntent { .. } => ErrorCode::ValEmptyIntent,
            Self::Validation { .. } => ErrorCode::ValInvalidInput,
            Self::UnknownProbe { .. } => ErrorCode::PrbNotFound,
            Self::MalformedProbe { .. } => ErrorCode::PrbMalformed,
            Self::Feed { .. } => ErrorCode::FeedFailed,
            Self::Preservation { .. } => ErrorCode::SinkFailed,
            Self::Configuration(_) => ErrorCode::ConfigInvalid,
            Self::Io(_) => ErrorCode::IoFailed,
            Self::Serialization(_) => ErrorCode::ParseInvalidJson,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// The request field responsible for this error, if it is a validation error.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::InvalidCharge { field, .. }
            | Self::EmptyIntent { field }
            | Self::Validation { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Whether this is a caller-side validation failure.
    pub fn is_validation(&self) -> bool {
        self.field().is_some()
    }

    /// Get a user-friendly suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::InvalidCharge { .. } => Some("Pass a charge within the configured bounds"),
            Self::EmptyIntent { .. } => Some("Describe what the probe is looking for"),
            Self::UnknownProbe { .. } => Some("Please check the probe ID and ensure it exists"),
            Self::Configuration(_) => Some("Please check threshold ordering and value ranges"),
            _ => None,
        }
    }
}
