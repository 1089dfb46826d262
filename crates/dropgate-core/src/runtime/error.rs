// crates/dropgate-core/src/runtime/error.rs
// ============================================================================
// Module: Dropgate Delivery Errors
// Description: Runtime error taxonomy with stable kinds and status classes.
// Purpose: Give every surface one mapping from failures to caller guidance.
// Dependencies: crate::interfaces, thiserror
// ============================================================================

//! ## Overview
//! [`DeliveryError`] is the single error type returned by runtime operations.
//! Every variant maps to one [`ErrorKind`], and every kind maps to one
//! [`StatusClass`] and HTTP status. Access failures collapse into
//! [`ErrorKind::NotFoundOrDenied`] so callers cannot probe for existence.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use thiserror::Error;

use crate::core::ManifestError;
use crate::core::TransitionError;
use crate::interfaces::BlobError;
use crate::interfaces::PaymentError;
use crate::interfaces::StoreError;
use crate::runtime::envelope::EnvelopeError;
use crate::runtime::tokens::TokenError;

// ============================================================================
// SECTION: Kinds
// ============================================================================

/// Stable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Resource absent or caller lacks access (indistinguishable).
    NotFoundOrDenied,
    /// Operation not allowed in the current lifecycle state.
    InvalidState,
    /// Request failed validation.
    InvalidInput,
    /// Required buyer inputs are absent.
    MissingRequiredInputs,
    /// Duplicate or concurrent write.
    Conflict,
    /// Token, key, or window has expired.
    Expired,
    /// Storage failed transiently after retries.
    TransientStoreError,
    /// Server misconfiguration.
    ConfigurationError,
}

/// Caller guidance derived from an error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    /// Retrying the same request may succeed.
    Retry,
    /// The request must be changed.
    FixRequest,
    /// The request will not succeed in the current state.
    NotAllowed,
    /// Operator action required.
    Fatal,
}

impl ErrorKind {
    /// Returns the stable label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFoundOrDenied => "not_found_or_denied",
            Self::InvalidState => "invalid_state",
            Self::InvalidInput => "invalid_input",
            Self::MissingRequiredInputs => "missing_required_inputs",
            Self::Conflict => "conflict",
            Self::Expired => "expired",
            Self::TransientStoreError => "transient_store_error",
            Self::ConfigurationError => "configuration_error",
        }
    }

    /// Returns the status class for the kind.
    #[must_use]
    pub const fn status_class(self) -> StatusClass {
        match self {
            Self::TransientStoreError => StatusClass::Retry,
            Self::InvalidInput | Self::MissingRequiredInputs => StatusClass::FixRequest,
            Self::NotFoundOrDenied | Self::InvalidState | Self::Conflict | Self::Expired => {
                StatusClass::NotAllowed
            }
            Self::ConfigurationError => StatusClass::Fatal,
        }
    }

    /// Returns the HTTP status code for the kind.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::NotFoundOrDenied => 404,
            Self::InvalidState | Self::Conflict => 409,
            Self::InvalidInput => 400,
            Self::MissingRequiredInputs => 422,
            Self::Expired => 410,
            Self::TransientStoreError => 503,
            Self::ConfigurationError => 500,
        }
    }
}

impl StatusClass {
    /// Returns the stable label for the class.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Retry => "retry",
            Self::FixRequest => "fix_request",
            Self::NotAllowed => "not_allowed",
            Self::Fatal => "fatal",
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Delivery runtime errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Resource absent or caller lacks access.
    #[error("not found or access denied")]
    NotFoundOrDenied,
    /// Upload session unknown, expired, or owned by someone else.
    #[error("upload session not found")]
    SessionNotFound,
    /// Chunk index outside the session's expected range.
    #[error("chunk index {index} out of range (expected < {expected})")]
    InvalidChunkIndex {
        /// Supplied index.
        index: u32,
        /// Expected chunk count.
        expected: u32,
    },
    /// Request failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation not allowed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Upload completion attempted with chunks missing.
    #[error("upload incomplete: {} chunk(s) missing", .missing.len())]
    IncompleteUpload {
        /// Missing chunk indices.
        missing: Vec<u32>,
    },
    /// Required buyer inputs absent.
    #[error("missing required inputs: {}", .missing.join(", "))]
    MissingRequiredInputs {
        /// Missing input names.
        missing: Vec<String>,
    },
    /// Duplicate or concurrent write.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Token or window expired.
    #[error("expired: {0}")]
    Expired(String),
    /// Key envelope for the recipient has expired.
    #[error("product key expired")]
    KeyExpired,
    /// Storage failed transiently.
    #[error("transient store error: {0}")]
    Transient(String),
    /// Server misconfiguration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl DeliveryError {
    /// Returns the stable kind for the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFoundOrDenied | Self::SessionNotFound => ErrorKind::NotFoundOrDenied,
            Self::InvalidChunkIndex {
                ..
            }
            | Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::InvalidState(_)
            | Self::IncompleteUpload {
                ..
            } => ErrorKind::InvalidState,
            Self::MissingRequiredInputs {
                ..
            } => ErrorKind::MissingRequiredInputs,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Expired(_) | Self::KeyExpired => ErrorKind::Expired,
            Self::Transient(_) => ErrorKind::TransientStoreError,
            Self::Configuration(_) => ErrorKind::ConfigurationError,
        }
    }

    /// Returns missing input names for [`DeliveryError::MissingRequiredInputs`].
    #[must_use]
    pub fn missing_inputs(&self) -> Option<&[String]> {
        match self {
            Self::MissingRequiredInputs {
                missing,
            } => Some(missing),
            _ => None,
        }
    }

    /// Returns true when the error may clear on retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

// ============================================================================
// SECTION: Conversions
// ============================================================================

impl From<StoreError> for DeliveryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Transient(message) | StoreError::Io(message) => Self::Transient(message),
            StoreError::Conflict(message) => Self::Conflict(message),
            StoreError::NotFound(_) => Self::NotFoundOrDenied,
            StoreError::Invalid(message) => Self::InvalidInput(message),
            StoreError::Corrupt(message) => Self::Configuration(message),
        }
    }
}

impl From<BlobError> for DeliveryError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::InvalidKey(message) => Self::InvalidInput(message),
            BlobError::Io(message) | BlobError::Backend(message) => Self::Transient(message),
            BlobError::Document(message) => Self::Configuration(message),
        }
    }
}

impl From<PaymentError> for DeliveryError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Unavailable(message) => Self::Transient(message),
            PaymentError::Rejected(message) => Self::InvalidInput(message),
        }
    }
}

impl From<TransitionError> for DeliveryError {
    fn from(err: TransitionError) -> Self {
        Self::InvalidState(err.to_string())
    }
}

impl From<ManifestError> for DeliveryError {
    fn from(err: ManifestError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

impl From<TokenError> for DeliveryError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => Self::Expired("token expired".to_string()),
            TokenError::Signing(message) => Self::Configuration(message),
            TokenError::Malformed | TokenError::BadSignature | TokenError::WrongType => {
                Self::NotFoundOrDenied
            }
        }
    }
}

impl From<EnvelopeError> for DeliveryError {
    fn from(err: EnvelopeError) -> Self {
        Self::Configuration(err.to_string())
    }
}
