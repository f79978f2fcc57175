//! Error types for the dispatch engine.
//!
//! Only configuration problems fail a batch. Relay and store failures are
//! folded into per-job outcomes and history stats respectively; their
//! variants here exist for callers that use the relay or store directly
//! (for example the connection probe).

use courier_smtp::ClientError;
use thiserror::Error;

/// Failure of a single send.
///
/// The `Display` text is what the classifier sees, so it keeps the relay's
/// own wording.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Smtp(#[from] ClientError),

    #[error("attempt timed out after {0}ms")]
    Timeout(u64),

    #[error("attachment {filename} could not be loaded: {reason}")]
    Attachment { filename: String, reason: String },

    #[error("invalid recipient address {0}")]
    InvalidRecipient(String),

    #[error("{0}")]
    Other(String),
}

impl RelayError {
    /// The SMTP reply code, if the relay answered with one.
    #[must_use]
    pub const fn code(&self) -> Option<u16> {
        match self {
            Self::Smtp(error) => error.code(),
            _ => None,
        }
    }
}

/// Failure writing delivery history.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("history I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("history serialisation error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("history store rejected write: {0}")]
    Rejected(String),
}

/// Failure turning a template and contact into a job.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("contact {index} has no email address")]
    MissingRecipient { index: usize },

    #[error("attachment list is not valid JSON: {0}")]
    Attachments(#[from] serde_json::Error),
}

/// Errors that stop a batch before (or instead of) dispatching.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatchError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}
