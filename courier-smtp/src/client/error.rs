//! Error types for the SMTP client.

use std::io;

use thiserror::Error;

/// Errors that can occur while talking to a relay.
///
/// The `Display` text keeps the relay's own wording (codes, server text, I/O
/// error descriptions) so failures can be categorised from the message alone.
/// Neither the word "SMTP" nor the host name is added to it.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Network I/O failed (connect refused, reset, broken pipe).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The relay host name did not resolve. The host is kept out of the
    /// text; relay names usually start with `smtp.`.
    #[error("getaddrinfo ENOTFOUND: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    /// The relay sent something that is not an SMTP reply.
    #[error("malformed relay reply: {0}")]
    Parse(String),

    /// The relay answered a command with a 4xx or 5xx reply.
    #[error("{command} rejected: {code} {message}")]
    Rejected {
        command: &'static str,
        code: u16,
        message: String,
    },

    /// The relay requires authentication but offers no mechanism we speak.
    #[error("no usable auth mechanism: {0}")]
    AuthUnsupported(String),

    /// TLS setup or handshake failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The message could not be assembled.
    #[error("invalid message: {0}")]
    Message(String),

    /// The relay closed the connection mid-conversation.
    #[error("connection closed unexpectedly")]
    ConnectionClosed,

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

impl ClientError {
    /// The SMTP reply code, when the failure came from a reply.
    #[must_use]
    pub const fn code(&self) -> Option<u16> {
        match self {
            Self::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Specialized `Result` type for SMTP client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
