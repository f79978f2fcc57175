//! Failure categorisation from relay error text.
//!
//! Relays report failures as free text, so categories are derived from
//! substrings of the lowercased message. Rules are checked in order and the
//! first match wins; the order matters because messages often contain words
//! from several categories (`"SMTP connection timeout"` is a [`ErrorKind::Timeout`]).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Category of a failed send, used as the key of the error breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Timeout,
    ConnectionError,
    AuthError,
    RateLimited,
    DnsOrHostError,
    TlsError,
    GeneralError,
}

impl ErrorKind {
    pub const ALL: [Self; 7] = [
        Self::Timeout,
        Self::ConnectionError,
        Self::AuthError,
        Self::RateLimited,
        Self::DnsOrHostError,
        Self::TlsError,
        Self::GeneralError,
    ];

    /// Stable name, identical to the serialised form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "Timeout",
            Self::ConnectionError => "ConnectionError",
            Self::AuthError => "AuthError",
            Self::RateLimited => "RateLimited",
            Self::DnsOrHostError => "DnsOrHostError",
            Self::TlsError => "TlsError",
            Self::GeneralError => "GeneralError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const RULES: &[(ErrorKind, &[&str])] = &[
    (ErrorKind::Timeout, &["timeout", "timed out", "tempo"]),
    (
        ErrorKind::ConnectionError,
        &["connection", "conexão", "econnrefused", "econnreset"],
    ),
    (ErrorKind::AuthError, &["smtp", "auth"]),
    (ErrorKind::RateLimited, &["rate", "limit"]),
    (
        ErrorKind::DnsOrHostError,
        &["dns", "host", "enotfound", "getaddrinfo"],
    ),
    (ErrorKind::TlsError, &["ssl", "tls", "certificate"]),
];

/// Categorise a failure message.
#[must_use]
pub fn classify(text: &str) -> ErrorKind {
    let text = text.to_lowercase();

    RULES
        .iter()
        .find(|(_, needles)| needles.iter().any(|needle| text.contains(needle)))
        .map_or(ErrorKind::GeneralError, |(kind, _)| *kind)
}
