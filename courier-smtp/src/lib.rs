//! Minimal SMTP submission client.
//!
//! Covers what a relay submission needs: plain, implicit-TLS and STARTTLS
//! connections, `AUTH PLAIN`/`AUTH LOGIN`, a single envelope per session and a
//! MIME message builder for HTML bodies with attachments.

pub mod client;

pub use client::{
    Attachment, ClientError, MessageBuilder, Response, ResponseLine, Security, SmtpClient,
};
