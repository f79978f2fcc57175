//! MIME message assembly: headers, an HTML (and optional plain text) body,
//! and base64 attachments.

use std::fmt::Write;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use ulid::Ulid;

use super::error::{ClientError, Result};

/// Encoded lines are wrapped at this width (RFC 2045 6.8).
const LINE_WIDTH: usize = 76;

/// A file to attach, already loaded into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Builds an RFC 5322 message ready to be handed to `DATA`.
///
/// ```
/// use courier_smtp::MessageBuilder;
///
/// let message = MessageBuilder::new()
///     .from(Some("Acme"), "news@acme.test")
///     .to("ana@example.com")
///     .subject("Olá")
///     .html("<p>Hello</p>")
///     .build()
///     .unwrap();
///
/// assert!(message.contains("Subject: =?UTF-8?B?"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    from: Option<String>,
    to: Vec<String>,
    subject: Option<String>,
    headers: Vec<(String, String)>,
    html: Option<String>,
    text: Option<String>,
    attachments: Vec<Attachment>,
    message_id: Option<String>,
    date: Option<DateTime<Utc>>,
}

impl MessageBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the `From` header, with an optional display name.
    #[must_use]
    pub fn from(mut self, name: Option<&str>, address: &str) -> Self {
        self.from = Some(mailbox(name, address));
        self
    }

    /// Adds a `To` recipient. The value is used verbatim, so both
    /// `a@b.test` and `"Name" <a@b.test>` are accepted.
    #[must_use]
    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.to.push(recipient.into());
        self
    }

    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Adds an extra header. Later calls with the same name add another line.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn html(mut self, body: impl Into<String>) -> Self {
        self.html = Some(body.into());
        self
    }

    /// Plain text alternative to the HTML body.
    #[must_use]
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.text = Some(body.into());
        self
    }

    #[must_use]
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Overrides the generated `Message-ID` (without angle brackets).
    #[must_use]
    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    #[must_use]
    pub const fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// The `Message-ID` this builder will emit, generating one from the
    /// sender's domain if none was set.
    pub fn ensure_message_id(&mut self) -> String {
        if let Some(id) = &self.message_id {
            return id.clone();
        }

        let domain = self
            .from
            .as_deref()
            .and_then(|from| from.rsplit_once('@'))
            .map_or("localhost", |(_, domain)| domain.trim_end_matches('>'));
        let id = format!("{}@{domain}", Ulid::new());
        self.message_id = Some(id.clone());
        id
    }

    /// Assemble the message.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Message`] if there is no sender, no recipient,
    /// or no body.
    pub fn build(mut self) -> Result<String> {
        let from = self
            .from
            .clone()
            .ok_or_else(|| ClientError::Message("missing From".to_string()))?;
        if self.to.is_empty() {
            return Err(ClientError::Message("missing To".to_string()));
        }
        if self.html.is_none() && self.text.is_none() {
            return Err(ClientError::Message("missing body".to_string()));
        }

        let message_id = self.ensure_message_id();
        let date = self.date.unwrap_or_else(Utc::now);

        let mut out = String::with_capacity(2048);
        push_header(&mut out, "From", &from);
        push_header(&mut out, "To", &self.to.join(", "));
        if let Some(subject) = &self.subject {
            push_header(&mut out, "Subject", &encode_word(subject));
        }
        push_header(&mut out, "Date", &date.to_rfc2822());
        push_header(&mut out, "Message-ID", &format!("<{message_id}>"));
        for (name, value) in &self.headers {
            push_header(&mut out, name, value);
        }
        push_header(&mut out, "MIME-Version", "1.0");

        let body = self.body_part();
        if self.attachments.is_empty() {
            out.push_str(&body);
            return Ok(out);
        }

        let boundary = boundary("mixed");
        push_header(
            &mut out,
            "Content-Type",
            &format!("multipart/mixed; boundary=\"{boundary}\""),
        );
        out.push_str("\r\n");

        let _ = write!(out, "--{boundary}\r\n{body}\r\n");
        for attachment in &self.attachments {
            let filename = encode_word(&attachment.filename);
            let _ = write!(
                out,
                "--{boundary}\r\n\
                 Content-Type: {}; name=\"{filename}\"\r\n\
                 Content-Transfer-Encoding: base64\r\n\
                 Content-Disposition: attachment; filename=\"{filename}\"\r\n\r\n{}",
                attachment.content_type,
                wrap_base64(&attachment.data),
            );
        }
        let _ = write!(out, "--{boundary}--\r\n");

        Ok(out)
    }

    /// The body entity, starting with its own `Content-Type` header.
    fn body_part(&self) -> String {
        match (&self.html, &self.text) {
            (Some(html), Some(text)) => {
                let boundary = boundary("alt");
                format!(
                    "Content-Type: multipart/alternative; boundary=\"{boundary}\"\r\n\r\n\
                     --{boundary}\r\n{}\r\n--{boundary}\r\n{}\r\n--{boundary}--\r\n",
                    text_part("plain", text),
                    text_part("html", html),
                )
            }
            (Some(html), None) => text_part("html", html),
            (None, Some(text)) => text_part("plain", text),
            (None, None) => String::new(),
        }
    }
}

fn push_header(out: &mut String, name: &str, value: &str) {
    let _ = write!(out, "{name}: {value}\r\n");
}

fn text_part(subtype: &str, content: &str) -> String {
    format!(
        "Content-Type: text/{subtype}; charset=utf-8\r\n\
         Content-Transfer-Encoding: base64\r\n\r\n{}",
        wrap_base64(content.as_bytes())
    )
}

/// `"Name" <address>`, or the bare address without a name.
fn mailbox(name: Option<&str>, address: &str) -> String {
    match name.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) if name.is_ascii() => {
            format!("\"{}\" <{address}>", name.replace('"', "\\\""))
        }
        Some(name) => format!("{} <{address}>", encode_word(name)),
        None => address.to_string(),
    }
}

/// RFC 2047 encoded-word for non-ASCII header text.
fn encode_word(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?UTF-8?B?{}?=", BASE64.encode(value))
    }
}

fn wrap_base64(data: &[u8]) -> String {
    let encoded = BASE64.encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / LINE_WIDTH * 2 + 2);
    // Base64 output is ASCII, so byte chunks are valid UTF-8.
    for line in encoded.as_bytes().chunks(LINE_WIDTH) {
        out.push_str(std::str::from_utf8(line).unwrap_or_default());
        out.push_str("\r\n");
    }
    out
}

fn boundary(kind: &str) -> String {
    format!("courier-{kind}-{}", Ulid::new())
}
