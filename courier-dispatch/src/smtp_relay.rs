//! [`Relay`] implementation that submits each job over its own SMTP session.

use async_trait::async_trait;
use courier_common::{incoming, internal};
use courier_smtp::{Attachment, MessageBuilder, Response, Security, SmtpClient};
use tracing::{debug, warn};

use crate::{
    error::RelayError,
    processor::history::parse_recipient,
    relay::{Relay, RelayReceipt},
    types::{AttachmentRef, MessageJob, RelayConfig},
};

/// What a successful [`SmtpRelay::probe`] learned about the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub greeting: String,
    pub tls: bool,
    pub authenticated: bool,
    /// EHLO extension lines, e.g. `AUTH PLAIN LOGIN`.
    pub extensions: Vec<String>,
}

/// An open, greeted and (when configured) authenticated session.
struct Session {
    client: SmtpClient,
    greeting: Response,
    capabilities: Response,
    authenticated: bool,
}

/// Opens one connection per message. Attachments referenced by URL are
/// fetched with a shared HTTP client.
#[derive(Debug, Clone, Default)]
pub struct SmtpRelay {
    http: reqwest::Client,
}

impl SmtpRelay {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect, greet, upgrade and authenticate according to `config`.
    async fn open(config: &RelayConfig) -> Result<Session, RelayError> {
        if config.accept_invalid_certs && config.security != Security::Plain {
            warn!(
                host = %config.host,
                "TLS certificate validation is disabled for this relay"
            );
        }

        let (mut client, greeting) = SmtpClient::connect(
            &config.host,
            config.port,
            config.security,
            config.accept_invalid_certs,
        )
        .await?;
        incoming!("{}", greeting.text());

        let mut capabilities = client.ehlo(config.helo_name()).await?;

        if config.security == Security::StartTls {
            client.starttls().await?;
            capabilities = client.ehlo(config.helo_name()).await?;
        }

        let authenticated = match config.password.as_deref() {
            Some(password) if !password.is_empty() => {
                client
                    .authenticate(&capabilities, config.login(), password)
                    .await?;
                true
            }
            _ => false,
        };

        Ok(Session {
            client,
            greeting,
            capabilities,
            authenticated,
        })
    }

    /// Run the session up to authentication and hang up, without sending.
    ///
    /// # Errors
    ///
    /// Returns the first failure of the connect, EHLO, STARTTLS or AUTH step.
    pub async fn probe(config: &RelayConfig) -> Result<ProbeReport, RelayError> {
        let Session {
            mut client,
            greeting,
            capabilities,
            authenticated,
        } = Self::open(config).await?;

        let report = ProbeReport {
            greeting: greeting.text(),
            tls: client.is_tls(),
            authenticated,
            extensions: capabilities.lines.iter().skip(1).cloned().collect(),
        };

        if let Err(err) = client.quit().await {
            debug!(host = %config.host, error = %err, "QUIT after probe failed");
        }

        Ok(report)
    }

    async fn load_attachments(&self, job: &MessageJob) -> Result<Vec<Attachment>, RelayError> {
        let mut loaded = Vec::with_capacity(job.attachments.len());

        for attachment in &job.attachments {
            let data = if attachment.is_remote() {
                self.fetch(attachment).await?
            } else {
                tokio::fs::read(&attachment.path)
                    .await
                    .map_err(|err| attachment_error(attachment, &err))?
            };

            internal!(
                level = DEBUG,
                filename = %attachment.filename,
                bytes = data.len(),
                "Attachment loaded"
            );

            loaded.push(Attachment {
                filename: attachment.filename.clone(),
                content_type: attachment.content_type.clone(),
                data,
            });
        }

        Ok(loaded)
    }

    async fn fetch(&self, attachment: &AttachmentRef) -> Result<Vec<u8>, RelayError> {
        let response = self
            .http
            .get(&attachment.path)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| attachment_error(attachment, &err))?;

        let body = response
            .bytes()
            .await
            .map_err(|err| attachment_error(attachment, &err))?;

        Ok(body.to_vec())
    }
}

fn attachment_error(attachment: &AttachmentRef, err: &dyn std::fmt::Display) -> RelayError {
    RelayError::Attachment {
        filename: attachment.filename.clone(),
        reason: err.to_string(),
    }
}

#[async_trait]
impl Relay for SmtpRelay {
    async fn send(
        &self,
        job: &MessageJob,
        config: &RelayConfig,
    ) -> Result<RelayReceipt, RelayError> {
        let (_, recipient) = parse_recipient(&job.to);
        if !recipient.contains('@') {
            return Err(RelayError::InvalidRecipient(job.to.clone()));
        }

        let sender = job
            .from_address
            .as_deref()
            .unwrap_or(&config.from_address);
        let sender_name = job.from_name.as_deref().or(config.from_name.as_deref());

        // Loaded before connecting so a bad attachment never opens a session.
        let attachments = self.load_attachments(job).await?;

        let mut builder = MessageBuilder::new()
            .from(sender_name, sender)
            .to(job.to.clone())
            .subject(job.subject.clone())
            .html(job.html.clone());
        for attachment in attachments {
            builder = builder.attach(attachment);
        }
        let message_id = builder.ensure_message_id();
        let message = builder.build()?;

        let Session { mut client, .. } = Self::open(config).await?;
        client.mail_from(sender).await?;
        client.rcpt_to(&recipient).await?;
        client.data(&message).await?;

        if let Err(err) = client.quit().await {
            warn!(
                host = %config.host,
                recipient = %recipient,
                error = %err,
                "QUIT failed after the message was accepted"
            );
        }

        Ok(RelayReceipt {
            message_id: Some(message_id),
        })
    }
}
