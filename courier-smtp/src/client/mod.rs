//! Submission client used to hand messages to a relay.
//!
//! A session is driven step by step:
//!
//! ```no_run
//! use courier_smtp::{MessageBuilder, Security, SmtpClient};
//!
//! # async fn example() -> Result<(), courier_smtp::ClientError> {
//! let (mut client, _greeting) =
//!     SmtpClient::connect("smtp.example.com", 587, Security::StartTls, false).await?;
//! client.ehlo("courier.local").await?;
//! client.starttls().await?;
//! let capabilities = client.ehlo("courier.local").await?;
//! client.authenticate(&capabilities, "user", "secret").await?;
//! client.mail_from("news@example.com").await?;
//! client.rcpt_to("ana@example.org").await?;
//!
//! let message = MessageBuilder::new()
//!     .from(Some("Example"), "news@example.com")
//!     .to("ana@example.org")
//!     .subject("Hello")
//!     .html("<p>Hello</p>")
//!     .build()?;
//! client.data(&message).await?;
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod message;
mod response;
mod smtp_client;

pub use error::{ClientError, Result};
pub use message::{Attachment, MessageBuilder};
pub use response::{Response, ResponseLine};
pub use smtp_client::{Security, SmtpClient};
