//! SMTP client connection with plain, implicit-TLS and STARTTLS support.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use courier_common::{incoming, outgoing, tracing};
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_rustls::{
    TlsConnector,
    rustls::{ClientConfig, RootCertStore, pki_types::ServerName},
};

use super::{
    error::{ClientError, Result},
    response::Response,
};

/// Initial size of the read buffer for SMTP replies.
const BUFFER_SIZE: usize = 4096;

/// Upper bound for a single reply (1MB).
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// How the connection to the relay is secured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Security {
    /// No TLS at all.
    Plain,
    /// TLS from the first byte (usually port 465).
    Tls,
    /// Plain connect, then upgrade with `STARTTLS` (usually port 587).
    #[default]
    StartTls,
}

impl Security {
    /// The conventional choice for a port: 465 is implicit TLS, 25 is plain,
    /// anything else negotiates STARTTLS.
    #[must_use]
    pub const fn for_port(port: u16) -> Self {
        match port {
            465 => Self::Tls,
            25 => Self::Plain,
            _ => Self::StartTls,
        }
    }
}

enum Connection {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl Connection {
    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(stream) => stream.write_all(data).await?,
            Self::Tls(stream) => stream.write_all(data).await?,
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = match self {
            Self::Plain(stream) => stream.read(buf).await?,
            Self::Tls(stream) => stream.read(buf).await?,
        };
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(n)
    }

    async fn into_tls(self, host: &str, accept_invalid_certs: bool) -> Result<Self> {
        let Self::Plain(stream) = self else {
            return Err(ClientError::Tls("connection is already TLS".to_string()));
        };

        let connector = TlsConnector::from(Arc::new(tls_config(accept_invalid_certs)?));
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| ClientError::Tls(format!("invalid server name {host}: {e}")))?;

        let stream = connector
            .connect(server_name, stream)
            .await
            .map_err(|e| ClientError::Tls(e.to_string()))?;

        Ok(Self::Tls(Box::new(stream)))
    }
}

fn tls_config(accept_invalid_certs: bool) -> Result<ClientConfig> {
    let mut roots = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for cert in native.certs {
        roots
            .add(cert)
            .map_err(|e| ClientError::Tls(format!("failed to add certificate: {e}")))?;
    }
    if !native.errors.is_empty() {
        tracing::warn!(errors = ?native.errors, "Some native certificates could not be loaded");
    }

    let mut config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    if accept_invalid_certs {
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(danger::AcceptAnyCertificate));
    }

    Ok(config)
}

mod danger {
    use tokio_rustls::rustls::{
        DigitallySignedStruct, Error, SignatureScheme,
        client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        pki_types::{CertificateDer, ServerName, UnixTime},
    };

    /// Skips certificate validation. Only reachable through the
    /// `accept_invalid_certs` relay setting, for relays with self-signed certs.
    #[derive(Debug)]
    pub(super) struct AcceptAnyCertificate;

    impl ServerCertVerifier for AcceptAnyCertificate {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            vec![
                SignatureScheme::RSA_PKCS1_SHA256,
                SignatureScheme::RSA_PKCS1_SHA384,
                SignatureScheme::RSA_PSS_SHA256,
                SignatureScheme::ECDSA_NISTP256_SHA256,
                SignatureScheme::ECDSA_NISTP384_SHA384,
                SignatureScheme::ED25519,
            ]
        }
    }
}

/// One SMTP session with a relay.
///
/// Every command method checks the reply and turns 4xx/5xx answers into
/// [`ClientError::Rejected`], so callers can chain them with `?`.
pub struct SmtpClient {
    connection: Option<Connection>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    host: String,
    accept_invalid_certs: bool,
}

impl SmtpClient {
    /// Connect to `host:port`, performing the implicit TLS handshake when
    /// `security` is [`Security::Tls`], and read the greeting.
    ///
    /// # Errors
    ///
    /// Fails if the host does not resolve, the TCP connect or TLS handshake
    /// fails, or the greeting is not a 2xx reply.
    pub async fn connect(
        host: &str,
        port: u16,
        security: Security,
        accept_invalid_certs: bool,
    ) -> Result<(Self, Response)> {
        let addrs: Vec<_> = tokio::net::lookup_host((host, port))
            .await
            .map_err(|source| ClientError::Resolve {
                host: host.to_string(),
                source,
            })?
            .collect();

        if addrs.is_empty() {
            return Err(ClientError::Resolve {
                host: host.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses"),
            });
        }

        let stream = TcpStream::connect(addrs.as_slice()).await?;
        let mut connection = Connection::Plain(stream);
        if security == Security::Tls {
            connection = connection.into_tls(host, accept_invalid_certs).await?;
        }

        let mut client = Self {
            connection: Some(connection),
            buffer: vec![0u8; BUFFER_SIZE],
            buffer_pos: 0,
            host: host.to_string(),
            accept_invalid_certs,
        };

        let greeting = client.read_response().await?;
        let greeting = Self::expect("CONNECT", greeting, Response::is_success)?;

        Ok((client, greeting))
    }

    /// Whether the session is currently TLS protected.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self.connection, Some(Connection::Tls(_)))
    }

    /// # Errors
    ///
    /// Fails on I/O errors or a non-2xx reply.
    pub async fn ehlo(&mut self, domain: &str) -> Result<Response> {
        let response = self.command(&format!("EHLO {domain}")).await?;
        Self::expect("EHLO", response, Response::is_success)
    }

    /// Issue `STARTTLS` and upgrade the connection.
    ///
    /// # Errors
    ///
    /// Fails if the relay refuses or the handshake fails.
    pub async fn starttls(&mut self) -> Result<Response> {
        let response = self.command("STARTTLS").await?;
        let response = Self::expect("STARTTLS", response, Response::is_success)?;

        let connection = self
            .connection
            .take()
            .ok_or(ClientError::ConnectionClosed)?;
        self.connection = Some(
            connection
                .into_tls(&self.host, self.accept_invalid_certs)
                .await?,
        );
        self.buffer_pos = 0;

        Ok(response)
    }

    /// Authenticate with `AUTH PLAIN` when offered, otherwise `AUTH LOGIN`.
    ///
    /// `capabilities` is the EHLO reply received on the current (possibly
    /// TLS-upgraded) connection.
    ///
    /// # Errors
    ///
    /// Fails if neither mechanism is offered or the credentials are rejected.
    pub async fn authenticate(
        &mut self,
        capabilities: &Response,
        username: &str,
        password: &str,
    ) -> Result<Response> {
        if capabilities.advertises("AUTH", Some("PLAIN")) {
            let token = BASE64.encode(format!("\0{username}\0{password}"));
            outgoing!("AUTH PLAIN <redacted>");
            self.send_line(&format!("AUTH PLAIN {token}")).await?;
            let response = self.read_response().await?;
            return Self::expect("AUTH", response, Response::is_success);
        }

        if capabilities.advertises("AUTH", Some("LOGIN")) {
            let response = self.command("AUTH LOGIN").await?;
            Self::expect("AUTH", response, Response::is_intermediate)?;

            outgoing!("<username>");
            self.send_line(&BASE64.encode(username)).await?;
            let response = self.read_response().await?;
            Self::expect("AUTH", response, Response::is_intermediate)?;

            outgoing!("<password>");
            self.send_line(&BASE64.encode(password)).await?;
            let response = self.read_response().await?;
            return Self::expect("AUTH", response, Response::is_success);
        }

        Err(ClientError::AuthUnsupported(format!(
            "{} offers neither AUTH PLAIN nor AUTH LOGIN",
            self.host
        )))
    }

    /// # Errors
    ///
    /// Fails on I/O errors or a non-2xx reply.
    pub async fn mail_from(&mut self, from: &str) -> Result<Response> {
        let response = self.command(&format!("MAIL FROM:<{from}>")).await?;
        Self::expect("MAIL FROM", response, Response::is_success)
    }

    /// # Errors
    ///
    /// Fails on I/O errors or a non-2xx reply.
    pub async fn rcpt_to(&mut self, to: &str) -> Result<Response> {
        let response = self.command(&format!("RCPT TO:<{to}>")).await?;
        Self::expect("RCPT TO", response, Response::is_success)
    }

    /// Send `DATA`, the dot-stuffed message and the terminating `.` line.
    ///
    /// # Errors
    ///
    /// Fails if the relay does not accept the data.
    pub async fn data(&mut self, message: &str) -> Result<Response> {
        let response = self.command("DATA").await?;
        Self::expect("DATA", response, Response::is_intermediate)?;

        let mut payload = dot_stuff(message);
        if !payload.ends_with("\r\n") {
            payload.push_str("\r\n");
        }
        payload.push_str(".\r\n");

        outgoing!(bytes = payload.len(), "<message data>");
        self.connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?
            .write_all(payload.as_bytes())
            .await?;

        let response = self.read_response().await?;
        Self::expect("DATA", response, Response::is_success)
    }

    /// Say goodbye. Errors are irrelevant at this point, the reply is returned
    /// for completeness.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors.
    pub async fn quit(&mut self) -> Result<Response> {
        self.command("QUIT").await
    }

    /// Send a raw command line and read the reply without checking it.
    ///
    /// # Errors
    ///
    /// Fails on I/O or parse errors.
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        outgoing!("{command}");
        self.send_line(command).await?;
        self.read_response().await
    }

    fn expect(
        command: &'static str,
        response: Response,
        accept: impl FnOnce(&Response) -> bool,
    ) -> Result<Response> {
        if accept(&response) {
            Ok(response)
        } else {
            Err(ClientError::Rejected {
                command,
                code: response.code,
                message: response.text(),
            })
        }
    }

    async fn send_line(&mut self, line: &str) -> Result<()> {
        self.connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?
            .write_all(format!("{line}\r\n").as_bytes())
            .await
    }

    async fn read_response(&mut self) -> Result<Response> {
        loop {
            if let Some((response, consumed)) =
                Response::parse_response(&self.buffer[..self.buffer_pos])?
            {
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;
                incoming!("{response}");
                return Ok(response);
            }

            if self.buffer_pos >= self.buffer.len() {
                let new_size = self.buffer.len() * 2;
                if new_size > MAX_BUFFER_SIZE {
                    return Err(ClientError::Parse(format!(
                        "reply exceeds {MAX_BUFFER_SIZE} bytes"
                    )));
                }
                self.buffer.resize(new_size, 0);
            }

            let connection = self
                .connection
                .as_mut()
                .ok_or(ClientError::ConnectionClosed)?;
            let n = connection.read(&mut self.buffer[self.buffer_pos..]).await?;
            self.buffer_pos += n;
        }
    }
}

/// Normalise line endings to CRLF and double any leading `.` (RFC 5321 4.5.2).
fn dot_stuff(message: &str) -> String {
    let mut out = String::with_capacity(message.len() + 64);
    for line in message.split_inclusive('\n') {
        let body = line
            .strip_suffix('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l));
        if line.starts_with('.') {
            out.push('.');
        }
        match body {
            Some(body) => {
                out.push_str(body);
                out.push_str("\r\n");
            }
            None => out.push_str(line),
        }
    }
    out
}
