//! The Gemini wire client.
//!
//! # Design
//! `Client` holds only configuration (trust callback and timeout) and no
//! per-connection state, so one value can serve any number of concurrent
//! requests. Every `request` call opens a fresh TLS connection; nothing is
//! pooled or reused.
//!
//! A single deadline, computed before the dial, bounds dial, handshake,
//! request write and header read together. The body returned for success
//! responses inherits the same deadline.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::error::GeminiError;
use crate::request::Request;
use crate::response::Response;
use crate::tls::{self, TlsInfo, TrustCertificate};

/// Timeout used by `Client::default`.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Asynchronous Gemini client.
#[derive(Clone)]
pub struct Client {
    trust: Option<TrustCertificate>,
    timeout: Duration,
}

impl Default for Client {
    fn default() -> Self {
        Self {
            trust: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("trust", &self.trust.as_ref().map(|_| "Fn(..)"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Client {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the trust-on-first-use callback. It runs inside the handshake,
    /// under the request deadline.
    pub fn with_trust(mut self, trust: TrustCertificate) -> Self {
        self.trust = Some(trust);
        self
    }

    /// Bound each exchange. `Duration::ZERO` disables the deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Perform one request and parse the response header.
    ///
    /// The returned `Response` owns the connection when it carries a body;
    /// the caller closes it (or drops it) when done reading.
    pub async fn request(&self, req: &Request) -> Result<Response, GeminiError> {
        req.validate()?;

        let deadline = (!self.timeout.is_zero()).then(|| Instant::now() + self.timeout);
        let exchange = self.exchange(req, deadline);
        match deadline {
            Some(at) => tokio::time::timeout_at(at, exchange)
                .await
                .map_err(|_| GeminiError::Timeout { after: self.timeout })?,
            None => exchange.await,
        }
    }

    async fn exchange(&self, req: &Request, deadline: Option<Instant>) -> Result<Response, GeminiError> {
        let hostname = req.url.host_str().ok_or(GeminiError::InvalidUrl)?;
        let server_name = server_name(hostname)?;
        let config = tls::client_config(hostname, self.trust.clone(), req.certificate.as_deref())?;

        let tcp = dial(&req.host, req.cancel.clone()).await?;
        debug!(host = %req.host, "connected");

        let connector = TlsConnector::from(Arc::new(config));
        let tls = connector
            .connect(server_name, tcp)
            .await
            .map_err(|source| GeminiError::Handshake {
                host: req.host.clone(),
                source,
            })?;
        let info = TlsInfo::from_connection(tls.get_ref().1);
        debug!(
            host = %req.host,
            version = ?info.protocol_version,
            cipher = ?info.cipher_suite,
            "handshake complete"
        );

        // Errors from here on drop `conn`, which closes the connection.
        let mut conn = BufWriter::new(tls);
        req.write_to(&mut conn).await?;
        conn.flush().await?;

        let mut response = Response::read_from(Box::new(conn.into_inner()), deadline).await?;
        response.tls = info;
        debug!(url = %req.url, status = %response.status, meta = %response.meta, "response");
        Ok(response)
    }
}

async fn dial(host: &str, cancel: Option<watch::Receiver<bool>>) -> Result<TcpStream, GeminiError> {
    let connect = async {
        TcpStream::connect(host)
            .await
            .map_err(|source| GeminiError::Connect {
                host: host.to_string(),
                source,
            })
    };
    let Some(mut cancel) = cancel else {
        return connect.await;
    };
    tokio::select! {
        biased;
        Ok(_) = cancel.wait_for(|cancelled| *cancelled) => Err(GeminiError::Cancelled),
        res = connect => res,
    }
}

fn server_name(hostname: &str) -> Result<ServerName<'static>, GeminiError> {
    // url keeps IPv6 literals bracketed in host_str
    let bare = hostname.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        return Ok(ServerName::IpAddress(ip.into()));
    }
    ServerName::try_from(hostname)
        .map(|name| name.to_owned())
        .map_err(|_| GeminiError::InvalidServerName(hostname.to_string()))
}
