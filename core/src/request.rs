//! Gemini requests: the target URL plus everything needed to dial it.

use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use url::Url;

use crate::error::GeminiError;
use crate::tls::ClientCertificate;

/// Port used when the URL names none.
pub const DEFAULT_PORT: u16 = 1965;

/// Longest URL a request line may carry, in bytes.
pub const MAX_URL_LENGTH: usize = 1024;

/// A single Gemini request.
///
/// `host` is the `host:port` pair to dial. It is derived from `url` by
/// `new` and `set_url`; callers may override it to reach a server under a
/// different address than the URL names.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub certificate: Option<Arc<ClientCertificate>>,
    /// Dialing stops with `GeminiError::Cancelled` once this reads `true`.
    pub cancel: Option<watch::Receiver<bool>>,
    pub host: String,
}

impl Request {
    pub fn new(url: Url) -> Self {
        let host = dial_host(&url);
        Self {
            url,
            certificate: None,
            cancel: None,
            host,
        }
    }

    /// Point the request at a new URL (e.g. a redirect target) and
    /// recompute the dial address.
    pub fn set_url(&mut self, url: Url) {
        self.host = dial_host(&url);
        self.url = url;
    }

    pub fn with_certificate(mut self, certificate: Arc<ClientCertificate>) -> Self {
        self.certificate = Some(certificate);
        self
    }

    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Check the URL against the request-line rules: no user-info and at
    /// most 1024 bytes.
    pub fn validate(&self) -> Result<(), GeminiError> {
        let url = self.url.as_str();
        if !self.url.username().is_empty()
            || self.url.password().is_some()
            || url.len() > MAX_URL_LENGTH
        {
            return Err(GeminiError::InvalidUrl);
        }
        Ok(())
    }

    /// Write `<URL>\r\n`. Nothing is written if the URL is invalid.
    pub async fn write_to<W>(&self, writer: &mut W) -> Result<(), GeminiError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.validate()?;
        writer.write_all(self.url.as_str().as_bytes()).await?;
        writer.write_all(b"\r\n").await?;
        Ok(())
    }
}

fn dial_host(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    format!("{}:{}", host, url.port().unwrap_or(DEFAULT_PORT))
}
