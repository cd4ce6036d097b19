//! Error types for the wire client and the gemtext pipeline.
//!
//! # Design
//! `GeminiError` splits into protocol-format errors (the four header and URL
//! violations a peer or caller can commit) and transport errors (dial,
//! handshake, deadline, cancellation). Neither kind is ever retried here.
//! Gemini failure statuses are not errors at all: they arrive as a parsed
//! `Response` and the caller decides what they mean.
//!
//! `GemtextError` covers everything a `Visitor` traversal can fail with.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors returned by `Client::request` and response parsing.
#[derive(Debug, Error)]
pub enum GeminiError {
    /// The request URL embeds user-info or exceeds 1024 bytes.
    #[error("gemini: invalid URL")]
    InvalidUrl,

    /// The status is not two ASCII digits inside `10..=69`.
    #[error("gemini: invalid status")]
    InvalidStatus,

    /// The meta field is longer than 1024 bytes.
    #[error("gemini: meta too long")]
    MetaTooLong,

    /// A separator (space, LF) is missing or meta is not UTF-8.
    #[error("gemini: malformed header")]
    MalformedHeader,

    #[error("gemini: request timed out after {:.3}s", after.as_secs_f64())]
    Timeout { after: Duration },

    #[error("gemini: request cancelled while connecting")]
    Cancelled,

    #[error("gemini: failed to connect to {host}: {source}")]
    Connect { host: String, source: io::Error },

    /// Includes rejections by the trust callback.
    #[error("gemini: TLS handshake with {host} failed: {source}")]
    Handshake { host: String, source: io::Error },

    #[error("gemini: {0:?} is not a valid TLS server name")]
    InvalidServerName(String),

    /// The peer certificate could not be decoded for display.
    #[error("gemini: cannot decode certificate: {0}")]
    Certificate(String),

    #[error("gemini: TLS configuration: {0}")]
    Tls(#[from] rustls::Error),

    #[error("gemini: {0}")]
    Io(#[from] io::Error),
}

/// Errors produced while parsing gemtext or emitting it through a sink.
#[derive(Debug, Error)]
pub enum GemtextError {
    #[error("gemtext I/O: {0}")]
    Io(#[from] io::Error),

    #[error("invalid link target {target:?}: {source}")]
    InvalidLink {
        target: String,
        source: url::ParseError,
    },

    #[error("cannot rewrite link {target}: {message}")]
    Rewrite { target: String, message: String },
}
