//! Gemini protocol core: wire client, status model and gemtext processing.
//!
//! # Overview
//! `Client::request` dials a TLS connection, writes one request line and
//! parses one response header into a `Response`. Certificates are accepted
//! through a caller-supplied trust-on-first-use callback rather than by PKI
//! validation. Success bodies are streamed from the connection; they are
//! usually fed to `gemtext::parse_lines`, which drives a `Visitor` such as
//! the normalizing `GmiWriter` or the `HtmlWriter`.
//!
//! # Design
//! - One TLS connection per request. No pooling, no retries.
//! - A single deadline covers dial, handshake, request write and header
//!   read; cancellation applies to the dial only.
//! - Gemini failure statuses are data, not errors. `GeminiError` is reserved
//!   for protocol violations and transport failures.
//! - The parser is synchronous over `BufRead`; callers that receive a body
//!   asynchronously buffer it first.

pub mod client;
pub mod error;
pub mod gemtext;
pub mod request;
pub mod response;
pub mod status;
pub mod tls;
pub mod uri;

pub use client::Client;
pub use error::{GeminiError, GemtextError};
pub use gemtext::{parse_lines, Visitor};
pub use request::Request;
pub use response::{Body, Response};
pub use status::{Status, StatusClass};
pub use tls::{CertificateSummary, ClientCertificate, TlsInfo, TrustCertificate, TrustResult};
pub use uri::UriRef;
