//! Response header parsing and the success body stream.
//!
//! # Design
//! A `Response` is built by reading exactly one header from a connection.
//! Only a success response keeps the connection, exposed as `Body`; any
//! other class closes it before `read_from` returns, so there is no way to
//! read (or forget to close) a body that carries no meaning.
//!
//! The connection-wide deadline set by the client carries over into `Body`:
//! reads after it has passed fail with `io::ErrorKind::TimedOut`.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf};
use tokio::time::{Instant, Sleep};

use crate::error::GeminiError;
use crate::status::{Status, StatusClass};
use crate::tls::TlsInfo;

/// Longest meta a header may carry, in bytes.
pub const MAX_META_LENGTH: usize = 1024;

/// Meta assumed for a success response that sends none.
pub const DEFAULT_MIME: &str = "text/gemini; charset=utf-8";

/// Byte stream a response can be read from.
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Connection for T {}

/// A parsed Gemini response.
#[derive(Debug)]
pub struct Response {
    pub status: Status,
    pub meta: String,
    /// Present iff `status.class()` is `StatusClass::Success`.
    pub body: Option<Body>,
    pub tls: TlsInfo,
}

impl Response {
    /// Read one response header from `conn`.
    ///
    /// For success responses the connection becomes the body; for anything
    /// else it is shut down before returning.
    pub async fn read_from(
        conn: Box<dyn Connection>,
        deadline: Option<Instant>,
    ) -> Result<Self, GeminiError> {
        let mut reader = BufReader::new(conn);
        let (status, meta) = read_header(&mut reader).await?;

        let body = if status.class() == StatusClass::Success {
            Some(Body::new(reader, deadline))
        } else {
            // The header was valid; failing to say goodbye cleanly is not
            // worth surfacing.
            let _ = reader.get_mut().shutdown().await;
            None
        };

        Ok(Self {
            status,
            meta,
            body,
            tls: TlsInfo::default(),
        })
    }

    pub fn into_body(self) -> Option<Body> {
        self.body
    }

    /// Close the underlying connection. Idempotent; a no-op for responses
    /// without a body.
    pub async fn close(&mut self) -> io::Result<()> {
        match self.body.as_mut() {
            Some(body) => body.close().await,
            None => Ok(()),
        }
    }
}

/// Read `<STATUS><SP><META><CR><LF>` from `reader`.
///
/// An empty meta on a success status is replaced with `DEFAULT_MIME`.
pub async fn read_header<R>(reader: &mut R) -> Result<(Status, String), GeminiError>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut digits = [0u8; 2];
    reader.read_exact(&mut digits).await?;
    let status = Status::from_digits(digits)?;

    if reader.read_u8().await? != b' ' {
        return Err(GeminiError::MalformedHeader);
    }

    let mut meta = Vec::new();
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
        match available.iter().position(|&b| b == b'\r') {
            Some(cr) => {
                meta.extend_from_slice(&available[..cr]);
                reader.consume(cr + 1);
                break;
            }
            None => {
                let n = available.len();
                meta.extend_from_slice(available);
                reader.consume(n);
            }
        }
        if meta.len() > MAX_META_LENGTH {
            return Err(GeminiError::MetaTooLong);
        }
    }
    if meta.len() > MAX_META_LENGTH {
        return Err(GeminiError::MetaTooLong);
    }

    if reader.read_u8().await? != b'\n' {
        return Err(GeminiError::MalformedHeader);
    }

    let mut meta = String::from_utf8(meta).map_err(|_| GeminiError::MalformedHeader)?;
    if status.class() == StatusClass::Success && meta.is_empty() {
        meta = DEFAULT_MIME.to_string();
    }
    Ok((status, meta))
}

/// Body of a success response: the rest of the connection.
pub struct Body {
    reader: Option<BufReader<Box<dyn Connection>>>,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl Body {
    fn new(reader: BufReader<Box<dyn Connection>>, deadline: Option<Instant>) -> Self {
        Self {
            reader: Some(reader),
            deadline: deadline.map(|at| Box::pin(tokio::time::sleep_until(at))),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    /// Shut the connection down. Only the first call does anything.
    pub async fn close(&mut self) -> io::Result<()> {
        match self.reader.take() {
            Some(mut reader) => reader.get_mut().shutdown().await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Body")
            .field("closed", &self.is_closed())
            .field("deadline", &self.deadline.as_ref().map(|s| s.deadline()))
            .finish()
    }
}

impl AsyncRead for Body {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Some(deadline) = this.deadline.as_mut() {
            if deadline.as_mut().poll(cx).is_ready() {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "gemini: response deadline exceeded",
                )));
            }
        }
        match this.reader.as_mut() {
            Some(reader) => Pin::new(reader).poll_read(cx, buf),
            // closed bodies read as EOF
            None => Poll::Ready(Ok(())),
        }
    }
}
