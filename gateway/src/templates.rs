//! Page rendering.
//!
//! # Design
//! The gateway never formats a page itself. Every response body that is not
//! a passthrough goes through `respond`, which fixes the status, headers and
//! `Content-Type` first and then asks the `Renderer` for the body. A render
//! failure is logged and whatever was produced so far is sent, the same way
//! a streaming template engine would have already flushed it.

use std::fmt::{self, Write};

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use gemini_core::gemtext::html::escape;
use gemini_core::{CertificateSummary, Status};
use thiserror::Error;
use tracing::error;

pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("rendering {page} page: {source}")]
    Format {
        page: &'static str,
        source: fmt::Error,
    },
}

/// Everything a page may show. Text fields are raw; renderers escape them.
#[derive(Debug, Clone)]
pub enum Page<'a> {
    Success {
        title: &'a str,
        /// Already HTML.
        body: &'a str,
        url: &'a str,
        /// Base64 SHA-256 of the upstream certificate.
        fingerprint: Option<&'a str>,
        certificate: Option<&'a CertificateSummary>,
    },
    Input {
        prompt: &'a str,
        sensitive: bool,
        url: &'a str,
    },
    Redirect {
        /// Where the user should go, already rewritten for the gateway.
        location: &'a str,
        url: &'a str,
    },
    Error {
        status: StatusCode,
        gemini: Option<Status>,
        message: &'a str,
        url: &'a str,
    },
}

impl Page<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Page::Success { .. } => "success",
            Page::Input { .. } => "input",
            Page::Redirect { .. } => "redirect",
            Page::Error { .. } => "error",
        }
    }
}

/// A loaded template set.
pub trait Renderer: Send + Sync {
    fn render(&self, page: &Page<'_>, out: &mut String) -> Result<(), RenderError>;
}

/// Plain, dependency-free pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinTemplates;

impl BuiltinTemplates {
    fn write_page(page: &Page<'_>, out: &mut String) -> fmt::Result {
        let title = match page {
            Page::Success { title, .. } => (*title).to_string(),
            Page::Input { prompt, .. } => (*prompt).to_string(),
            Page::Redirect { .. } => "Redirect".to_string(),
            Page::Error { status, .. } => {
                format!("{} {}", status.as_u16(), status.canonical_reason().unwrap_or_default())
            }
        };
        writeln!(out, "<!doctype html>")?;
        writeln!(out, "<html>\n<head>\n<meta charset=\"utf-8\">")?;
        writeln!(out, "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">")?;
        writeln!(out, "<title>{}</title>\n</head>\n<body>", escape(&title))?;

        match page {
            Page::Success {
                body,
                url,
                fingerprint,
                certificate,
                ..
            } => {
                writeln!(out, "<main>\n{body}</main>")?;
                writeln!(out, "<footer>")?;
                writeln!(out, "<p>Proxied from <code>{}</code></p>", escape(url))?;
                if let Some(fingerprint) = fingerprint {
                    writeln!(out, "<p>Certificate SHA-256: <code>{}</code></p>", escape(fingerprint))?;
                }
                if let Some(cert) = certificate {
                    if let Some(issuer) = &cert.issuer_common_name {
                        writeln!(out, "<p>Issued by <code>{}</code></p>", escape(issuer))?;
                    }
                    writeln!(
                        out,
                        "<p>Valid from {} until {}</p>",
                        cert.not_before.format(TIME_FORMAT),
                        cert.not_after.format(TIME_FORMAT)
                    )?;
                }
                writeln!(out, "</footer>")?;
            }
            Page::Input {
                prompt,
                sensitive,
                url,
            } => {
                let kind = if *sensitive { "password" } else { "text" };
                writeln!(out, "<main>\n<form method=\"post\">")?;
                writeln!(out, "<label for=\"q\">{}</label>", escape(prompt))?;
                writeln!(out, "<input id=\"q\" name=\"q\" type=\"{kind}\" autofocus>")?;
                writeln!(out, "<button type=\"submit\">Submit</button>")?;
                writeln!(out, "</form>\n</main>")?;
                writeln!(out, "<footer><p>Input requested by <code>{}</code></p></footer>", escape(url))?;
            }
            Page::Redirect { location, url } => {
                writeln!(out, "<main>")?;
                writeln!(out, "<p><code>{}</code> is redirecting you to</p>", escape(url))?;
                writeln!(out, "<p><a href=\"{0}\">{0}</a></p>", escape(location))?;
                writeln!(out, "</main>")?;
            }
            Page::Error {
                gemini,
                message,
                url,
                ..
            } => {
                writeln!(out, "<main>\n<h1>{}</h1>", escape(&title))?;
                if let Some(gemini) = gemini {
                    writeln!(out, "<p>The server answered <code>{}</code></p>", escape(&gemini.describe()))?;
                }
                if !message.is_empty() {
                    writeln!(out, "<p>{}</p>", escape(message))?;
                }
                writeln!(out, "<p><code>{}</code></p>\n</main>", escape(url))?;
            }
        }
        writeln!(out, "</body>\n</html>")
    }
}

impl Renderer for BuiltinTemplates {
    fn render(&self, page: &Page<'_>, out: &mut String) -> Result<(), RenderError> {
        Self::write_page(page, out).map_err(|source| RenderError::Format {
            page: page.name(),
            source,
        })
    }
}

/// Render `page` as an HTML response.
pub fn respond(renderer: &dyn Renderer, status: StatusCode, mut headers: HeaderMap, page: &Page<'_>) -> Response {
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(HTML_CONTENT_TYPE));
    let mut body = String::new();
    if let Err(err) = renderer.render(page, &mut body) {
        error!("{err}");
    }
    (status, headers, body).into_response()
}
