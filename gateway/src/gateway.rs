//! The dispatcher: one upstream Gemini exchange per HTTP request, mapped
//! onto an HTTP response.

use std::io;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use gemini_core::{parse_lines, Client, Request, Status, StatusClass, UriRef};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tracing::{debug, warn};
use url::Url;

use crate::config::Settings;
use crate::links::LinkRewriter;
use crate::media_type::MediaType;
use crate::render::SuccessContext;
use crate::templates::{respond, BuiltinTemplates, Page, Renderer};

/// Passthrough bodies are forwarded in reads of at most this many bytes.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Gemtext documents larger than this are refused rather than rendered.
pub const MAX_DOCUMENT_SIZE: usize = 16 * 1024 * 1024;

/// Characters escaped when a submitted `q` becomes a Gemini query.
const QUERY: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// Shared, read-only state of a running gateway.
pub struct Gateway {
    client: Client,
    root: Url,
    rewriter: Arc<LinkRewriter>,
    image_pattern: Option<Regex>,
    renderer: Arc<dyn Renderer>,
    cancel: Option<watch::Receiver<bool>>,
    max_document_size: usize,
}

impl Gateway {
    pub fn new(settings: &Settings) -> Self {
        Self {
            client: Client::new().with_timeout(settings.timeout),
            root: settings.root.clone(),
            rewriter: Arc::new(LinkRewriter::new(settings.root.clone(), settings.external.clone())),
            image_pattern: settings.image_pattern.clone(),
            renderer: Arc::new(BuiltinTemplates),
            cancel: None,
            max_document_size: MAX_DOCUMENT_SIZE,
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Upstream dials in progress give up once `cancel` reads `true`.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Cap on the gemtext bytes buffered for one page.
    pub fn with_max_document_size(mut self, bytes: usize) -> Self {
        self.max_document_size = bytes;
        self
    }

    /// The upstream URL an inbound path and query map to.
    pub fn upstream_url(&self, uri: &Uri) -> Url {
        let mut url = self.root.clone();
        url.set_path(uri.path());
        url.set_query(uri.query());
        url
    }

    async fn proxy(&self, uri: &Uri) -> Response {
        let mut req = Request::new(self.upstream_url(uri));
        if let Some(cancel) = &self.cancel {
            req = req.with_cancel(cancel.clone());
        }
        debug!(url = %req.url, "upstream request");

        let resp = match self.client.request(&req).await {
            Ok(resp) => resp,
            Err(err) => {
                return self.error_page(StatusCode::BAD_GATEWAY, None, &err.to_string(), &req.url);
            }
        };

        match resp.status.class() {
            StatusClass::Input => {
                let page = Page::Input {
                    prompt: &resp.meta,
                    sensitive: resp.status == Status::SENSITIVE_INPUT,
                    url: req.url.as_str(),
                };
                respond(self.renderer.as_ref(), StatusCode::OK, HeaderMap::new(), &page)
            }
            StatusClass::Success => self.success(&req, resp).await,
            StatusClass::Redirect => self.redirect(&req.url, resp.status, &resp.meta),
            StatusClass::TemporaryFailure => {
                let mut headers = HeaderMap::new();
                let status = match resp.status {
                    Status::SERVER_UNAVAILABLE => StatusCode::SERVICE_UNAVAILABLE,
                    Status::SLOW_DOWN => {
                        match HeaderValue::from_str(&resp.meta) {
                            Ok(value) => {
                                headers.insert(header::RETRY_AFTER, value);
                            }
                            Err(_) => warn!(meta = %resp.meta, "SLOW DOWN meta is not a valid Retry-After value"),
                        }
                        StatusCode::TOO_MANY_REQUESTS
                    }
                    _ => StatusCode::BAD_GATEWAY,
                };
                self.failure(status, headers, resp.status, &resp.meta, &req.url)
            }
            StatusClass::PermanentFailure => {
                let status = match resp.status {
                    Status::NOT_FOUND => StatusCode::NOT_FOUND,
                    Status::GONE => StatusCode::GONE,
                    Status::BAD_REQUEST => {
                        warn!(url = %req.url, meta = %resp.meta, "upstream rejected our request as malformed");
                        StatusCode::BAD_GATEWAY
                    }
                    _ => StatusCode::FORBIDDEN,
                };
                self.failure(status, HeaderMap::new(), resp.status, &resp.meta, &req.url)
            }
            StatusClass::CertificateRequired => self.failure(
                StatusCode::NOT_IMPLEMENTED,
                HeaderMap::new(),
                resp.status,
                &resp.meta,
                &req.url,
            ),
        }
    }

    async fn success(&self, req: &Request, resp: gemini_core::Response) -> Response {
        let media_type = match MediaType::parse(&resp.meta) {
            Ok(media_type) => media_type,
            Err(err) => {
                let message = format!("{} {}: {err}", resp.status, resp.meta);
                return self.error_page(StatusCode::BAD_GATEWAY, Some(resp.status), &message, &req.url);
            }
        };
        let fingerprint = resp.tls.fingerprint().map(|digest| STANDARD.encode(digest));
        let certificate = resp.tls.leaf_summary().unwrap_or_else(|err| {
            warn!(url = %req.url, "{err}");
            None
        });
        let content_type = resp.meta.clone();
        let Some(mut body) = resp.into_body() else {
            return self.error_page(StatusCode::BAD_GATEWAY, None, "success response without a body", &req.url);
        };

        if !media_type.is("text/gemini") {
            let mut headers = HeaderMap::new();
            match HeaderValue::from_str(&content_type) {
                Ok(value) => {
                    headers.insert(header::CONTENT_TYPE, value);
                }
                Err(_) => warn!(meta = %content_type, "media type is not a valid header value"),
            }
            return (headers, Body::from_stream(passthrough(body))).into_response();
        }

        if let Some(charset) = media_type.param("charset") {
            if !charset.eq_ignore_ascii_case("utf-8") {
                debug!(url = %req.url, charset, "decoding gemtext as UTF-8 anyway");
            }
        }

        let limit = self.max_document_size;
        let mut document = Vec::new();
        let read = (&mut body).take(limit as u64 + 1).read_to_end(&mut document).await;
        // EOF or not, this body is done with
        let _ = body.close().await;
        if let Err(err) = read {
            let message = format!("reading response body: {err}");
            return self.error_page(StatusCode::BAD_GATEWAY, None, &message, &req.url);
        }
        if document.len() > limit {
            warn!(url = %req.url, limit, "document too large");
            let message = format!("document exceeds {limit} bytes");
            return self.error_page(StatusCode::BAD_GATEWAY, None, &message, &req.url);
        }

        let mut context = SuccessContext::new(self.rewriter.clone(), self.image_pattern.clone());
        if let Err(err) = parse_lines(document.as_slice(), &mut context) {
            warn!(url = %req.url, "rendering partial document: {err}");
        }
        let (title, html) = match context.finish() {
            Ok(rendered) => rendered,
            Err(err) => {
                let message = format!("rendering document: {err}");
                return self.error_page(StatusCode::BAD_GATEWAY, None, &message, &req.url);
            }
        };

        let page = Page::Success {
            title: title.as_deref().unwrap_or(req.url.as_str()),
            body: &html,
            url: req.url.as_str(),
            fingerprint: fingerprint.as_deref(),
            certificate: certificate.as_ref(),
        };
        respond(self.renderer.as_ref(), StatusCode::OK, HeaderMap::new(), &page)
    }

    fn redirect(&self, from: &Url, status: Status, meta: &str) -> Response {
        let next = match UriRef::parse(meta).and_then(|target| target.resolve(from)) {
            Ok(next) => next,
            Err(err) => {
                let message = format!("bad redirect {meta:?}: {err}");
                return self.error_page(StatusCode::BAD_GATEWAY, Some(status), &message, from);
            }
        };
        let automatic = next.scheme() == "gemini";
        let location = match self.rewriter.convert(&UriRef::Absolute(next)) {
            Ok(location) => location,
            Err(err) => return self.error_page(StatusCode::BAD_GATEWAY, Some(status), &err.to_string(), from),
        };

        let page = Page::Redirect {
            location: location.as_str(),
            url: from.as_str(),
        };
        if !automatic {
            return respond(self.renderer.as_ref(), StatusCode::OK, HeaderMap::new(), &page);
        }

        let mut headers = HeaderMap::new();
        match HeaderValue::from_str(location.as_str()) {
            Ok(value) => {
                headers.insert(header::LOCATION, value);
            }
            Err(_) => warn!(%location, "redirect target is not a valid header value"),
        }
        respond(self.renderer.as_ref(), StatusCode::FOUND, headers, &page)
    }

    fn failure(&self, status: StatusCode, headers: HeaderMap, gemini: Status, meta: &str, url: &Url) -> Response {
        let page = Page::Error {
            status,
            gemini: Some(gemini),
            message: meta,
            url: url.as_str(),
        };
        respond(self.renderer.as_ref(), status, headers, &page)
    }

    fn error_page(&self, status: StatusCode, gemini: Option<Status>, message: &str, url: &Url) -> Response {
        let page = Page::Error {
            status,
            gemini,
            message,
            url: url.as_str(),
        };
        respond(self.renderer.as_ref(), status, HeaderMap::new(), &page)
    }

    fn submit(&self, uri: &Uri, form: &[u8]) -> Response {
        let url = self.upstream_url(uri);
        let query = uri.query().unwrap_or_default().as_bytes();
        let q = url::form_urlencoded::parse(form)
            .chain(url::form_urlencoded::parse(query))
            .find(|(name, _)| name == "q")
            .map(|(_, value)| value.into_owned());

        let Some(q) = q else {
            return self.error_page(StatusCode::BAD_REQUEST, None, "missing form field q", &url);
        };
        let location = format!("?{}", utf8_percent_encode(&q, QUERY));
        let mut headers = HeaderMap::new();
        match HeaderValue::from_str(&location) {
            Ok(value) => {
                headers.insert(header::LOCATION, value);
            }
            Err(_) => warn!(%location, "query is not a valid header value"),
        }
        let page = Page::Redirect {
            location: &location,
            url: url.as_str(),
        };
        respond(self.renderer.as_ref(), StatusCode::FOUND, headers, &page)
    }
}

/// Fallback handler for every path.
pub async fn dispatch(State(gateway): State<Arc<Gateway>>, method: Method, uri: Uri, form: Bytes) -> Response {
    match method {
        Method::GET => gateway.proxy(&uri).await,
        Method::POST => gateway.submit(&uri, &form),
        _ => {
            let url = gateway.upstream_url(&uri);
            let mut headers = HeaderMap::new();
            headers.insert(header::ALLOW, HeaderValue::from_static("GET, POST"));
            let page = Page::Error {
                status: StatusCode::METHOD_NOT_ALLOWED,
                gemini: None,
                message: "",
                url: url.as_str(),
            };
            respond(gateway.renderer.as_ref(), StatusCode::METHOD_NOT_ALLOWED, headers, &page)
        }
    }
}

/// Stream `body` in chunks until EOF, closing it at the end.
fn passthrough(body: gemini_core::Body) -> impl futures::Stream<Item = io::Result<Bytes>> + Send + 'static {
    futures::stream::unfold(Some(body), |state| async move {
        let mut body = state?;
        let mut buf = vec![0; CHUNK_SIZE];
        match body.read(&mut buf).await {
            Ok(0) => {
                let _ = body.close().await;
                None
            }
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(Bytes::from(buf)), Some(body)))
            }
            Err(err) => Some((Err(err), None)),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;

    fn gateway() -> Gateway {
        let config = GatewayConfig::from_toml(r#"root = "gemini://example.org:1966""#).unwrap();
        Gateway::new(&config.validate().unwrap())
    }

    #[test]
    fn upstream_url_keeps_path_and_query() {
        let g = gateway();
        let uri: Uri = "/docs/a.gmi?x%20y".parse().unwrap();
        assert_eq!(g.upstream_url(&uri).as_str(), "gemini://example.org:1966/docs/a.gmi?x%20y");
        let uri: Uri = "/".parse().unwrap();
        assert_eq!(g.upstream_url(&uri).as_str(), "gemini://example.org:1966/");
    }

    #[test]
    fn submitted_queries_are_percent_encoded() {
        assert_eq!(utf8_percent_encode("a b&c/é~", QUERY).to_string(), "a%20b%26c%2F%C3%A9~");
    }

    #[test]
    fn post_reads_form_then_query() {
        let g = gateway();
        let uri: Uri = "/search?q=fromquery".parse().unwrap();
        let resp = g.submit(&uri, b"q=hello+world");
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers()[header::LOCATION], "?hello%20world");

        let resp = g.submit(&uri, b"");
        assert_eq!(resp.headers()[header::LOCATION], "?fromquery");

        let uri: Uri = "/search".parse().unwrap();
        assert_eq!(g.submit(&uri, b"other=1").status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn redirects() {
        let g = gateway();
        let from = Url::parse("gemini://example.org:1966/old/page.gmi").unwrap();

        let resp = g.redirect(&from, Status::REDIRECT, "../new.gmi");
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers()[header::LOCATION], "/new.gmi");

        let resp = g.redirect(&from, Status::PERMANENT_REDIRECT, "gemini://other.example/");
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers()[header::LOCATION], "gemini://other.example/");

        let resp = g.redirect(&from, Status::REDIRECT, "https://example.org/");
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().get(header::LOCATION).is_none());

        let resp = g.redirect(&from, Status::REDIRECT, "http://[::1/");
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }
}
