//! HTTP gateway to a single Gemini capsule.
//!
//! # Overview
//! Every HTTP path is proxied to the same path on the configured upstream
//! root. Gemtext becomes an HTML page, other media types stream through
//! unchanged, and Gemini statuses are translated to their HTTP
//! counterparts: redirects, input prompts and failures each get a page of
//! their own.
//!
//! # Design
//! The application is a plain axum `Router` whose fallback is `dispatch`.
//! `Gateway` holds everything the dispatcher needs (client, root, link
//! rewriter, compiled image pattern and the page renderer); it is built
//! once from validated `Settings` and only ever read afterwards, so
//! handlers share it through an `Arc` with no locking.

pub mod config;
pub mod gateway;
pub mod links;
pub mod media_type;
pub mod render;
pub mod templates;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

pub use config::{ConfigError, GatewayConfig, Settings};
pub use gateway::{dispatch, Gateway};
pub use links::{ExternalTemplate, LinkRewriter};
pub use templates::{BuiltinTemplates, Page, RenderError, Renderer};

pub fn app(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/favicon.ico", get(no_favicon))
        .fallback(dispatch)
        .layer(middleware::from_fn(log_request))
        .with_state(gateway)
}

/// Serve `gateway` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, gateway: Arc<Gateway>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app(gateway)).with_graceful_shutdown(shutdown).await
}

async fn no_favicon() -> impl IntoResponse {
    StatusCode::NOT_FOUND
}

async fn log_request(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();
    let response = next.run(req).await;
    info!(
        %method,
        path = %uri,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "request"
    );
    response
}
