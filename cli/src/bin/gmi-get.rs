use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use gemini_core::tls::{fingerprint, CertificateDer};
use gemini_core::{Client, Request, StatusClass, TrustCertificate, TrustResult, UriRef};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

/// Fetch a Gemini URL, following redirects.
#[derive(Debug, Parser)]
#[command(name = "gmi-get", version)]
struct Args {
    /// Output path, `-` for stdout.
    #[arg(short, long, default_value = "-")]
    output: String,

    /// Maximum number of redirects to follow.
    #[arg(short = 'r', long = "redirect", default_value_t = 5)]
    max_redirects: u32,

    url: Url,
}

async fn open_output(path: &str) -> anyhow::Result<Box<dyn AsyncWrite + Unpin + Send>> {
    if path == "-" {
        return Ok(Box::new(tokio::io::stdout()));
    }
    let file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("creating {path}"))?;
    Ok(Box::new(file))
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut output = open_output(&args.output).await?;

    let trust: TrustCertificate = Arc::new(|host: &str, cert: &CertificateDer<'_>| -> TrustResult {
        info!(host, fingerprint = %hex::encode(fingerprint(cert)), "certificate");
        Ok(())
    });
    let client = Client::new().with_trust(trust);

    let mut req = Request::new(args.url);
    let mut redirects_left = args.max_redirects;
    loop {
        let resp = client
            .request(&req)
            .await
            .with_context(|| format!("requesting {}", req.url))?;

        match resp.status.class() {
            StatusClass::Success => {
                let mut body = resp.into_body().context("success response without a body")?;
                tokio::io::copy(&mut body, &mut output)
                    .await
                    .context("copying response body")?;
                output.flush().await?;
                let _ = body.close().await;
                return Ok(ExitCode::SUCCESS);
            }
            StatusClass::Redirect => {
                info!(status = %resp.status, meta = %resp.meta, "redirect");
                if redirects_left == 0 {
                    warn!("too many redirects");
                    return Ok(ExitCode::from(resp.status.code()));
                }
                redirects_left -= 1;
                let next = UriRef::parse(&resp.meta)
                    .and_then(|target| target.resolve(&req.url))
                    .with_context(|| format!("bad redirect target {:?}", resp.meta))?;
                req.set_url(next);
            }
            _ => {
                warn!(status = %resp.status, meta = %resp.meta, "request failed");
                return Ok(ExitCode::from(resp.status.code()));
            }
        }
    }
}
