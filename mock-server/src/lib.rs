use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use rustls::crypto::ring;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::ServerConfig;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use url::Url;

/// Longest request line accepted: a 1024-byte URL plus CRLF.
const MAX_REQUEST_LINE: u64 = 1026;

/// What the server sends back for one path.
#[derive(Clone, Debug)]
pub enum Reply {
    /// Raw response bytes, header included; the connection closes after.
    Full(Vec<u8>),
    /// Accept the request and never answer.
    Hang,
}

impl Reply {
    /// A header-only reply, `<status> <meta>\r\n`.
    pub fn header(status: u8, meta: &str) -> Self {
        Reply::Full(format!("{status} {meta}\r\n").into_bytes())
    }

    /// A `20` reply carrying `body`.
    pub fn document(mime: &str, body: impl AsRef<[u8]>) -> Self {
        let mut bytes = format!("20 {mime}\r\n").into_bytes();
        bytes.extend_from_slice(body.as_ref());
        Reply::Full(bytes)
    }
}

/// Canned replies keyed by request path (plus `?query` when present).
#[derive(Clone, Debug, Default)]
pub struct Capsule {
    routes: HashMap<String, Reply>,
}

impl Capsule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, path: &str, reply: Reply) -> Self {
        self.routes.insert(path.to_string(), reply);
        self
    }

    fn reply_for(&self, request_line: &str) -> Reply {
        let Ok(url) = Url::parse(request_line) else {
            return Reply::header(59, "Bad request");
        };
        let key = match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_string(),
        };
        self.routes
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Reply::header(51, "Not found"))
    }
}

/// A capsule served over TLS on a loopback port.
#[derive(Debug)]
pub struct MockServer {
    pub addr: SocketAddr,
    certificate: CertificateDer<'static>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockServer {
    /// Bind `127.0.0.1:0` and serve `capsule` on a background task.
    pub async fn start(capsule: Capsule) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        Self::serve(listener, capsule)
    }

    /// Serve `capsule` on an already bound listener.
    pub fn serve(listener: TcpListener, capsule: Capsule) -> io::Result<Self> {
        let addr = listener.local_addr()?;
        let (certificate, key) = self_signed(vec!["localhost".to_string(), "127.0.0.1".to_string()])?;
        let acceptor = acceptor(vec![certificate.clone()], key)?;
        let requests = Arc::new(Mutex::new(Vec::new()));
        tokio::spawn(run(listener, acceptor, Arc::new(capsule), requests.clone()));
        Ok(Self {
            addr,
            certificate,
            requests,
        })
    }

    /// `gemini://127.0.0.1:<port><path>`
    pub fn url(&self, path: &str) -> Result<Url, url::ParseError> {
        Url::parse(&format!("gemini://{}", self.addr))?.join(path)
    }

    pub fn certificate(&self) -> &CertificateDer<'static> {
        &self.certificate
    }

    /// Request lines received so far, without CRLF.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Common name on the issuer (and subject) of certificates from [`self_signed`].
pub const ISSUER: &str = "mock-server";

/// Generate a self-signed certificate for `names`, issued by [`ISSUER`] and
/// valid from 2024-01-01 until 2034-01-01.
pub fn self_signed(
    names: Vec<String>,
) -> io::Result<(CertificateDer<'static>, PrivateKeyDer<'static>)> {
    let mut params = rcgen::CertificateParams::new(names).map_err(io::Error::other)?;
    let mut dn = rcgen::DistinguishedName::new();
    dn.push(rcgen::DnType::CommonName, ISSUER);
    params.distinguished_name = dn;
    params.not_before = rcgen::date_time_ymd(2024, 1, 1);
    params.not_after = rcgen::date_time_ymd(2034, 1, 1);
    let key_pair = rcgen::KeyPair::generate().map_err(io::Error::other)?;
    let cert = params.self_signed(&key_pair).map_err(io::Error::other)?;
    let key = PrivatePkcs8KeyDer::from(key_pair.serialize_der());
    Ok((cert.der().clone(), PrivateKeyDer::Pkcs8(key)))
}

pub fn acceptor(
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> io::Result<TlsAcceptor> {
    let config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .and_then(|builder| builder.with_no_client_auth().with_single_cert(chain, key))
        .map_err(io::Error::other)?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Accept connections forever, one task per connection.
pub async fn run(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    capsule: Arc<Capsule>,
    requests: Arc<Mutex<Vec<String>>>,
) -> io::Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        let acceptor = acceptor.clone();
        let capsule = capsule.clone();
        let requests = requests.clone();
        tokio::spawn(async move {
            // Clients hanging up early is routine here.
            let _ = handle(stream, acceptor, &capsule, &requests).await;
        });
    }
}

async fn handle(
    stream: TcpStream,
    acceptor: TlsAcceptor,
    capsule: &Capsule,
    requests: &Mutex<Vec<String>>,
) -> io::Result<()> {
    let mut conn = BufReader::new(acceptor.accept(stream).await?);

    let mut line = Vec::new();
    (&mut conn).take(MAX_REQUEST_LINE).read_until(b'\n', &mut line).await?;
    let reply = match line.strip_suffix(b"\r\n") {
        Some(url) => {
            let url = String::from_utf8_lossy(url).into_owned();
            let reply = capsule.reply_for(&url);
            requests.lock().unwrap_or_else(|e| e.into_inner()).push(url);
            reply
        }
        None => Reply::header(59, "Bad request"),
    };

    match reply {
        Reply::Full(bytes) => {
            conn.write_all(&bytes).await?;
            conn.shutdown().await
        }
        Reply::Hang => {
            let mut rest = Vec::new();
            conn.read_to_end(&mut rest).await.map(|_| ())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_path_is_not_found() {
        let capsule = Capsule::new().route("/", Reply::document("text/gemini", "# hi\n"));
        match capsule.reply_for("gemini://localhost/missing") {
            Reply::Full(bytes) => assert_eq!(bytes, b"51 Not found\r\n"),
            Reply::Hang => panic!("expected a full reply"),
        }
    }

    #[test]
    fn query_is_part_of_the_key() {
        let capsule = Capsule::new()
            .route("/search", Reply::header(10, "Query?"))
            .route("/search?rust", Reply::document("text/plain", "found"));
        match capsule.reply_for("gemini://localhost/search?rust") {
            Reply::Full(bytes) => assert_eq!(bytes, b"20 text/plain\r\nfound"),
            Reply::Hang => panic!("expected a full reply"),
        }
        match capsule.reply_for("gemini://localhost/search") {
            Reply::Full(bytes) => assert_eq!(bytes, b"10 Query?\r\n"),
            Reply::Hang => panic!("expected a full reply"),
        }
    }

    #[test]
    fn unparseable_request_is_bad_request() {
        match Capsule::new().reply_for("not a url") {
            Reply::Full(bytes) => assert_eq!(bytes, b"59 Bad request\r\n"),
            Reply::Hang => panic!("expected a full reply"),
        }
    }

    #[test]
    fn self_signed_certificate_is_der() {
        let (cert, _key) = self_signed(vec!["localhost".to_string()]).unwrap();
        // DER SEQUENCE tag
        assert_eq!(cert.as_ref()[0], 0x30);
    }
}
