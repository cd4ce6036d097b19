use mock_server::{Capsule, MockServer, Reply};
use tokio::net::TcpListener;

const INDEX: &str = "# Mock capsule

A small set of canned pages for trying out clients.

=> /about.gmi About
=> /search Search (asks for input)
=> /moved Redirects to the about page
=> /gone A page that is gone
=> /slow Rate limited
=> /plain.txt A plain text file
=> gemini://elsewhere.example/ Another capsule
=> https://example.org/ The web
";

const ABOUT: &str = "## About

> Served by mock-server.

* Self-signed certificate, regenerated on every start
* Unknown paths answer 51
";

fn demo() -> Capsule {
    Capsule::new()
        .route("/", Reply::document("text/gemini", INDEX))
        .route("/about.gmi", Reply::document("text/gemini; charset=utf-8", ABOUT))
        .route("/search", Reply::header(10, "Search for"))
        .route("/moved", Reply::header(31, "/about.gmi"))
        .route("/gone", Reply::header(52, "It was here once"))
        .route("/slow", Reply::header(44, "30"))
        .route("/plain.txt", Reply::document("text/plain", "just bytes\n"))
}

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let port = std::env::var("PORT").unwrap_or_else(|_| "1965".to_string());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    let server = MockServer::serve(listener, demo())?;
    println!("listening on gemini://{}/", server.addr);
    tokio::signal::ctrl_c().await
}
