//! Link rewriting: which targets stay inside the gateway, which leave it,
//! and how external ones are presented.

use std::collections::HashMap;

use gemini_core::gemtext::UrlRewriter;
use gemini_core::request::DEFAULT_PORT;
use gemini_core::{GemtextError, UriRef};
use url::Url;

/// Class given to links that stay on the gateway.
pub const LOCAL: &str = "local";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Url,
    Scheme,
    Host,
    Port,
    Path,
    Query,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Field(Field),
}

/// A link template such as `https://portal.example/gemini/{host}{path}`.
///
/// Placeholders: `{url}` `{scheme}` `{host}` `{port}` `{path}` `{query}`.
/// Values are substituted verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalTemplate {
    parts: Vec<Part>,
}

impl ExternalTemplate {
    pub fn parse(source: &str) -> Result<Self, String> {
        let mut parts = Vec::new();
        let mut rest = source;
        while let Some(open) = rest.find('{') {
            if open > 0 {
                parts.push(Part::Literal(rest[..open].to_string()));
            }
            let after = &rest[open + 1..];
            let close = after
                .find('}')
                .ok_or_else(|| format!("unterminated placeholder in {source:?}"))?;
            let field = match &after[..close] {
                "url" => Field::Url,
                "scheme" => Field::Scheme,
                "host" => Field::Host,
                "port" => Field::Port,
                "path" => Field::Path,
                "query" => Field::Query,
                other => return Err(format!("unknown placeholder {{{other}}}")),
            };
            parts.push(Part::Field(field));
            rest = &after[close + 1..];
        }
        if !rest.is_empty() {
            parts.push(Part::Literal(rest.to_string()));
        }
        Ok(Self { parts })
    }

    pub fn expand(&self, url: &Url) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Field(Field::Url) => out.push_str(url.as_str()),
                Part::Field(Field::Scheme) => out.push_str(url.scheme()),
                Part::Field(Field::Host) => out.push_str(url.host_str().unwrap_or_default()),
                Part::Field(Field::Port) => {
                    if let Some(port) = url.port() {
                        out.push_str(&port.to_string());
                    }
                }
                Part::Field(Field::Path) => out.push_str(url.path()),
                Part::Field(Field::Query) => out.push_str(url.query().unwrap_or_default()),
            }
        }
        out
    }
}

/// Rewrites link targets found on pages served from `root`.
#[derive(Debug, Clone)]
pub struct LinkRewriter {
    root: Url,
    external: HashMap<String, ExternalTemplate>,
}

impl LinkRewriter {
    pub fn new(root: Url, external: HashMap<String, ExternalTemplate>) -> Self {
        Self { root, external }
    }

    /// Whether `target` names the upstream root's host and port.
    pub fn is_local(&self, target: &UriRef) -> bool {
        match target.as_url() {
            None => true,
            Some(url) => url.host_str() == self.root.host_str() && effective_port(url) == effective_port(&self.root),
        }
    }

    /// `local` for targets on the gateway, otherwise the target's scheme.
    pub fn classify(&self, target: &UriRef) -> String {
        if self.is_local(target) {
            LOCAL.to_string()
        } else {
            target.scheme().to_string()
        }
    }

    /// Rewrite `target` for a page served by the gateway.
    ///
    /// Relative references are kept. Gemini URLs on the root become
    /// gateway paths. Everything else goes through the template for its
    /// scheme (or `_`), and is kept as is without one.
    pub fn convert(&self, target: &UriRef) -> Result<UriRef, GemtextError> {
        let Some(url) = target.as_url() else {
            return Ok(target.clone());
        };

        if url.scheme() == "gemini" && self.is_local(target) {
            return Ok(UriRef::Relative(internal_path(url)));
        }

        let template = self.external.get(url.scheme()).or_else(|| self.external.get("_"));
        match template {
            Some(template) => {
                let expanded = template.expand(url);
                UriRef::parse(&expanded).map_err(|e| GemtextError::Rewrite {
                    target: url.to_string(),
                    message: format!("template produced {expanded:?}: {e}"),
                })
            }
            None => Ok(target.clone()),
        }
    }
}

impl UrlRewriter for LinkRewriter {
    fn rewrite(&self, target: &UriRef) -> Result<(UriRef, String), GemtextError> {
        Ok((self.convert(target)?, self.classify(target)))
    }
}

fn effective_port(url: &Url) -> Option<u16> {
    match url.scheme() {
        "gemini" => Some(url.port().unwrap_or(DEFAULT_PORT)),
        _ => url.port_or_known_default(),
    }
}

/// `/path[?query][#fragment]` of `url`.
fn internal_path(url: &Url) -> String {
    let mut out = match url.path() {
        "" => "/".to_string(),
        path => path.to_string(),
    };
    if let Some(query) = url.query() {
        out.push('?');
        out.push_str(query);
    }
    if let Some(fragment) = url.fragment() {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewriter(external: &[(&str, &str)]) -> LinkRewriter {
        let external = external
            .iter()
            .map(|(scheme, src)| (scheme.to_string(), ExternalTemplate::parse(src).unwrap()))
            .collect();
        LinkRewriter::new(Url::parse("gemini://example.org").unwrap(), external)
    }

    fn uri(s: &str) -> UriRef {
        UriRef::parse(s).unwrap()
    }

    #[test]
    fn template_placeholders() {
        let t = ExternalTemplate::parse("https://p.example/{scheme}/{host}{path}?{query}&port={port}").unwrap();
        let url = Url::parse("gemini://other.example:1966/a/b?x=1").unwrap();
        assert_eq!(t.expand(&url), "https://p.example/gemini/other.example/a/b?x=1&port=1966");

        let t = ExternalTemplate::parse("{url}").unwrap();
        assert_eq!(t.expand(&url), "gemini://other.example:1966/a/b?x=1");
    }

    #[test]
    fn template_errors() {
        assert!(ExternalTemplate::parse("https://x/{nope}").is_err());
        assert!(ExternalTemplate::parse("https://x/{url").is_err());
        assert_eq!(ExternalTemplate::parse("plain").unwrap().expand(&Url::parse("a:b").unwrap()), "plain");
    }

    #[test]
    fn classification() {
        let r = rewriter(&[]);
        assert_eq!(r.classify(&uri("page.gmi")), "local");
        assert_eq!(r.classify(&uri("gemini://example.org/x")), "local");
        assert_eq!(r.classify(&uri("gemini://example.org:1965/x")), "local");
        assert_eq!(r.classify(&uri("gemini://example.org:1966/x")), "gemini");
        assert_eq!(r.classify(&uri("gemini://other.example/")), "gemini");
        assert_eq!(r.classify(&uri("https://example.org/")), "https");
        assert_eq!(r.classify(&uri("mailto:someone@example.org")), "mailto");
    }

    #[test]
    fn internal_links_become_gateway_paths() {
        let r = rewriter(&[("_", "https://portal.example/{url}")]);
        assert_eq!(r.convert(&uri("gemini://example.org/docs/?q=1#top")).unwrap(), uri("/docs/?q=1#top"));
        assert_eq!(r.convert(&uri("gemini://example.org")).unwrap(), uri("/"));
        assert_eq!(r.convert(&uri("../up.gmi")).unwrap(), uri("../up.gmi"));
    }

    #[test]
    fn external_links_use_scheme_template_then_fallback() {
        let r = rewriter(&[
            ("gemini", "https://portal.example/gemini/{host}{path}"),
            ("_", "https://redirect.example/?to={url}"),
        ]);
        assert_eq!(
            r.convert(&uri("gemini://other.example/page.gmi")).unwrap(),
            uri("https://portal.example/gemini/other.example/page.gmi")
        );
        assert_eq!(
            r.convert(&uri("gopher://hole.example/")).unwrap(),
            uri("https://redirect.example/?to=gopher://hole.example/")
        );
    }

    #[test]
    fn external_links_without_templates_are_kept() {
        let r = rewriter(&[]);
        assert_eq!(r.convert(&uri("https://example.com/")).unwrap(), uri("https://example.com/"));
    }

    #[test]
    fn rewrite_pairs_target_and_class() {
        let r = rewriter(&[]);
        let (target, class) = r.rewrite(&uri("gemini://example.org/a")).unwrap();
        assert_eq!(target, uri("/a"));
        assert_eq!(class, "local");
    }
}
