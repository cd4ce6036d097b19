//! URI references as they appear in gemtext links and redirect metas.
//!
//! `url::Url` only models absolute URLs, while a link line may just as well
//! say `=> hello.gmi`. `UriRef` keeps relative references as written (after
//! checking they would resolve) and defers resolution to the caller, who
//! knows the base.

use std::fmt;

use url::{ParseError, Url};

/// An absolute URL or a relative reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UriRef {
    Absolute(Url),
    Relative(String),
}

impl UriRef {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        match Url::parse(input) {
            Ok(url) => Ok(UriRef::Absolute(url)),
            Err(ParseError::RelativeUrlWithoutBase) => {
                // Reject references that could never be resolved.
                Url::parse("gemini://localhost/")?.join(input)?;
                Ok(UriRef::Relative(input.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    pub fn is_absolute(&self) -> bool {
        matches!(self, UriRef::Absolute(_))
    }

    /// Scheme of an absolute URL; empty for relative references.
    pub fn scheme(&self) -> &str {
        match self {
            UriRef::Absolute(url) => url.scheme(),
            UriRef::Relative(_) => "",
        }
    }

    pub fn host_str(&self) -> Option<&str> {
        match self {
            UriRef::Absolute(url) => url.host_str(),
            UriRef::Relative(_) => None,
        }
    }

    /// Path component, without query or fragment.
    pub fn path(&self) -> &str {
        match self {
            UriRef::Absolute(url) => url.path(),
            UriRef::Relative(reference) => {
                let end = reference.find(['?', '#']).unwrap_or(reference.len());
                &reference[..end]
            }
        }
    }

    pub fn as_url(&self) -> Option<&Url> {
        match self {
            UriRef::Absolute(url) => Some(url),
            UriRef::Relative(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            UriRef::Absolute(url) => url.as_str(),
            UriRef::Relative(reference) => reference,
        }
    }

    /// Resolve against `base` (RFC 3986 section 5).
    pub fn resolve(&self, base: &Url) -> Result<Url, ParseError> {
        match self {
            UriRef::Absolute(url) => Ok(url.clone()),
            UriRef::Relative(reference) => base.join(reference),
        }
    }
}

impl From<Url> for UriRef {
    fn from(url: Url) -> Self {
        UriRef::Absolute(url)
    }
}

impl fmt::Display for UriRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
