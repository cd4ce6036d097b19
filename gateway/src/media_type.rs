//! Media types from a success response's meta (RFC 2045 syntax).

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MediaTypeError {
    #[error("no media type")]
    Empty,
    #[error("expected type/subtype in {0:?}")]
    MissingSlash(String),
    #[error("invalid token {0:?}")]
    InvalidToken(String),
    #[error("malformed parameter {0:?}")]
    InvalidParameter(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    /// Lowercased `type/subtype`.
    pub essence: String,
    /// Parameters with lowercased names, in order of appearance.
    pub params: Vec<(String, String)>,
}

impl MediaType {
    pub fn parse(value: &str) -> Result<Self, MediaTypeError> {
        let (essence, mut rest) = match value.split_once(';') {
            Some((essence, rest)) => (essence.trim(), rest),
            None => (value.trim(), ""),
        };
        if essence.is_empty() {
            return Err(MediaTypeError::Empty);
        }
        let (primary, sub) = essence
            .split_once('/')
            .ok_or_else(|| MediaTypeError::MissingSlash(essence.to_string()))?;
        for token in [primary.trim(), sub.trim()] {
            if !is_token(token) {
                return Err(MediaTypeError::InvalidToken(token.to_string()));
            }
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(|c: char| c == ';' || c.is_ascii_whitespace());
            if rest.is_empty() {
                break;
            }
            let (param, remainder) = parse_parameter(rest)?;
            params.push(param);
            rest = remainder;
        }

        Ok(Self {
            essence: format!("{}/{}", primary.trim(), sub.trim()).to_ascii_lowercase(),
            params,
        })
    }

    pub fn is(&self, essence: &str) -> bool {
        self.essence.eq_ignore_ascii_case(essence)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Parse one `name=value` or `name="quoted value"` off the front of `input`
/// and return it with the unparsed remainder, which is empty or starts at
/// the next `;`.
fn parse_parameter(input: &str) -> Result<((String, String), &str), MediaTypeError> {
    let invalid = || {
        let shown = input.split(';').next().unwrap_or_default().trim();
        MediaTypeError::InvalidParameter(shown.to_string())
    };
    let (name, after) = input.split_once('=').ok_or_else(invalid)?;
    let name = name.trim();
    if !is_token(name) {
        return Err(invalid());
    }
    let name = name.to_ascii_lowercase();
    let after = after.trim_start();

    let Some(quoted) = after.strip_prefix('"') else {
        let end = after.find(';').unwrap_or(after.len());
        let value = after[..end].trim();
        if !is_token(value) {
            return Err(invalid());
        }
        return Ok(((name, value.to_string()), &after[end..]));
    };

    let mut value = String::new();
    let mut chars = quoted.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, escaped)) => value.push(escaped),
                None => break,
            },
            '"' => {
                let rest = quoted[i + 1..].trim_start();
                if !rest.is_empty() && !rest.starts_with(';') {
                    return Err(invalid());
                }
                return Ok(((name, value), rest));
            }
            _ => value.push(c),
        }
    }
    // unterminated quoted string
    Err(invalid())
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_graphic()
                && !matches!(
                    b,
                    b'(' | b')' | b'<' | b'>' | b'@' | b',' | b';' | b':' | b'\\' | b'"' | b'/' | b'[' | b']' | b'?' | b'='
                )
        })
}
