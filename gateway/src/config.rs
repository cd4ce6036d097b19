//! Gateway configuration, read once at startup from TOML.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::links::ExternalTemplate;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("root {root:?}: {reason}")]
    Root { root: String, reason: String },

    #[error("image_pattern: {0}")]
    ImagePattern(#[from] regex::Error),

    #[error("external template for {scheme:?}: {message}")]
    External { scheme: String, message: String },
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_timeout() -> u64 {
    30_000
}

/// Raw configuration as written in the file. Unknown keys are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Upstream Gemini root, e.g. `gemini://example.org`.
    pub root: String,

    /// Whole-exchange deadline in milliseconds; 0 disables it.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default)]
    pub image_pattern: Option<String>,

    /// Per-scheme link templates; `_` applies to schemes without one.
    #[serde(default)]
    pub external: HashMap<String, String>,
}

/// Configuration after validation: everything parsed and compiled.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind: SocketAddr,
    pub root: Url,
    pub timeout: Duration,
    pub image_pattern: Option<Regex>,
    pub external: HashMap<String, ExternalTemplate>,
}

impl GatewayConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn validate(&self) -> Result<Settings, ConfigError> {
        let root_error = |reason: &str| ConfigError::Root {
            root: self.root.clone(),
            reason: reason.to_string(),
        };
        let root = Url::parse(&self.root).map_err(|e| root_error(&e.to_string()))?;
        if root.scheme() != "gemini" {
            return Err(root_error("scheme must be gemini"));
        }
        if root.host_str().is_none() {
            return Err(root_error("missing host"));
        }

        let image_pattern = self.image_pattern.as_deref().map(Regex::new).transpose()?;

        let external = self
            .external
            .iter()
            .map(|(scheme, source)| {
                ExternalTemplate::parse(source)
                    .map(|template| (scheme.clone(), template))
                    .map_err(|message| ConfigError::External {
                        scheme: scheme.clone(),
                        message,
                    })
            })
            .collect::<Result<_, _>>()?;

        Ok(Settings {
            bind: self.bind,
            root,
            timeout: Duration::from_millis(self.timeout),
            image_pattern,
            external,
        })
    }
}
