//! Instance and error definitions for discovery.

use std::fmt;

use thiserror::Error;
use url::Url;

/// Errors raised by an instance catalog.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DiscoveryError {
    /// The discovery backend could not be reached or answered with an error.
    #[error("discovery backend unavailable for service {service}: {reason}")]
    Unavailable { service: String, reason: String },

    /// The discovery backend returned data it could not decode.
    #[error("malformed discovery response for service {service}: {reason}")]
    Malformed { service: String, reason: String },
}

/// Reasons an instance address cannot be turned into a URL.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("missing scheme")]
    MissingScheme,

    #[error("missing host")]
    MissingHost,

    #[error("{0}")]
    Parse(#[from] url::ParseError),

    #[error("invalid request target: {0}")]
    InvalidUri(String),
}

/// One resolvable endpoint of a logical service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInstance {
    /// Logical service this instance belongs to.
    pub service: String,
    /// URL scheme, e.g. "http".
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    /// Base path prepended to every request path. Empty for none.
    pub path: String,
}

impl ServiceInstance {
    /// Create an instance with no base path.
    pub fn new(
        service: impl Into<String>,
        scheme: impl Into<String>,
        host: impl Into<String>,
        port: Option<u16>,
    ) -> Self {
        Self {
            service: service.into(),
            scheme: scheme.into(),
            host: host.into(),
            port,
            path: String::new(),
        }
    }

    /// Set the base path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Build an instance from a URI string such as `http://10.0.0.4:8080/api`.
    pub fn from_uri(service: impl Into<String>, uri: &str) -> Result<Self, AddressError> {
        let url = Url::parse(uri)?;
        let host = url.host_str().ok_or(AddressError::MissingHost)?;
        let path = match url.path() {
            "/" => String::new(),
            p => p.trim_end_matches('/').to_string(),
        };

        Ok(Self {
            service: service.into(),
            scheme: url.scheme().to_string(),
            host: host.to_string(),
            port: url.port(),
            path,
        })
    }

    /// Convert this instance into a base URL.
    pub fn to_url(&self) -> Result<Url, AddressError> {
        if self.scheme.is_empty() {
            return Err(AddressError::MissingScheme);
        }
        if self.host.is_empty() {
            return Err(AddressError::MissingHost);
        }

        let url = Url::parse(&self.to_string())?;
        if url.cannot_be_a_base() || url.host_str().is_none() {
            return Err(AddressError::MissingHost);
        }
        Ok(url)
    }
}

impl fmt::Display for ServiceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        if !self.path.is_empty() && !self.path.starts_with('/') {
            f.write_str("/")?;
        }
        f.write_str(&self.path)
    }
}
