/// Core abstractions: backend connections, endpoints and the connection pool
pub mod document;
pub mod pool;

pub use document::{ClusterTime, CursorId, Document};
pub use pool::ConnectionPool;

use crate::error::{BackendError, RouterError, RouterResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Descriptor of one backend router endpoint (host:port)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new<H: Into<String>>(host: H, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl FromStr for Endpoint {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (host, port) = trimmed
            .rsplit_once(':')
            .ok_or_else(|| RouterError::invalid_endpoint(s, "must be host:port"))?;
        if host.is_empty() {
            return Err(RouterError::invalid_endpoint(s, "host is empty"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| RouterError::invalid_endpoint(s, format!("bad port: {e}")))?;
        Ok(Endpoint::new(host, port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Connection options parsed from a `key=value&key=value` string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    values: BTreeMap<String, String>,
}

impl ConnectOptions {
    pub fn parse(text: &str) -> RouterResult<Self> {
        let mut values = BTreeMap::new();
        let text = text.trim().trim_start_matches('?');

        for pair in text.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| RouterError::invalid_options(format!("'{pair}' is not key=value")))?;
            if key.is_empty() {
                return Err(RouterError::invalid_options(format!("'{pair}' has an empty key")));
            }
            values.insert(key.to_string(), value.to_string());
        }

        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Per-call options handed through to the backend unchanged
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOptions(pub Document);

impl CommandOptions {
    pub fn none() -> Self {
        Self::default()
    }
}

/// One established connection to a backend router.
///
/// Authentication, transport, compression and retries all live behind
/// this trait. A not-ok reply is returned as `Ok`; `Err` is reserved for
/// failures to obtain a reply at all.
#[async_trait]
pub trait BackendConnection: Send + Sync {
    /// Stable identity, normally the endpoint's host string
    fn identity(&self) -> &str;

    async fn execute(
        &self,
        db: &str,
        command: Document,
        options: &CommandOptions,
    ) -> Result<Document, BackendError>;
}

/// Establishes backend connections while the pool is being built
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        default_db: &str,
        options: &ConnectOptions,
    ) -> RouterResult<Arc<dyn BackendConnection>>;
}
