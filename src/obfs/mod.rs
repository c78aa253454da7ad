//! Traffic disguise subsystem.
//!
//! # Data Flow
//! ```text
//! config "obfs" name
//!     → ObfsKind::from_name (registry: "" → none, known → kind, else error)
//!     → Arc<dyn Obfuscator>
//!
//! raw stream (from transport layer)
//!     → Obfuscator::wrap (pure construction, no I/O)
//!     → BoxedStream used exactly like the raw one
//! ```
//!
//! # Design Decisions
//! - One capability trait; strategies are variants of `ObfsKind`
//! - Each strategy has a client half and a server half
//! - Streams are single-reader/single-writer and take no locks
//! - Timeouts and cancellation belong to the raw stream, not this layer

pub mod error;
pub mod rng;
pub mod simple_http;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

pub use error::{ObfsError, ObfsResult};
pub use rng::ObfsRng;
pub use simple_http::{SimpleHttpObfuscator, SimpleHttpServerObfuscator, SimpleHttpStream};

/// Any duplex byte stream the disguise layer can sit on.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// Type-erased stream, a drop-in for the raw connection.
pub type BoxedStream = Box<dyn AsyncStream>;

/// A disguise strategy.
pub trait Obfuscator: Send + Sync + fmt::Debug {
    /// Registry name of the strategy.
    fn name(&self) -> &'static str;

    /// Wrap an established connection. Performs no I/O.
    fn wrap(&self, conn: BoxedStream) -> ObfsResult<BoxedStream>;
}

/// Known strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObfsKind {
    SimpleHttp,
}

impl ObfsKind {
    pub const ALL: [ObfsKind; 1] = [ObfsKind::SimpleHttp];

    /// Resolve a configured name. The empty name means no disguise.
    pub fn from_name(name: &str) -> ObfsResult<Option<Self>> {
        if name.is_empty() {
            return Ok(None);
        }
        name.parse().map(Some)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ObfsKind::SimpleHttp => simple_http::NAME,
        }
    }

    /// Client half, used on connections this process dials.
    pub fn client(&self) -> Arc<dyn Obfuscator> {
        match self {
            ObfsKind::SimpleHttp => Arc::new(SimpleHttpObfuscator::new()),
        }
    }

    /// Server half, used on connections this process accepts.
    pub fn server(&self) -> Arc<dyn Obfuscator> {
        match self {
            ObfsKind::SimpleHttp => Arc::new(SimpleHttpServerObfuscator::new()),
        }
    }
}

impl FromStr for ObfsKind {
    type Err = ObfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ObfsError::Unsupported(s.to_string()))
    }
}

impl fmt::Display for ObfsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the client-side strategy for `name`, or `None` for no disguise.
pub fn new_obfuscator(name: &str) -> ObfsResult<Option<Arc<dyn Obfuscator>>> {
    Ok(ObfsKind::from_name(name)?.map(|kind| kind.client()))
}

/// Build the server-side strategy for `name`, or `None` for no disguise.
pub fn new_server_obfuscator(name: &str) -> ObfsResult<Option<Arc<dyn Obfuscator>>> {
    Ok(ObfsKind::from_name(name)?.map(|kind| kind.server()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_empty_is_passthrough() {
        assert!(new_obfuscator("").unwrap().is_none());
        assert!(new_server_obfuscator("").unwrap().is_none());
        assert_eq!(ObfsKind::from_name("").unwrap(), None);
    }

    #[test]
    fn test_registry_simple_http() {
        let obfs = new_obfuscator("simple_http").unwrap().unwrap();
        assert_eq!(obfs.name(), "simple_http");

        let server = new_server_obfuscator("simple_http").unwrap().unwrap();
        assert_eq!(server.name(), "simple_http");
    }

    #[test]
    fn test_registry_unknown_is_error() {
        for name in ["tls", "SIMPLE_HTTP", " simple_http", "simple_http ", "http"] {
            let err = new_obfuscator(name).unwrap_err();
            assert!(matches!(err, ObfsError::Unsupported(ref n) if n == name));
        }
    }

    #[test]
    fn test_kind_display_round_trips() {
        for kind in ObfsKind::ALL {
            assert_eq!(kind.to_string().parse::<ObfsKind>().unwrap(), kind);
        }
    }
}
