//! `simple_http` disguise: the connection looks like one HTTP GET and its
//! response.
//!
//! # Data Flow
//! ```text
//! client write #1 ─▶ "GET /%xx..%xx HTTP/1.1" + headers + rest of payload ─▶ wire
//! client write #n ─▶ payload verbatim ─▶ wire
//!
//! wire ─▶ server read #1 ─▶ strip request header, decode path ─▶ head + rest
//! server write #1 ─▶ "HTTP/1.1 200 OK" + headers + payload ─▶ wire
//!
//! wire ─▶ client read #1 ─▶ strip response header ─▶ payload
//! ```
//!
//! Wrapping is pure construction. All protocol work happens lazily on the
//! first read and first write of the returned stream.

pub mod framing;
pub mod stream;

use std::sync::Arc;

use crate::obfs::error::ObfsResult;
use crate::obfs::rng::ObfsRng;
use crate::obfs::{BoxedStream, Obfuscator};

pub use framing::{decode_header, encode_header, DEFAULT_HOST};
pub use stream::SimpleHttpStream;

use stream::Side;

/// Name under which the registry selects this strategy.
pub const NAME: &str = "simple_http";

/// Client half: disguises outgoing connections as HTTP requests.
#[derive(Debug, Clone)]
pub struct SimpleHttpObfuscator {
    host: Arc<str>,
    rng: ObfsRng,
}

impl SimpleHttpObfuscator {
    pub fn new() -> Self {
        Self::with_rng(ObfsRng::global())
    }

    /// Use an explicit random source, e.g. a seeded one in tests.
    pub fn with_rng(rng: ObfsRng) -> Self {
        Self {
            host: Arc::from(DEFAULT_HOST),
            rng,
        }
    }

    /// Override the `Host` header value.
    pub fn with_host(mut self, host: impl Into<Arc<str>>) -> Self {
        self.host = host.into();
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Wrap any stream, keeping its concrete type.
    pub fn wrap_stream<S>(&self, conn: S) -> SimpleHttpStream<S> {
        SimpleHttpStream::new(
            conn,
            Side::Client {
                host: Arc::clone(&self.host),
                rng: self.rng.fork(),
            },
        )
    }
}

impl Default for SimpleHttpObfuscator {
    fn default() -> Self {
        Self::new()
    }
}

impl Obfuscator for SimpleHttpObfuscator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn wrap(&self, conn: BoxedStream) -> ObfsResult<BoxedStream> {
        Ok(Box::new(self.wrap_stream(conn)))
    }
}

/// Server half: accepts connections disguised by [`SimpleHttpObfuscator`].
#[derive(Debug, Clone, Default)]
pub struct SimpleHttpServerObfuscator;

impl SimpleHttpServerObfuscator {
    pub fn new() -> Self {
        Self
    }

    pub fn wrap_stream<S>(&self, conn: S) -> SimpleHttpStream<S> {
        SimpleHttpStream::new(conn, Side::Server)
    }
}

impl Obfuscator for SimpleHttpServerObfuscator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn wrap(&self, conn: BoxedStream) -> ObfsResult<BoxedStream> {
        Ok(Box::new(self.wrap_stream(conn)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_with_host() {
        let obfs = SimpleHttpObfuscator::with_rng(ObfsRng::seeded(1)).with_host("cdn.example.com:80");
        assert_eq!(obfs.host(), "cdn.example.com:80");
        assert_eq!(SimpleHttpObfuscator::new().host(), DEFAULT_HOST);
    }

    #[test]
    fn test_wrap_does_no_io() {
        let (a, _b) = duplex(16);
        let stream = SimpleHttpObfuscator::new().wrap_stream(a);
        assert!(!stream.header_sent());
        assert!(!stream.header_consumed());
    }

    #[tokio::test]
    async fn test_seeded_wire_output_is_reproducible() {
        async fn first_frame(seed: u64) -> Vec<u8> {
            let (a, mut b) = duplex(4096);
            let obfs = SimpleHttpObfuscator::with_rng(ObfsRng::seeded(seed));
            let mut stream = obfs.wrap_stream(a);
            stream.write_all(b"0123456789abcdefghij").await.unwrap();
            drop(stream);

            let mut wire = Vec::new();
            b.read_to_end(&mut wire).await.unwrap();
            wire
        }

        assert_eq!(first_frame(42).await, first_frame(42).await);
    }

    #[tokio::test]
    async fn test_boxed_round_trip() {
        let (a, b) = duplex(4096);
        let client = SimpleHttpObfuscator::new();
        let server = SimpleHttpServerObfuscator::new();

        let mut c = client.wrap(Box::new(a)).unwrap();
        let mut s = server.wrap(Box::new(b)).unwrap();

        c.write_all(b"a fairly long request payload").await.unwrap();
        let mut req = [0u8; 29];
        s.read_exact(&mut req).await.unwrap();
        assert_eq!(&req, b"a fairly long request payload");

        s.write_all(b"reply").await.unwrap();
        let mut reply = [0u8; 5];
        c.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"reply");
    }
}
