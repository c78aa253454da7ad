//! HTTP-disguised TCP tunnel library.
//!
//! The core is [`obfs`]: a registry of disguise strategies and the
//! `simple_http` strategy, which makes a raw stream look like an HTTP
//! request and response on the wire. The remaining modules run a tunnel
//! endpoint around it.

pub mod config;
pub mod lifecycle;
pub mod net;
pub mod obfs;
pub mod observability;
pub mod relay;

pub use config::TunnelConfig;
pub use lifecycle::Shutdown;
pub use obfs::{new_obfuscator, new_server_obfuscator, BoxedStream, ObfsError, Obfuscator};
pub use relay::Tunnel;
