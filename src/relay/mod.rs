//! Relay subsystem: the consumer of the disguise registry.
//!
//! # Data Flow
//! ```text
//! Listener::accept
//!     → RelaySettings snapshot (mode, upstream, obfuscator)
//!     → dial upstream (connect timeout)
//!     → client mode: wrap upstream │ server mode: wrap inbound
//!     → copy_bidirectional until either side closes
//! ```
//!
//! # Design Decisions
//! - Settings are swapped atomically; each connection keeps its snapshot
//! - Deadlines live on the raw sockets, never inside the disguise
//! - Shutdown stops accepting first, then drains with a deadline

pub mod settings;
pub mod tunnel;

pub use settings::RelaySettings;
pub use tunnel::{relay, RelayError, Tunnel};
