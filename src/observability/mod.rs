//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Relay and config subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Connection ID flows through every relay log line
//! - The disguise streams themselves never log

pub mod logging;
pub mod metrics;
