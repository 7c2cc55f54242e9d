//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!     → stats.rs (hit/miss counters for the admin API)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Admin API (/admin/stats)
//! ```
//!
//! # Design Decisions
//! - Structured logging for machine parsing
//! - Request ID flows through all request logs
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
pub mod stats;

pub use stats::{ProxyStats, StatsSnapshot};
