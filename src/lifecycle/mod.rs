//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger()
//!
//! Shutdown (shutdown.rs):
//!     Trigger → every subscribed listener stops accepting → in-flight requests drain → Exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup lives in main: config, store, balancer, then listeners
//! - Ordered shutdown: stop accept, drain, close

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
