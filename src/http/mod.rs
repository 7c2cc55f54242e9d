//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID)
//!     → proxy.rs (cache lookup, load balancer picks server, forward, store)
//!     → response.rs (strip hop-by-hop, add X-Cache headers)
//!     → Send to client
//! ```

pub mod proxy;
pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use response::{CacheStatus, X_CACHE, X_CACHE_KEY};
pub use server::{AppState, HttpServer, ServerError};
