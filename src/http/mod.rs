//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum router, tower layers)
//!     → request.rs (x-request-id assigned and propagated)
//!     → HttpContext built from the request
//!     → current Pipeline generation handles it
//!     → ctx.into_response() sent to client
//! ```

pub mod request;
pub mod server;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::HttpServer;
