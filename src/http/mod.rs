//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID layers)
//!     → middleware.rs (span, metrics, access record)
//!     → handlers.rs (sample routes, /metrics)
//!     → error.rs (failures mapped to status codes)
//!     → Send to client
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod request;
pub mod server;

pub use error::{AppError, FailureDetail};
pub use request::{MakeRequestUuid, RequestContext, X_REQUEST_ID};
pub use server::{instrument, AppState, HttpServer};
