//! Resilience helpers.
//!
//! # Data Flow
//! ```text
//! Span batch export:
//!     → export timeout (per attempt)
//!     → On failure: backoff.rs (wait, then retry up to the attempt limit)
//!     → After the last attempt: batch dropped and counted
//! ```
//!
//! # Design Decisions
//! - Every outbound call has a deadline
//! - Jitter keeps many instances from retrying in lockstep

pub mod backoff;

pub use backoff::Backoff;
