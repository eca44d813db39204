//! # iib-events
//!
//! The notification envelope and wire vocabulary for IIB's message bus
//! (SPEC_FULL.md §4.5).
//!
//! ## Design principles
//!
//! - Every transition produces at most two envelopes: per-request, per-batch
//! - The per-batch envelope is gated on batch creation or batch termination,
//!   never on an ordinary member-request phase update
//! - Messaging is strictly best-effort; nothing here is allowed to surface
//!   an error to a request-handling caller

mod envelope;
mod error;
mod types;

pub use envelope::*;
pub use error::MessagingError;
pub use types::*;
