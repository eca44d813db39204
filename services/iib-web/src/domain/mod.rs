//! The request-lifecycle domain model.
//!
//! This module holds the in-memory shapes the rest of the crate works with:
//! the polymorphic `Request`, its `RequestState` history, `Batch`, and the
//! per-type payloads. Persistence (`crate::db`) reads and writes these types
//! but does not own their invariants; those live here so they can be unit
//! tested without a database.

mod batch;
mod error;
mod image;
mod request;
mod types;

pub use batch::Batch;
pub use error::DomainError;
pub use image::Image;
pub use request::{Request, RequestState};
pub use types::*;
