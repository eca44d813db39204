//! # iib-id
//!
//! Typed identifiers for IIB's resources.
//!
//! ## Design Principles
//!
//! - IDs are stable and database-assigned; a request's id is its primary key
//! - All IDs are plain monotone integers — they are used directly as URL
//!   path segments (`/builds/<id>`) and as SQL primary/foreign keys
//! - IDs are typed to prevent mixing different resource types at compile time
//!
//! Unlike a client-facing, externally-generated identifier, nothing about an
//! IIB id needs to be unguessable, sortable across processes, or carry an
//! embedded type tag — it is simply the row's serial primary key, wrapped so
//! a `RequestId` and a `BatchId` are not interchangeable by accident.

mod macros;
mod types;

pub use types::*;
