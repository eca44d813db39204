//! iib-web: HTTP API, dispatcher, and build driver for the index image
//! builder (SPEC_FULL.md §2, components C6-C8 plus the C1-C5 collaborators
//! they compose). Ships an `iib-web` binary; the library surface exists so
//! integration tests can build an `api::create_router` against a real or
//! faked `AppState` without going through `main`.

pub mod api;
pub mod cache;
pub mod cleanup;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod domain;
pub mod driver;
pub mod git;
pub mod messaging;
pub mod pipeline;
pub mod state;
pub mod transport;
pub mod worker;
