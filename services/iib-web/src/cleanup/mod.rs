//! Background retention sweeping for data that "may expire independently by
//! age" (SPEC_FULL.md §3).

mod worker;

pub use worker::{CleanupWorker, CleanupWorkerConfig};
