//! Error types for the messaging layer.
//!
//! None of these ever reach a caller: the notification bus is strictly
//! best-effort (SPEC_FULL.md §4.5/§7), so every variant here is logged by
//! `send_messages` and then discarded. The type exists so the connection
//! loop can distinguish "try the next URL" from "give up" without
//! string-matching.

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum MessagingError {
    #[error("failed to connect to {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("all configured broker URLs were exhausted")]
    AllUrlsExhausted,

    #[error("failed to send to {address}: {reason}")]
    SendFailed { address: String, reason: String },

    #[error("no broker URLs configured")]
    NoUrlsConfigured,
}
