//! Utility modules for ambr-pipeline

pub mod retry;

pub use retry::{retry_transient, Attempted, RetryPolicy, Transient};
