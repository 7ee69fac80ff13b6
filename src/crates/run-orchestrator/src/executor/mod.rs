//! Retry policy shared by the scheduler (§4.7) when resubmitting failed runs.

pub mod retry;

pub use retry::{classify_error, retry_with_backoff, ErrorClass, RetryConfig};
