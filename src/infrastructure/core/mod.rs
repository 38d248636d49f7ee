pub mod retry;

pub use retry::{RetryError, RetryPolicy, retry_with_backoff};
