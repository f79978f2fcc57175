//! Policies applied around each send, independent of the pool that runs them.

pub mod retry;

pub use retry::RetryPolicy;
