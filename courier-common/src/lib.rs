//! Pieces shared by every courier crate: the tracing re-export and the
//! span-scoped logging macros.

pub mod logging;

pub use tracing;
