//! Resource Cache Library
//!
//! A local file cache for remote resources. Each URL is stored once under a
//! content-addressed name, concurrent requests for the same resource share a
//! single download, cached files can be revalidated against the origin, and
//! the cache is kept under a size budget by evicting the oldest unlocked
//! files.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};
