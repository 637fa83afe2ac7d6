//! Application constants for the resource cache
//!
//! This module centralizes all constants used throughout the crate,
//! organized by functional domain.

use std::time::Duration;

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = concat!("resource-cache/", env!("CARGO_PKG_VERSION"));

    /// Default HTTP request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum idle connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 8;

    /// Maximum number of redirects to follow
    pub const MAX_REDIRECTS: usize = 10;

    /// Format of an HTTP-date (RFC 7231, IMF-fixdate)
    pub const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";
}

/// Rate limiting and retry configuration
pub mod limits {
    /// Default rate limit for outgoing requests (requests per second)
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 50;

    /// Default retry attempts for 429/503 responses
    pub const DEFAULT_MAX_RETRIES: u32 = 0;

    /// Base delay for exponential backoff (milliseconds)
    pub const RETRY_BASE_DELAY_MS: u64 = 500;
}

/// File operation constants
pub mod files {
    /// Temporary file suffix for atomic operations
    pub const TEMP_FILE_SUFFIX: &str = ".tmp";

    /// Extension used when a URL path has none
    pub const FALLBACK_EXTENSION: &str = "bin";
}

/// Cache defaults
pub mod cache {
    /// Application directory under the OS cache directory
    pub const APP_DIR_NAME: &str = "resource-cache";

    /// Default namespace directory under the application directory
    pub const DEFAULT_NAMESPACE: &str = "resources";

    /// Default cache budget in bytes (0 = unlimited)
    pub const DEFAULT_MAX_CACHE_SIZE: u64 = 0;
}

/// Logging constants
pub mod logging {
    /// Default log level
    pub const DEFAULT_LOG_LEVEL: &str = "warn";

    /// Log target used by the env filter
    pub const LOG_TARGET: &str = "resource_cache";
}

// Re-export commonly used constants for convenience
pub use files::{FALLBACK_EXTENSION, TEMP_FILE_SUFFIX};
pub use http::{DEFAULT_TIMEOUT as HTTP_TIMEOUT, USER_AGENT};
