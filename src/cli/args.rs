//! Command-line argument parsing
//!
//! This module defines the CLI structure using clap derive macros.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::app::Strategy;
use crate::errors::{AppError, DownloadError, Result};

/// Resource Cache - fetch remote files into a local content-addressed cache
#[derive(Parser, Debug)]
#[command(
    name = "resource_cache",
    version,
    about = "Fetch remote resources into a local content-addressed cache",
    long_about = "Fetch remote resources into a local cache keyed by the SHA-1 of their URL.
Cached files can be trusted forever (immutable) or revalidated against the origin (mutable),
and the cache is kept under a size budget by evicting the oldest files first."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Cache directory path
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve a URL through the cache and print the local path
    Fetch(FetchArgs),

    /// Place a local file into the cache under a URL
    Import(ImportArgs),

    /// Delete one cache entry, or the whole cache
    Flush {
        /// Cache file name; everything is deleted when omitted
        #[arg(value_name = "FILE_NAME")]
        file_name: Option<String>,
    },

    /// Evict the oldest files until the cache is under budget
    Sweep,

    /// Show cache statistics and information
    Info {
        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the cache file name for a URL
    Name {
        /// Resource URL
        url: String,
    },
}

/// Arguments for the fetch command
#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// Resource URL
    pub url: String,

    /// Cache strategy: immutable or mutable (config default if omitted)
    #[arg(short, long)]
    pub strategy: Option<String>,

    /// Extra request header, as `name:value`
    #[arg(short = 'H', long = "header", value_name = "NAME:VALUE")]
    pub headers: Vec<String>,
}

impl FetchArgs {
    /// Parse the strategy, if one was given
    pub fn strategy(&self) -> Result<Option<Strategy>> {
        self.strategy
            .as_deref()
            .map(|s| s.parse::<Strategy>().map_err(AppError::from))
            .transpose()
    }

    /// Parse the `name:value` header arguments
    pub fn header_map(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for raw in &self.headers {
            let (name, value) = raw.split_once(':').ok_or_else(|| DownloadError::InvalidHeader {
                name: raw.clone(),
                reason: "expected NAME:VALUE".to_string(),
            })?;

            let name = HeaderName::from_bytes(name.trim().as_bytes()).map_err(|e| {
                DownloadError::InvalidHeader {
                    name: name.to_string(),
                    reason: e.to_string(),
                }
            })?;
            let value = HeaderValue::from_str(value.trim()).map_err(|e| {
                DownloadError::InvalidHeader {
                    name: name.to_string(),
                    reason: e.to_string(),
                }
            })?;
            headers.append(name, value);
        }
        Ok(headers)
    }
}

/// Arguments for the import command
#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    /// Local file to import
    pub path: PathBuf,

    /// URL the file stands in for
    pub url: String,

    /// Move the file instead of copying it
    #[arg(long = "move")]
    pub move_file: bool,

    /// Modification time to stamp on the cached file (RFC 3339)
    #[arg(long, value_name = "TIME", value_parser = parse_rfc3339)]
    pub modified_at: Option<DateTime<Utc>>,
}

fn parse_rfc3339(value: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 time '{}': {}", value, e))
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the logging level based on global arguments
    pub fn log_level(&self) -> tracing::Level {
        if self.global.quiet {
            tracing::Level::ERROR
        } else if self.global.very_verbose {
            tracing::Level::DEBUG
        } else if self.global.verbose {
            tracing::Level::INFO
        } else {
            tracing::Level::WARN
        }
    }
}
