//! Command handlers for the CLI
//!
//! Each handler builds a [`CacheManager`] from the loaded configuration and
//! the global arguments, runs one cache operation and prints the outcome.

use std::time::{Duration, SystemTime};

use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::app::{name_for, CacheManager, ImportOptions};
use crate::cli::{FetchArgs, GlobalArgs, ImportArgs};
use crate::config::AppConfig;
use crate::errors::{AppError, Result};

/// Build a cache manager from the loaded configuration and global arguments
pub async fn build_manager(global: &GlobalArgs, app_config: &AppConfig) -> Result<CacheManager> {
    let (mut cache_config, client_config) = app_config.to_runtime_config()?;

    if let Some(cache_dir) = &global.cache_dir {
        cache_config.cache_root = Some(cache_dir.clone());
    }
    debug!("Cache configuration: {:?}", cache_config);

    CacheManager::with_http(cache_config, &client_config).await
}

/// Handle the fetch command
///
/// Locks the file for the duration of the command and prints every path the
/// resolution emits.
pub async fn handle_fetch(cache: &CacheManager, args: FetchArgs, quiet: bool) -> Result<()> {
    let strategy = args
        .strategy()?
        .unwrap_or(cache.config().default_strategy);
    let headers = args.header_map()?;

    info!("Resolving {} ({})", args.url, strategy);

    let guard = cache.lock(cache.name_for(&args.url));
    let stream =
        cache.observable_with_headers(&args.url, guard.consumer(), strategy, None, headers)?;

    let spinner = if quiet {
        ProgressBar::hidden()
    } else {
        create_spinner(&format!("Resolving {}", args.url))
    };

    let mut resolutions = stream.subscribe();
    let mut resolved = false;
    while let Some(resolution) = resolutions.next().await {
        match &resolution.path {
            Some(path) => {
                resolved = true;
                spinner.suspend(|| println!("{}", path.display()));
            }
            None => spinner.suspend(|| eprintln!("Could not fetch {}", args.url)),
        }
    }
    spinner.finish_and_clear();
    drop(guard);

    if resolved {
        Ok(())
    } else {
        Err(AppError::generic(format!("Failed to resolve {}", args.url)))
    }
}

/// Handle the import command
pub async fn handle_import(cache: &CacheManager, args: ImportArgs) -> Result<()> {
    let mut options = ImportOptions {
        move_file: args.move_file,
        ..Default::default()
    };
    if let Some(time) = args.modified_at {
        options = options.with_modified_at(SystemTime::from(time));
    }

    let result = cache.import_local_file(&args.path, &args.url, options).await?;
    match result.path {
        Some(path) => {
            println!("{} -> {}", result.url, path.display());
            Ok(())
        }
        None => Err(AppError::generic(format!(
            "Failed to import {}",
            args.path.display()
        ))),
    }
}

/// Handle the flush command
pub async fn handle_flush(cache: &CacheManager, file_name: Option<String>) -> Result<()> {
    let target = file_name.unwrap_or_default();
    if cache.flush(&target).await? {
        if target.is_empty() {
            println!("Flushed {}", cache.cache_root().display());
        } else {
            println!("Flushed {}", target);
        }
        Ok(())
    } else {
        Err(AppError::generic("Flush failed"))
    }
}

/// Handle the sweep command
pub async fn handle_sweep(cache: &CacheManager) -> Result<()> {
    if cache.config().max_cache_size == 0 {
        println!("No cache budget configured; nothing to evict");
        return Ok(());
    }

    let report = cache.sweep().await;
    println!("Evicted files: {}", report.evicted.len());
    println!(
        "Freed: {}",
        crate::app::cache::stats::format_bytes(report.bytes_freed)
    );
    if report.skipped_locked > 0 {
        println!("Locked files skipped: {}", report.skipped_locked);
    }
    Ok(())
}

/// Handle the info command
pub async fn handle_info(cache: &CacheManager, json: bool) -> Result<()> {
    let stats = cache.stats().await?;

    if json {
        let rendered = serde_json::to_string_pretty(&stats)
            .map_err(|e| AppError::generic(format!("Failed to render statistics: {}", e)))?;
        println!("{}", rendered);
        return Ok(());
    }

    println!("Cache Information");
    println!("=================");
    println!("Location: {}", stats.cache_root.display());
    println!("Cached files: {}", stats.cached_files_count);
    println!("Cache size: {}", stats.format_cache_size());
    println!("Budget: {}", stats.format_budget());
    if stats.max_cache_size > 0 {
        println!("Usage: {:.1}%", stats.usage_percentage());
    }

    Ok(())
}

/// Handle the name command
pub fn handle_name(url: &str) {
    println!("{}", name_for(url));
}

fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(style.tick_strings(&["◐", "◓", "◑", "◒"]));
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}
