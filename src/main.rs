//! Resource Cache CLI application
//!
//! Command-line front end for fetching, importing and pruning cached
//! resources.

use std::process;

use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

use resource_cache::cli::{
    build_manager, handle_fetch, handle_flush, handle_import, handle_info, handle_name,
    handle_sweep, Cli, Commands,
};
use resource_cache::config::AppConfig;
use resource_cache::constants::logging::LOG_TARGET;
use resource_cache::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();
    let app_config = AppConfig::load(cli.global.config.as_deref()).await?;
    init_logging(&cli, &app_config);

    info!("Resource Cache v{} starting", env!("CARGO_PKG_VERSION"));

    // Name derivation needs no cache directory
    if let Commands::Name { url } = &cli.command {
        handle_name(url);
        return Ok(());
    }

    let cache = build_manager(&cli.global, &app_config).await?;
    debug!("Using cache at {}", cache.cache_root().display());

    match cli.command {
        Commands::Fetch(args) => handle_fetch(&cache, args, cli.global.quiet).await,
        Commands::Import(args) => handle_import(&cache, args).await,
        Commands::Flush { file_name } => handle_flush(&cache, file_name).await,
        Commands::Sweep => handle_sweep(&cache).await,
        Commands::Info { json } => handle_info(&cache, json).await,
        Commands::Name { .. } => Ok(()),
    }
}

/// Initialize logging based on CLI verbosity settings
///
/// `RUST_LOG` takes precedence over the verbosity flags, which take
/// precedence over the configured level.
fn init_logging(cli: &Cli, config: &AppConfig) {
    let level = if cli.global.quiet || cli.global.verbose || cli.global.very_verbose {
        cli.log_level().to_string()
    } else {
        config.logging.level.clone()
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{}={}", LOG_TARGET, level)));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.global.very_verbose)
        .with_writer(std::io::stderr)
        .init();

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
}
