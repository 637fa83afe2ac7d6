//! Command-line interface components
//!
//! Argument parsing and the handlers behind each subcommand.

pub mod args;
pub mod commands;

pub use args::{Cli, Commands, FetchArgs, GlobalArgs, ImportArgs};
pub use commands::{
    build_manager, handle_fetch, handle_flush, handle_import, handle_info, handle_name,
    handle_sweep,
};
