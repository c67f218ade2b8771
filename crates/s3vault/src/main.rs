//! s3vault - S3 gateway with Vault transit encryption
//!
//! This is the main entry point for the s3vault command-line interface.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use s3vault::logging::init_tracing;
use s3vault_core::config::LogFormat;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize rustls crypto provider (required for rustls 0.23+)
    // This must be done before any TLS operations
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cli = Cli::parse();

    let command = match cli.command {
        Some(command) => command,
        None => Commands::Serve(cli::default_serve_args()?),
    };

    match command {
        Commands::Serve(args) => {
            init_tracing(&args.log_level, args.log_format, cli.verbose, cli.quiet);
            commands::serve::run(args).await
        }
        Commands::Version(args) => commands::version::run(args),
        Commands::ResolveKey(args) => {
            init_tracing("warn", LogFormat::Text, cli.verbose, cli.quiet);
            commands::resolve_key::run(args)
        }
    }
}
