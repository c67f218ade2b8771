//! Tracing subscriber setup

use s3vault_core::config::LogFormat;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Pick the filter directive: `-q` wins, then `-v`/`-vv`, then `LOG_LEVEL`
pub fn filter_directive(level: &str, verbose: u8, quiet: bool) -> String {
    if quiet {
        return "error".to_string();
    }
    match verbose {
        0 => match level.trim() {
            "" => "info".to_string(),
            level => level.to_ascii_lowercase(),
        },
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Initialize the global subscriber; `RUST_LOG` overrides everything
pub fn init_tracing(level: &str, format: LogFormat, verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(level, verbose, quiet)));

    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().flatten_event(true).with_current_span(false))
            .try_init(),
        LogFormat::Text => registry.with(fmt::layer().with_target(false)).try_init(),
    };
    if let Err(e) = result {
        eprintln!("tracing already initialized: {e}");
    }
}
