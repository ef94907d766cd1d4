//! CLI argument parsing for services.

use std::path::PathBuf;

use clap::{CommandFactory, FromArgMatches, Parser};

/// Common CLI arguments for all services.
#[derive(Parser, Debug, Clone)]
#[command(about = "SIMPSS pipeline service")]
pub struct ServiceArgs {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long, env = "SIMPSS_CONFIG")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, env = "SIMPSS_LOG_LEVEL")]
    pub log_level: Option<String>,
}

/// Parse a service's command line, defaulting `--config` to `default_config`.
///
/// `A` is the binary's own parser, which flattens [`ServiceArgs`] next to
/// its deployment overrides.
pub fn parse_args<A: Parser>(default_config: &'static str) -> A {
    let matches = A::command()
        .mut_arg("config", |arg| arg.default_value(default_config))
        .get_matches();

    A::from_arg_matches(&matches).unwrap_or_else(|e| e.exit())
}
