// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `flowdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "flowdag",
    version,
    about = "Run flows of dependent jobs with retries, SLAs and checkpointing.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Flowdag.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Flowdag.toml")]
    pub config: String,

    /// Exit once every flow has finished instead of running until Ctrl-C.
    #[arg(long)]
    pub once: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `FLOWDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print flows, but don't execute any jobs.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let args = CliArgs::try_parse_from([
            "flowdag",
            "--config",
            "flows/Flowdag.toml",
            "--once",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.config, "flows/Flowdag.toml");
        assert!(args.once);
        assert!(!args.dry_run);
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    }

    #[test]
    fn defaults_config_path() {
        let args = CliArgs::try_parse_from(["flowdag"]).unwrap();
        assert_eq!(args.config, "Flowdag.toml");
        assert!(args.log_level.is_none());
    }
}
