//! Command-line interface.
//!
//! A root command carries the persistent `--config`/`--debug` flags; `serve`
//! is the only subcommand. Flags bind into the settings store so that
//! configuration precedence stays in one place.

pub mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "backend", version, about = "Minimal backend service template")]
pub struct Cli {
    /// use this configuration file
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// enable debug messages
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start HTTPS server
    Serve(serve::ServeArgs),
}

/// Parse arguments and run the selected command.
pub async fn execute() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(ref args) => serve::run(&cli, args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_serve_with_flags() {
        let cli = Cli::parse_from([
            "backend",
            "--config",
            "/tmp/config.toml",
            "--debug",
            "serve",
            "--env",
            "prod",
            "--log-level",
            "warn",
        ]);
        assert_eq!(cli.config.as_deref().unwrap().to_str(), Some("/tmp/config.toml"));
        assert!(cli.debug);
        let Command::Serve(args) = cli.command;
        assert_eq!(args.env.as_deref(), Some("prod"));
        assert_eq!(args.log_level.as_deref(), Some("warn"));
    }

    #[test]
    fn serve_flags_are_optional() {
        let cli = Cli::parse_from(["backend", "serve"]);
        let Command::Serve(args) = cli.command;
        assert!(args.env.is_none());
        assert!(args.log_level.is_none());
    }
}
