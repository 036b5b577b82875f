//! CLI definitions for the `rickybot` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Chat server that answers through a local Ollama model with calculator tools.
#[derive(Parser)]
#[command(name = "rickybot", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true, env = "RICKYBOT_CONFIG", default_value = "rickybot.toml")]
    pub config: PathBuf,

    /// Suppress all log output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Also export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the chat server.
    Serve {
        /// Host to bind to (overrides `[server].host`).
        #[arg(long, env = "RICKYBOT_HOST")]
        host: Option<String>,

        /// Port to listen on (overrides `[server].port`).
        #[arg(short, long, env = "RICKYBOT_PORT")]
        port: Option<u16>,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_flags_parse() {
        let cli = Cli::try_parse_from([
            "rickybot", "-vv", "--config", "/tmp/r.toml", "serve", "--host", "0.0.0.0", "--port", "9000",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, PathBuf::from("/tmp/r.toml"));
        match cli.command {
            Commands::Serve { host, port } => {
                assert_eq!(host.as_deref(), Some("0.0.0.0"));
                assert_eq!(port, Some(9000));
            }
            Commands::Completions { .. } => panic!("expected serve"),
        }
    }

    #[test]
    fn rejects_invalid_port() {
        assert!(Cli::try_parse_from(["rickybot", "serve", "--port", "99999"]).is_err());
    }
}
