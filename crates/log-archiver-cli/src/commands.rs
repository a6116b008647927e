use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "log-archiver")]
#[command(about = "Compress aged log files into per-period archives", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to config.{toml,json,yaml} in the working directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Archive eligible logs, then apply retention if enabled
    Run,
    /// Show the groups and container names a run would produce, without writing anything
    Plan,
    /// Apply the retention policy to the destination folder only
    Prune,
    /// Print the effective configuration as TOML
    PrintConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_config_flag_after_subcommand() {
        let cli = Cli::parse_from(["log-archiver", "run", "--config", "/etc/archiver.toml"]);
        assert!(matches!(cli.command, Some(Commands::Run)));
        assert_eq!(cli.config, Some(PathBuf::from("/etc/archiver.toml")));
    }

    #[test]
    fn test_no_subcommand() {
        let cli = Cli::parse_from(["log-archiver"]);
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }
}
