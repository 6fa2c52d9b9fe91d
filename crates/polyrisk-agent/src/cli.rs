//! Argument handling for the `polyrisk` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use polyrisk_common::config::{CONFIG_ENV_VAR, DEFAULT_CONFIG_PATH};

#[derive(Debug, Parser)]
#[command(name = "polyrisk", version, arg_required_else_help = true)]
#[command(about = "Reference statistics operator tool", long_about = None)]
pub struct Cli {
    /// Configuration file
    #[arg(long, global = true, env = CONFIG_ENV_VAR, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Command {
    /// Verify the store and every configured table
    Check,
    /// Create the reference stats cache table if missing
    InitCache,
    /// Compute and cache reference stats for the configured ancestry
    Warm {
        /// PGS model ID; defaults to `pipeline.model_id`
        #[arg(long)]
        model: Option<String>,
        #[arg(required = true)]
        traits: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> Result<Command, clap::Error> {
        Cli::try_parse_from(std::iter::once("polyrisk").chain(args.iter().copied())).map(|cli| cli.command)
    }

    #[test]
    fn test_subcommands() {
        assert_eq!(parse(&["check"]).unwrap(), Command::Check);
        assert_eq!(parse(&["init-cache"]).unwrap(), Command::InitCache);
    }

    #[test]
    fn test_no_args_prints_help() {
        let err = parse(&[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand);
    }

    #[test]
    fn test_warm_collects_traits_and_model() {
        let cmd = parse(&["warm", "height", "--model", "PGS000002", "ldl"]).unwrap();
        assert_eq!(
            cmd,
            Command::Warm {
                model: Some("PGS000002".into()),
                traits: vec!["height".into(), "ldl".into()],
            }
        );
    }

    #[test]
    fn test_warm_requires_a_trait() {
        assert_eq!(parse(&["warm"]).unwrap_err().kind(), ErrorKind::MissingRequiredArgument);
        assert!(parse(&["warm", "height", "--model"]).is_err());
    }

    #[test]
    fn test_config_path_flag() {
        let cli = Cli::try_parse_from(["polyrisk", "check", "--config", "/etc/polyrisk.toml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/polyrisk.toml"));
        assert_eq!(cli.command, Command::Check);
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(parse(&["serve"]).unwrap_err().kind(), ErrorKind::InvalidSubcommand);
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
