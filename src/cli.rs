use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "contents-grapple",
    version,
    about = "Find which package ships a file, across Debian-style archives"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Configuration file (defaults to config.toml in the data directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Refresh every configured source once
    Refresh(RefreshArgs),
    /// Refresh sources periodically until interrupted
    Watch,
    /// Find the packages providing paths that match a glob
    Find(FindArgs),
    /// List archives that completed at least one refresh
    Archives(ListArgs),
    /// List configured pools and their members
    Pools(ListArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Refresh --

#[derive(Debug, Parser)]
pub struct RefreshArgs {
    /// Refresh only these source URIs instead of the configured ones
    #[arg(long = "source", value_name = "URI")]
    pub sources: Vec<String>,
}

// -- Find --

#[derive(Debug, Parser)]
pub struct FindArgs {
    /// Pool name or archive identity (e.g. mirror/ubuntu/dists/xenial)
    pub target: String,

    /// Shell glob matched against whole file paths
    pub pattern: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct ListArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "contents-grapple",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parse_find() {
        let cli = Cli::parse_from([
            "contents-grapple",
            "find",
            "neon",
            "usr/bin/*",
            "--json",
        ]);
        match cli.command {
            Command::Find(args) => {
                assert_eq!(args.target, "neon");
                assert_eq!(args.pattern, "usr/bin/*");
                assert!(args.json);
            }
            _ => panic!("expected find command"),
        }
    }

    #[test]
    fn parse_refresh_sources_and_globals() {
        let cli = Cli::parse_from([
            "contents-grapple",
            "refresh",
            "--source",
            "http://a/dists/x/Contents-amd64.gz",
            "--source",
            "http://b/dists/x/Contents-amd64.gz",
            "-vv",
            "--data-dir",
            "/tmp/grapple",
        ]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/grapple")));
        match cli.command {
            Command::Refresh(args) => assert_eq!(args.sources.len(), 2),
            _ => panic!("expected refresh command"),
        }
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        let result =
            Cli::try_parse_from(["contents-grapple", "-q", "-v", "watch"]);
        assert!(result.is_err());
    }

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
