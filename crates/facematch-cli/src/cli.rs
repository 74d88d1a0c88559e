use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "facematch",
    about = "Register known faces and identify them in new images",
    version
)]
pub struct Cli {
    /// Emit structured JSON to stdout instead of human-readable output
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase verbosity (may be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Register the single face in an image under an identity id
    Register(RegisterArgs),
    /// Identify every face in an image against the registered identities
    Match(MatchArgs),
    /// List registered identities
    List(ListArgs),
    /// Remove a registered identity
    Remove(RemoveArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct StoreArgs {
    /// Signature store directory (overrides config and FACEMATCH_STORE_DIR)
    #[arg(long)]
    pub store_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct ImageArgs {
    /// Image file to read; `-` reads standard input
    pub image: PathBuf,

    /// Treat the image contents as base64 text
    #[arg(long)]
    pub base64: bool,
}

#[derive(Debug, Clone, Args)]
pub struct RegisterArgs {
    /// Identity id to register the face under
    pub identity: String,

    #[command(flatten)]
    pub image: ImageArgs,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Clone, Args)]
pub struct MatchArgs {
    #[command(flatten)]
    pub image: ImageArgs,

    /// Maximum distance (exclusive) for a face to count as a match
    #[arg(long)]
    pub tolerance: Option<f64>,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Clone, Default, Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Clone, Args)]
pub struct RemoveArgs {
    /// Identity id to remove
    pub identity: String,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    Human,
    Json,
}

impl From<bool> for OutputMode {
    fn from(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        OutputMode::from(self.json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn register_parses_positionals_and_flags() {
        let cli = Cli::try_parse_from([
            "facematch",
            "--json",
            "register",
            "alice",
            "alice.png",
            "--base64",
            "--store-dir",
            "/tmp/faces",
        ])
        .unwrap();
        assert_eq!(cli.output_mode(), OutputMode::Json);
        match cli.command {
            Commands::Register(args) => {
                assert_eq!(args.identity, "alice");
                assert_eq!(args.image.image, PathBuf::from("alice.png"));
                assert!(args.image.base64);
                assert_eq!(args.store.store_dir, Some(PathBuf::from("/tmp/faces")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn match_accepts_tolerance_override() {
        let cli =
            Cli::try_parse_from(["facematch", "match", "crowd.jpg", "--tolerance", "0.45", "-vv"])
                .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Match(args) => assert_eq!(args.tolerance, Some(0.45)),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
