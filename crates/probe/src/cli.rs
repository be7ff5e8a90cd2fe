use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use eyre::Report as EyreReport;
use serde::{Serialize, Serializer};
use thiserror::Error as ThisError;

use crate::output::{ErrorLine, Format, Output, Report};

mod discover;
mod test_folder;
mod watch;

use discover::DiscoverCommand;
use test_folder::TestFolderCommand;
use watch::WatchCommand;

pub const EXAMPLES: &str = r"
  # Show what a resource advertises
  $ conformance-probe discover https://localhost:8443/foo/bar.txt

  # Subscribe to everything and print what arrives within 30 seconds
  $ COOKIE=... conformance-probe watch /foo/bar.txt --wait 30

  # Print a fresh container URL for a test run
  $ STORAGE_ROOT=https://localhost:8443/alice conformance-probe test-folder
";

#[derive(Debug, Parser)]
#[command(author, version, about = "Probe the notification surface of a storage server")]
#[command(after_help = format!(
    "Environment variables:\n  \
       STORAGE_ROOT, SERVER_ROOT   Storage under test\n  \
       COOKIE                      Session cookie\n  \
       SKIP_*, WEBHOOK_*           See the flags of each subcommand\n\n\
     Examples:{EXAMPLES}"
))]
pub struct RootCommand {
    #[command(flatten)]
    pub args: RootArgs,

    #[command(subcommand)]
    pub action: SubCommands,
}

#[derive(Debug, Subcommand)]
pub enum SubCommands {
    Discover(DiscoverCommand),
    Watch(WatchCommand),
    TestFolder(TestFolderCommand),
}

#[derive(Debug, Parser)]
pub struct RootArgs {
    #[arg(long, value_name = "FORMAT", default_value_t, value_enum, global = true)]
    pub output_format: Format,

    /// Raise log verbosity (repeat for more)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug)]
pub struct Environment {
    pub output: Output,
}

impl RootCommand {
    pub async fn run(self) -> Result<(), CliError> {
        let environment = Environment {
            output: Output::new(self.args.output_format),
        };

        let result = match self.action {
            SubCommands::Discover(discover) => discover.run(&environment).await,
            SubCommands::Watch(watch) => watch.run(&environment).await,
            SubCommands::TestFolder(test_folder) => test_folder.run(&environment),
        };

        if let Err(err) = result {
            let err = CliError::Other(err);
            environment.output.write(&err);
            return Err(err);
        }

        Ok(())
    }
}

#[derive(Debug, Serialize, ThisError)]
pub enum CliError {
    #[error(transparent)]
    Other(
        #[from]
        #[serde(serialize_with = "serialize_eyre_report")]
        EyreReport,
    ),
}

impl From<CliError> for ExitCode {
    fn from(error: CliError) -> Self {
        match error {
            CliError::Other(_) => Self::FAILURE,
        }
    }
}

impl Report for CliError {
    fn report(&self) {
        match self {
            Self::Other(err) => ErrorLine(&format!("{err:?}")).report(),
        }
    }
}

fn serialize_eyre_report<S>(report: &EyreReport, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_seq(report.chain().map(ToString::to_string))
}
