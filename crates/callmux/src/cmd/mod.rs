use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod call;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Issue one tool call over a channel and print the matched result.
    Call(CallArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Call(args) => call::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Tool name to invoke.
    pub name: String,
    /// Call arguments as a JSON object.
    #[arg(long, default_value = "{}")]
    pub args: String,
    /// Unix socket path carrying the channel.
    #[arg(long, conflicts_with = "exec")]
    pub socket: Option<PathBuf>,
    /// Spawn a subprocess and use its stdio as the channel.
    /// Everything after the command is passed to it as arguments.
    #[arg(long, num_args = 1.., value_name = "CMD", conflicts_with = "socket", allow_hyphen_values = true)]
    pub exec: Option<Vec<String>>,
    /// Per-call timeout (e.g. 60s, 500ms).
    #[arg(long, default_value = "60s")]
    pub timeout: String,
    /// Bootstrap call issued before the tool call, as NAME or NAME:JSON.
    #[arg(long, value_name = "NAME[:JSON]")]
    pub bootstrap: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
