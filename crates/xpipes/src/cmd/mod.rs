use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use xpipes_transport::RetryPolicy;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod create;
pub mod listen;
pub mod remove;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a named pipe and exit.
    Create(CreateArgs),
    /// Remove a named pipe.
    Remove(RemoveArgs),
    /// Send framed messages to a pipe.
    Send(SendArgs),
    /// Read and print framed messages from a pipe.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Create(args) => create::run(args, format),
        Command::Remove(args) => remove::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Pipe name (a path on Unix, a bare or `\\.\pipe\` name on Windows).
    pub name: PathBuf,
    /// Permission bits for the FIFO, in octal (Unix only).
    #[arg(long, default_value = "600", value_parser = create::parse_mode)]
    pub mode: u32,
}

#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Pipe name.
    pub name: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct RetryArgs {
    /// Open attempts before giving up.
    #[arg(long, default_value = "3", env = "XPIPES_RETRIES")]
    pub retries: u32,
    /// Delay between open attempts (e.g. 2s, 500ms).
    #[arg(long, default_value = "500ms", env = "XPIPES_RETRY_DELAY")]
    pub retry_delay: String,
}

impl RetryArgs {
    pub fn policy(&self) -> CliResult<RetryPolicy> {
        let delay: Duration = send::parse_duration(&self.retry_delay)?;
        Ok(RetryPolicy::fixed(self.retries, delay))
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Pipe name.
    pub name: PathBuf,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Send the payload N times.
    #[arg(long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..))]
    pub repeat: u32,
    #[command(flatten)]
    pub retry: RetryArgs,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Pipe name.
    pub name: PathBuf,
    /// Create the pipe first and remove it on exit.
    #[arg(long)]
    pub create: bool,
    /// Permission bits when creating, in octal (Unix only).
    #[arg(long, default_value = "600", value_parser = create::parse_mode)]
    pub mode: u32,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
    #[command(flatten)]
    pub retry: RetryArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
