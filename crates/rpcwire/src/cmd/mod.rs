use clap::{Args, Subcommand};
use std::path::PathBuf;

use rpcwire_frame::{DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_SCRATCH_CAPACITY};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a capture through the contiguous buffer and print its messages.
    Decode(DecodeArgs),
    /// Write framed messages.
    Encode(EncodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Decode(args) => decode::run(args, format),
        Command::Encode(args) => encode::run(args),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Capture file to replay, or `-` for stdin.
    pub input: PathBuf,
    /// Bytes handed to the buffer per receive.
    #[arg(long, default_value_t = DEFAULT_SCRATCH_CAPACITY, value_parser = parse_nonzero)]
    pub chunk_size: usize,
    /// Largest accepted message (envelope + payload).
    #[arg(long, default_value_t = DEFAULT_MAX_MESSAGE_SIZE)]
    pub max_message_size: usize,
    /// Name attributed to the sender of every message.
    #[arg(long, default_value = "capture")]
    pub peer: String,
    /// Reject receives shorter than a whole envelope prefix.
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Hex-encoded payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
    /// Routing metadata carried in the envelope.
    #[arg(long, default_value = "")]
    pub routing: String,
    /// Number of copies of the message to write.
    #[arg(long, default_value_t = 1)]
    pub repeat: usize,
    /// Write to a file instead of stdout.
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn parse_nonzero(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(err) => Err(err.to_string()),
    }
}
