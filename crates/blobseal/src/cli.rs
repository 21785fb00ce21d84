//! CLI argument parsing with clap

use blobseal_stages::EXIT_FAILURE;
use camino::Utf8PathBuf;
use clap::error::ErrorKind;
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};

/// blobseal - encrypt files into object storage and decrypt them back
#[derive(Parser, Debug)]
#[command(name = "blobseal")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase diagnostic verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only report errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a runtime settings file (falls back to BLOBSEAL_CONFIG)
    #[arg(short, long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Format of diagnostic output on stderr
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Encrypt a local file into the encrypted bucket
    Encrypt(EncryptArgs),

    /// Decrypt an object named by a storage event into the decrypted bucket
    Decrypt(DecryptArgs),

    /// Generate fresh key material
    Keygen(KeygenArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Args, Debug)]
pub struct EncryptArgs {
    /// File to encrypt
    pub file: Utf8PathBuf,

    /// Job name recorded in the object's metadata
    pub job_name: String,
}

#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("source")
        .required(true)
        .args(["bucket", "event"])
))]
pub struct DecryptArgs {
    /// Bucket of the encrypted object
    #[arg(long, requires = "name")]
    pub bucket: Option<String>,

    /// Name of the encrypted object
    #[arg(long, requires = "bucket")]
    pub name: Option<String>,

    /// Storage event JSON file, or `-` for stdin
    #[arg(long, conflicts_with_all = ["bucket", "name"])]
    pub event: Option<String>,
}

#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Write the key to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<Utf8PathBuf>,

    /// Overwrite an existing key file
    #[arg(short, long)]
    pub force: bool,
}

/// Exit code for a command line that did not parse
///
/// Help and version requests are not failures.
pub fn parse_error_code(err: &clap::Error) -> i32 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => EXIT_FAILURE,
    }
}
