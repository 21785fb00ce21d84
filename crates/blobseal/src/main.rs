//! blobseal CLI
//!
//! Entry point for the encrypt, decrypt and keygen commands. The process exit
//! code of a stage command is `1` on success and `-1` on failure; a command
//! line that does not parse is a failure too.

mod cli;
mod commands;
mod output;

use blobseal_stages::EXIT_FAILURE;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands, LogFormat};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialize rustls crypto provider (required for rustls 0.23+)
    // This must be done before any TLS operations
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = cli::parse_error_code(&err);
            let _ = err.print();
            if code == EXIT_FAILURE {
                output::status(output::FAILED);
            }
            std::process::exit(code);
        }
    };
    init_tracing(cli.verbose, cli.quiet, cli.log_format);

    let config = cli.config.as_deref();
    let code = match cli.command {
        Commands::Encrypt(args) => commands::encrypt::run(args, config).await,
        Commands::Decrypt(args) => commands::decrypt::run(args, config).await,
        Commands::Keygen(args) => commands::keygen::run(args),
    };

    std::process::exit(code);
}

/// Initialize tracing on stderr; stdout carries checkpoint events
fn init_tracing(verbose: u8, quiet: bool, format: LogFormat) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}
