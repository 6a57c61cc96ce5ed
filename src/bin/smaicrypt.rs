//! smaicrypt CLI - Password-based file encryption
//!
//! Command-line front end for encrypting files into `.smai` containers and
//! decrypting them again.

use clap::{Parser, Subcommand};
use std::error::Error as StdError;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use smaicrypt::error::{ErrorCategory, ErrorKind, Result, SmaiError};
use smaicrypt::file_ops::{self, Options, OverwritePolicy};
use smaicrypt::passphrase::{
    CachingPassphraseReader, NonEmptyPassphraseReader, PassphraseReader, ReaderPassphraseReader,
    TerminalPassphraseReader,
};

#[derive(Parser)]
#[command(name = "smaicrypt")]
#[command(version)]
#[command(about = "Password-based file encryption.", long_about = None)]
struct Cli {
    /// Read password from stdin instead of from terminal
    #[arg(long, global = true)]
    passphrase_stdin: bool,

    /// Refuse to replace an existing output file
    #[arg(long, global = true)]
    no_clobber: bool,

    /// Delete each input file after it was processed successfully
    #[arg(long, global = true)]
    remove_source: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt files, writing FILE.smai next to each FILE
    #[command(alias = "e")]
    Encrypt {
        /// Files whose contents are to be encrypted
        #[arg(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,
    },

    /// Decrypt FILE.smai containers, writing FILE next to each
    #[command(alias = "d")]
    Decrypt {
        /// Containers to decrypt; names must end in .smai
        #[arg(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,
    },
}

#[derive(Clone, Copy)]
enum Operation {
    Encrypt,
    Decrypt,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let options = Options {
        overwrite: if cli.no_clobber {
            OverwritePolicy::FailIfExists
        } else {
            OverwritePolicy::Overwrite
        },
    };
    let (operation, files) = match cli.command {
        Commands::Encrypt { files } => (Operation::Encrypt, files),
        Commands::Decrypt { files } => (Operation::Decrypt, files),
    };
    let mut reader = get_passphrase_reader(cli.passphrase_stdin, operation);

    let mut failed = false;
    for file in &files {
        match run(operation, file, &mut *reader, &options) {
            Ok(output) => {
                println!("{}", output.display());
                if cli.remove_source {
                    remove_source(file);
                }
            }
            Err(e) => {
                report(&e);
                failed = true;
                if e.kind == Some(ErrorKind::PassphraseUnavailable) {
                    break;
                }
            }
        }
    }

    if failed {
        process::exit(1);
    }
}

fn run(
    operation: Operation,
    file: &Path,
    reader: &mut dyn PassphraseReader,
    options: &Options,
) -> Result<PathBuf> {
    match operation {
        Operation::Encrypt => {
            let password = reader.read_passphrase()?;
            file_ops::encrypt_file_with_options(file, &password, options)
        }
        Operation::Decrypt => {
            // Reject non-containers before asking for a password.
            if file_ops::decrypted_path(file).is_none() {
                return Err(SmaiError::with_kind(
                    ErrorCategory::User,
                    ErrorKind::MalformedContainer,
                    format!(
                        "{} is not a .{} file",
                        file.display(),
                        file_ops::CONTAINER_EXTENSION
                    ),
                ));
            }
            let password = reader.read_passphrase()?;
            file_ops::decrypt_file_with_options(file, &password, options)
        }
    }
}

fn remove_source(file: &Path) {
    if let Err(e) = fs::remove_file(file) {
        warn!(path = %file.display(), "output written, but removing the source failed: {e}");
    }
}

/// Print the error with its full source chain, followed by the reason,
/// on a single line.
fn report(err: &SmaiError) {
    let mut msg = err.to_string();
    let mut source = StdError::source(err);
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    if let Some(reason) = err.reason() {
        msg.push_str(": ");
        msg.push_str(reason);
    }
    eprintln!("Error: {}", msg);
}

fn get_passphrase_reader(use_stdin: bool, operation: Operation) -> Box<dyn PassphraseReader> {
    let upstream: Box<dyn PassphraseReader> = if use_stdin {
        Box::new(ReaderPassphraseReader::new(Box::new(std::io::stdin())))
    } else {
        match operation {
            Operation::Encrypt => Box::new(TerminalPassphraseReader::with_confirmation()),
            Operation::Decrypt => Box::new(TerminalPassphraseReader::new()),
        }
    };
    Box::new(CachingPassphraseReader::new(Box::new(
        NonEmptyPassphraseReader::new(upstream),
    )))
}
