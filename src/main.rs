//! Unified shade CLI.
//!
//! One binary fronts every role:
//! - `shade client` - SOCKS5 front end and static tunnels
//! - `shade server` - remote terminator
//! - `shade jumper` - cascading hop
//! - `shade reverse` - far-side claimant
//! - `shade keygen` - random key generation
//!
//! Each role can also be driven through its own crate's CLI module.

use std::process::ExitCode;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use clap::{Args, Parser, Subcommand};
use rand::RngCore;
use rand::rngs::OsRng;
use shade_crypto::Method;

/// Unified shade CLI.
#[derive(Parser)]
#[command(
    name = "shade",
    version,
    about = "Shadowsocks-compatible encrypted TCP tunnel",
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the local agent (SOCKS5 front end and static tunnels).
    Client(Box<shade_client::ClientArgs>),

    /// Run the remote terminator.
    #[command(alias = "serve")]
    Server(Box<shade_server::ServerArgs>),

    /// Run a cascading hop toward another node.
    Jumper(Box<shade_server::JumperArgs>),

    /// Run the reverse claimant next to the targets.
    Reverse(Box<shade_server::ReverseArgs>),

    /// Generate a random key for a cipher and print it base64url.
    Keygen(KeygenArgs),
}

#[derive(Args)]
struct KeygenArgs {
    /// Cipher method the key is for.
    #[arg(long, default_value = shade_core::defaults::DEFAULT_CIPHER)]
    cipher: String,
}

fn keygen(args: &KeygenArgs) -> Result<(), Box<dyn std::error::Error>> {
    let method: Method = args.cipher.parse()?;
    let mut key = vec![0u8; method.key_len()];
    OsRng.fill_bytes(&mut key);
    println!("{}", URL_SAFE.encode(&key));
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Client(args) => shade_client::cli::run(*args).await,
        Commands::Server(args) => shade_server::cli::run_server(*args).await,
        Commands::Jumper(args) => shade_server::cli::run_jumper(*args).await,
        Commands::Reverse(args) => shade_server::cli::run_reverse(*args).await,
        Commands::Keygen(args) => keygen(&args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
