use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};

use ultraqr::{PcrSelection, RunConfig};

#[derive(Parser, Debug)]
#[command(name = "ultraqr")]
#[command(about = "TPM-backed measured-boot attestation over QR codes", version)]
pub struct Cli {
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// TPM character device
    #[arg(long, global = true, default_value = "/dev/tpmrm0")]
    pub device: PathBuf,

    /// Path prefix for the persisted key blobs (<prefix>.priv, <prefix>.pub)
    #[arg(long, global = true, default_value = "/etc/ultraqr/key")]
    pub key_prefix: PathBuf,

    /// Comma-separated PCR indices the key is sealed to
    #[arg(long, global = true, default_value = "0,2,4,8,9")]
    pub pcrs: PcrSelection,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a fresh signing key sealed to the current PCR state
    Init,

    /// Print the public key (hex DER) as a QR code for verifier enrollment
    Enroll {
        /// Also write the QR code as a PNG image
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Sign a challenge (or the current timestamp) and print the payload QR
    Verify {
        /// Verifier-supplied nonce to sign; omitted means sign a timestamp
        #[arg(long)]
        challenge: Option<String>,

        /// Also write the QR code as a PNG image
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    // Usage errors exit 1, same as operational failures; only help and
    // version keep their success status.
    let cli = Cli::try_parse().unwrap_or_else(|err| {
        let _ = err.print();
        match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => std::process::exit(0),
            _ => std::process::exit(1),
        }
    });

    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let mut config = RunConfig {
        device_path: cli.device,
        key_prefix: cli.key_prefix,
        pcrs: cli.pcrs,
        challenge: None,
        qr_image: None,
    };

    match cli.command {
        Commands::Init => {
            ultraqr::initialize(&config).context("failed to create sealed signing key")?;
            println!("key created under {}", config.key_prefix.display());
        }

        Commands::Enroll { output } => {
            config.qr_image = output;
            let text = ultraqr::enroll(&config).context("failed to export public key")?;
            io::stdout().write_all(text.as_bytes())?;
        }

        Commands::Verify { challenge, output } => {
            config.challenge = challenge;
            config.qr_image = output;
            let text =
                ultraqr::verify(&config).context("failed to produce attestation payload")?;
            io::stdout().write_all(text.as_bytes())?;
        }
    }

    Ok(())
}
