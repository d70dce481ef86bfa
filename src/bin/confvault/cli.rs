use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Admin CLI for ConfVault snapshot directories.
///
/// The key comes from CV_KEY_HEX / CV_KEY_BASE64 (and CV_KID).
/// Without --dir, CV_SNAPSHOTS_DIR (or ./snapshots) is used.
#[derive(Parser, Debug)]
#[command(name = "confvault", version, about = "ConfVault snapshot admin")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// List snapshot ids (ascending)
    List {
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Show the configurations of one snapshot (passwords masked). Latest if --id is omitted.
    Show {
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(long)]
        id: Option<u64>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Delete the oldest snapshots, keeping at most --keep (snapshot 0 always stays)
    Gc {
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(long)]
        keep: usize,
    },
    /// Encrypt plaintext snapshots left by an older installation
    Migrate {
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Write the XML of a snapshot (file-level encryption removed, passwords stay encrypted)
    Export {
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(long)]
        id: u64,
        /// Output file (stdout if omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Generate a random 32-byte key (hex, or base64 with --base64)
    Keygen {
        #[arg(long, default_value_t = false)]
        base64: bool,
    },
    /// Print the OCD defaults of a metatype XML file
    Defaults {
        #[arg(long)]
        metatype: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
