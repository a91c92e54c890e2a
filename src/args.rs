use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "otskit",
    version,
    about = "Create, upgrade and verify OpenTimestamps proofs"
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// YAML config file
    #[arg(long, global = true, env = "OTSKIT_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Timestamp one or more files
    Stamp {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Calendar URL; repeat for more than one
        #[arg(long = "calendar", value_name = "URL")]
        calendars: Vec<String>,

        /// How many calendar replies make a stamp
        #[arg(short = 'm', value_name = "N")]
        threshold: Option<usize>,

        /// Keep waiting for the threshold well past the usual deadline
        #[arg(long)]
        wait: bool,

        /// Hash applied to the file
        #[arg(long, default_value = "sha256", value_name = "ALGO")]
        hash: String,

        /// Per-request timeout in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// Fetch completed attestations for pending proofs
    Upgrade {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Check availability without rewriting the file
        #[arg(long)]
        dry_run: bool,

        /// Additional whitelisted calendar; repeatable
        #[arg(long = "whitelist", value_name = "URL")]
        whitelist: Vec<String>,

        /// Start from an empty whitelist
        #[arg(long)]
        no_default_whitelist: bool,

        /// Per-request timeout in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// Check a proof against its file and the blockchain
    Verify {
        /// The .ots proof file
        proof: PathBuf,

        /// The original file; defaults to the proof path without .ots
        #[arg(short = 'f', long, value_name = "FILE")]
        target: Option<PathBuf>,

        /// Verify a bare hex digest instead of a file
        #[arg(short = 'd', long, value_name = "HEX", conflicts_with = "target")]
        digest: Option<String>,

        /// Skip blockchain checks
        #[arg(long)]
        no_bitcoin: bool,

        /// Esplora-compatible block explorer
        #[arg(long, value_name = "URL", env = "OTSKIT_ESPLORA_URL")]
        esplora: Option<String>,

        /// Per-request timeout in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// Show the operation tree of a proof
    Info {
        /// The .ots proof file
        proof: PathBuf,

        /// Emit a JSON attestation summary instead of the tree
        #[arg(long)]
        json: bool,
    },

    /// Split an armored git commit into clean text and a detached proof
    GitExtract {
        /// File holding the commit or tag text
        commit: PathBuf,

        /// Where to write the proof (default: <commit>.ots)
        output: Option<PathBuf>,
    },
}
