//! Pollard's kangaroo (lambda) solver for the secp256k1 interval ECDLP.
//!
//! Finds the private key k with P = k*G when k is known to lie in
//! [range_start, range_end]. Tame walks start from the range base, wild
//! walks from the target key; distinguished points funnel into a central
//! table until the two herds meet.

mod cli;
pub mod config;
pub mod crypto;
pub mod dp_table;
pub mod math;
pub mod solver;
pub mod walk;
pub mod walker;

pub use config::{SearchConfig, SearchParams};
pub use crypto::{
    parse_hex_u256, parse_pubkey, pubkey_to_hex, scalar_to_hex, verify_key, Point,
};
pub use dp_table::{AddOutcome, DpTable};
pub use solver::{resolve_collision, KangarooSolver, SolvedKey};
pub use walk::{Herd, JumpTable, Kangaroo, KangarooType, SpawnParams, HERD_SIZE};
pub use walker::{BatchWalker, DpItem, LaunchReport, ITEM_SIZE, NB_RUN};

use std::path::PathBuf;

use anyhow::{ensure, Result};
use clap::Parser;
use serde::Serialize;
use tracing::info;

/// Pollard's kangaroo interval ECDLP solver for secp256k1
///
/// Reads a config file with the search range and the public keys to solve,
/// then runs parallel tame/wild walks until every key falls.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Search config file: range start (hex), range end (hex), then one
    /// public key per line
    config: PathBuf,

    /// Number of CPU worker threads (default: all cores)
    #[arg(short, long)]
    threads: Option<usize>,

    /// Distinguished point bits (negative: auto-calculated)
    #[arg(short, long, default_value_t = -1, allow_negative_numbers = true)]
    dp_bits: i32,

    /// Maximum group operations per key before giving up (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_ops: u64,

    /// Output file for solved keys (hex, one per line)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Quiet mode - no progress, just print found keys
    #[arg(short, long)]
    quiet: bool,

    /// Emit solved keys as JSON records to stdout
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct SolvedRecord<'a> {
    key_index: usize,
    pubkey: &'a str,
    private_key: &'a str,
    total_ops: u64,
    time_seconds: f64,
}

pub fn run_from_args<I, S>(args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: Into<std::ffi::OsString> + Clone,
{
    let args = Args::parse_from(args);
    run(args)
}

pub fn run(args: Args) -> Result<()> {
    if !args.quiet && !args.json {
        cli::init_tracing();
    }

    info!("Kangaroo interval ECDLP solver");
    let config = SearchConfig::from_file(&args.config)?;

    let threads = args.threads.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(usize::from)
            .unwrap_or(1)
    });

    let solver = KangarooSolver::new(config, args.dp_bits, args.max_ops, args.quiet || args.json);
    let total_keys = solver.num_targets();
    let solved = solver.run(threads, Vec::new())?;

    for key in &solved {
        let pub_hex = pubkey_to_hex(&key.target);
        let priv_hex = scalar_to_hex(&key.private_key);
        if args.json {
            let record = SolvedRecord {
                key_index: key.key_index,
                pubkey: &pub_hex,
                private_key: &priv_hex,
                total_ops: key.total_ops,
                time_seconds: key.time_seconds,
            };
            println!("{}", serde_json::to_string(&record)?);
        } else if args.quiet {
            println!("{priv_hex}");
        } else {
            println!("Key #{} Pub:  0x{}", key.key_index, pub_hex);
            println!("        Priv: 0x{}", priv_hex);
        }
    }

    if let Some(ref output) = args.output {
        let mut text = String::new();
        for key in &solved {
            text.push_str(&scalar_to_hex(&key.private_key));
            text.push('\n');
        }
        std::fs::write(output, text)?;
        if !args.quiet && !args.json {
            info!("Results written to: {}", output.display());
        }
    }

    ensure!(
        solved.len() == total_keys,
        "solved {} of {} keys",
        solved.len(),
        total_keys
    );
    Ok(())
}
