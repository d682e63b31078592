//! Validate a UTXO snapshot end to end.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use txoutset::{set_up_logging, SnapshotReader};

#[derive(Parser)]
#[command(about = "Check a dumptxoutset snapshot for format and consistency errors")]
struct Args {
    /// Snapshot file produced by `dumptxoutset`
    snapshot: PathBuf,
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    set_up_logging(log::LevelFilter::Info)?;

    let mut reader = SnapshotReader::open(&args.snapshot)?;
    let header = reader.read_header()?;
    log::info!(
        "network={} block_hash={} utxo_count={}",
        header.network,
        header.block_hash,
        header.utxo_count
    );

    match reader.validate() {
        Ok(()) => {
            log::info!(
                "OK: {} outputs, {} bytes",
                reader.outputs_read(),
                reader.position()
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            log::error!("invalid snapshot: {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}
