//! Aggregate statistics over a UTXO snapshot: per-script-type counts and
//! totals, coinbase share, height range.

use clap::Parser;
use std::path::PathBuf;

use bitcoin::{Amount, Script};
use txoutset::{set_up_logging, ProgressLogger, SnapshotReader};

#[derive(Parser)]
#[command(about = "Collect per-script-type statistics from a dumptxoutset snapshot")]
struct Args {
    /// Snapshot file produced by `dumptxoutset`
    snapshot: PathBuf,
}

#[derive(Default)]
struct Bucket {
    count: u64,
    total_sat: u64,
}

impl Bucket {
    fn add(&mut self, amount: u64) {
        self.count += 1;
        self.total_sat += amount;
    }
}

#[derive(Default)]
struct Stats {
    p2pk: Bucket,
    p2pkh: Bucket,
    p2sh: Bucket,
    multisig: Bucket,
    p2wpkh: Bucket,
    p2wsh: Bucket,
    p2tr: Bucket,
    op_return: Bucket,
    nonstandard: Bucket,
    coinbase_count: u64,
    min_height: u32,
    max_height: u32,
}

impl Stats {
    fn bucket_for(&mut self, script: &Script) -> &mut Bucket {
        if script.is_p2pkh() {
            &mut self.p2pkh
        } else if script.is_p2sh() {
            &mut self.p2sh
        } else if script.is_p2pk() {
            &mut self.p2pk
        } else if script.is_p2wpkh() {
            &mut self.p2wpkh
        } else if script.is_p2wsh() {
            &mut self.p2wsh
        } else if script.is_p2tr() {
            &mut self.p2tr
        } else if script.is_multisig() {
            &mut self.multisig
        } else if script.is_op_return() {
            &mut self.op_return
        } else {
            &mut self.nonstandard
        }
    }
}

fn main() -> anyhow::Result<()> {
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

    let mut stats = Stats {
        min_height: u32::MAX,
        ..Default::default()
    };
    let mut seen = 0u64;
    let mut progress = ProgressLogger::new();
    for entry in reader.entries() {
        let utxo = entry?;
        let output = &utxo.output;
        stats.bucket_for(&output.script_pub_key).add(output.amount);
        if output.is_coinbase {
            stats.coinbase_count += 1;
        }
        stats.min_height = stats.min_height.min(output.height);
        stats.max_height = stats.max_height.max(output.height);
        seen += 1;
        progress.log(|| {
            log::info!(
                "{seen}/{} outputs scanned ({:.1}%)",
                header.utxo_count,
                seen as f64 / header.utxo_count as f64 * 100.0
            )
        });
    }

    println!("{:<14} {:>14} {:>22}", "type", "outputs", "total");
    for (name, bucket) in [
        ("p2pk", &stats.p2pk),
        ("p2pkh", &stats.p2pkh),
        ("p2sh", &stats.p2sh),
        ("multisig", &stats.multisig),
        ("p2wpkh", &stats.p2wpkh),
        ("p2wsh", &stats.p2wsh),
        ("p2tr", &stats.p2tr),
        ("op_return", &stats.op_return),
        ("nonstandard", &stats.nonstandard),
    ] {
        println!(
            "{:<14} {:>14} {:>22}",
            name,
            bucket.count,
            Amount::from_sat(bucket.total_sat).to_string()
        );
    }
    println!();
    println!("outputs:  {seen}");
    println!("coinbase: {}", stats.coinbase_count);
    if seen > 0 {
        println!("heights:  {}..={}", stats.min_height, stats.max_height);
    }
    Ok(())
}
