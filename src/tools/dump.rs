//! Dump a UTXO snapshot to text or CSV.

use clap::{Parser, ValueEnum};
use std::io::stdout;
use std::path::PathBuf;

use txoutset::{set_up_logging, EncodeHex, ProgressLogger, SnapshotReader};

#[derive(Parser)]
#[command(about = "Dump the entries of a dumptxoutset snapshot")]
struct Args {
    /// Snapshot file produced by `dumptxoutset`
    snapshot: PathBuf,
    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: Format,
    /// Stop after this many outputs
    #[arg(long)]
    limit: Option<u64>,
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, ValueEnum)]
enum Format {
    Text,
    Csv,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    set_up_logging(if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    })?;

    let mut reader = SnapshotReader::open(&args.snapshot)?;
    let header = reader.read_header()?;
    log::info!(
        "network={} block_hash={} utxo_count={}",
        header.network,
        header.block_hash,
        header.utxo_count
    );

    let limit = args.limit.unwrap_or(u64::MAX);
    match args.format {
        Format::Text => dump_text(&mut reader, limit)?,
        Format::Csv => dump_csv(&mut reader, limit)?,
    }
    Ok(())
}

fn dump_text<R: std::io::Read>(reader: &mut SnapshotReader<R>, limit: u64) -> anyhow::Result<()> {
    let mut progress = ProgressLogger::new();
    let mut dumped = 0u64;
    for entry in reader.entries().take(limit as usize) {
        let utxo = entry?;
        println!(
            "{} height={} coinbase={} amount={} script={}",
            utxo,
            utxo.output.height,
            utxo.output.is_coinbase,
            utxo.output.amount,
            utxo.output.script_pub_key.as_bytes().hex(),
        );
        dumped += 1;
        progress.log(|| log::debug!("{dumped} outputs dumped"));
    }
    log::info!("{dumped} outputs dumped");
    Ok(())
}

fn dump_csv<R: std::io::Read>(reader: &mut SnapshotReader<R>, limit: u64) -> anyhow::Result<()> {
    let mut csv = csv::Writer::from_writer(stdout().lock());
    csv.write_record(["txid", "vout", "height", "coinbase", "amount", "script_pub_key"])?;

    let mut progress = ProgressLogger::new();
    let mut dumped = 0u64;
    for entry in reader.entries().take(limit as usize) {
        let utxo = entry?;
        csv.write_record(&[
            utxo.txid.to_string(),
            utxo.output.vout.to_string(),
            utxo.output.height.to_string(),
            utxo.output.is_coinbase.to_string(),
            utxo.output.amount.to_string(),
            utxo.output.script_pub_key.as_bytes().hex(),
        ])?;
        dumped += 1;
        progress.log(|| log::debug!("{dumped} outputs dumped"));
    }
    csv.flush()?;
    log::info!("{dumped} outputs dumped");
    Ok(())
}
