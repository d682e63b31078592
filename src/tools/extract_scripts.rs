//! Split a UTXO snapshot into per-script-type binary dumps.
//!
//! Each output file starts with a 9-byte header: a 4-byte ASCII magic
//! naming the script type, a 4-byte little-endian entry count (patched in
//! when the file is closed) and a flags byte (bit 0 set when every record
//! carries an 8-byte little-endian satoshi amount prefix). Records are the
//! fixed-shape hash or key for the type: 20 bytes for `P2KH`/`P2SH`,
//! 32 bytes for `WPKH`/`PWSH`/`P2TR`, a length-prefixed key for `P2PK`,
//! and an `(m, n)` byte pair plus length-prefixed keys for `P2MS`.

use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bitcoin::script::Instruction;
use bitcoin::Script;
use byteorder::{WriteBytesExt, LE};
use txoutset::{set_up_logging, ProgressLogger, SnapshotReader};

const FLAG_AMOUNTS: u8 = 0x01;

#[derive(Parser)]
#[command(about = "Extract per-script-type binary dumps from a dumptxoutset snapshot")]
struct Args {
    /// Snapshot file produced by `dumptxoutset`
    snapshot: PathBuf,
    /// Directory the dump files are written into
    #[arg(long, default_value = "script-dumps")]
    output_dir: PathBuf,
    /// Prefix every record with its 8-byte satoshi amount
    #[arg(long)]
    with_amounts: bool,
}

/// One per-type dump file. The entry count lands at offset 4 on close.
struct DumpFile {
    writer: BufWriter<File>,
    with_amounts: bool,
    count: u32,
}

impl DumpFile {
    fn create(dir: &Path, magic: &[u8; 4], with_amounts: bool) -> anyhow::Result<DumpFile> {
        let name = String::from_utf8_lossy(magic).to_lowercase();
        let mut writer = BufWriter::new(File::create(dir.join(format!("{name}.bin")))?);
        writer.write_all(magic)?;
        writer.write_u32::<LE>(0)?;
        writer.write_u8(if with_amounts { FLAG_AMOUNTS } else { 0 })?;
        Ok(DumpFile {
            writer,
            with_amounts,
            count: 0,
        })
    }

    fn push(&mut self, amount: u64, record: &[u8]) -> anyhow::Result<()> {
        if self.with_amounts {
            self.writer.write_u64::<LE>(amount)?;
        }
        self.writer.write_all(record)?;
        self.count += 1;
        Ok(())
    }

    fn close(mut self) -> anyhow::Result<u32> {
        self.writer.seek(SeekFrom::Start(4))?;
        self.writer.write_u32::<LE>(self.count)?;
        self.writer.flush()?;
        Ok(self.count)
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    set_up_logging(log::LevelFilter::Info)?;

    std::fs::create_dir_all(&args.output_dir)?;
    let dir = args.output_dir.as_path();
    let mut p2pk = DumpFile::create(dir, b"P2PK", args.with_amounts)?;
    let mut p2kh = DumpFile::create(dir, b"P2KH", args.with_amounts)?;
    let mut p2ms = DumpFile::create(dir, b"P2MS", args.with_amounts)?;
    let mut p2sh = DumpFile::create(dir, b"P2SH", args.with_amounts)?;
    let mut wpkh = DumpFile::create(dir, b"WPKH", args.with_amounts)?;
    let mut pwsh = DumpFile::create(dir, b"PWSH", args.with_amounts)?;
    let mut p2tr = DumpFile::create(dir, b"P2TR", args.with_amounts)?;

    let mut reader = SnapshotReader::open(&args.snapshot)?;
    let header = reader.read_header()?;
    log::info!(
        "network={} block_hash={} utxo_count={}",
        header.network,
        header.block_hash,
        header.utxo_count
    );

    let mut seen = 0u64;
    let mut skipped = 0u64;
    let mut progress = ProgressLogger::new();
    for entry in reader.entries() {
        let utxo = entry?;
        let script = &utxo.output.script_pub_key;
        let amount = utxo.output.amount;
        let bytes = script.as_bytes();

        if script.is_p2pkh() {
            p2kh.push(amount, &bytes[3..23])?;
        } else if script.is_p2sh() {
            p2sh.push(amount, &bytes[2..22])?;
        } else if script.is_p2pk() {
            // key push: length byte, then the 33- or 65-byte key
            let key = &bytes[1..bytes.len() - 1];
            let mut record = Vec::with_capacity(1 + key.len());
            record.push(key.len() as u8);
            record.extend_from_slice(key);
            p2pk.push(amount, &record)?;
        } else if script.is_p2wpkh() {
            wpkh.push(amount, &bytes[2..22])?;
        } else if script.is_p2wsh() {
            pwsh.push(amount, &bytes[2..34])?;
        } else if script.is_p2tr() {
            p2tr.push(amount, &bytes[2..34])?;
        } else if let Some(record) = multisig_record(script) {
            p2ms.push(amount, &record)?;
        } else {
            skipped += 1;
        }

        seen += 1;
        progress.log(|| log::info!("{seen}/{} outputs processed", header.utxo_count));
    }

    for (name, file) in [
        ("P2PK", p2pk),
        ("P2KH", p2kh),
        ("P2MS", p2ms),
        ("P2SH", p2sh),
        ("WPKH", wpkh),
        ("PWSH", pwsh),
        ("P2TR", p2tr),
    ] {
        let count = file.close()?;
        log::info!("{name}: {count} entries");
    }
    log::info!("{seen} outputs processed, {skipped} without a dump file");
    Ok(())
}

/// Serializes a bare multisig script as `m`, `n`, then each key with a
/// length prefix. Returns `None` for anything that is not standard
/// multisig.
fn multisig_record(script: &Script) -> Option<Vec<u8>> {
    if !script.is_multisig() {
        return None;
    }
    let mut m = None;
    let mut keys: Vec<Vec<u8>> = Vec::new();
    for instruction in script.instructions() {
        match instruction.ok()? {
            Instruction::Op(op) => {
                let byte = op.to_u8();
                // OP_PUSHNUM_1 ..= OP_PUSHNUM_16
                if (0x51..=0x60).contains(&byte) {
                    let value = byte - 0x50;
                    if m.is_none() {
                        m = Some(value);
                    } else {
                        // n, followed only by OP_CHECKMULTISIG
                        let mut record = vec![m?, value];
                        for key in &keys {
                            record.push(key.len() as u8);
                            record.extend_from_slice(key);
                        }
                        return Some(record);
                    }
                }
            }
            Instruction::PushBytes(push) => keys.push(push.as_bytes().to_vec()),
        }
    }
    None
}
