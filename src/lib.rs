//! Read, write and validate Bitcoin Core UTXO set snapshots.
//!
//! Snapshots are the files produced by the `dumptxoutset` RPC (format
//! version 2): a 51-byte header followed by per-transaction records, each
//! holding one or more serialized unspent outputs. The serialization packs
//! outputs tightly with two variable-length integer encodings, a compressed
//! amount representation and a compressed `scriptPubKey` form, so a
//! mainnet snapshot of a few hundred million coins stays around ten
//! gigabytes.
//!
//! [`SnapshotReader`] streams transactions out of such a file;
//! [`SnapshotWriter`] produces one, patching the final output count into
//! the header on [`SnapshotWriter::finalize`].
//!
//! # Examples
//!
//! ```
//! use std::io::Cursor;
//! use bitcoin::hashes::Hash;
//! use txoutset::{Header, Network, Output, SnapshotReader, SnapshotWriter, Transaction};
//!
//! let mut writer = SnapshotWriter::new(Cursor::new(Vec::new()));
//! let block_hash = bitcoin::BlockHash::all_zeros();
//! writer.write_header(&Header::new(Network::Regtest, block_hash, 0)).unwrap();
//! writer.write_transaction(&Transaction {
//!     txid: bitcoin::Txid::all_zeros(),
//!     outputs: vec![Output {
//!         vout: 0,
//!         height: 120,
//!         is_coinbase: true,
//!         amount: 50_0000_0000,
//!         script_pub_key: bitcoin::ScriptBuf::new(),
//!     }],
//! }).unwrap();
//! writer.finalize().unwrap();
//!
//! let mut reader = SnapshotReader::new(Cursor::new(writer.into_inner().into_inner()));
//! let header = reader.read_header().unwrap();
//! assert_eq!(header.utxo_count, 1);
//! assert_eq!(reader.entries().map(Result::unwrap).count(), 1);
//! ```

pub mod amount;
pub mod ec;
pub mod error;
pub mod reader;
pub mod script;
pub mod snapshot;
pub mod varint;
pub mod writer;

pub use error::{Error, FormatError, FormatErrorKind, Result, ValidationError};
pub use reader::SnapshotReader;
pub use script::CompressedScript;
pub use snapshot::{Header, Network, Output, Transaction, Utxo};
pub use writer::SnapshotWriter;

use std::io::stderr;
use std::time::{Duration, Instant};

pub trait EncodeHex {
    fn hex(&self) -> String;
}

impl<A> EncodeHex for A
where
    A: AsRef<[u8]>,
{
    fn hex(&self) -> String {
        hex::encode(self)
    }
}

pub fn set_up_logging(level: log::LevelFilter) -> anyhow::Result<()> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(stderr())
        .apply()?;
    Ok(())
}

/// Rate-limits progress output to one line per second.
///
/// # Examples
///
/// ```
/// use txoutset::ProgressLogger;
///
/// let mut progress = ProgressLogger::new();
/// for n in 0..1000_u32 {
///     progress.log(|| eprintln!("{n} done"));
/// }
/// ```
pub struct ProgressLogger {
    last: Option<Instant>,
}

impl ProgressLogger {
    pub fn new() -> Self {
        Self { last: None }
    }

    pub fn log(&mut self, f: impl FnOnce()) {
        let due = match self.last {
            None => true,
            Some(last) => last.elapsed() >= Duration::from_secs(1),
        };
        if due {
            f();
            self.last = Some(Instant::now());
        }
    }
}

impl Default for ProgressLogger {
    fn default() -> Self {
        Self::new()
    }
}
