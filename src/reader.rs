//! Streaming snapshot reader.
//!
//! [`SnapshotReader`] pulls one transaction record at a time from an
//! underlying byte stream, keeping a running output count that must land
//! exactly on the header's declared total. Nothing is buffered beyond the
//! record currently being parsed, so multi-gigabyte snapshots stream in
//! constant memory.

use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use bitcoin::hashes::Hash;
use bitcoin::Txid;

use crate::error::{Error, FormatErrorKind, Result, ValidationError};
use crate::snapshot::{Header, Network, Output, Transaction, Utxo, MAX_MONEY, MAX_SCRIPT_SIZE};
use crate::varint::read_compact_size;

/// A reader adapter that tracks the absolute stream position, so parse
/// errors can report the byte offset of the offending element.
pub struct PositionReader<R> {
    inner: R,
    position: u64,
}

impl<R> PositionReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for PositionReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl<R: Seek> Seek for PositionReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.position = self.inner.seek(pos)?;
        Ok(self.position)
    }
}

/// Streaming reader over a version-2 UTXO snapshot.
pub struct SnapshotReader<R: Read> {
    reader: PositionReader<R>,
    header: Option<Header>,
    outputs_read: u64,
}

impl SnapshotReader<BufReader<File>> {
    /// Opens a snapshot file with a buffered reader.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: Read> SnapshotReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: PositionReader::new(reader),
            header: None,
            outputs_read: 0,
        }
    }

    /// Parses and caches the file header; later calls return the cached
    /// copy. A failed parse caches nothing, so the call can be retried
    /// after [`SnapshotReader::reset`].
    pub fn read_header(&mut self) -> Result<Header> {
        if let Some(header) = &self.header {
            return Ok(header.clone());
        }
        let header = Header::read(&mut self.reader)?;
        self.header = Some(header.clone());
        Ok(header)
    }

    /// Parses the next transaction record, or `None` once the declared
    /// output count has been reached. Reads the header first if the caller
    /// has not.
    pub fn read_next_transaction(&mut self) -> Result<Option<Transaction>> {
        let header = self.read_header()?;
        if self.outputs_read >= header.utxo_count {
            return Ok(None);
        }

        let record_start = self.reader.position();
        let mut txid_bytes = [0u8; 32];
        if let Err(e) = self.reader.read_exact(&mut txid_bytes) {
            if e.kind() == ErrorKind::UnexpectedEof {
                // A clean end at a record boundary means the stream came up
                // short of the declared total; anything else is truncation.
                let kind = if self.reader.position() == record_start {
                    FormatErrorKind::UtxoCountMismatch {
                        declared: header.utxo_count,
                        found: self.outputs_read,
                    }
                } else {
                    FormatErrorKind::Truncated
                };
                return Err(kind.at(record_start).into());
            }
            return Err(Error::Io(e));
        }
        let txid = Txid::from_byte_array(txid_bytes);

        let count =
            read_compact_size(&mut self.reader, true).map_err(|e| e.with_offset(record_start))?;
        let mut outputs = Vec::with_capacity(count.min(16_384) as usize);
        for _ in 0..count {
            let output_start = self.reader.position();
            let output =
                Output::read(&mut self.reader).map_err(|e| e.with_offset(output_start))?;
            outputs.push(output);
        }

        self.outputs_read += count;
        if self.outputs_read > header.utxo_count {
            return Err(FormatErrorKind::UtxoCountMismatch {
                declared: header.utxo_count,
                found: self.outputs_read,
            }
            .at(record_start)
            .into());
        }

        Ok(Some(Transaction { txid, outputs }))
    }

    /// Lazy iterator over the remaining transaction records.
    pub fn transactions(&mut self) -> Transactions<'_, R> {
        Transactions { reader: self }
    }

    /// Lazy iterator over individual outputs, each paired with its txid.
    pub fn entries(&mut self) -> Entries<'_, R> {
        Entries {
            reader: self,
            pending: Vec::new().into_iter(),
        }
    }

    /// Drives the whole file and checks semantic invariants on every
    /// record: no null txid, amounts within the coin supply, scripts within
    /// the consensus size limit, and a known network magic.
    pub fn validate(&mut self) -> Result<()> {
        let header = self.read_header()?;
        if header.network == Network::Unknown {
            return Err(ValidationError::UnknownMagic(header.network_magic).into());
        }
        while let Some(tx) = self.read_next_transaction()? {
            if tx.txid == Txid::all_zeros() {
                return Err(ValidationError::InvalidTxid.into());
            }
            for output in &tx.outputs {
                if output.amount > MAX_MONEY {
                    return Err(ValidationError::InvalidAmount(output.amount).into());
                }
                if output.script_pub_key.len() > MAX_SCRIPT_SIZE {
                    return Err(ValidationError::InvalidScript.into());
                }
            }
        }
        Ok(())
    }

    /// Outputs produced so far.
    pub fn outputs_read(&self) -> u64 {
        self.outputs_read
    }

    /// Current byte position in the stream.
    pub fn position(&self) -> u64 {
        self.reader.position()
    }

    /// Releases the underlying stream.
    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }
}

impl<R: Read + Seek> SnapshotReader<R> {
    /// Rewinds to the start of the stream and forgets the cached header, so
    /// the file can be read again from scratch.
    pub fn reset(&mut self) -> Result<()> {
        self.reader.seek(SeekFrom::Start(0))?;
        self.header = None;
        self.outputs_read = 0;
        Ok(())
    }
}

/// Iterator returned by [`SnapshotReader::transactions`].
pub struct Transactions<'a, R: Read> {
    reader: &'a mut SnapshotReader<R>,
}

impl<R: Read> Iterator for Transactions<'_, R> {
    type Item = Result<Transaction>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.read_next_transaction().transpose()
    }
}

/// Iterator returned by [`SnapshotReader::entries`].
pub struct Entries<'a, R: Read> {
    reader: &'a mut SnapshotReader<R>,
    pending: std::vec::IntoIter<Utxo>,
}

impl<R: Read> Iterator for Entries<'_, R> {
    type Item = Result<Utxo>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(utxo) = self.pending.next() {
                return Some(Ok(utxo));
            }
            match self.reader.read_next_transaction() {
                Ok(None) => return None,
                Ok(Some(tx)) => {
                    let txid = tx.txid;
                    self.pending = tx
                        .outputs
                        .into_iter()
                        .map(|output| Utxo { txid, output })
                        .collect::<Vec<_>>()
                        .into_iter();
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
