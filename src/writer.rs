//! Streaming snapshot writer.
//!
//! [`SnapshotWriter`] mirrors the reader: a header first, then transaction
//! records one at a time. On a seekable sink the final output count does
//! not need to be known up front; [`SnapshotWriter::finalize`] patches the
//! running total into the header's count field. A non-seekable sink works
//! too, but then the header must already carry the final count.

use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use bitcoin::hashes::Hash;
use byteorder::{WriteBytesExt, LE};

use crate::error::Result;
use crate::snapshot::{Header, Transaction, Utxo, HEADER_SIZE, UTXO_COUNT_OFFSET};
use crate::varint::write_compact_size;

/// Streaming writer producing a version-2 UTXO snapshot.
pub struct SnapshotWriter<W: Write> {
    writer: W,
    bytes_written: u64,
    entries_written: u64,
    header_written: bool,
}

impl SnapshotWriter<BufWriter<File>> {
    /// Creates a new snapshot file, refusing to overwrite an existing one.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(BufWriter::new(File::create_new(path)?)))
    }

    /// Creates a snapshot file, truncating any existing file at the path.
    pub fn create_overwrite(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> SnapshotWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            bytes_written: 0,
            entries_written: 0,
            header_written: false,
        }
    }

    /// Writes the file header. Must be called exactly once, before any
    /// transaction. On a non-seekable sink the header's `utxo_count` must
    /// already be the final total; seekable sinks can fix it up later via
    /// [`SnapshotWriter::finalize`].
    ///
    /// # Panics
    ///
    /// Panics when called a second time.
    pub fn write_header(&mut self, header: &Header) -> Result<()> {
        assert!(!self.header_written, "snapshot header already written");
        header.write(&mut self.writer)?;
        self.bytes_written += HEADER_SIZE as u64;
        self.header_written = true;
        Ok(())
    }

    /// Writes one transaction record. Transactions without outputs are
    /// silently dropped, matching what the dumping node would emit.
    ///
    /// # Panics
    ///
    /// Panics when the header has not been written yet.
    pub fn write_transaction(&mut self, tx: &Transaction) -> Result<()> {
        assert!(
            self.header_written,
            "write_header must precede write_transaction"
        );
        if tx.outputs.is_empty() {
            return Ok(());
        }

        let mut written = 32u64;
        self.writer.write_all(&tx.txid.to_byte_array())?;
        written += write_compact_size(&mut self.writer, tx.outputs.len() as u64)? as u64;
        for output in &tx.outputs {
            written += output.write(&mut self.writer)? as u64;
        }

        self.bytes_written += written;
        self.entries_written += tx.outputs.len() as u64;
        Ok(())
    }

    /// Writes a single output as a one-output transaction record.
    pub fn write_entry(&mut self, utxo: &Utxo) -> Result<()> {
        self.write_transaction(&Transaction {
            txid: utxo.txid,
            outputs: vec![utxo.output.clone()],
        })
    }

    /// Outputs emitted so far.
    pub fn entries_written(&self) -> u64 {
        self.entries_written
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Flushes and releases the underlying stream without patching the
    /// header.
    pub fn into_inner(mut self) -> W {
        let _ = self.writer.flush();
        self.writer
    }
}

impl<W: Write + Seek> SnapshotWriter<W> {
    /// Seeks back to the header and rewrites the 8-byte `utxo_count`
    /// field, then restores the stream position.
    ///
    /// # Panics
    ///
    /// Panics when the header has not been written yet.
    pub fn update_utxo_count(&mut self, utxo_count: u64) -> Result<()> {
        assert!(
            self.header_written,
            "write_header must precede update_utxo_count"
        );
        let end = self.writer.stream_position()?;
        // Every byte since construction went through this writer, so the
        // header starts exactly `bytes_written` back from here.
        let header_start = end - self.bytes_written;
        self.writer
            .seek(SeekFrom::Start(header_start + UTXO_COUNT_OFFSET))?;
        self.writer.write_u64::<LE>(utxo_count)?;
        self.writer.seek(SeekFrom::Start(end))?;
        Ok(())
    }

    /// Patches the running output count into the header (when one was
    /// written) and flushes the sink.
    pub fn finalize(&mut self) -> Result<()> {
        if self.header_written {
            self.update_utxo_count(self.entries_written)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use bitcoin::{BlockHash, ScriptBuf, Txid};
    use hex_literal::hex;

    use super::*;
    use crate::reader::SnapshotReader;
    use crate::snapshot::{Network, Output};

    fn sample_tx(txid_byte: u8, vouts: &[u64]) -> Transaction {
        Transaction {
            txid: Txid::from_byte_array([txid_byte; 32]),
            outputs: vouts
                .iter()
                .map(|&vout| Output {
                    vout,
                    height: 2016,
                    is_coinbase: false,
                    amount: 1_0000_0000,
                    script_pub_key: ScriptBuf::from_bytes(vec![0x51]),
                })
                .collect(),
        }
    }

    #[test]
    fn scenario_minimal_regtest_header() {
        let mut writer = SnapshotWriter::new(Cursor::new(Vec::new()));
        writer
            .write_header(&Header::new(Network::Regtest, BlockHash::all_zeros(), 0))
            .unwrap();
        let bytes = writer.into_inner().into_inner();

        assert_eq!(bytes.len(), 51);
        assert_eq!(bytes[0..5], hex!("7574786f ff"));
        assert_eq!(bytes[5..7], hex!("0200"));
        assert_eq!(bytes[7..11], hex!("fabfb5da"));
        assert_eq!(bytes[11..43], [0u8; 32]);
        assert_eq!(bytes[43..51], [0u8; 8]);

        let mut reader = SnapshotReader::new(Cursor::new(bytes));
        let header = reader.read_header().unwrap();
        assert_eq!(header, Header::new(Network::Regtest, BlockHash::all_zeros(), 0));
        assert!(reader.transactions().next().is_none());
    }

    #[test]
    fn finalize_patches_utxo_count() {
        let mut writer = SnapshotWriter::new(Cursor::new(Vec::new()));
        // count unknown up front, left at zero
        writer
            .write_header(&Header::new(Network::Regtest, BlockHash::all_zeros(), 0))
            .unwrap();
        writer.write_transaction(&sample_tx(1, &[0, 1])).unwrap();
        writer.write_transaction(&sample_tx(2, &[5])).unwrap();
        writer.finalize().unwrap();
        assert_eq!(writer.entries_written(), 3);

        let bytes = writer.into_inner().into_inner();
        let mut reader = SnapshotReader::new(Cursor::new(bytes));
        assert_eq!(reader.read_header().unwrap().utxo_count, 3);
        assert!(reader.validate().is_ok());
    }

    #[test]
    fn update_count_restores_position() {
        let mut writer = SnapshotWriter::new(Cursor::new(Vec::new()));
        writer
            .write_header(&Header::new(Network::Signet, BlockHash::all_zeros(), 0))
            .unwrap();
        writer.write_transaction(&sample_tx(1, &[0])).unwrap();
        writer.update_utxo_count(1).unwrap();
        // the next record must land after the first one, not on the header
        writer.write_transaction(&sample_tx(2, &[0])).unwrap();
        writer.update_utxo_count(2).unwrap();

        let bytes = writer.into_inner().into_inner();
        let mut reader = SnapshotReader::new(Cursor::new(bytes));
        assert!(reader.validate().is_ok());
        assert_eq!(reader.outputs_read(), 2);
    }

    #[test]
    fn patching_works_mid_stream() {
        // a snapshot appended after unrelated leading bytes
        let mut sink = Cursor::new(Vec::new());
        sink.write_all(b"leading junk").unwrap();
        let junk_len = sink.position();

        let mut writer = SnapshotWriter::new(sink);
        writer
            .write_header(&Header::new(Network::Regtest, BlockHash::all_zeros(), 0))
            .unwrap();
        writer.write_transaction(&sample_tx(3, &[0])).unwrap();
        writer.finalize().unwrap();

        let bytes = writer.into_inner().into_inner();
        let mut reader =
            SnapshotReader::new(Cursor::new(bytes[junk_len as usize..].to_vec()));
        assert_eq!(reader.read_header().unwrap().utxo_count, 1);
        assert!(reader.validate().is_ok());
    }

    #[test]
    fn empty_transactions_are_dropped() {
        let mut writer = SnapshotWriter::new(Cursor::new(Vec::new()));
        writer
            .write_header(&Header::new(Network::Regtest, BlockHash::all_zeros(), 0))
            .unwrap();
        writer
            .write_transaction(&Transaction {
                txid: Txid::from_byte_array([7; 32]),
                outputs: vec![],
            })
            .unwrap();
        writer.finalize().unwrap();

        assert_eq!(writer.entries_written(), 0);
        let bytes = writer.into_inner().into_inner();
        assert_eq!(bytes.len(), HEADER_SIZE);
    }

    #[test]
    fn write_entry_emits_singleton_record() {
        let mut writer = SnapshotWriter::new(Cursor::new(Vec::new()));
        writer
            .write_header(&Header::new(Network::Regtest, BlockHash::all_zeros(), 0))
            .unwrap();
        let tx = sample_tx(4, &[9]);
        writer
            .write_entry(&Utxo {
                txid: tx.txid,
                output: tx.outputs[0].clone(),
            })
            .unwrap();
        writer.finalize().unwrap();

        let bytes = writer.into_inner().into_inner();
        let mut reader = SnapshotReader::new(Cursor::new(bytes));
        let read: Vec<_> = reader.transactions().map(Result::unwrap).collect();
        assert_eq!(read, vec![tx]);
    }

    #[test]
    fn written_compact_sizes_are_canonical() {
        // 300 outputs forces the three-byte CompactSize form
        let vouts: Vec<u64> = (0..300).collect();
        let mut writer = SnapshotWriter::new(Cursor::new(Vec::new()));
        writer
            .write_header(&Header::new(Network::Regtest, BlockHash::all_zeros(), 0))
            .unwrap();
        writer.write_transaction(&sample_tx(1, &vouts)).unwrap();
        writer.finalize().unwrap();

        let bytes = writer.into_inner().into_inner();
        // tag byte right after the 32-byte txid
        assert_eq!(bytes[HEADER_SIZE + 32], 0xfd);
        assert_eq!(bytes[HEADER_SIZE + 33..HEADER_SIZE + 35], hex!("2c01"));

        let mut reader = SnapshotReader::new(Cursor::new(bytes));
        assert!(reader.validate().is_ok());
        assert_eq!(reader.outputs_read(), 300);
    }

    #[test]
    #[should_panic(expected = "write_header must precede")]
    fn transaction_before_header_panics() {
        let mut writer = SnapshotWriter::new(Cursor::new(Vec::new()));
        let _ = writer.write_transaction(&sample_tx(1, &[0]));
    }

    #[test]
    #[should_panic(expected = "header already written")]
    fn double_header_panics() {
        let mut writer = SnapshotWriter::new(Cursor::new(Vec::new()));
        let header = Header::new(Network::Regtest, BlockHash::all_zeros(), 0);
        writer.write_header(&header).unwrap();
        let _ = writer.write_header(&header);
    }
}
