//! Snapshot data model and on-disk constants.
//!
//! A version-2 snapshot starts with a fixed 51-byte header:
//!
//! | offset | size | field |
//! |--------|------|-------|
//! | 0 | 5 | file magic `75 74 78 6f ff` |
//! | 5 | 2 | version, little-endian |
//! | 7 | 4 | network magic |
//! | 11 | 32 | block hash, byte-reversed |
//! | 43 | 8 | utxo count, little-endian |
//!
//! Transaction records follow from offset 51 until the declared number of
//! outputs has been produced.

use std::fmt;
use std::io::{self, Read, Write};

use bitcoin::hashes::Hash;
use bitcoin::{BlockHash, ScriptBuf, Txid};
use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use hex_literal::hex;

use crate::amount::{compress_amount, decompress_amount};
use crate::error::{Error, FormatErrorKind, Result};
use crate::script::CompressedScript;
use crate::varint::{read_compact_size, read_var_int, write_compact_size, write_var_int};

/// The five magic bytes opening every snapshot file: `utxo` plus `0xff`.
pub const UTXO_SET_MAGIC: [u8; 5] = hex!("7574786f ff");

/// Snapshot format versions this crate understands.
pub const SUPPORTED_VERSIONS: [u16; 1] = [2];

/// Fixed size of the file header.
pub const HEADER_SIZE: usize = 51;

/// Byte offset of the `utxo_count` field inside the header.
pub(crate) const UTXO_COUNT_OFFSET: u64 = 43;

/// Total satoshi supply cap, 21 million coins.
pub const MAX_MONEY: u64 = 21_000_000 * 100_000_000;

/// Largest serialized script accepted by consensus.
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Coin heights are serialized as `(height << 1) | coinbase`, so the top
/// bit of the 32-bit height is unavailable.
pub const MAX_COIN_HEIGHT: u32 = (1 << 31) - 1;

const MAINNET_MAGIC: [u8; 4] = hex!("f9beb4d9");
const SIGNET_MAGIC: [u8; 4] = hex!("0a03cf40");
const TESTNET3_MAGIC: [u8; 4] = hex!("0b110907");
const TESTNET4_MAGIC: [u8; 4] = hex!("1c163f28");
const REGTEST_MAGIC: [u8; 4] = hex!("fabfb5da");

/// The network a snapshot belongs to, derived from its 4-byte p2p magic.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet3,
    Testnet4,
    Signet,
    Regtest,
    /// A magic this crate does not know; the raw bytes are preserved in
    /// [`Header::network_magic`] so the file still round-trips.
    Unknown,
}

impl Network {
    pub fn from_magic(magic: [u8; 4]) -> Network {
        match magic {
            MAINNET_MAGIC => Network::Mainnet,
            TESTNET3_MAGIC => Network::Testnet3,
            TESTNET4_MAGIC => Network::Testnet4,
            SIGNET_MAGIC => Network::Signet,
            REGTEST_MAGIC => Network::Regtest,
            _ => Network::Unknown,
        }
    }

    pub fn magic(self) -> Option<[u8; 4]> {
        match self {
            Network::Mainnet => Some(MAINNET_MAGIC),
            Network::Testnet3 => Some(TESTNET3_MAGIC),
            Network::Testnet4 => Some(TESTNET4_MAGIC),
            Network::Signet => Some(SIGNET_MAGIC),
            Network::Regtest => Some(REGTEST_MAGIC),
            Network::Unknown => None,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Network::Mainnet => "mainnet",
            Network::Testnet3 => "testnet3",
            Network::Testnet4 => "testnet4",
            Network::Signet => "signet",
            Network::Regtest => "regtest",
            Network::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// The fixed file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u16,
    pub network: Network,
    /// Raw network magic as found on disk, preserved even when unknown.
    pub network_magic: [u8; 4],
    pub block_hash: BlockHash,
    pub utxo_count: u64,
}

impl Header {
    /// Builds a version-2 header for a known network.
    ///
    /// # Panics
    ///
    /// Panics for [`Network::Unknown`]; construct the struct directly with
    /// the raw magic in that case.
    pub fn new(network: Network, block_hash: BlockHash, utxo_count: u64) -> Header {
        let network_magic = network
            .magic()
            .expect("Header::new needs a known network magic");
        Header {
            version: SUPPORTED_VERSIONS[0],
            network,
            network_magic,
            block_hash,
            utxo_count,
        }
    }

    /// Parses the 51-byte header from the start of a stream.
    pub fn read<R: Read>(reader: &mut R) -> Result<Header> {
        let mut magic = [0u8; 5];
        reader.read_exact(&mut magic).map_err(Error::from_read_io)?;
        if magic != UTXO_SET_MAGIC {
            return Err(FormatErrorKind::BadFileMagic { found: magic }.at(0).into());
        }

        let version = reader.read_u16::<LE>().map_err(Error::from_read_io)?;
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(Error::Version { found: version });
        }

        let mut network_magic = [0u8; 4];
        reader
            .read_exact(&mut network_magic)
            .map_err(Error::from_read_io)?;
        let network = Network::from_magic(network_magic);

        let mut hash = [0u8; 32];
        reader.read_exact(&mut hash).map_err(Error::from_read_io)?;
        let block_hash = BlockHash::from_byte_array(hash);

        let utxo_count = reader.read_u64::<LE>().map_err(Error::from_read_io)?;

        Ok(Header {
            version,
            network,
            network_magic,
            block_hash,
            utxo_count,
        })
    }

    /// Emits the 51-byte header.
    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&UTXO_SET_MAGIC)?;
        writer.write_u16::<LE>(self.version)?;
        writer.write_all(&self.network_magic)?;
        writer.write_all(&self.block_hash.to_byte_array())?;
        writer.write_u64::<LE>(self.utxo_count)
    }
}

/// All unspent outputs of one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub txid: Txid,
    pub outputs: Vec<Output>,
}

/// A single unspent output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub vout: u64,
    /// Height of the block that created the output.
    pub height: u32,
    pub is_coinbase: bool,
    /// Value in satoshis.
    pub amount: u64,
    /// The full locking script, decompressed.
    pub script_pub_key: ScriptBuf,
}

impl Output {
    /// Reads one serialized output: CompactSize vout, VarInt height/coinbase
    /// code, VarInt compressed amount, compressed script.
    pub fn read<R: Read>(reader: &mut R) -> Result<Output> {
        let vout = read_compact_size(reader, true)?;

        let code = read_var_int(reader)?;
        let height = code >> 1;
        if height > u64::from(MAX_COIN_HEIGHT) {
            return Err(FormatErrorKind::HeightOverflow(height).into());
        }
        let is_coinbase = code & 1 == 1;

        let amount = decompress_amount(read_var_int(reader)?);
        let script_pub_key = CompressedScript::read(reader)?.decompress()?;

        Ok(Output {
            vout,
            height: height as u32,
            is_coinbase,
            amount,
            script_pub_key,
        })
    }

    /// Writes the serialized output, returning the bytes written.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<usize> {
        if self.height > MAX_COIN_HEIGHT {
            return Err(FormatErrorKind::HeightOverflow(u64::from(self.height)).into());
        }
        let mut written = write_compact_size(writer, self.vout)?;
        let code = (u64::from(self.height) << 1) | u64::from(self.is_coinbase);
        written += write_var_int(writer, code)?;
        written += write_var_int(writer, compress_amount(self.amount))?;
        written += CompressedScript::compress(&self.script_pub_key).write(writer)?;
        Ok(written)
    }
}

/// An output paired with the txid of the transaction that created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub txid: Txid,
    pub output: Output,
}

impl fmt::Display for Utxo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.output.vout)
    }
}
