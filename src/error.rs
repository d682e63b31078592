//! Error taxonomy for the snapshot codec.
//!
//! The codec layers never recover: the first inconsistency stops the
//! current operation and surfaces here. Underlying stream failures pass
//! through as [`Error::Io`], except that an unexpected end-of-file inside a
//! record is reported as a truncation format error.

use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(
        "unsupported snapshot version {found} (supported: {:?})",
        crate::snapshot::SUPPORTED_VERSIONS
    )]
    Version { found: u16 },

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Attaches a byte offset to a format error that does not carry one yet.
    pub(crate) fn with_offset(mut self, offset: u64) -> Error {
        if let Error::Format(e) = &mut self {
            e.offset.get_or_insert(offset);
        }
        self
    }

    /// Maps a failed stream read: end-of-file mid-element is a truncated
    /// record, everything else is an I/O error.
    pub(crate) fn from_read_io(e: io::Error) -> Error {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            FormatErrorKind::Truncated.into()
        } else {
            Error::Io(e)
        }
    }
}

impl From<FormatErrorKind> for Error {
    fn from(kind: FormatErrorKind) -> Error {
        Error::Format(kind.into())
    }
}

/// Malformed or inconsistent snapshot bytes, with the byte offset of the
/// offending element where the reader knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatError {
    pub kind: FormatErrorKind,
    pub offset: Option<u64>,
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            Some(offset) => write!(f, "{} (at byte {})", self.kind, offset),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for FormatError {}

impl From<FormatErrorKind> for FormatError {
    fn from(kind: FormatErrorKind) -> FormatError {
        FormatError { kind, offset: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatErrorKind {
    #[error("bad file magic {found:02x?}")]
    BadFileMagic { found: [u8; 5] },

    #[error("truncated record")]
    Truncated,

    #[error("non-canonical CompactSize")]
    NonCanonicalCompactSize,

    #[error("CompactSize {0:#x} exceeds the 32 MiB limit")]
    CompactSizeRange(u64),

    #[error("VarInt overflows 64 bits")]
    VarIntOverflow,

    #[error("script of {0} bytes exceeds the encodable range")]
    OversizedScript(u64),

    #[error("UTXO count mismatch: header declares {declared}, stream holds {found}")]
    UtxoCountMismatch { declared: u64, found: u64 },

    #[error("malformed public key encoding")]
    MalformedPubKey,

    #[error("public key is not a point on the secp256k1 curve")]
    PubKeyNotOnCurve,

    #[error("coin height {0} exceeds the representable range")]
    HeightOverflow(u64),
}

impl FormatErrorKind {
    pub(crate) fn at(self, offset: u64) -> FormatError {
        FormatError {
            kind: self,
            offset: Some(offset),
        }
    }
}

/// The file parsed but failed a semantic check. Count mismatches and
/// truncation are structural and live in [`FormatErrorKind`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid txid (null)")]
    InvalidTxid,

    #[error("invalid script")]
    InvalidScript,

    #[error("amount {0} exceeds the total coin supply")]
    InvalidAmount(u64),

    #[error("unknown network magic {0:02x?}")]
    UnknownMagic([u8; 4]),
}
