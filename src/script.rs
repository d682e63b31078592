//! Compressed `scriptPubKey` codec.
//!
//! The snapshot format stores each locking script as a VarInt tag plus a
//! payload. Tags 0 through 5 cover the historically dominant shapes and
//! shrink them to their hash or x-coordinate; any other script is stored
//! verbatim under the tag `length + 6`.
//!
//! | tag | payload | script |
//! |-----|---------|--------|
//! | 0 | 20-byte hash | P2PKH |
//! | 1 | 20-byte hash | P2SH |
//! | 2, 3 | 32-byte x | P2PK, compressed key |
//! | 4, 5 | 32-byte x | P2PK, uncompressed key (y recovered) |
//! | ≥ 6 | `tag - 6` bytes | raw script |

use std::io::{Read, Write};

use bitcoin::opcodes::all::{
    OP_CHECKSIG, OP_DUP, OP_EQUAL, OP_EQUALVERIFY, OP_HASH160, OP_PUSHBYTES_20, OP_PUSHBYTES_33,
    OP_PUSHBYTES_65,
};
use bitcoin::{Script, ScriptBuf};

use crate::ec;
use crate::error::{Error, FormatErrorKind, Result};
use crate::varint::{read_var_int, var_int_len, write_var_int, MAX_COMPACT_SIZE};

/// Tag values below this mark one of the recognized script shapes.
pub const SPECIAL_SCRIPT_KINDS: u64 = 6;

const OP_DUP_B: u8 = OP_DUP.to_u8();
const OP_HASH160_B: u8 = OP_HASH160.to_u8();
const OP_EQUALVERIFY_B: u8 = OP_EQUALVERIFY.to_u8();
const OP_EQUAL_B: u8 = OP_EQUAL.to_u8();
const OP_CHECKSIG_B: u8 = OP_CHECKSIG.to_u8();
const PUSH_20: u8 = OP_PUSHBYTES_20.to_u8();
const PUSH_33: u8 = OP_PUSHBYTES_33.to_u8();
const PUSH_65: u8 = OP_PUSHBYTES_65.to_u8();

/// A script in its compressed on-disk form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressedScript {
    /// `OP_DUP OP_HASH160 <hash> OP_EQUALVERIFY OP_CHECKSIG`
    P2pkh([u8; 20]),
    /// `OP_HASH160 <hash> OP_EQUAL`
    P2sh([u8; 20]),
    /// `<33-byte key, even y> OP_CHECKSIG`
    P2pkEven([u8; 32]),
    /// `<33-byte key, odd y> OP_CHECKSIG`
    P2pkOdd([u8; 32]),
    /// `<65-byte key> OP_CHECKSIG`, y recovered as the even root
    P2pkUncompressedEven([u8; 32]),
    /// `<65-byte key> OP_CHECKSIG`, y recovered as the odd root
    P2pkUncompressedOdd([u8; 32]),
    /// Anything else, stored verbatim.
    Raw(Vec<u8>),
}

impl CompressedScript {
    /// Compresses a full script. Exact structural matches of the four
    /// recognized shapes win; everything else (including an uncompressed
    /// P2PK whose embedded key is not on the curve) falls back to the raw
    /// encoding.
    pub fn compress(script: &Script) -> CompressedScript {
        let bytes = script.as_bytes();
        match *bytes {
            [OP_DUP_B, OP_HASH160_B, PUSH_20, .., OP_EQUALVERIFY_B, OP_CHECKSIG_B]
                if bytes.len() == 25 =>
            {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(&bytes[3..23]);
                CompressedScript::P2pkh(hash)
            }
            [OP_HASH160_B, PUSH_20, .., OP_EQUAL_B] if bytes.len() == 23 => {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(&bytes[2..22]);
                CompressedScript::P2sh(hash)
            }
            [PUSH_33, parity @ (0x02 | 0x03), .., OP_CHECKSIG_B] if bytes.len() == 35 => {
                let mut x = [0u8; 32];
                x.copy_from_slice(&bytes[2..34]);
                if parity == 0x02 {
                    CompressedScript::P2pkEven(x)
                } else {
                    CompressedScript::P2pkOdd(x)
                }
            }
            [PUSH_65, 0x04, .., OP_CHECKSIG_B] if bytes.len() == 67 => {
                match ec::compress_pub_key(&bytes[1..66]) {
                    Ok(compressed) => {
                        let mut x = [0u8; 32];
                        x.copy_from_slice(&compressed[1..]);
                        if compressed[0] == 0x02 {
                            CompressedScript::P2pkUncompressedEven(x)
                        } else {
                            CompressedScript::P2pkUncompressedOdd(x)
                        }
                    }
                    Err(_) => CompressedScript::Raw(bytes.to_vec()),
                }
            }
            _ => CompressedScript::Raw(bytes.to_vec()),
        }
    }

    /// The wire tag of this form.
    pub fn tag(&self) -> u64 {
        match self {
            CompressedScript::P2pkh(_) => 0,
            CompressedScript::P2sh(_) => 1,
            CompressedScript::P2pkEven(_) => 2,
            CompressedScript::P2pkOdd(_) => 3,
            CompressedScript::P2pkUncompressedEven(_) => 4,
            CompressedScript::P2pkUncompressedOdd(_) => 5,
            CompressedScript::Raw(bytes) => bytes.len() as u64 + SPECIAL_SCRIPT_KINDS,
        }
    }

    fn payload(&self) -> &[u8] {
        match self {
            CompressedScript::P2pkh(h) | CompressedScript::P2sh(h) => h,
            CompressedScript::P2pkEven(x)
            | CompressedScript::P2pkOdd(x)
            | CompressedScript::P2pkUncompressedEven(x)
            | CompressedScript::P2pkUncompressedOdd(x) => x,
            CompressedScript::Raw(bytes) => bytes,
        }
    }

    /// Serialized size on the wire.
    pub fn encoded_len(&self) -> usize {
        var_int_len(self.tag()) + self.payload().len()
    }

    /// Reads one compressed script from the stream.
    pub fn read<R: Read>(reader: &mut R) -> Result<CompressedScript> {
        let tag = read_var_int(reader)?;
        let payload_len = match tag {
            0 | 1 => 20,
            2..=5 => 32,
            _ => {
                if tag > MAX_COMPACT_SIZE {
                    return Err(FormatErrorKind::OversizedScript(tag - SPECIAL_SCRIPT_KINDS).into());
                }
                (tag - SPECIAL_SCRIPT_KINDS) as usize
            }
        };
        let mut payload = vec![0u8; payload_len];
        reader
            .read_exact(&mut payload)
            .map_err(Error::from_read_io)?;

        Ok(match tag {
            0 | 1 => {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(&payload);
                if tag == 0 {
                    CompressedScript::P2pkh(hash)
                } else {
                    CompressedScript::P2sh(hash)
                }
            }
            2..=5 => {
                let mut x = [0u8; 32];
                x.copy_from_slice(&payload);
                match tag {
                    2 => CompressedScript::P2pkEven(x),
                    3 => CompressedScript::P2pkOdd(x),
                    4 => CompressedScript::P2pkUncompressedEven(x),
                    _ => CompressedScript::P2pkUncompressedOdd(x),
                }
            }
            _ => CompressedScript::Raw(payload),
        })
    }

    /// Writes the VarInt tag and payload, returning the bytes written.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<usize> {
        if let CompressedScript::Raw(bytes) = self {
            if bytes.len() as u64 + SPECIAL_SCRIPT_KINDS > MAX_COMPACT_SIZE {
                return Err(FormatErrorKind::OversizedScript(bytes.len() as u64).into());
            }
        }
        let mut written = write_var_int(writer, self.tag())?;
        let payload = self.payload();
        writer.write_all(payload)?;
        written += payload.len();
        Ok(written)
    }

    /// Expands back into the full script. Fails for tags 4 and 5 when the
    /// stored x-coordinate is not on the curve.
    pub fn decompress(&self) -> Result<ScriptBuf> {
        let bytes = match self {
            CompressedScript::P2pkh(hash) => {
                let mut script = Vec::with_capacity(25);
                script.extend_from_slice(&[OP_DUP_B, OP_HASH160_B, PUSH_20]);
                script.extend_from_slice(hash);
                script.extend_from_slice(&[OP_EQUALVERIFY_B, OP_CHECKSIG_B]);
                script
            }
            CompressedScript::P2sh(hash) => {
                let mut script = Vec::with_capacity(23);
                script.extend_from_slice(&[OP_HASH160_B, PUSH_20]);
                script.extend_from_slice(hash);
                script.push(OP_EQUAL_B);
                script
            }
            CompressedScript::P2pkEven(x) | CompressedScript::P2pkOdd(x) => {
                let parity = if matches!(self, CompressedScript::P2pkEven(_)) {
                    0x02
                } else {
                    0x03
                };
                let mut script = Vec::with_capacity(35);
                script.extend_from_slice(&[PUSH_33, parity]);
                script.extend_from_slice(x);
                script.push(OP_CHECKSIG_B);
                script
            }
            CompressedScript::P2pkUncompressedEven(x)
            | CompressedScript::P2pkUncompressedOdd(x) => {
                let odd = matches!(self, CompressedScript::P2pkUncompressedOdd(_));
                let key = ec::decompress_pub_key(x, odd)?;
                let mut script = Vec::with_capacity(67);
                script.push(PUSH_65);
                script.extend_from_slice(&key);
                script.push(OP_CHECKSIG_B);
                script
            }
            CompressedScript::Raw(raw) => raw.clone(),
        };
        Ok(ScriptBuf::from_bytes(bytes))
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use hex_literal::hex;

    use super::*;
    use crate::EncodeHex;

    const G_X: [u8; 32] = hex!("79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798");
    const G_Y: [u8; 32] = hex!("483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8");

    fn round_trip(script: &Script) -> CompressedScript {
        let compressed = CompressedScript::compress(script);
        let mut wire = Vec::new();
        let written = compressed.write(&mut wire).unwrap();
        assert_eq!(written, wire.len());
        assert_eq!(written, compressed.encoded_len());

        let read_back = CompressedScript::read(&mut Cursor::new(&wire)).unwrap();
        assert_eq!(read_back, compressed);
        assert_eq!(read_back.decompress().unwrap().as_bytes(), script.as_bytes());
        compressed
    }

    #[test]
    fn p2pkh_compresses_to_tag_0() {
        let mut script = Vec::new();
        script.extend_from_slice(&hex!("76a914"));
        script.extend_from_slice(&[0x11; 20]);
        script.extend_from_slice(&hex!("88ac"));
        let script = ScriptBuf::from_bytes(script);

        let compressed = round_trip(&script);
        assert_eq!(compressed, CompressedScript::P2pkh([0x11; 20]));

        let mut wire = Vec::new();
        compressed.write(&mut wire).unwrap();
        assert_eq!(wire.len(), 21);
        assert_eq!(wire[0], 0x00);
        assert_eq!(wire[1..], [0x11; 20]);
    }

    #[test]
    fn p2sh_compresses_to_tag_1() {
        let mut script = Vec::new();
        script.extend_from_slice(&hex!("a914"));
        script.extend_from_slice(&[0x33; 20]);
        script.push(0x87);
        let script = ScriptBuf::from_bytes(script);

        let compressed = round_trip(&script);
        assert_eq!(compressed, CompressedScript::P2sh([0x33; 20]));
    }

    #[test]
    fn p2pk_compressed_keys() {
        for (parity, expected_tag) in [(0x02_u8, 2_u64), (0x03, 3)] {
            let mut script = vec![0x21, parity];
            script.extend_from_slice(&G_X);
            script.push(0xac);
            let script = ScriptBuf::from_bytes(script);

            let compressed = round_trip(&script);
            assert_eq!(compressed.tag(), expected_tag);
        }
    }

    #[test]
    fn p2pk_uncompressed_recovers_y() {
        let mut script = vec![0x41, 0x04];
        script.extend_from_slice(&G_X);
        script.extend_from_slice(&G_Y);
        script.push(0xac);
        let script = ScriptBuf::from_bytes(script);

        let compressed = round_trip(&script);
        assert_eq!(compressed, CompressedScript::P2pkUncompressedEven(G_X));

        let decompressed = compressed.decompress().unwrap();
        let bytes = decompressed.as_bytes();
        assert_eq!(bytes.len(), 67);
        assert_eq!(bytes[0], 0x41);
        assert_eq!(bytes[1], 0x04);
        assert_eq!(bytes[66], 0xac);
        assert_eq!(&bytes[2..34], &G_X);
        assert_eq!(&bytes[34..66], &G_Y);
    }

    #[test]
    fn p2pk_uncompressed_off_curve_stays_raw() {
        let mut script = vec![0x41, 0x04];
        script.extend_from_slice(&G_X);
        let mut y = G_Y;
        y[31] ^= 1;
        script.extend_from_slice(&y);
        script.push(0xac);
        let script = ScriptBuf::from_bytes(script.clone());

        let compressed = round_trip(&script);
        assert!(matches!(compressed, CompressedScript::Raw(_)));
        assert_eq!(compressed.tag(), 67 + SPECIAL_SCRIPT_KINDS);
    }

    #[test]
    fn near_miss_shapes_stay_raw() {
        // one byte short of a P2PKH
        let mut script = Vec::new();
        script.extend_from_slice(&hex!("76a914"));
        script.extend_from_slice(&[0x11; 19]);
        script.extend_from_slice(&hex!("88ac"));
        let compressed = round_trip(&ScriptBuf::from_bytes(script));
        assert!(matches!(compressed, CompressedScript::Raw(_)));

        // P2PK push with a bogus parity byte
        let mut script = vec![0x21, 0x05];
        script.extend_from_slice(&G_X);
        script.push(0xac);
        let compressed = round_trip(&ScriptBuf::from_bytes(script));
        assert!(matches!(compressed, CompressedScript::Raw(_)));
    }

    #[test]
    fn empty_and_op_return_scripts_round_trip_raw() {
        let empty = round_trip(Script::from_bytes(&[]));
        assert_eq!(empty.tag(), SPECIAL_SCRIPT_KINDS);

        let op_return = round_trip(Script::from_bytes(&hex!("6a0548656c6c6f")));
        assert_eq!(op_return.tag(), 7 + SPECIAL_SCRIPT_KINDS);
    }

    #[test]
    fn raw_tag_arithmetic() {
        let wire = hex!("07 6a");
        let read = CompressedScript::read(&mut Cursor::new(&wire)).unwrap();
        assert_eq!(read, CompressedScript::Raw(vec![0x6a]));
        assert_eq!(read.decompress().unwrap().as_bytes().hex(), "6a");
    }

    #[test]
    fn truncated_payload_rejected() {
        // tag 0 wants 20 bytes, only 5 present
        let wire = hex!("00 1111111111");
        assert!(CompressedScript::read(&mut Cursor::new(&wire)).is_err());

        // raw tag declaring 4 bytes, only 2 present
        let wire = hex!("0a 6a6a");
        assert!(CompressedScript::read(&mut Cursor::new(&wire)).is_err());
    }

    #[test]
    fn off_curve_tag_4_fails_on_decompress() {
        // x = 0 is not the abscissa of any curve point
        let compressed = CompressedScript::P2pkUncompressedEven([0; 32]);
        assert!(compressed.decompress().is_err());
    }

    #[test]
    fn oversized_raw_script_rejected_on_write() {
        let compressed = CompressedScript::Raw(vec![0; MAX_COMPACT_SIZE as usize + 1]);
        assert!(compressed.write(&mut Vec::new()).is_err());
    }
}
