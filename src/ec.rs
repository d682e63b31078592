//! secp256k1 point recovery for compressed public keys.
//!
//! Snapshot script compression stores only the x-coordinate of a public
//! key plus the parity of y. Recovering the full key needs a modular
//! square root over the curve's prime field: since `p ≡ 3 (mod 4)`,
//! `sqrt(a) = a^((p+1)/4) (mod p)` whenever `a` is a quadratic residue.

use num_bigint::BigUint;
use num_traits::Zero;
use once_cell::sync::Lazy;

use crate::error::{FormatErrorKind, Result};

/// Field prime: 2^256 - 2^32 - 977.
static FIELD_P: Lazy<BigUint> = Lazy::new(|| {
    BigUint::parse_bytes(
        b"fffffffffffffffffffffffffffffffffffffffffffffffffffffffefffffc2f",
        16,
    )
    .unwrap()
});

/// Square-root exponent (p + 1) / 4.
static SQRT_EXP: Lazy<BigUint> = Lazy::new(|| (&*FIELD_P + 1u8) >> 2);

/// Right-hand side of the curve equation: x^3 + 7 (mod p).
fn curve_rhs(x: &BigUint) -> BigUint {
    (x.pow(3) + 7u8) % &*FIELD_P
}

/// Whether (x, y) satisfies y^2 = x^3 + 7 (mod p).
pub fn is_on_curve(x: &BigUint, y: &BigUint) -> bool {
    x < &*FIELD_P && y < &*FIELD_P && (y * y) % &*FIELD_P == curve_rhs(x)
}

/// Recovers the uncompressed key `04 || x || y` from an x-coordinate and
/// the expected parity of y. Fails when x is not the abscissa of a curve
/// point.
pub fn decompress_pub_key(x: &[u8; 32], odd_y: bool) -> Result<[u8; 65]> {
    let x_num = BigUint::from_bytes_be(x);
    if x_num >= *FIELD_P {
        return Err(FormatErrorKind::PubKeyNotOnCurve.into());
    }
    let rhs = curve_rhs(&x_num);
    let mut y = rhs.modpow(&SQRT_EXP, &FIELD_P);
    if (&y * &y) % &*FIELD_P != rhs {
        return Err(FormatErrorKind::PubKeyNotOnCurve.into());
    }
    if y.bit(0) != odd_y {
        if y.is_zero() {
            return Err(FormatErrorKind::PubKeyNotOnCurve.into());
        }
        y = &*FIELD_P - y;
    }

    let mut key = [0u8; 65];
    key[0] = 0x04;
    key[1..33].copy_from_slice(x);
    let y_bytes = y.to_bytes_be();
    key[65 - y_bytes.len()..].copy_from_slice(&y_bytes);
    Ok(key)
}

/// Compresses an uncompressed key to `02/03 || x`, verifying that the key
/// actually lies on the curve.
pub fn compress_pub_key(key: &[u8]) -> Result<[u8; 33]> {
    if key.len() != 65 || key[0] != 0x04 {
        return Err(FormatErrorKind::MalformedPubKey.into());
    }
    let x = BigUint::from_bytes_be(&key[1..33]);
    let y = BigUint::from_bytes_be(&key[33..65]);
    if !is_on_curve(&x, &y) {
        return Err(FormatErrorKind::PubKeyNotOnCurve.into());
    }

    let mut out = [0u8; 33];
    out[0] = if y.bit(0) { 0x03 } else { 0x02 };
    out[1..].copy_from_slice(&key[1..33]);
    Ok(out)
}

#[cfg(test)]
mod test {
    use hex_literal::hex;

    use super::*;

    // the generator point of secp256k1
    const G_X: [u8; 32] = hex!("79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798");
    const G_Y: [u8; 32] = hex!("483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8");

    #[test]
    fn generator_recovers_even_y() {
        let key = decompress_pub_key(&G_X, false).unwrap();
        assert_eq!(key[0], 0x04);
        assert_eq!(key[1..33], G_X);
        assert_eq!(key[33..65], G_Y);
    }

    #[test]
    fn parity_flip_round_trips() {
        let key = decompress_pub_key(&G_X, true).unwrap();
        assert_ne!(key[33..65], G_Y);

        let compressed = compress_pub_key(&key).unwrap();
        assert_eq!(compressed[0], 0x03);
        assert_eq!(compressed[1..], G_X);
    }

    #[test]
    fn compress_decompress_identity() {
        let mut key = [0u8; 65];
        key[0] = 0x04;
        key[1..33].copy_from_slice(&G_X);
        key[33..65].copy_from_slice(&G_Y);

        let compressed = compress_pub_key(&key).unwrap();
        assert_eq!(compressed[0], 0x02);

        let recovered = decompress_pub_key(&G_X, false).unwrap();
        assert_eq!(recovered, key);
    }

    #[test]
    fn x_at_or_above_field_prime_rejected() {
        let too_big = [0xff_u8; 32];
        assert!(decompress_pub_key(&too_big, false).is_err());

        let p_bytes: [u8; 32] =
            hex!("fffffffffffffffffffffffffffffffffffffffffffffffffffffffefffffc2f");
        assert!(decompress_pub_key(&p_bytes, false).is_err());
    }

    #[test]
    fn off_curve_point_rejected_on_compress() {
        let mut key = [0u8; 65];
        key[0] = 0x04;
        key[1..33].copy_from_slice(&G_X);
        key[33..65].copy_from_slice(&G_Y);
        key[64] ^= 1;
        assert!(compress_pub_key(&key).is_err());
    }

    #[test]
    fn malformed_key_rejected() {
        assert!(compress_pub_key(&[0x04; 33]).is_err());
        let mut key = [0u8; 65];
        key[0] = 0x02;
        assert!(compress_pub_key(&key).is_err());
    }

    #[test]
    fn non_residue_x_rejected() {
        // for x = 0 the rhs is 7, which has no square root mod p
        let zero = [0u8; 32];
        assert!(decompress_pub_key(&zero, false).is_err());
        assert!(decompress_pub_key(&zero, true).is_err());
    }
}
