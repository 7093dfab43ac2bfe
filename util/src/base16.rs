#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Conversions between `BigUint` and fixed-width uppercase hex strings.

use anyhow::{Result, ensure};
use num_bigint::BigUint;

/// Converts a `BigUint` to an uppercase hex string with no prefix, left-padded
/// with zeros to the number of bytes required to hold `fixed_len_bits` bits.
///
/// Returns an error if the value does not fit.
pub fn to_string_uppercase_hex_bits(u: &BigUint, fixed_len_bits: u32) -> Result<String> {
    let fixed_len_bits = (fixed_len_bits as u64).max(1);
    let fixed_len_digits = fixed_len_bits.div_ceil(8) * 2;

    let value_bits = u.bits().max(1);
    ensure!(
        value_bits <= fixed_len_digits * 4,
        "Value of {value_bits} bits does not fit a fixed length of {fixed_len_bits} bits."
    );

    let value_digits = value_bits.div_ceil(4);
    let s = if value_digits < fixed_len_digits {
        let leading_zeros = "0".repeat((fixed_len_digits - value_digits) as usize);
        format!("{leading_zeros}{u:X}")
    } else {
        format!("{u:X}")
    };

    ensure!(
        s.len() as u64 == fixed_len_digits,
        "Output length mismatch. Got {}, expected {fixed_len_digits}.",
        s.len()
    );

    Ok(s)
}

/// Parses a `BigUint` from a hex string (upper or lower case, no prefix)
/// produced by [`to_string_uppercase_hex_bits`] with the same bit length.
pub fn biguint_from_str_hex_bits(s: &str, fixed_len_bits: u32) -> Result<BigUint> {
    let fixed_len_digits = (fixed_len_bits as u64).max(1).div_ceil(8) * 2;
    ensure!(
        s.len() as u64 == fixed_len_digits,
        "Input length mismatch. Got {}, expected {fixed_len_digits}.",
        s.len()
    );
    ensure!(
        s.bytes().all(|b| b.is_ascii_hexdigit()),
        "Input contains a non-hex character."
    );

    BigUint::parse_bytes(s.as_bytes(), 16)
        .ok_or_else(|| anyhow::anyhow!("Could not parse hex string."))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    #[test]
    fn fixed_width_round_trip() {
        let u = BigUint::from(0xAB01_u32);
        let s = to_string_uppercase_hex_bits(&u, 32).unwrap();
        assert_eq!(s, "0000AB01");
        assert_eq!(biguint_from_str_hex_bits(&s, 32).unwrap(), u);
    }

    #[test]
    fn rejects_values_too_large_for_width() {
        let u = BigUint::from(0x1_0000_u32);
        assert!(to_string_uppercase_hex_bits(&u, 16).is_err());
    }

    #[test]
    fn rejects_wrong_length_and_bad_digits() {
        assert!(biguint_from_str_hex_bits("AB01", 32).is_err());
        assert!(biguint_from_str_hex_bits("0000GB01", 32).is_err());
    }

}
