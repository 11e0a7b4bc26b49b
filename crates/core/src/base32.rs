//! Text form of 32-byte keys used in addresses
//!
//! Keys are written in z-base-32 without padding, which is always 52
//! symbols for 32 bytes.

use crate::service::AddressError;
use data_encoding::{Encoding, Specification};
use std::sync::OnceLock;

/// Raw key length in bytes
pub const KEY_LEN: usize = 32;

/// Encoded key length in symbols
pub const ENCODED_KEY_LEN: usize = 52;

/// z-base-32 alphabet
const ALPHABET: &str = "ybndrfg8ejkmcpqxot1uwisza345h769";

fn zbase32() -> &'static Encoding {
    static ENCODING: OnceLock<Encoding> = OnceLock::new();
    ENCODING.get_or_init(|| {
        let mut spec = Specification::new();
        spec.symbols.push_str(ALPHABET);
        spec.encoding().expect("z-base-32 alphabet is a valid specification")
    })
}

pub fn encode_key(bytes: &[u8; KEY_LEN]) -> String {
    zbase32().encode(bytes)
}

/// Decode a 52-symbol key label. Symbols are matched case-insensitively;
/// non-canonical trailing bits are rejected.
pub fn decode_key(label: &str) -> Result<[u8; KEY_LEN], AddressError> {
    let bytes = zbase32()
        .decode(label.to_ascii_lowercase().as_bytes())
        .map_err(|_| AddressError::InvalidEncoding)?;

    if bytes.len() != KEY_LEN {
        return Err(AddressError::InvalidLength(bytes.len()));
    }

    let mut array = [0u8; KEY_LEN];
    array.copy_from_slice(&bytes);
    Ok(array)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_length_is_fixed() {
        assert_eq!(encode_key(&[0u8; KEY_LEN]).len(), ENCODED_KEY_LEN);
        assert_eq!(encode_key(&[0xffu8; KEY_LEN]).len(), ENCODED_KEY_LEN);
    }

    #[test]
    fn uses_z_base_32_alphabet() {
        assert_eq!(encode_key(&[0u8; KEY_LEN]), "y".repeat(ENCODED_KEY_LEN));
        assert_eq!(
            encode_key(&[0xffu8; KEY_LEN]),
            format!("{}o", "9".repeat(ENCODED_KEY_LEN - 1))
        );

        let mut bytes = [0u8; KEY_LEN];
        bytes[0] = 0x08;
        assert!(encode_key(&bytes).starts_with("b"));
    }

    #[test]
    fn decode_is_case_insensitive() {
        let key = [0x5au8; KEY_LEN];
        let encoded = encode_key(&key);
        assert_eq!(decode_key(&encoded.to_uppercase()).unwrap(), key);
    }

    #[test]
    fn rejects_short_and_garbage() {
        assert_eq!(decode_key("").unwrap_err(), AddressError::InvalidLength(0));
        assert_eq!(decode_key("aaaaaaaa").unwrap_err(), AddressError::InvalidLength(5));
        assert_eq!(decode_key("!!!!").unwrap_err(), AddressError::InvalidEncoding);
    }

    #[test]
    fn rejects_non_canonical_trailing_bits() {
        let mut encoded = encode_key(&[0u8; KEY_LEN]);
        // The final symbol only carries one data bit; 'b' sets a padding bit
        encoded.pop();
        encoded.push('b');
        assert_eq!(decode_key(&encoded).unwrap_err(), AddressError::InvalidEncoding);
    }
}
