/// LNS (name system) records
///
/// Registered names map to service addresses through records stored on the
/// directory chain. The chain only sees the hash of a name and a ciphertext
/// sealed with a key derived from the name itself, so resolving requires
/// knowing the plain name.

use crate::dht::DhtKey;
use crate::service::ServiceAddress;
use bdxnet_common::naming::{
    MAX_LNS_NAME_LEN, MAX_LNS_PUNYCODE_LEN, ROUTER_TLD, SERVICE_TLD,
};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    Key, XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// XChaCha20 nonce length
pub const NONCE_LEN: usize = 24;

/// Hash a name into the keyspace used for LNS lookups
pub fn name_hash(name: &str) -> DhtKey {
    let normalized = name.trim_end_matches('.').to_ascii_lowercase();
    DhtKey::from_bytes(*blake3::hash(normalized.as_bytes()).as_bytes())
}

fn record_cipher(name: &str) -> XChaCha20Poly1305 {
    let normalized = name.trim_end_matches('.').to_ascii_lowercase();
    let hash = name_hash(&normalized);
    let key = blake3::keyed_hash(hash.as_bytes(), normalized.as_bytes());
    XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()))
}

/// An encrypted LNS record as stored by the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedName {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
}

impl EncryptedName {
    /// Seal `address` under `name` with a fresh random nonce
    pub fn seal(name: &str, address: &ServiceAddress) -> Result<Self, LnsError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = record_cipher(name)
            .encrypt(XNonce::from_slice(&nonce), address.as_bytes().as_slice())
            .map_err(|_| LnsError::Crypto)?;

        Ok(Self { ciphertext, nonce })
    }

    /// Build a record from the hex fields the directory daemon returns
    pub fn from_hex(ciphertext: &str, nonce: &str) -> Result<Self, LnsError> {
        let ciphertext = hex::decode(ciphertext).map_err(|_| LnsError::InvalidHex)?;
        let nonce_bytes = hex::decode(nonce).map_err(|_| LnsError::InvalidHex)?;
        let nonce: [u8; NONCE_LEN] = nonce_bytes
            .as_slice()
            .try_into()
            .map_err(|_| LnsError::InvalidNonceLength(nonce_bytes.len()))?;

        if ciphertext.is_empty() {
            return Err(LnsError::EmptyCiphertext);
        }

        Ok(Self { ciphertext, nonce })
    }

    /// Recover the service address, `None` if `name` does not open the record
    pub fn decrypt(&self, name: &str) -> Option<ServiceAddress> {
        if self.ciphertext.is_empty() {
            return None;
        }

        let plaintext = record_cipher(name)
            .decrypt(XNonce::from_slice(&self.nonce), self.ciphertext.as_slice())
            .ok()?;

        let key: [u8; 32] = plaintext.as_slice().try_into().ok()?;
        Some(ServiceAddress::from_bytes(key))
    }
}

/// Check a name against the LNS registration rules
///
/// The name must end in `.bdx`; only `[a-z0-9.-]` may precede it. The
/// primary label is capped at 32 characters, or 63 when it contains dashes
/// (punycode), may not start or end with a dash, and a dash pair at offset 2
/// is only allowed as the `xn--` punycode prefix.
pub fn is_valid_name(name: &str) -> bool {
    let stem = match name.strip_suffix(SERVICE_TLD).and_then(|s| s.strip_suffix('.')) {
        Some(stem) => stem,
        None => return false,
    };

    if !stem
        .chars()
        .all(|c| c == '-' || c == '.' || c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return false;
    }

    let primary = match stem.rsplit('.').next() {
        Some(label) if !label.is_empty() => label,
        _ => return false,
    };

    if primary == "localhost" || primary == SERVICE_TLD || primary == ROUTER_TLD {
        return false;
    }

    if !primary.contains('-') {
        return primary.len() <= MAX_LNS_NAME_LEN;
    }

    if primary.starts_with('-') || primary.ends_with('-') {
        return false;
    }

    if primary.len() > MAX_LNS_PUNYCODE_LEN {
        return false;
    }

    let bytes = primary.as_bytes();
    if bytes.get(2) == Some(&b'-') && bytes.get(3) == Some(&b'-') {
        return primary.starts_with("xn");
    }
    true
}

/// LNS record errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LnsError {
    #[error("Invalid hex in record")]
    InvalidHex,

    #[error("Invalid nonce length: {0} (expected 24)")]
    InvalidNonceLength(usize),

    #[error("Record has no ciphertext")]
    EmptyCiphertext,

    #[error("Record encryption failed")]
    Crypto,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::KeyPair;

    #[test]
    fn test_name_hash_normalizes() {
        assert_eq!(name_hash("Example.bdx"), name_hash("example.bdx"));
        assert_eq!(name_hash("example.bdx."), name_hash("example.bdx"));
        assert_ne!(name_hash("example.bdx"), name_hash("other.bdx"));
    }

    #[test]
    fn test_seal_and_decrypt() {
        let address = ServiceAddress::from_public_key(&KeyPair::generate().public_key());
        let record = EncryptedName::seal("example.bdx", &address).unwrap();

        assert_eq!(record.decrypt("example.bdx"), Some(address.clone()));
        assert_eq!(record.decrypt("EXAMPLE.bdx."), Some(address));
        assert_eq!(record.decrypt("other.bdx"), None);
    }

    #[test]
    fn test_tampered_record_fails() {
        let address = ServiceAddress::from_bytes([5u8; 32]);
        let mut record = EncryptedName::seal("example.bdx", &address).unwrap();
        record.ciphertext[0] ^= 0xff;
        assert_eq!(record.decrypt("example.bdx"), None);
    }

    #[test]
    fn test_from_hex() {
        let address = ServiceAddress::from_bytes([6u8; 32]);
        let record = EncryptedName::seal("six.bdx", &address).unwrap();

        let parsed =
            EncryptedName::from_hex(&hex::encode(&record.ciphertext), &hex::encode(record.nonce))
                .unwrap();
        assert_eq!(parsed, record);

        assert_eq!(
            EncryptedName::from_hex("zz", &hex::encode(record.nonce)).unwrap_err(),
            LnsError::InvalidHex
        );
        assert_eq!(
            EncryptedName::from_hex(&hex::encode(&record.ciphertext), "0011").unwrap_err(),
            LnsError::InvalidNonceLength(2)
        );
        assert_eq!(
            EncryptedName::from_hex("", &hex::encode(record.nonce)).unwrap_err(),
            LnsError::EmptyCiphertext
        );
    }

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("example.bdx"));
        assert!(is_valid_name("www.example.bdx"));
        assert!(is_valid_name("my-site.bdx"));
        assert!(is_valid_name("xn--bcher-kva.bdx"));
        assert!(is_valid_name(&format!("{}.bdx", "a".repeat(32))));
    }

    #[test]
    fn test_invalid_names() {
        assert!(!is_valid_name("example.com"));
        assert!(!is_valid_name("example"));
        assert!(!is_valid_name(".bdx"));
        assert!(!is_valid_name("Example.bdx"));
        assert!(!is_valid_name("under_score.bdx"));
        assert!(!is_valid_name("localhost.bdx"));
        assert!(!is_valid_name("mnode.bdx"));
        assert!(!is_valid_name("-lead.bdx"));
        assert!(!is_valid_name("trail-.bdx"));
        assert!(!is_valid_name("ab--cd.bdx"));
        assert!(!is_valid_name(&format!("{}.bdx", "a".repeat(33))));
        assert!(!is_valid_name(&format!("a-{}.bdx", "b".repeat(62))));
    }
}
