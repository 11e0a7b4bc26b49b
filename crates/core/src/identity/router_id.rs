use super::{KeyPairError, PublicKey};
use crate::base32::{decode_key, encode_key, KEY_LEN};
use crate::dht::DhtKey;
use crate::service::AddressError;
use bdxnet_common::naming::ROUTER_TLD;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a relay (master node)
///
/// These are the bytes of the relay's ed25519 identity key. The text form is
/// `<base32>.mnode`; the directory daemon speaks hex.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouterId([u8; KEY_LEN]);

impl RouterId {
    /// Create a RouterId from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// The RouterId of the relay holding this identity key
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        Self(public_key.as_bytes())
    }

    /// Get the raw bytes of the RouterId
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Interpret the id as the relay's identity key
    pub fn public_key(&self) -> Result<PublicKey, KeyPairError> {
        PublicKey::from_bytes(&self.0)
    }

    /// Convert to a hexadecimal string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Create from a hexadecimal string
    pub fn from_hex(s: &str) -> Result<Self, AddressError> {
        let bytes = hex::decode(s).map_err(|_| AddressError::InvalidEncoding)?;
        if bytes.len() != KEY_LEN {
            return Err(AddressError::InvalidLength(bytes.len()));
        }
        let mut array = [0u8; KEY_LEN];
        array.copy_from_slice(&bytes);
        Ok(Self(array))
    }

    /// Parse the `<base32>.mnode` form. Relay addresses carry no subdomain.
    pub fn from_string(s: &str) -> Result<Self, AddressError> {
        if s.is_empty() {
            return Err(AddressError::Empty);
        }

        let payload = s
            .strip_suffix(ROUTER_TLD)
            .and_then(|rest| rest.strip_suffix('.'))
            .ok_or_else(|| AddressError::WrongTld(ROUTER_TLD.to_string()))?;

        if payload.contains('.') {
            return Err(AddressError::UnexpectedSubdomain);
        }

        decode_key(payload).map(Self)
    }

    /// Key of this relay in the DHT keyspace (identity mapping)
    pub fn to_key(&self) -> DhtKey {
        DhtKey::from_bytes(self.0)
    }

    /// Get a shortened display version (first 8 bytes as hex)
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Debug for RouterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RouterId({}...)", &self.short_hex())
    }
}

impl fmt::Display for RouterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", encode_key(&self.0), ROUTER_TLD)
    }
}

impl From<[u8; KEY_LEN]> for RouterId {
    fn from(value: [u8; KEY_LEN]) -> Self {
        Self::from_bytes(value)
    }
}

impl FromStr for RouterId {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::KeyPair;

    #[test]
    fn test_router_id_string_roundtrip() {
        let keypair = KeyPair::generate();
        let router = RouterId::from_public_key(&keypair.public_key());

        let text = router.to_string();
        assert!(text.ends_with(".mnode"));

        let parsed: RouterId = text.parse().unwrap();
        assert_eq!(parsed, router);
        assert_eq!(parsed.public_key().unwrap(), keypair.public_key());
    }

    #[test]
    fn test_router_id_hex() {
        let router = RouterId::from_bytes([7u8; 32]);
        let restored = RouterId::from_hex(&router.to_hex()).unwrap();
        assert_eq!(router, restored);

        assert_eq!(
            RouterId::from_hex("abcd").unwrap_err(),
            AddressError::InvalidLength(2)
        );
        assert_eq!(
            RouterId::from_hex("not-hex").unwrap_err(),
            AddressError::InvalidEncoding
        );
    }

    #[test]
    fn test_router_id_rejects_other_forms() {
        let router = RouterId::from_bytes([9u8; 32]);
        let payload = encode_key(router.as_bytes());

        assert_eq!(RouterId::from_string("").unwrap_err(), AddressError::Empty);
        assert!(matches!(
            RouterId::from_string(&format!("{}.bdx", payload)),
            Err(AddressError::WrongTld(_))
        ));
        assert!(matches!(
            RouterId::from_string(&format!("{}mnode", payload)),
            Err(AddressError::WrongTld(_))
        ));
        assert_eq!(
            RouterId::from_string(&format!("www.{}.mnode", payload)).unwrap_err(),
            AddressError::UnexpectedSubdomain
        );
        assert_eq!(
            RouterId::from_string(".mnode").unwrap_err(),
            AddressError::InvalidLength(0)
        );
    }

    #[test]
    fn test_dht_key_is_identity() {
        let router = RouterId::from_bytes([3u8; 32]);
        assert_eq!(router.to_key().as_bytes(), router.as_bytes());
    }

    #[test]
    fn test_serialization() {
        let router = RouterId::from_bytes([0xabu8; 32]);

        let serialized = bincode::serialize(&router).unwrap();
        let deserialized: RouterId = bincode::deserialize(&serialized).unwrap();

        assert_eq!(router, deserialized);
    }
}
