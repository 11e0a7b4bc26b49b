/// .bdx service address system
///
/// A service address is the service's 32-byte identity key written as
/// `[subdomain.]<base32>.bdx`. The subdomain rides along for DNS but is not
/// part of the address identity.

use crate::base32::{decode_key, encode_key, KEY_LEN};
use crate::dht::DhtKey;
use crate::identity::{KeyPairError, PublicKey, RouterId};
use bdxnet_common::naming::{ALLOWED_TLDS, SERVICE_TLD};
use blake3::Hasher;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

/// Domain separation tag for service keys in the DHT keyspace
const DHT_KEY_TAG: &[u8] = b"BDXNET-SERVICE-DHT-V1";

/// A .bdx service address (e.g., "www.abc123...xyz.bdx")
///
/// Equality, ordering and hashing only look at the key bytes.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ServiceAddress {
    key: [u8; KEY_LEN],

    #[serde(default, skip_serializing_if = "String::is_empty")]
    subdomain: String,
}

impl ServiceAddress {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self {
            key: bytes,
            subdomain: String::new(),
        }
    }

    /// The address of a service with this identity key
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        Self::from_bytes(public_key.as_bytes())
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    /// Subdomain captured when parsing, empty if there was none
    pub fn subdomain(&self) -> &str {
        &self.subdomain
    }

    pub fn set_subdomain(&mut self, subdomain: impl Into<String>) {
        self.subdomain = subdomain.into();
    }

    pub fn with_subdomain(mut self, subdomain: impl Into<String>) -> Self {
        self.set_subdomain(subdomain);
        self
    }

    /// Whether `tld` is on the allow-list
    pub fn permit_tld(tld: &str) -> bool {
        ALLOWED_TLDS
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(tld))
    }

    /// Render as `[subdomain.]<base32>.<tld>`
    pub fn to_string_with_tld(&self, tld: &str) -> String {
        let mut out = String::new();
        if !self.subdomain.is_empty() {
            out.push_str(&self.subdomain);
            out.push('.');
        }
        out.push_str(&encode_key(&self.key));
        out.push('.');
        out.push_str(tld);
        out
    }

    /// Parse `[subdomain.]<base32>.<tld>`
    ///
    /// The final label must equal `tld` exactly and `tld` must be permitted.
    /// Everything before the key label becomes the subdomain.
    pub fn from_string(s: &str, tld: &str) -> Result<Self, AddressError> {
        if s.is_empty() {
            return Err(AddressError::Empty);
        }
        if !Self::permit_tld(tld) {
            return Err(AddressError::TldNotPermitted(tld.to_string()));
        }

        let rest = match s.rsplit_once('.') {
            Some((rest, last)) if last == tld => rest,
            _ => return Err(AddressError::WrongTld(tld.to_string())),
        };

        let (subdomain, payload) = rest.rsplit_once('.').unwrap_or(("", rest));
        let key = decode_key(payload)?;

        Ok(Self {
            key,
            subdomain: subdomain.to_string(),
        })
    }

    /// Key of this service in the DHT keyspace
    pub fn to_key(&self) -> DhtKey {
        let mut hasher = Hasher::new();
        hasher.update(DHT_KEY_TAG);
        hasher.update(&self.key);
        DhtKey::from_bytes(*hasher.finalize().as_bytes())
    }

    /// The same bytes seen as the id of the relay hosting the service
    pub fn to_router(&self) -> RouterId {
        RouterId::from_bytes(self.key)
    }

    /// Interpret the address as the service's identity key
    pub fn public_key(&self) -> Result<PublicKey, KeyPairError> {
        PublicKey::from_bytes(&self.key)
    }
}

impl PartialEq for ServiceAddress {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ServiceAddress {}

impl PartialOrd for ServiceAddress {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ServiceAddress {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl Hash for ServiceAddress {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Debug for ServiceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAddress")
            .field("key", &hex::encode(&self.key[..8]))
            .field("subdomain", &self.subdomain)
            .finish()
    }
}

impl fmt::Display for ServiceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_with_tld(SERVICE_TLD))
    }
}

impl FromStr for ServiceAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s, SERVICE_TLD)
    }
}

/// Classification of an address string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedAddress {
    Service(ServiceAddress),
    Router(RouterId),
    Unrecognized,
}

/// Classify an address string.
///
/// Relay ids are tried first: a string in the `<base32>.mnode` form is always
/// a `Router`, even though the service codec would also accept it when asked
/// for the `mnode` TLD. Service addresses are only recognised with the
/// `.bdx` TLD.
pub fn parse_address(addr: &str) -> ParsedAddress {
    if let Ok(router) = RouterId::from_string(addr) {
        return ParsedAddress::Router(router);
    }
    match ServiceAddress::from_string(addr, SERVICE_TLD) {
        Ok(service) => ParsedAddress::Service(service),
        Err(_) => ParsedAddress::Unrecognized,
    }
}

/// Service address errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("Empty address")]
    Empty,

    #[error("TLD not permitted: {0}")]
    TldNotPermitted(String),

    #[error("Not a .{0} address")]
    WrongTld(String),

    #[error("Unexpected subdomain")]
    UnexpectedSubdomain,

    #[error("Invalid base32 encoding")]
    InvalidEncoding,

    #[error("Invalid address length: {0} (expected 32)")]
    InvalidLength(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::KeyPair;
    use std::collections::hash_map::DefaultHasher;
    use std::collections::HashSet;

    fn hash_of(address: &ServiceAddress) -> u64 {
        let mut hasher = DefaultHasher::new();
        address.hash(&mut hasher);
        std::hash::Hasher::finish(&hasher)
    }

    #[test]
    fn test_roundtrip_without_subdomain() {
        for key in [[0u8; 32], [0xffu8; 32], KeyPair::generate().public_bytes()] {
            for tld in ALLOWED_TLDS {
                let text = ServiceAddress::from_bytes(key).to_string_with_tld(tld);
                let parsed = ServiceAddress::from_string(&text, tld).unwrap();
                assert_eq!(parsed.as_bytes(), &key);
                assert_eq!(parsed.subdomain(), "");
            }
        }
    }

    #[test]
    fn test_subdomain_extraction() {
        let key = KeyPair::generate().public_bytes();
        let payload = encode_key(&key);

        let parsed: ServiceAddress = format!("abc.{}.bdx", payload).parse().unwrap();
        assert_eq!(parsed.subdomain(), "abc");
        assert_eq!(parsed.as_bytes(), &key);

        let nested: ServiceAddress = format!("a.b.c.{}.bdx", payload).parse().unwrap();
        assert_eq!(nested.subdomain(), "a.b.c");

        // Printing keeps the subdomain
        assert_eq!(nested.to_string(), format!("a.b.c.{}.bdx", payload));
    }

    #[test]
    fn test_identity_ignores_subdomain() {
        let key = [0x42u8; 32];
        let plain = ServiceAddress::from_bytes(key);
        let www = ServiceAddress::from_bytes(key).with_subdomain("www");

        assert_eq!(plain, www);
        assert_eq!(plain.cmp(&www), Ordering::Equal);
        assert_eq!(hash_of(&plain), hash_of(&www));

        let set: HashSet<_> = [plain, www].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_tld_must_match_exactly() {
        let text = ServiceAddress::from_bytes([1u8; 32]).to_string_with_tld("bdx");

        assert!(matches!(
            ServiceAddress::from_string(&text, "mnode"),
            Err(AddressError::WrongTld(_))
        ));
        assert!(matches!(
            ServiceAddress::from_string(&text.to_uppercase(), "bdx"),
            Err(AddressError::WrongTld(_))
        ));
        assert!(matches!(
            ServiceAddress::from_string(&format!("{}.", text), "bdx"),
            Err(AddressError::WrongTld(_))
        ));
    }

    #[test]
    fn test_malformed_addresses() {
        assert_eq!(ServiceAddress::from_str("").unwrap_err(), AddressError::Empty);
        assert!(matches!(
            ServiceAddress::from_str("bdx"),
            Err(AddressError::WrongTld(_))
        ));
        assert_eq!(
            ServiceAddress::from_str("not_base32.bdx").unwrap_err(),
            AddressError::InvalidEncoding
        );
        assert_eq!(
            ServiceAddress::from_str(".bdx").unwrap_err(),
            AddressError::InvalidLength(0)
        );
        assert_eq!(
            ServiceAddress::from_string("x.onion", "onion").unwrap_err(),
            AddressError::TldNotPermitted("onion".to_string())
        );
    }

    #[test]
    fn test_permit_tld() {
        assert!(ServiceAddress::permit_tld("bdx"));
        assert!(ServiceAddress::permit_tld("BDX"));
        assert!(ServiceAddress::permit_tld("mnode"));
        assert!(!ServiceAddress::permit_tld("onion"));
        assert!(!ServiceAddress::permit_tld(""));
    }

    #[test]
    fn test_to_router_is_bit_identical() {
        let key = KeyPair::generate().public_bytes();
        let address = ServiceAddress::from_bytes(key);
        assert_eq!(address.to_router().as_bytes(), &key);
    }

    #[test]
    fn test_to_key_is_stable() {
        let address = ServiceAddress::from_bytes([0u8; 32]);
        let key = address.to_key();

        assert_eq!(key, address.clone().with_subdomain("www").to_key());
        assert_ne!(key.as_bytes(), address.as_bytes());

        let mut hasher = Hasher::new();
        hasher.update(b"BDXNET-SERVICE-DHT-V1");
        hasher.update(&[0u8; 32]);
        assert_eq!(key.as_bytes(), hasher.finalize().as_bytes());
    }

    #[test]
    fn test_public_key_roundtrip() {
        let keypair = KeyPair::generate();
        let address = ServiceAddress::from_public_key(&keypair.public_key());
        assert_eq!(address.public_key().unwrap(), keypair.public_key());
    }

    #[test]
    fn test_parse_address_classifies() {
        let key = KeyPair::generate().public_bytes();
        let payload = encode_key(&key);

        match parse_address(&format!("{}.bdx", payload)) {
            ParsedAddress::Service(address) => assert_eq!(address.as_bytes(), &key),
            other => panic!("expected service, got {:?}", other),
        }

        match parse_address(&format!("www.{}.bdx", payload)) {
            ParsedAddress::Service(address) => assert_eq!(address.subdomain(), "www"),
            other => panic!("expected service, got {:?}", other),
        }

        assert_eq!(parse_address("example.com"), ParsedAddress::Unrecognized);
        assert_eq!(parse_address(""), ParsedAddress::Unrecognized);
    }

    #[test]
    fn test_parse_address_prefers_router() {
        let key = KeyPair::generate().public_bytes();
        let text = format!("{}.mnode", encode_key(&key));

        // The service codec accepts this string for the mnode TLD...
        let as_service = ServiceAddress::from_string(&text, "mnode").unwrap();
        assert_eq!(as_service.as_bytes(), &key);

        // ...but classification picks the relay reading
        assert_eq!(
            parse_address(&text),
            ParsedAddress::Router(RouterId::from_bytes(key))
        );
    }
}
