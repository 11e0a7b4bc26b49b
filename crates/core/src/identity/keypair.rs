use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a libsodium-style secret key (seed followed by public key)
const EXPANDED_SECRET_LEN: usize = 64;

/// An ed25519 identity keypair
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut rng = OsRng;
        let mut secret_bytes = [0u8; 32];
        rng.fill_bytes(&mut secret_bytes);

        Self::from_seed(&secret_bytes)
    }

    fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Create a keypair from a 32-byte seed
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self, KeyPairError> {
        Ok(Self::from_seed(bytes))
    }

    /// Parse a hex secret key as handed out by the directory daemon
    ///
    /// Accepts either a 32-byte seed or the 64-byte `seed || public key`
    /// form. In the latter case the embedded public key must match the seed.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyPairError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|_| KeyPairError::InvalidSecretKey)?;

        match bytes.len() {
            32 => {
                let mut seed = [0u8; 32];
                seed.copy_from_slice(&bytes);
                Self::from_secret_bytes(&seed)
            }
            EXPANDED_SECRET_LEN => {
                let mut seed = [0u8; 32];
                seed.copy_from_slice(&bytes[..32]);
                let keypair = Self::from_secret_bytes(&seed)?;
                if keypair.public_bytes()[..] != bytes[32..] {
                    return Err(KeyPairError::PublicKeyMismatch);
                }
                Ok(keypair)
            }
            _ => Err(KeyPairError::InvalidSecretKey),
        }
    }

    /// Get the secret key bytes
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Get the public key bytes
    pub fn public_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Get the public key
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            key: self.verifying_key,
        }
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Verify a signature on a message
    pub fn verify(&self, message: &[u8], signature: &[u8; 64]) -> bool {
        self.verifying_key
            .verify(message, &Signature::from_bytes(signature))
            .is_ok()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &hex::encode(self.public_bytes()))
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// A public key for verifying signatures
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey {
    #[serde(with = "public_key_serde")]
    key: VerifyingKey,
}

impl PublicKey {
    /// Create a public key from bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, KeyPairError> {
        let key = VerifyingKey::from_bytes(bytes)
            .map_err(|_| KeyPairError::InvalidPublicKey)?;
        Ok(Self { key })
    }

    /// Create a public key from its hex form
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyPairError> {
        let bytes = hex::decode(hex_str).map_err(|_| KeyPairError::InvalidPublicKey)?;
        let array: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyPairError::InvalidPublicKey)?;
        Self::from_bytes(&array)
    }

    /// Get the public key bytes
    pub fn as_bytes(&self) -> [u8; 32] {
        self.key.to_bytes()
    }

    /// Verify a signature on a message
    pub fn verify(&self, message: &[u8], signature: &[u8; 64]) -> bool {
        self.key
            .verify(message, &Signature::from_bytes(signature))
            .is_ok()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.as_bytes()))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.as_bytes()))
    }
}

/// Errors related to keypair operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyPairError {
    #[error("Invalid secret key")]
    InvalidSecretKey,

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Secret key does not match its embedded public key")]
    PublicKeyMismatch,
}

// Custom serde for VerifyingKey
mod public_key_serde {
    use ed25519_dalek::VerifyingKey;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(key: &VerifyingKey, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        key.to_bytes().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<VerifyingKey, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes: [u8; 32] = Deserialize::deserialize(deserializer)?;
        VerifyingKey::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_from_bytes() {
        let keypair1 = KeyPair::generate();
        let secret = keypair1.secret_bytes();

        let keypair2 = KeyPair::from_secret_bytes(&secret).unwrap();
        assert_eq!(keypair1.public_bytes(), keypair2.public_bytes());
    }

    #[test]
    fn test_keypair_from_seed_hex() {
        let keypair = KeyPair::generate();
        let parsed = KeyPair::from_hex(&hex::encode(keypair.secret_bytes())).unwrap();
        assert_eq!(parsed.public_bytes(), keypair.public_bytes());
    }

    #[test]
    fn test_keypair_from_expanded_hex() {
        let keypair = KeyPair::generate();
        let mut expanded = keypair.secret_bytes().to_vec();
        expanded.extend_from_slice(&keypair.public_bytes());

        let parsed = KeyPair::from_hex(&hex::encode(&expanded)).unwrap();
        assert_eq!(parsed.public_bytes(), keypair.public_bytes());

        // Tampered public half is rejected
        expanded[63] ^= 0x01;
        assert_eq!(
            KeyPair::from_hex(&hex::encode(&expanded)).unwrap_err(),
            KeyPairError::PublicKeyMismatch
        );
    }

    #[test]
    fn test_keypair_rejects_bad_hex() {
        assert!(KeyPair::from_hex("zz").is_err());
        assert!(KeyPair::from_hex(&"ab".repeat(16)).is_err());
    }

    #[test]
    fn test_sign_and_verify() {
        let keypair = KeyPair::generate();
        let message = b"master node ping";

        let signature = keypair.sign(message);
        assert!(keypair.verify(message, &signature));
        assert!(keypair.public_key().verify(message, &signature));

        // Wrong message should fail
        assert!(!keypair.verify(b"Wrong message", &signature));
    }

    #[test]
    fn test_public_key_hex() {
        let keypair = KeyPair::generate();
        let public_key = keypair.public_key();

        let parsed = PublicKey::from_hex(&public_key.to_string()).unwrap();
        assert_eq!(parsed, public_key);
        assert!(PublicKey::from_hex("abcd").is_err());
    }

    #[test]
    fn test_public_key_serialization() {
        let keypair = KeyPair::generate();
        let public_key = keypair.public_key();

        let serialized = bincode::serialize(&public_key).unwrap();
        let deserialized: PublicKey = bincode::deserialize(&serialized).unwrap();

        assert_eq!(public_key, deserialized);
    }
}
