pub mod base32;
pub mod dht;
pub mod dns;
pub mod identity;
pub mod rpc;
pub mod service;

pub use identity::{KeyPair, KeyPairError, PublicKey, RouterId};

// Re-export addressing types
pub use dht::DhtKey;
pub use service::{
    is_valid_name, name_hash, parse_address, AddressError, EncryptedName, LnsError,
    ParsedAddress, ServiceAddress,
};

// Re-export DNS types
pub use dns::{decode_name, encode_name, DnsError, Question, WireBuffer};

// Re-export directory client types
pub use rpc::{
    ConnectionId, DirectoryClient, DirectoryError, DisconnectHandler, FramedTransport, InboundHandler,
    MessageTransport, Router,
};
