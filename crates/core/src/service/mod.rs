/// .bdx service naming
///
/// - Service addresses and address classification
/// - LNS records: name hashes and encrypted name → address mappings

pub mod address;
pub mod lns;

pub use address::{parse_address, AddressError, ParsedAddress, ServiceAddress};
pub use lns::{is_valid_name, name_hash, EncryptedName, LnsError};
