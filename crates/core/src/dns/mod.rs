/// DNS wire support for the resolver front end
///
/// - A fixed-capacity cursor buffer
/// - The domain-name label codec, with compression pointers on decode
/// - The question record and the name classification helpers the
///   resolver uses to route queries

pub mod buffer;
pub mod name;
pub mod question;

pub use buffer::WireBuffer;
pub use name::{decode_name, encode_name};
pub use question::Question;

pub const QTYPE_A: u16 = 1;
pub const QTYPE_NS: u16 = 2;
pub const QTYPE_CNAME: u16 = 5;
pub const QTYPE_PTR: u16 = 12;
pub const QTYPE_MX: u16 = 15;
pub const QTYPE_TXT: u16 = 16;
pub const QTYPE_AAAA: u16 = 28;
pub const QTYPE_SRV: u16 = 33;

pub const QCLASS_IN: u16 = 1;

/// DNS wire and question errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DnsError {
    #[error("Buffer full: need {needed} bytes, {remaining} remaining")]
    BufferFull { needed: usize, remaining: usize },

    #[error("Truncated input: need {needed} bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("Empty label in name")]
    EmptyLabel,

    #[error("Label too long: {0} bytes (max 63)")]
    LabelTooLong(usize),

    #[error("Name too long: {0} bytes on the wire (max 255)")]
    NameTooLong(usize),

    #[error("Label is not valid UTF-8")]
    InvalidLabel,

    #[error("Reserved label type 0x{0:02x}")]
    ReservedLabelType(u8),

    #[error("Compression pointer to offset {0} does not point backwards")]
    BadPointer(usize),

    #[error("Too many compression pointers")]
    PointerLoop,

    #[error("Question name cannot be empty")]
    EmptyName,
}
