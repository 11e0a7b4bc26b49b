mod key;

pub use key::DhtKey;
