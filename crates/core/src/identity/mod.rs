mod keypair;
mod router_id;

pub use keypair::{KeyPair, KeyPairError, PublicKey};
pub use router_id::RouterId;
