pub mod sync;
pub mod types;

pub use types::{EthProtocol, PeerRequestError, SnapProtocol};
