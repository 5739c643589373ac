mod config;
mod control;
mod error;
mod negotiation;
mod peer;
mod signaling;
mod transport;

pub use config::*;
pub use control::*;
pub use error::*;
pub use negotiation::*;
pub use peer::*;
pub use signaling::*;
pub use transport::*;
