pub use tandem_core::{RoomId, SessionId};

pub mod model {
    pub use tandem_core::model::*;
    pub use tandem_core::utils::{CHUNK_SIZE, CONTROL_CHANNEL_ID, CONTROL_CHANNEL_LABEL, DEFAULT_STUN_ADDR};
}

#[cfg(feature = "server")]
pub mod server {
    pub use tandem_server::*;
}

#[cfg(feature = "client")]
pub mod client {
    pub use tandem_peer::*;
}
