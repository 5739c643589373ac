mod channel;
mod control;
mod relay;
mod room;
mod session;
mod signaling;

pub use channel::{ChannelLabel, VideoFilter};
pub use control::{ControlMessage, Frame};
pub use relay::{ClientMessage, RelayMessage};
pub use room::RoomId;
pub use session::{ConnectionState, SessionId};
pub use signaling::{IceCandidate, IceServer, IceServerConfig, SdpType, SessionDescription, SignalMessage};
