mod file_transfer;
mod protocol;
mod queue;

pub use file_transfer::*;
pub use protocol::*;
pub use queue::*;
