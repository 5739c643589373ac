pub mod error;
pub mod model;
pub mod utils;

pub use error::{RoomIdError, SignalFormatError};
pub use model::*;
