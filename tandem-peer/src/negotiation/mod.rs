mod session;
mod signal_sink;
mod state;

pub use session::*;
pub use signal_sink::*;
pub use state::*;
