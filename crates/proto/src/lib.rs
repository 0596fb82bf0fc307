//! Protocol types for the thermabox web interface.

mod enc;
mod evt;
mod limits;
mod state;
mod temp;

pub use enc::*;
pub use evt::*;
pub use limits::*;
pub use state::*;
pub use temp::*;
