//! Trainer module: process spawning, line protocol and stream reading.

mod events;
mod process;
mod stream;

pub use events::*;
pub use process::*;
pub use stream::*;
