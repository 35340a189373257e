//! Supervisor module: shared progress state and run orchestration.

mod runner;
mod store;

pub use runner::*;
pub use store::*;
