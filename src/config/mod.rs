//! Configuration module.

mod types;

pub use types::*;
