//! trainwatch - supervise a training process and chart its loss live.

pub mod config;
pub mod display;
pub mod render;
pub mod supervisor;
pub mod trainer;
