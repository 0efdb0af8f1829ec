pub mod commands;
pub mod progress;
pub mod scan;
pub mod targets;

pub use commands::{Cli, Commands};
