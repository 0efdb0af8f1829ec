pub mod cli;
pub mod cloud;
pub mod config;
pub mod cost;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod reporting;
pub mod scanners;
pub mod session;
pub mod utils;

pub use errors::IdlescanError;
pub use pipeline::ScanOrchestrator;
