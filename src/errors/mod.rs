pub mod types;
pub mod classification;
pub mod retry;

pub use types::IdlescanError;
pub use classification::ErrorClassification;
pub use retry::{BackoffPolicy, with_backoff};
