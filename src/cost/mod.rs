pub mod estimator;
pub mod rate_table;

pub use estimator::{CostEstimate, CostEstimator};
pub use rate_table::{Rate, RateTable, ANY_REGION};
