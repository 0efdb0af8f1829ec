pub mod gateway;

pub use gateway::{MetricQuery, MetricsGateway};
