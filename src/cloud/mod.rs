pub mod client;
pub mod emulated;
pub mod pool;

pub use client::{
    ClientFactory, ClientKey, CloudApi, MetricDataPage, MetricDataRequest, ResourcePage, METRICS_SERVICE,
};
pub use emulated::{EmulatedCloud, Fault, FaultEffect, Fixture, FixtureResource, MetricSeries, Operation};
pub use pool::ClientPool;
