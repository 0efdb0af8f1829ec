pub mod aggregator;
pub mod formatter;

pub use aggregator::{AggregatedFindings, FindingAggregator};
pub use formatter::{format_finding_line, format_scan_summary};
