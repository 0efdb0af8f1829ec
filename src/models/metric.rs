use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One datapoint of a utilization time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub metric_name: String,
    pub value: f64,
}

/// Statistic requested from the metrics API for each period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Statistic {
    #[default]
    Average,
    Sum,
    Maximum,
    Minimum,
}

impl Statistic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Average => "Average",
            Self::Sum => "Sum",
            Self::Maximum => "Maximum",
            Self::Minimum => "Minimum",
        }
    }
}

/// Lookback window `[start, end]` sampled at a fixed period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub period_secs: u32,
}

impl MetricWindow {
    pub fn trailing_days(end: DateTime<Utc>, days: u32, period_secs: u32) -> Self {
        Self {
            start: end - Duration::days(i64::from(days)),
            end,
            period_secs: period_secs.max(1),
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }

    /// Number of datapoints a fully monitored resource reports in this window.
    pub fn expected_samples(&self) -> usize {
        let secs = (self.end - self.start).num_seconds().max(0) as u64;
        ((secs / u64::from(self.period_secs)) as usize).max(1)
    }

    pub fn days(&self) -> f64 {
        (self.end - self.start).num_seconds().max(0) as f64 / 86_400.0
    }

    /// Fraction of expected datapoints present among `samples`, capped at 1.
    pub fn coverage(&self, samples: &[MetricSample]) -> f64 {
        let present = samples.iter().filter(|s| self.contains(s.timestamp)).count();
        (present as f64 / self.expected_samples() as f64).min(1.0)
    }
}
