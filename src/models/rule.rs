use serde::{Deserialize, Serialize};

use super::metric::{MetricSample, MetricWindow, Statistic};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Below,
    Above,
}

impl Comparison {
    pub fn breached(&self, observed: f64, limit: f64) -> bool {
        match self {
            Self::Below => observed < limit,
            Self::Above => observed > limit,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Below => "below",
            Self::Above => "above",
        }
    }
}

/// How in-window samples are reduced to the single observed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    #[default]
    Mean,
    Max,
    /// Sum of all samples divided by the window length in days.
    DailySum,
}

impl Aggregate {
    pub fn apply(&self, samples: &[MetricSample], window: &MetricWindow) -> Option<f64> {
        if samples.is_empty() {
            return None;
        }
        let values = samples.iter().map(|s| s.value);
        match self {
            Self::Mean => Some(values.sum::<f64>() / samples.len() as f64),
            Self::Max => values.reduce(f64::max),
            Self::DailySum => {
                let days = window.days();
                if days <= 0.0 {
                    None
                } else {
                    Some(values.sum::<f64>() / days)
                }
            }
        }
    }
}

fn default_coverage() -> f64 {
    0.5
}

fn default_savings_ratio() -> f64 {
    1.0
}

/// A configured comparison of a metric against a limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    /// Stable identifier reported as `rule_triggered`; derived from the
    /// metric and comparison when omitted.
    #[serde(default)]
    pub name: Option<String>,
    pub metric_name: String,
    pub comparison: Comparison,
    pub limit: f64,
    #[serde(default)]
    pub statistic: Statistic,
    #[serde(default)]
    pub aggregate: Aggregate,
    /// Overrides the kind's `days_to_check` for this rule.
    #[serde(default)]
    pub evaluation_window_days: Option<u32>,
    #[serde(default = "default_coverage")]
    pub required_sample_coverage: f64,
    /// Share of the resource's monthly cost recovered by acting on the finding.
    #[serde(default = "default_savings_ratio")]
    pub savings_ratio: f64,
}

impl ThresholdRule {
    pub fn new(name: &str, metric_name: &str, comparison: Comparison, limit: f64) -> Self {
        Self {
            name: Some(name.to_string()),
            metric_name: metric_name.to_string(),
            comparison,
            limit,
            statistic: Statistic::default(),
            aggregate: Aggregate::default(),
            evaluation_window_days: None,
            required_sample_coverage: default_coverage(),
            savings_ratio: default_savings_ratio(),
        }
    }

    pub fn with_statistic(mut self, statistic: Statistic) -> Self {
        self.statistic = statistic;
        self
    }

    pub fn with_aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregate = aggregate;
        self
    }

    pub fn with_savings_ratio(mut self, ratio: f64) -> Self {
        self.savings_ratio = ratio;
        self
    }

    pub fn with_coverage(mut self, coverage: f64) -> Self {
        self.required_sample_coverage = coverage;
        self
    }

    pub fn id(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{}_{}", self.metric_name, self.comparison.as_str()),
        }
    }

    pub fn window_days(&self, kind_default: u32) -> u32 {
        self.evaluation_window_days.unwrap_or(kind_default)
    }
}
