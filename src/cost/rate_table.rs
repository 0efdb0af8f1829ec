use std::collections::HashMap;

use crate::config::{RateEntry, RateUnit};
use crate::models::ResourceKind;

/// Region key that matches any region.
pub const ANY_REGION: &str = "*";

const HOURS_PER_MONTH: f64 = 730.0;

/// On-demand hourly list prices used when the config has no matching row.
const BUILTIN_HOURLY: &[(ResourceKind, &str, f64)] = &[
    (ResourceKind::Compute, "t2.micro", 0.0116),
    (ResourceKind::Compute, "t2.small", 0.023),
    (ResourceKind::Compute, "t2.medium", 0.0464),
    (ResourceKind::Compute, "t3.micro", 0.0104),
    (ResourceKind::Compute, "t3.small", 0.0208),
    (ResourceKind::Compute, "t3.medium", 0.0416),
    (ResourceKind::Compute, "m5.large", 0.096),
    (ResourceKind::Compute, "m5.xlarge", 0.192),
    (ResourceKind::Database, "db.t3.micro", 0.017),
    (ResourceKind::Database, "db.t3.small", 0.034),
    (ResourceKind::Database, "db.t3.medium", 0.068),
    (ResourceKind::Database, "db.m5.large", 0.192),
    (ResourceKind::Database, "db.m5.xlarge", 0.384),
];

/// Monthly per-GB block storage prices.
const BUILTIN_PER_GB: &[(&str, f64)] = &[
    ("gp2", 0.10),
    ("gp3", 0.08),
    ("io1", 0.125),
    ("io2", 0.125),
    ("st1", 0.045),
    ("sc1", 0.025),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rate {
    pub monthly_cost: f64,
    pub unit: RateUnit,
}

/// Monthly unit costs keyed by (region, kind, size attribute), over an
/// optional region-independent built-in layer.
#[derive(Debug, Clone, Default)]
pub struct RateTable {
    rates: HashMap<(String, ResourceKind, String), Rate>,
    builtin: HashMap<(ResourceKind, String), Rate>,
}

impl RateTable {
    /// Configured entries only. Later entries for the same key replace
    /// earlier ones.
    pub fn from_entries(entries: &[RateEntry]) -> Self {
        let rates = entries
            .iter()
            .map(|e| {
                (
                    (e.region.clone(), e.kind, e.size.clone()),
                    Rate { monthly_cost: e.monthly_cost, unit: e.unit },
                )
            })
            .collect();
        Self { rates, builtin: HashMap::new() }
    }

    /// Configured entries layered over the built-in price list.
    pub fn with_builtin(entries: &[RateEntry]) -> Self {
        let mut table = Self::from_entries(entries);
        table.builtin = builtin_rates();
        table
    }

    /// Exact region first, then the `*` row, then the built-in price.
    pub fn lookup(&self, region: &str, kind: ResourceKind, size: &str) -> Option<Rate> {
        self.rates
            .get(&(region.to_string(), kind, size.to_string()))
            .or_else(|| self.rates.get(&(ANY_REGION.to_string(), kind, size.to_string())))
            .or_else(|| self.builtin.get(&(kind, size.to_string())))
            .copied()
    }

    /// Configured rows, not counting built-in prices.
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

fn builtin_rates() -> HashMap<(ResourceKind, String), Rate> {
    let hourly = BUILTIN_HOURLY.iter().map(|(kind, size, hourly)| {
        (
            (*kind, size.to_string()),
            Rate { monthly_cost: hourly * HOURS_PER_MONTH, unit: RateUnit::Resource },
        )
    });
    let per_gb = BUILTIN_PER_GB.iter().map(|(volume_type, price)| {
        (
            (ResourceKind::BlockStorage, volume_type.to_string()),
            Rate { monthly_cost: *price, unit: RateUnit::Gb },
        )
    });
    hourly.chain(per_gb).collect()
}
