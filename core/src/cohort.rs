//! Cohort retention: customers grouped by first-purchase month and
//! tracked across later calendar months.

use crate::{
    metrics::{customer_totals, round_to},
    snapshot::TransactionSnapshot,
    types::YearMonth,
};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq)]
pub struct CohortEntry {
    pub cohort_month: YearMonth,
    /// Distinct customers whose first transaction fell in `cohort_month`.
    pub size:         usize,
    /// Period offset → percent of `size` active in that month, one decimal.
    pub retention:    BTreeMap<u32, f64>,
}

impl CohortEntry {
    pub fn retention_at(&self, offset: u32) -> f64 {
        self.retention.get(&offset).copied().unwrap_or(0.0)
    }
}

/// Serialized flat: `{"cohort": "2023-01", "size": 2, "month_0": 100.0, ...}`.
impl Serialize for CohortEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.retention.len() + 2))?;
        map.serialize_entry("cohort", &self.cohort_month)?;
        map.serialize_entry("size", &self.size)?;
        for (offset, pct) in &self.retention {
            map.serialize_entry(&period_head(*offset), pct)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CohortReport {
    pub retention: Vec<CohortEntry>,
    /// Column names `month_0..=month_max` over every cohort.
    pub heads:     Vec<String>,
}

pub fn period_head(offset: u32) -> String {
    format!("month_{offset}")
}

pub fn cohort_retention(snapshot: &TransactionSnapshot) -> CohortReport {
    let first_month: BTreeMap<String, YearMonth> = customer_totals(snapshot)
        .into_iter()
        .map(|(name, t)| (name, YearMonth::from_date(t.first_purchase)))
        .collect();

    // (cohort, offset) → distinct active customers
    let mut active: BTreeMap<(YearMonth, u32), BTreeSet<&str>> = BTreeMap::new();
    for record in snapshot.iter() {
        let Some(&cohort) = first_month.get(&record.customer_name) else {
            continue;
        };
        // the cohort month is the customer's earliest, so the offset is never negative
        let offset = cohort.months_until(record.month()).max(0) as u32;
        active
            .entry((cohort, offset))
            .or_default()
            .insert(record.customer_name.as_str());
    }

    let Some(max_offset) = active.keys().map(|(_, offset)| *offset).max() else {
        return CohortReport {
            retention: Vec::new(),
            heads:     vec![period_head(0)],
        };
    };

    let cohorts: BTreeSet<YearMonth> = active.keys().map(|(cohort, _)| *cohort).collect();

    let retention = cohorts
        .into_iter()
        .map(|cohort| {
            let count_at = |offset: u32| active.get(&(cohort, offset)).map_or(0, |s| s.len());
            let size = count_at(0);
            let retention = (0..=max_offset)
                .map(|offset| {
                    let pct = if size > 0 {
                        round_to(100.0 * count_at(offset) as f64 / size as f64, 1)
                    } else {
                        0.0
                    };
                    (offset, pct)
                })
                .collect();
            CohortEntry { cohort_month: cohort, size, retention }
        })
        .collect::<Vec<_>>();

    log::debug!(
        "cohort: {} cohorts, max offset {max_offset}",
        retention.len()
    );

    CohortReport {
        retention,
        heads: (0..=max_offset).map(period_head).collect(),
    }
}
