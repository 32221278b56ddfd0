//! Metric aggregation: revenue, customer and period roll-ups.
//!
//! Every function here is a pure function of the snapshot plus its
//! parameters. An empty snapshot yields empty or zero-valued results.
//! Grouping uses BTreeMaps so output order never depends on hashing.

use crate::{
    churn::{ChurnAssessment, RiskLevel},
    snapshot::{TransactionRecord, TransactionSnapshot},
    types::{CustomerName, YearMonth},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyRevenuePoint {
    pub month:   YearMonth,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRevenuePoint {
    pub date:  NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRevenue {
    pub customer_name: CustomerName,
    pub revenue:       f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRevenue {
    pub name:  String,
    pub value: f64,
}

/// Per-customer totals over the whole snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerTotals {
    pub revenue:           f64,
    pub transaction_count: usize,
    pub first_purchase:    NaiveDate,
    pub last_purchase:     NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueStats {
    pub total_revenue:   f64,
    pub monthly_revenue: Vec<MonthlyRevenuePoint>,
    pub top_customers:   Vec<CustomerRevenue>,
}

/// Dashboard comparison window. The previous window has the same length
/// and ends where the current one starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "7d")]
    Days7,
    #[serde(rename = "30d")]
    Days30,
    #[serde(rename = "90d")]
    Days90,
    #[serde(rename = "12m")]
    Months12,
}

impl TimeRange {
    /// Unrecognised ranges fall back to 30 days.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "7d"  => Self::Days7,
            "90d" => Self::Days90,
            "12m" => Self::Months12,
            _     => Self::Days30,
        }
    }

    pub fn days(&self) -> i64 {
        match self {
            Self::Days7    => 7,
            Self::Days30   => 30,
            Self::Days90   => 90,
            Self::Months12 => 365,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodMetrics {
    /// Revenue inside the current window.
    pub mrr:                 f64,
    pub active_customers:    usize,
    pub arpu:                f64,
    /// Percent change versus the previous window, two decimals.
    pub growth_rate:         f64,
    pub category_split:      Vec<CategoryRevenue>,
    pub recent_transactions: Vec<TransactionRecord>,
    pub sparkline:           Vec<DailyRevenuePoint>,
}

impl PeriodMetrics {
    fn empty() -> Self {
        Self {
            mrr:                 0.0,
            active_customers:    0,
            arpu:                0.0,
            growth_rate:         0.0,
            category_split:      Vec::new(),
            recent_transactions: Vec::new(),
            sparkline:           Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerSummary {
    pub name:          CustomerName,
    pub total_revenue: f64,
    pub last_purchase: NaiveDate,
    pub transactions:  usize,
    pub recency:       i64,
    pub status:        CustomerStatus,
    pub churn_risk:    RiskLevel,
    pub churn_factors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerStatus {
    Active,
    Inactive,
}

// ── Whole-snapshot aggregates ────────────────────────────────────────────────

pub fn total_revenue(snapshot: &TransactionSnapshot) -> f64 {
    snapshot.iter().map(|r| r.amount).sum()
}

pub fn customer_totals(snapshot: &TransactionSnapshot) -> BTreeMap<CustomerName, CustomerTotals> {
    let mut totals: BTreeMap<CustomerName, CustomerTotals> = BTreeMap::new();
    for record in snapshot.iter() {
        totals
            .entry(record.customer_name.clone())
            .and_modify(|t| {
                t.revenue += record.amount;
                t.transaction_count += 1;
                t.first_purchase = t.first_purchase.min(record.date);
                t.last_purchase = t.last_purchase.max(record.date);
            })
            .or_insert(CustomerTotals {
                revenue:           record.amount,
                transaction_count: 1,
                first_purchase:    record.date,
                last_purchase:     record.date,
            });
    }
    totals
}

/// Top `n` customers by summed amount; ties break on name.
pub fn top_customers(snapshot: &TransactionSnapshot, n: usize) -> Vec<CustomerRevenue> {
    let mut ranked: Vec<CustomerRevenue> = customer_totals(snapshot)
        .into_iter()
        .map(|(customer_name, t)| CustomerRevenue { customer_name, revenue: t.revenue })
        .collect();
    ranked.sort_by(|a, b| {
        b.revenue
            .total_cmp(&a.revenue)
            .then_with(|| a.customer_name.cmp(&b.customer_name))
    });
    ranked.truncate(n);
    ranked
}

/// Revenue per calendar month from the first to the last active month.
/// Months without transactions are emitted with zero revenue.
pub fn monthly_revenue(snapshot: &TransactionSnapshot) -> Vec<MonthlyRevenuePoint> {
    let mut by_month: BTreeMap<YearMonth, f64> = BTreeMap::new();
    for record in snapshot.iter() {
        *by_month.entry(record.month()).or_insert(0.0) += record.amount;
    }

    let (Some(&first), Some(&last)) = (by_month.keys().next(), by_month.keys().next_back()) else {
        return Vec::new();
    };

    let mut points = Vec::with_capacity((first.months_until(last) + 1) as usize);
    let mut month = first;
    while month <= last {
        points.push(MonthlyRevenuePoint {
            month,
            revenue: by_month.get(&month).copied().unwrap_or(0.0),
        });
        month = month.succ();
    }
    points
}

pub fn revenue_stats(snapshot: &TransactionSnapshot, top_n: usize) -> RevenueStats {
    RevenueStats {
        total_revenue:   total_revenue(snapshot),
        monthly_revenue: monthly_revenue(snapshot),
        top_customers:   top_customers(snapshot, top_n),
    }
}

/// Revenue in the calendar month of the latest transaction.
pub fn current_month_revenue(snapshot: &TransactionSnapshot) -> f64 {
    let Some(latest) = snapshot.max_date() else {
        return 0.0;
    };
    let current = YearMonth::from_date(latest);
    snapshot
        .iter()
        .filter(|r| r.month() == current)
        .map(|r| r.amount)
        .sum()
}

pub fn active_customer_count(snapshot: &TransactionSnapshot) -> usize {
    snapshot
        .iter()
        .map(|r| r.customer_name.as_str())
        .collect::<BTreeSet<_>>()
        .len()
}

// ── Windowed metrics ─────────────────────────────────────────────────────────

/// One point per day in `[start, end]`; days without activity are zero.
pub fn daily_revenue(
    snapshot: &TransactionSnapshot,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<DailyRevenuePoint> {
    if start > end {
        return Vec::new();
    }

    let mut by_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for record in snapshot.iter().filter(|r| r.date >= start && r.date <= end) {
        *by_day.entry(record.date).or_insert(0.0) += record.amount;
    }

    start
        .iter_days()
        .take_while(|d| *d <= end)
        .map(|date| DailyRevenuePoint {
            date,
            value: by_day.get(&date).copied().unwrap_or(0.0),
        })
        .collect()
}

/// Current-vs-previous window metrics anchored at the latest transaction.
/// Windows are half-open on the left: `(anchor - days, anchor]`.
pub fn period_metrics(
    snapshot: &TransactionSnapshot,
    range: TimeRange,
    recent_limit: usize,
) -> PeriodMetrics {
    let Some(anchor) = snapshot.max_date() else {
        return PeriodMetrics::empty();
    };

    let window = chrono::Duration::days(range.days());
    let start = anchor - window;
    let prev_start = start - window;

    let current: Vec<&TransactionRecord> = snapshot
        .iter()
        .filter(|r| r.date > start && r.date <= anchor)
        .collect();
    let prev_revenue: f64 = snapshot
        .iter()
        .filter(|r| r.date > prev_start && r.date <= start)
        .map(|r| r.amount)
        .sum();

    let mrr: f64 = current.iter().map(|r| r.amount).sum();
    let growth_rate = if prev_revenue > 0.0 {
        round_to(((mrr - prev_revenue) / prev_revenue) * 100.0, 2)
    } else {
        0.0
    };

    let active_customers = current
        .iter()
        .map(|r| r.customer_name.as_str())
        .collect::<BTreeSet<_>>()
        .len();
    let arpu = if active_customers > 0 {
        mrr / active_customers as f64
    } else {
        0.0
    };

    let mut by_category: BTreeMap<&str, f64> = BTreeMap::new();
    for record in &current {
        *by_category.entry(record.category.as_str()).or_insert(0.0) += record.amount;
    }
    let category_split = by_category
        .into_iter()
        .map(|(name, value)| CategoryRevenue { name: name.to_string(), value })
        .collect();

    let mut recent: Vec<&TransactionRecord> = snapshot.iter().collect();
    recent.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.id.cmp(&a.id)));
    let recent_transactions = recent.into_iter().take(recent_limit).cloned().collect();

    // The anchor row always falls in the current window, so `current` is non-empty.
    let sparkline_start = current.iter().map(|r| r.date).min().unwrap_or(anchor);
    let sparkline = daily_revenue(snapshot, sparkline_start, anchor);

    log::debug!(
        "metrics: range={}d mrr={mrr:.2} prev={prev_revenue:.2} active={active_customers}",
        range.days()
    );

    PeriodMetrics {
        mrr,
        active_customers,
        arpu,
        growth_rate,
        category_split,
        recent_transactions,
        sparkline,
    }
}

// ── Customer listing ─────────────────────────────────────────────────────────

/// Customer roster sorted by total revenue, joined with churn output.
/// Recency is measured against the snapshot's latest transaction date,
/// the same reference the churn classifier uses.
pub fn customer_summaries(
    snapshot: &TransactionSnapshot,
    churn: &BTreeMap<CustomerName, ChurnAssessment>,
    inactive_after_days: i64,
) -> Vec<CustomerSummary> {
    let Some(reference) = snapshot.max_date() else {
        return Vec::new();
    };

    let mut summaries: Vec<CustomerSummary> = customer_totals(snapshot)
        .into_iter()
        .map(|(name, totals)| {
            let recency = (reference - totals.last_purchase).num_days();
            let (churn_risk, churn_factors) = match churn.get(&name) {
                Some(a) => (a.risk, a.factors.clone()),
                None    => (RiskLevel::Unknown, vec!["Insufficient data".to_string()]),
            };
            CustomerSummary {
                total_revenue: totals.revenue,
                last_purchase: totals.last_purchase,
                transactions:  totals.transaction_count,
                recency,
                status: if recency <= inactive_after_days {
                    CustomerStatus::Active
                } else {
                    CustomerStatus::Inactive
                },
                churn_risk,
                churn_factors,
                name,
            }
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.total_revenue
            .total_cmp(&a.total_revenue)
            .then_with(|| a.name.cmp(&b.name))
    });
    summaries
}

/// One customer's transactions, newest first.
pub fn customer_transactions(snapshot: &TransactionSnapshot, name: &str) -> Vec<TransactionRecord> {
    let mut rows: Vec<TransactionRecord> = snapshot
        .iter()
        .filter(|r| r.customer_name == name)
        .cloned()
        .collect();
    rows.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.id.cmp(&a.id)));
    rows
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
