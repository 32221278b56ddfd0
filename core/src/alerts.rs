//! Alert rule evaluation.
//!
//! RULE: evaluation is stateless. Every run re-evaluates every active
//! rule against the current snapshot and re-emits for every rule that
//! holds, whether or not it fired on a previous run.

use crate::{
    churn::{high_risk_count, ChurnReport},
    error::{EngineError, EngineResult},
    metrics::{active_customer_count, current_month_revenue},
    snapshot::TransactionSnapshot,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type RuleId = i64;

// ── Rule definitions ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertMetric {
    /// Revenue in the calendar month of the latest transaction.
    Mrr,
    /// Distinct customers in the snapshot.
    ActiveCustomers,
    /// Customers classified High risk.
    ChurnRisk,
}

impl AlertMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mrr             => "mrr",
            Self::ActiveCustomers => "active_customers",
            Self::ChurnRisk       => "churn_risk",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "mrr"              => Some(Self::Mrr),
            "active_customers" => Some(Self::ActiveCustomers),
            "churn_risk"       => Some(Self::ChurnRisk),
            _                  => None,
        }
    }
}

impl fmt::Display for AlertMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "<")]
    LessThan,
}

impl Condition {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::GreaterThan => ">",
            Self::LessThan    => "<",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            ">" => Some(Self::GreaterThan),
            "<" => Some(Self::LessThan),
            _   => None,
        }
    }

    /// Strict comparison; equality never triggers.
    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThan => value > threshold,
            Self::LessThan    => value < threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id:        RuleId,
    pub name:      String,
    pub metric:    AlertMetric,
    pub condition: Condition,
    pub threshold: f64,
    pub is_active: bool,
}

/// A rule as stored by the rule-management collaborator, metric and
/// condition still free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAlertRule {
    pub id:        RuleId,
    pub name:      String,
    pub metric:    String,
    pub condition: String,
    pub threshold: f64,
    pub is_active: bool,
}

impl TryFrom<RawAlertRule> for AlertRule {
    type Error = EngineError;

    fn try_from(raw: RawAlertRule) -> Result<Self, Self::Error> {
        let metric = AlertMetric::parse(&raw.metric).ok_or_else(|| EngineError::InvalidRule {
            rule_id: raw.id,
            reason:  format!("unknown metric '{}'", raw.metric),
        })?;
        let condition = Condition::parse(&raw.condition).ok_or_else(|| EngineError::InvalidRule {
            rule_id: raw.id,
            reason:  format!("unknown condition '{}'", raw.condition),
        })?;
        if !raw.threshold.is_finite() {
            return Err(EngineError::InvalidRule {
                rule_id: raw.id,
                reason:  format!("threshold {} is not finite", raw.threshold),
            });
        }
        Ok(Self {
            id: raw.id,
            name: raw.name,
            metric,
            condition,
            threshold: raw.threshold,
            is_active: raw.is_active,
        })
    }
}

impl From<&AlertRule> for RawAlertRule {
    fn from(rule: &AlertRule) -> Self {
        Self {
            id:        rule.id,
            name:      rule.name.clone(),
            metric:    rule.metric.as_str().to_string(),
            condition: rule.condition.symbol().to_string(),
            threshold: rule.threshold,
            is_active: rule.is_active,
        }
    }
}

// ── Events ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info     => "info",
            Self::Warning  => "warning",
            Self::Critical => "critical",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "info"     => Some(Self::Info),
            "warning"  => Some(Self::Warning),
            "critical" => Some(Self::Critical),
            _          => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Assigned by the sink on append.
    pub id:        Option<i64>,
    pub rule_id:   RuleId,
    pub timestamp: NaiveDateTime,
    pub message:   String,
    pub severity:  Severity,
    pub is_read:   bool,
}

/// Append-only destination for alert events.
pub trait AlertSink {
    /// Append `events` in one batch and return them with ids assigned.
    fn append_alerts(&mut self, events: &[AlertEvent]) -> EngineResult<Vec<AlertEvent>>;
}

impl AlertSink for Vec<AlertEvent> {
    fn append_alerts(&mut self, events: &[AlertEvent]) -> EngineResult<Vec<AlertEvent>> {
        let mut stored = Vec::with_capacity(events.len());
        for event in events {
            let mut event = event.clone();
            event.id = Some(self.len() as i64 + 1);
            self.push(event.clone());
            stored.push(event);
        }
        Ok(stored)
    }
}

// ── Evaluation ───────────────────────────────────────────────────────────────

/// Current values for every alertable metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricValues {
    pub mrr:                 f64,
    pub active_customers:    usize,
    pub high_risk_customers: usize,
}

impl MetricValues {
    pub fn compute(snapshot: &TransactionSnapshot, churn: &ChurnReport) -> Self {
        Self {
            mrr:                 current_month_revenue(snapshot),
            active_customers:    active_customer_count(snapshot),
            high_risk_customers: high_risk_count(churn),
        }
    }

    pub fn value(&self, metric: AlertMetric) -> f64 {
        match metric {
            AlertMetric::Mrr             => self.mrr,
            AlertMetric::ActiveCustomers => self.active_customers as f64,
            AlertMetric::ChurnRisk       => self.high_risk_customers as f64,
        }
    }

    fn render(&self, metric: AlertMetric) -> String {
        match metric {
            AlertMetric::Mrr             => format!("{:.2}", self.mrr),
            AlertMetric::ActiveCustomers => self.active_customers.to_string(),
            AlertMetric::ChurnRisk       => self.high_risk_customers.to_string(),
        }
    }
}

/// Build one event for every active rule whose condition holds.
/// No active rules or an empty snapshot yields no events.
pub fn evaluate_rules(
    rules: &[AlertRule],
    snapshot: &TransactionSnapshot,
    churn: &ChurnReport,
    now: NaiveDateTime,
) -> Vec<AlertEvent> {
    let active: Vec<&AlertRule> = rules.iter().filter(|r| r.is_active).collect();
    if active.is_empty() || snapshot.is_empty() {
        return Vec::new();
    }

    let values = MetricValues::compute(snapshot, churn);

    active
        .into_iter()
        .filter(|rule| rule.condition.holds(values.value(rule.metric), rule.threshold))
        .map(|rule| AlertEvent {
            id:        None,
            rule_id:   rule.id,
            timestamp: now,
            message:   format!(
                "Alert Triggered: {}. Current {}: {} {} {}",
                rule.name,
                rule.metric,
                values.render(rule.metric),
                rule.condition.symbol(),
                rule.threshold
            ),
            severity:  Severity::Warning,
            is_read:   false,
        })
        .collect()
}

pub struct AlertRuleEvaluator;

impl AlertRuleEvaluator {
    /// Evaluate and append to `sink`; returns the stored events.
    pub fn run(
        sink: &mut dyn AlertSink,
        rules: &[AlertRule],
        snapshot: &TransactionSnapshot,
        churn: &ChurnReport,
        now: NaiveDateTime,
    ) -> EngineResult<Vec<AlertEvent>> {
        let events = evaluate_rules(rules, snapshot, churn, now);
        if events.is_empty() {
            return Ok(events);
        }
        let stored = sink.append_alerts(&events)?;
        for event in &stored {
            log::info!("alerts: rule={} fired: {}", event.rule_id, event.message);
        }
        Ok(stored)
    }
}
