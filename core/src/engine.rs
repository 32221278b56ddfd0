//! The analytics engine: one full run over a transaction snapshot.
//!
//! EXECUTION ORDER (fixed):
//!   1. Metric aggregation   (dashboard stats)
//!   2. Churn classification
//!   3. Revenue forecast
//!   4. Cohort retention
//!   5. Alert evaluation     (reads 1 + 2, appends to the sink)
//!
//! RULES:
//!   - Every run recomputes everything from the snapshot it is given.
//!   - Nothing is cached between runs.
//!   - All randomness flows through the RngBank seeded from config.

use crate::{
    alerts::{AlertEvent, AlertRule, AlertRuleEvaluator, AlertSink},
    churn::{high_risk_count, ChurnReport, ChurnRiskClassifier, ClassificationPath},
    cohort::{cohort_retention, CohortReport},
    config::EngineConfig,
    error::EngineResult,
    forecast::{ForecastResult, RevenueForecaster},
    metrics::{customer_summaries, revenue_stats, CustomerSummary, RevenueStats},
    snapshot::TransactionSnapshot,
};
use chrono::NaiveDateTime;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineReport {
    pub stats:      RevenueStats,
    pub forecast:   ForecastResult,
    pub churn:      ChurnReport,
    pub churn_path: ClassificationPath,
    pub cohorts:    CohortReport,
    /// Events appended during this run only.
    pub alerts:     Vec<AlertEvent>,
}

pub struct AnalyticsEngine {
    config:     EngineConfig,
    classifier: ChurnRiskClassifier,
    forecaster: RevenueForecaster,
}

impl AnalyticsEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            classifier: ChurnRiskClassifier::new(config.churn_model.clone()),
            forecaster: RevenueForecaster::new(config.forecast.clone()),
            config,
        }
    }

    /// Engine with hardcoded defaults. Use in tests.
    pub fn build_test() -> Self {
        Self::new(EngineConfig::default_test())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn classifier(&self) -> &ChurnRiskClassifier {
        &self.classifier
    }

    pub fn forecaster(&self) -> &RevenueForecaster {
        &self.forecaster
    }

    /// Every derived output except alerts. Pure; no side effects.
    pub fn analyze(&self, snapshot: &TransactionSnapshot) -> EngineReport {
        let stats = revenue_stats(snapshot, self.config.metrics.top_customers);
        let (churn, churn_path) = self.classifier.classify_with_path(snapshot);
        let forecast = self.forecaster.forecast(snapshot);
        let cohorts = cohort_retention(snapshot);

        log::info!(
            "engine: {} transactions, {} customers ({} high risk, {:?}), {} months, {} cohorts",
            snapshot.len(),
            churn.len(),
            high_risk_count(&churn),
            churn_path,
            forecast.historical.len(),
            cohorts.retention.len(),
        );

        EngineReport {
            stats,
            forecast,
            churn,
            churn_path,
            cohorts,
            alerts: Vec::new(),
        }
    }

    /// Full run: analysis plus one alert evaluation appended to `sink`.
    pub fn run(
        &self,
        snapshot: &TransactionSnapshot,
        rules: &[AlertRule],
        sink: &mut dyn AlertSink,
        now: NaiveDateTime,
    ) -> EngineResult<EngineReport> {
        let mut report = self.analyze(snapshot);
        report.alerts = AlertRuleEvaluator::run(sink, rules, snapshot, &report.churn, now)?;
        if !report.alerts.is_empty() {
            log::info!("engine: {} alerts appended", report.alerts.len());
        }
        Ok(report)
    }

    /// Customer roster joined with a fresh churn classification.
    pub fn customers(&self, snapshot: &TransactionSnapshot) -> Vec<CustomerSummary> {
        let churn = self.classifier.classify(snapshot);
        customer_summaries(snapshot, &churn, self.config.metrics.inactive_after_days)
    }
}
