//! Churn risk classification: hybrid rule-based / clustering model.
//!
//! This component:
//!   1. Summarises every customer as RFM (recency, frequency, monetary),
//!      with recency measured against the latest transaction date
//!   2. Classifies small populations with fixed recency thresholds
//!   3. Clusters larger populations with seeded k-means over standardized
//!      RFM and ranks clusters by mean recency (stalest = High risk)
//!   4. Explains every non-Low assessment with up to three factors
//!
//! A clustering failure never reaches the caller: the whole population
//! is re-classified with the threshold rules instead.

use crate::{
    config::ChurnModelConfig,
    kmeans::{fit_kmeans, Clustering, ClusteringError},
    metrics::customer_totals,
    rng::{ComponentSlot, RngBank},
    snapshot::TransactionSnapshot,
    types::CustomerName,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "High Risk")]
    High,
    #[serde(rename = "Medium Risk")]
    Medium,
    #[serde(rename = "Low Risk")]
    Low,
    #[serde(rename = "Unknown")]
    Unknown,
}

impl RiskLevel {
    pub fn label(&self) -> &'static str {
        match self {
            Self::High    => "High Risk",
            Self::Medium  => "Medium Risk",
            Self::Low     => "Low Risk",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfmSummary {
    pub customer_name: CustomerName,
    /// Days between the customer's last transaction and the reference date.
    pub recency:       i64,
    pub frequency:     usize,
    pub monetary:      f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChurnAssessment {
    /// Carried for callers holding a single assessment; the report map is keyed by it.
    #[serde(skip)]
    pub customer_name: CustomerName,
    pub risk:          RiskLevel,
    pub factors:       Vec<String>,
}

/// customer_name → assessment, ordered by name.
pub type ChurnReport = BTreeMap<CustomerName, ChurnAssessment>;

pub const ACTIVE_RECENTLY: &str = "Active recently";

#[derive(Debug, Clone, Copy)]
struct PopulationMeans {
    recency:   f64,
    frequency: f64,
    monetary:  f64,
}

/// Which path produced a report; logged and exposed for tests and tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationPath {
    Empty,
    Rules,
    Clustering,
    RulesAfterClusteringFailure,
}

// ── Classifier ───────────────────────────────────────────────────────────────

pub struct ChurnRiskClassifier {
    config: ChurnModelConfig,
}

impl ChurnRiskClassifier {
    pub fn new(config: ChurnModelConfig) -> Self {
        Self { config }
    }

    pub fn classify(&self, snapshot: &TransactionSnapshot) -> ChurnReport {
        self.classify_with_path(snapshot).0
    }

    pub fn classify_with_path(&self, snapshot: &TransactionSnapshot) -> (ChurnReport, ClassificationPath) {
        let rfm = rfm_summaries(snapshot);
        if rfm.is_empty() {
            return (ChurnReport::new(), ClassificationPath::Empty);
        }

        let means = population_means(&rfm);

        if rfm.len() < self.config.rule_based_max_customers {
            log::debug!("churn: {} customers, using threshold rules", rfm.len());
            return (self.apply_rules(&rfm, means), ClassificationPath::Rules);
        }

        match self.apply_clustering(&rfm, means) {
            Ok(report) => {
                log::debug!("churn: {} customers classified by clustering", rfm.len());
                (report, ClassificationPath::Clustering)
            }
            Err(e) => {
                log::warn!("churn: clustering failed ({e}), falling back to threshold rules");
                (self.apply_rules(&rfm, means), ClassificationPath::RulesAfterClusteringFailure)
            }
        }
    }

    fn apply_rules(&self, rfm: &[RfmSummary], means: PopulationMeans) -> ChurnReport {
        rfm.iter()
            .map(|r| {
                let risk = if r.recency > self.config.high_risk_recency_days {
                    RiskLevel::High
                } else if r.recency > self.config.medium_risk_recency_days {
                    RiskLevel::Medium
                } else {
                    RiskLevel::Low
                };
                (r.customer_name.clone(), self.assess(r, risk, means))
            })
            .collect()
    }

    fn apply_clustering(
        &self,
        rfm: &[RfmSummary],
        means: PopulationMeans,
    ) -> Result<ChurnReport, ClusteringError> {
        let k = self.config.max_clusters.min(rfm.len());
        let features = standardize(rfm);

        let mut rng = RngBank::new(self.config.clustering.seed)
            .for_component(ComponentSlot::ChurnClustering);
        let clustering = fit_kmeans(&features, k, &self.config.clustering, &mut rng)?;

        log::debug!(
            "churn: k={k} inertia={:.4} iterations={} sizes={:?}",
            clustering.inertia,
            clustering.iterations,
            clustering.cluster_sizes()
        );

        let risk_by_cluster = rank_clusters(rfm, &clustering);

        Ok(rfm
            .iter()
            .zip(&clustering.labels)
            .map(|(r, label)| {
                let risk = risk_by_cluster.get(label).copied().unwrap_or(RiskLevel::Unknown);
                (r.customer_name.clone(), self.assess(r, risk, means))
            })
            .collect())
    }

    fn assess(&self, rfm: &RfmSummary, risk: RiskLevel, means: PopulationMeans) -> ChurnAssessment {
        let factors = if risk == RiskLevel::Low {
            vec![ACTIVE_RECENTLY.to_string()]
        } else {
            self.factors(rfm, means)
        };
        ChurnAssessment { customer_name: rfm.customer_name.clone(), risk, factors }
    }

    fn factors(&self, rfm: &RfmSummary, means: PopulationMeans) -> Vec<String> {
        let c = &self.config;
        let mut factors = Vec::new();

        if rfm.recency > c.high_risk_recency_days {
            factors.push(format!("Inactive for {} days", rfm.recency));
        } else if rfm.recency as f64 > means.recency * c.recency_mean_multiplier {
            factors.push(format!(
                "Inactivity higher than average ({} days)",
                means.recency as i64
            ));
        }

        if (rfm.frequency as f64) < means.frequency * c.frequency_mean_fraction {
            factors.push("Low transaction frequency".to_string());
        }

        if rfm.monetary < means.monetary * c.monetary_mean_fraction {
            factors.push("Total spend is significantly low".to_string());
        }

        if factors.is_empty() {
            factors.push("General engagement drop".to_string());
        }

        factors.truncate(c.max_factors);
        factors
    }
}

// ── RFM helpers ──────────────────────────────────────────────────────────────

/// RFM per customer, ordered by name, against the snapshot's latest date.
pub fn rfm_summaries(snapshot: &TransactionSnapshot) -> Vec<RfmSummary> {
    let Some(reference) = snapshot.max_date() else {
        return Vec::new();
    };
    customer_totals(snapshot)
        .into_iter()
        .map(|(customer_name, t)| RfmSummary {
            recency: (reference - t.last_purchase).num_days(),
            frequency: t.transaction_count,
            monetary: t.revenue,
            customer_name,
        })
        .collect()
}

pub fn high_risk_count(report: &ChurnReport) -> usize {
    report.values().filter(|a| a.risk == RiskLevel::High).count()
}

fn population_means(rfm: &[RfmSummary]) -> PopulationMeans {
    let n = rfm.len().max(1) as f64;
    PopulationMeans {
        recency:   rfm.iter().map(|r| r.recency as f64).sum::<f64>() / n,
        frequency: rfm.iter().map(|r| r.frequency as f64).sum::<f64>() / n,
        monetary:  rfm.iter().map(|r| r.monetary).sum::<f64>() / n,
    }
}

/// Zero mean, unit population variance per column. A constant column
/// standardizes to all zeros.
fn standardize(rfm: &[RfmSummary]) -> Vec<Vec<f64>> {
    let raw: Vec<[f64; 3]> = rfm
        .iter()
        .map(|r| [r.recency as f64, r.frequency as f64, r.monetary])
        .collect();
    let n = raw.len() as f64;

    let mut mean = [0.0; 3];
    let mut std = [0.0; 3];
    for col in 0..3 {
        mean[col] = raw.iter().map(|row| row[col]).sum::<f64>() / n;
        let var = raw.iter().map(|row| (row[col] - mean[col]).powi(2)).sum::<f64>() / n;
        std[col] = var.sqrt();
    }

    raw.iter()
        .map(|row| {
            (0..3)
                .map(|col| {
                    // NaN from overflowing sums passes through and fails the fit
                    if std[col] == 0.0 {
                        0.0
                    } else {
                        (row[col] - mean[col]) / std[col]
                    }
                })
                .collect()
        })
        .collect()
}

/// Map cluster index → risk. Non-empty clusters are ranked by mean raw
/// recency, stalest first, ties on cluster index.
fn rank_clusters(rfm: &[RfmSummary], clustering: &Clustering) -> BTreeMap<usize, RiskLevel> {
    let mut sums = vec![0.0; clustering.k];
    let sizes = clustering.cluster_sizes();
    for (r, &label) in rfm.iter().zip(&clustering.labels) {
        sums[label] += r.recency as f64;
    }

    let mut ranked: Vec<(usize, f64)> = (0..clustering.k)
        .filter(|&c| sizes[c] > 0)
        .map(|c| (c, sums[c] / sizes[c] as f64))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    ranked
        .into_iter()
        .zip(risk_labels(clustering.k))
        .map(|((cluster, _), risk)| (cluster, risk))
        .collect()
}

fn risk_labels(k: usize) -> Vec<RiskLevel> {
    match k {
        0 => Vec::new(),
        1 => vec![RiskLevel::Medium],
        2 => vec![RiskLevel::High, RiskLevel::Low],
        _ => {
            let mut labels = vec![RiskLevel::High];
            labels.extend(std::iter::repeat(RiskLevel::Medium).take(k - 2));
            labels.push(RiskLevel::Low);
            labels
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rfm(name: &str, recency: i64, frequency: usize, monetary: f64) -> RfmSummary {
        RfmSummary { customer_name: name.into(), recency, frequency, monetary }
    }

    #[test]
    fn standardized_columns_have_zero_mean() {
        let rows = vec![rfm("a", 1, 1, 10.0), rfm("b", 5, 3, 30.0), rfm("c", 9, 5, 50.0)];
        let z = standardize(&rows);
        for col in 0..3 {
            let mean: f64 = z.iter().map(|r| r[col]).sum::<f64>() / 3.0;
            assert!(mean.abs() < 1e-12);
        }
    }

    #[test]
    fn constant_column_standardizes_to_zero() {
        let rows = vec![rfm("a", 4, 1, 10.0), rfm("b", 4, 3, 30.0)];
        let z = standardize(&rows);
        assert!(z.iter().all(|r| r[0] == 0.0));
    }

    #[test]
    fn label_sets_follow_cluster_count() {
        assert_eq!(risk_labels(1), vec![RiskLevel::Medium]);
        assert_eq!(risk_labels(2), vec![RiskLevel::High, RiskLevel::Low]);
        assert_eq!(
            risk_labels(3),
            vec![RiskLevel::High, RiskLevel::Medium, RiskLevel::Low]
        );
    }

    #[test]
    fn factors_are_capped_and_ordered() {
        let classifier = ChurnRiskClassifier::new(crate::config::EngineConfig::default_test().churn_model);
        let means = PopulationMeans { recency: 10.0, frequency: 10.0, monetary: 1000.0 };
        let f = classifier.factors(&rfm("x", 120, 1, 5.0), means);
        assert_eq!(
            f,
            vec![
                "Inactive for 120 days".to_string(),
                "Low transaction frequency".to_string(),
                "Total spend is significantly low".to_string(),
            ]
        );
        let f = classifier.factors(&rfm("y", 20, 10, 1000.0), means);
        assert_eq!(f, vec!["Inactivity higher than average (10 days)".to_string()]);
        let f = classifier.factors(&rfm("z", 5, 10, 1000.0), means);
        assert_eq!(f, vec!["General engagement drop".to_string()]);
    }
}
