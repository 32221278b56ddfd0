use serde::{Deserialize, Serialize};

// ── Churn model ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChurnModelConfig {
    /// Populations smaller than this are classified by fixed thresholds only.
    pub rule_based_max_customers: usize,
    /// Recency (days) above which a customer is High risk / "Inactive for N days".
    pub high_risk_recency_days: i64,
    /// Recency (days) above which a customer is at least Medium risk.
    pub medium_risk_recency_days: i64,
    /// Recency above `mean × this` is reported as above-average inactivity.
    pub recency_mean_multiplier: f64,
    /// Frequency below `mean × this` is reported as low frequency.
    pub frequency_mean_fraction: f64,
    /// Monetary below `mean × this` is reported as low spend.
    pub monetary_mean_fraction: f64,
    pub max_factors: usize,
    pub max_clusters: usize,
    pub clustering: ClusteringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    pub seed: u64,
    /// Independent restarts; the lowest-inertia result wins.
    pub n_init: usize,
    pub max_iterations: usize,
    /// Stop once no centroid moves further than this (standardized units).
    pub tolerance: f64,
}

// ── Forecast ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    pub horizon_months: usize,
    pub polynomial_degree: usize,
    /// Relative pivot size below which a coefficient is pinned to zero.
    pub rank_tolerance: f64,
}

// ── Metrics ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub top_customers: usize,
    pub recent_transactions: usize,
    /// Customers with recency above this are listed as "Inactive".
    pub inactive_after_days: i64,
}

// ── Root ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub churn_model: ChurnModelConfig,
    pub forecast:    ForecastConfig,
    pub metrics:     MetricsConfig,
}

impl EngineConfig {
    /// Load from a JSON file.
    /// In tests, use EngineConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: EngineConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let c = &self.churn_model;
        if c.max_clusters == 0 {
            anyhow::bail!("churn_model.max_clusters must be > 0");
        }
        if c.clustering.n_init == 0 || c.clustering.max_iterations == 0 {
            anyhow::bail!("churn_model.clustering needs n_init > 0 and max_iterations > 0");
        }
        if c.medium_risk_recency_days > c.high_risk_recency_days {
            anyhow::bail!(
                "medium_risk_recency_days ({}) exceeds high_risk_recency_days ({})",
                c.medium_risk_recency_days,
                c.high_risk_recency_days
            );
        }
        Ok(())
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        Self::default()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            churn_model: ChurnModelConfig {
                rule_based_max_customers: 5,
                high_risk_recency_days:   90,
                medium_risk_recency_days: 30,
                recency_mean_multiplier:  1.5,
                frequency_mean_fraction:  0.5,
                monetary_mean_fraction:   0.5,
                max_factors:              3,
                max_clusters:             3,
                clustering: ClusteringConfig {
                    seed:           42,
                    n_init:         10,
                    max_iterations: 300,
                    tolerance:      1e-4,
                },
            },
            forecast: ForecastConfig {
                horizon_months:    3,
                polynomial_degree: 2,
                rank_tolerance:    1e-10,
            },
            metrics: MetricsConfig {
                top_customers:       3,
                recent_transactions: 5,
                inactive_after_days: 90,
            },
        }
    }
}
