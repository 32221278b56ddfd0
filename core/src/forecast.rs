//! Revenue forecasting: polynomial trend over the monthly revenue series.
//!
//! Months are indexed 0..N-1 in chronological order (gap months carry
//! zero revenue), a least-squares polynomial is fitted over
//! (index, revenue), and indices N..N+horizon-1 are extrapolated.
//! Forecast values are clamped at zero.

use crate::{
    config::ForecastConfig,
    metrics::{monthly_revenue, MonthlyRevenuePoint},
    regression::fit_polynomial,
    snapshot::TransactionSnapshot,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub historical: Vec<MonthlyRevenuePoint>,
    pub forecast:   Vec<MonthlyRevenuePoint>,
}

pub struct RevenueForecaster {
    config: ForecastConfig,
}

impl RevenueForecaster {
    pub fn new(config: ForecastConfig) -> Self {
        Self { config }
    }

    /// Forecast using the configured horizon.
    pub fn forecast(&self, snapshot: &TransactionSnapshot) -> ForecastResult {
        self.forecast_with_horizon(snapshot, self.config.horizon_months)
    }

    pub fn forecast_with_horizon(
        &self,
        snapshot: &TransactionSnapshot,
        horizon: usize,
    ) -> ForecastResult {
        let historical = monthly_revenue(snapshot);
        let Some(last) = historical.last().map(|p| p.month) else {
            return ForecastResult::default();
        };

        let xs: Vec<f64> = (0..historical.len()).map(|i| i as f64).collect();
        let ys: Vec<f64> = historical.iter().map(|p| p.revenue).collect();

        let fit = fit_polynomial(
            &xs,
            &ys,
            self.config.polynomial_degree,
            self.config.rank_tolerance,
        );

        let n = historical.len();
        let forecast = (0..horizon)
            .map(|step| {
                let x = (n + step) as f64;
                // A failed fit (non-finite solve) holds the last observed value.
                let predicted = match &fit {
                    Some(f) => f.evaluate(x),
                    None    => ys[n - 1],
                };
                MonthlyRevenuePoint {
                    month:   last.add_months(step as i64 + 1),
                    revenue: if predicted.is_finite() { predicted.max(0.0) } else { 0.0 },
                }
            })
            .collect();

        if let Some(f) = &fit {
            log::debug!(
                "forecast: months={n} horizon={horizon} degree={} coefficients={:?}",
                f.effective_degree(),
                f.coefficients
            );
        } else {
            log::warn!("forecast: polynomial fit failed over {n} months, holding last value");
        }

        ForecastResult { historical, forecast }
    }
}

/// Convenience wrapper with default forecast settings.
pub fn forecast_revenue(snapshot: &TransactionSnapshot, horizon: usize) -> ForecastResult {
    RevenueForecaster::new(crate::config::EngineConfig::default().forecast)
        .forecast_with_horizon(snapshot, horizon)
}
