//! Revenue insight engine.
//!
//! Derives a revenue forecast, churn-risk classification, cohort
//! retention matrix and rule-driven alerts from a snapshot of dated
//! customer transactions. Start at [`engine::AnalyticsEngine`].

pub mod alerts;
pub mod churn;
pub mod cohort;
pub mod config;
pub mod engine;
pub mod error;
pub mod forecast;
pub mod kmeans;
pub mod metrics;
pub mod regression;
pub mod rng;
pub mod snapshot;
pub mod store;
pub mod types;
