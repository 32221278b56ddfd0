//! insight-runner: headless runner for the revenue insight engine.
//!
//! Usage:
//!   insight-runner --snapshot demos/transactions.json --rules demos/rules.json
//!   insight-runner --db insight.db --range 90d --config engine.json
//!
//! `--snapshot` replaces the stored transactions before the run;
//! `--rules` appends rule definitions. The report is printed as JSON.

use anyhow::{Context, Result};
use revenue_insight_core::{
    config::EngineConfig,
    engine::{AnalyticsEngine, EngineReport},
    metrics::{customer_transactions, period_metrics, CustomerSummary, PeriodMetrics, TimeRange},
    snapshot::{TransactionRecord, TransactionSnapshot},
    store::InsightStore,
};
use std::env;

#[derive(serde::Deserialize)]
struct RuleDefinition {
    name:      String,
    metric:    String,
    condition: String,
    threshold: f64,
    #[serde(default = "default_active")]
    is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(serde::Serialize)]
struct RunOutput<'a> {
    run_id:        String,
    report:        &'a EngineReport,
    period:        PeriodMetrics,
    customers:     Vec<CustomerSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    customer:      Option<Vec<TransactionRecord>>,
    unread_alerts: i64,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = arg_value(&args, "--db").unwrap_or(":memory:");
    let range = TimeRange::parse(arg_value(&args, "--range").unwrap_or("30d"));

    let mut config = match arg_value(&args, "--config") {
        Some(path) => EngineConfig::load(path)?,
        None       => EngineConfig::default(),
    };
    config.forecast.horizon_months =
        parse_arg(&args, "--horizon", config.forecast.horizon_months);
    config.churn_model.clustering.seed =
        parse_arg(&args, "--seed", config.churn_model.clustering.seed);

    let mut store = InsightStore::open(db)?;
    store.migrate()?;

    if let Some(path) = arg_value(&args, "--snapshot") {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read snapshot {path}"))?;
        let snapshot: TransactionSnapshot = serde_json::from_str(&content)
            .with_context(|| format!("Cannot parse snapshot {path}"))?;
        let cleared = store.clear_transactions()?;
        let inserted = store.insert_transactions(snapshot.records())?;
        log::info!("runner: replaced {cleared} stored transactions with {inserted} from {path}");
    }

    if let Some(path) = arg_value(&args, "--rules") {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read rules {path}"))?;
        let rules: Vec<RuleDefinition> = serde_json::from_str(&content)
            .with_context(|| format!("Cannot parse rules {path}"))?;
        for rule in &rules {
            store.insert_alert_rule(
                &rule.name,
                &rule.metric,
                &rule.condition,
                rule.threshold,
                rule.is_active,
            )?;
        }
        log::info!("runner: added {} alert rules from {path}", rules.len());
    }

    let snapshot = store.load_snapshot()?;
    let rules = store
        .active_alert_rules()
        .context("active alert rules are malformed")?;

    let run_id = format!("run-{}", uuid::Uuid::new_v4());
    let engine = AnalyticsEngine::new(config);
    let now = chrono::Local::now().naive_local();

    log::info!(
        "runner: {run_id} db={db} transactions={} rules={}",
        snapshot.len(),
        rules.len()
    );

    let report = engine.run(&snapshot, &rules, &mut store, now)?;

    let output = RunOutput {
        run_id,
        report:        &report,
        period:        period_metrics(&snapshot, range, engine.config().metrics.recent_transactions),
        customers:     engine.customers(&snapshot),
        customer:      arg_value(&args, "--customer")
            .map(|name| customer_transactions(&snapshot, name)),
        unread_alerts: store.unread_alert_count()?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
