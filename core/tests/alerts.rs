use chrono::{NaiveDate, NaiveDateTime};
use revenue_insight_core::{
    alerts::{
        evaluate_rules, AlertEvent, AlertMetric, AlertRule, AlertRuleEvaluator, Condition,
        MetricValues, Severity,
    },
    churn::{ChurnReport, ChurnRiskClassifier},
    config::EngineConfig,
    error::EngineError,
    snapshot::{TransactionRecord, TransactionSnapshot},
    store::InsightStore,
};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 7, 1)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap()
}

fn tx(id: i64, y: i32, m: u32, d: u32, amount: f64, customer: &str) -> TransactionRecord {
    TransactionRecord {
        id,
        date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
        amount,
        customer_name: customer.into(),
        category: "Services".into(),
    }
}

fn rule(id: i64, metric: AlertMetric, condition: Condition, threshold: f64) -> AlertRule {
    AlertRule {
        id,
        name: format!("rule-{id}"),
        metric,
        condition,
        threshold,
        is_active: true,
    }
}

/// June revenue is 5000 across two customers; May holds an earlier 9000.
fn june_snapshot() -> TransactionSnapshot {
    TransactionSnapshot::new(vec![
        tx(1, 2024, 5, 10, 9000.0, "Acme"),
        tx(2, 2024, 6, 3, 3000.0, "Acme"),
        tx(3, 2024, 6, 28, 2000.0, "Globex"),
    ])
    .unwrap()
}

fn churn_for(snapshot: &TransactionSnapshot) -> ChurnReport {
    ChurnRiskClassifier::new(EngineConfig::default_test().churn_model).classify(snapshot)
}

fn store() -> InsightStore {
    let store = InsightStore::in_memory().unwrap();
    store.migrate().unwrap();
    store
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn revenue_floor_rule_fires_with_formatted_message() {
    let snapshot = june_snapshot();
    let mut rule = rule(1, AlertMetric::Mrr, Condition::LessThan, 10000.0);
    rule.name = "Low MRR".into();

    let events = evaluate_rules(&[rule], &snapshot, &churn_for(&snapshot), now());
    assert_eq!(events.len(), 1);

    let event = &events[0];
    assert_eq!(event.rule_id, 1);
    assert_eq!(event.message, "Alert Triggered: Low MRR. Current mrr: 5000.00 < 10000");
    assert_eq!(event.severity, Severity::Warning);
    assert_eq!(event.timestamp, now());
    assert!(!event.is_read);
    assert_eq!(event.id, None);
}

#[test]
fn mrr_counts_only_the_latest_calendar_month() {
    let snapshot = june_snapshot();
    let values = MetricValues::compute(&snapshot, &churn_for(&snapshot));
    assert_eq!(values.mrr, 5000.0);
    assert_eq!(values.active_customers, 2);
}

#[test]
fn rule_that_does_not_hold_is_silent() {
    let snapshot = june_snapshot();
    let rules = [
        rule(1, AlertMetric::Mrr, Condition::GreaterThan, 10000.0),
        rule(2, AlertMetric::Mrr, Condition::LessThan, 5000.0),
    ];
    assert!(evaluate_rules(&rules, &snapshot, &churn_for(&snapshot), now()).is_empty());
}

#[test]
fn inactive_rules_are_ignored() {
    let snapshot = june_snapshot();
    let mut inactive = rule(1, AlertMetric::Mrr, Condition::LessThan, 10000.0);
    inactive.is_active = false;
    assert!(evaluate_rules(&[inactive], &snapshot, &churn_for(&snapshot), now()).is_empty());
}

#[test]
fn empty_snapshot_or_no_rules_emit_nothing() {
    let snapshot = june_snapshot();
    let churn = churn_for(&snapshot);
    assert!(evaluate_rules(&[], &snapshot, &churn, now()).is_empty());

    let floor = rule(1, AlertMetric::Mrr, Condition::LessThan, 10000.0);
    let empty = TransactionSnapshot::empty();
    assert!(evaluate_rules(&[floor], &empty, &ChurnReport::new(), now()).is_empty());
}

#[test]
fn customer_count_and_churn_metrics_render_as_integers() {
    let snapshot = TransactionSnapshot::new(vec![
        tx(1, 2024, 6, 30, 10.0, "Now"),
        tx(2, 2024, 3, 1, 10.0, "Gone"),
    ])
    .unwrap();
    let churn = churn_for(&snapshot);

    let rules = [
        rule(1, AlertMetric::ActiveCustomers, Condition::GreaterThan, 1.0),
        rule(2, AlertMetric::ChurnRisk, Condition::GreaterThan, 0.0),
    ];
    let events = evaluate_rules(&rules, &snapshot, &churn, now());
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].message, "Alert Triggered: rule-1. Current active_customers: 2 > 1");
    assert_eq!(events[1].message, "Alert Triggered: rule-2. Current churn_risk: 1 > 0");
}

/// Evaluation keeps no memory; a rule that still holds fires again.
#[test]
fn rules_refire_on_every_run() {
    let snapshot = june_snapshot();
    let churn = churn_for(&snapshot);
    let rules = [rule(1, AlertMetric::Mrr, Condition::LessThan, 10000.0)];
    let mut sink: Vec<AlertEvent> = Vec::new();

    let first = AlertRuleEvaluator::run(&mut sink, &rules, &snapshot, &churn, now()).unwrap();
    let second = AlertRuleEvaluator::run(&mut sink, &rules, &snapshot, &churn, now()).unwrap();

    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_eq!(first[0].id, Some(1));
    assert_eq!(second[0].id, Some(2));
    assert_eq!(sink.len(), 2);
}

#[test]
fn store_sink_persists_events_for_reading() {
    let mut store = store();
    let snapshot = june_snapshot();
    let churn = churn_for(&snapshot);

    let rule_id = store.insert_alert_rule("Low MRR", "mrr", "<", 10000.0, true).unwrap();
    store.insert_alert_rule("Big month", "mrr", ">", 1_000_000.0, true).unwrap();
    let rules = store.active_alert_rules().unwrap();
    assert_eq!(rules.len(), 2);

    let appended = AlertRuleEvaluator::run(&mut store, &rules, &snapshot, &churn, now()).unwrap();
    assert_eq!(appended.len(), 1);
    assert_eq!(appended[0].rule_id, rule_id);
    let event_id = appended[0].id.unwrap();

    let stored = store.alert_events(10).unwrap();
    assert_eq!(stored, appended);
    assert_eq!(store.unread_alert_count().unwrap(), 1);

    assert!(store.mark_alert_read(event_id).unwrap());
    assert_eq!(store.unread_alert_count().unwrap(), 0);
    assert!(store.alert_events(10).unwrap()[0].is_read);
}

#[test]
fn deactivated_rules_drop_out_of_evaluation() {
    let store = store();
    let id = store.insert_alert_rule("Low MRR", "mrr", "<", 10000.0, true).unwrap();
    assert!(store.set_alert_rule_active(id, false).unwrap());
    assert!(store.active_alert_rules().unwrap().is_empty());
    assert_eq!(store.raw_alert_rules().unwrap().len(), 1);
}

#[test]
fn malformed_active_rule_is_rejected_on_load() {
    let store = store();
    let id = store.insert_alert_rule("Typo", "revenue", "<", 1.0, true).unwrap();

    let err = store.active_alert_rules().unwrap_err();
    assert!(matches!(err, EngineError::InvalidRule { rule_id, .. } if rule_id == id));
}

#[test]
fn malformed_inactive_rule_is_left_alone() {
    let store = store();
    store.insert_alert_rule("Typo", "mrr", ">=", 1.0, false).unwrap();
    store.insert_alert_rule("Floor", "mrr", "<", 1.0, true).unwrap();

    let rules = store.active_alert_rules().unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].name, "Floor");
}
