use chrono::{Duration, NaiveDate};
use revenue_insight_core::{
    churn::{high_risk_count, rfm_summaries, ChurnRiskClassifier, ClassificationPath, RiskLevel},
    config::EngineConfig,
    snapshot::{TransactionRecord, TransactionSnapshot},
};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn reference() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
}

fn days_ago(n: i64) -> NaiveDate {
    reference() - Duration::days(n)
}

fn tx(id: i64, date: NaiveDate, amount: f64, customer: &str) -> TransactionRecord {
    TransactionRecord {
        id,
        date,
        amount,
        customer_name: customer.into(),
        category: "Subscription".into(),
    }
}

fn classifier() -> ChurnRiskClassifier {
    ChurnRiskClassifier::new(EngineConfig::default_test().churn_model)
}

/// Six customers: B lapsed (last seen 100 days ago), everyone else active.
fn lapsed_customer_snapshot() -> TransactionSnapshot {
    let mut rows = Vec::new();
    let mut id = 0;
    let mut push = |date, amount, who: &str| {
        id += 1;
        rows.push(tx(id, date, amount, who));
    };

    push(days_ago(120), 100.0, "B");
    push(days_ago(100), 100.0, "B");

    for (who, last, count, amount) in [
        ("A", 0, 5, 100.0),
        ("C", 2, 4, 100.0),
        ("D", 1, 6, 100.0),
        ("E", 5, 3, 100.0),
        ("F", 3, 5, 90.0),
    ] {
        for i in 0..count {
            push(days_ago(last + 7 * i), amount, who);
        }
    }

    TransactionSnapshot::new(rows).unwrap()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn empty_snapshot_yields_empty_report() {
    let (report, path) = classifier().classify_with_path(&TransactionSnapshot::empty());
    assert!(report.is_empty());
    assert_eq!(path, ClassificationPath::Empty);
}

#[test]
fn rfm_uses_latest_transaction_as_reference() {
    let snapshot = TransactionSnapshot::new(vec![
        tx(1, days_ago(10), 40.0, "Acme"),
        tx(2, days_ago(3), 60.0, "Acme"),
        tx(3, reference(), 25.0, "Globex"),
    ])
    .unwrap();

    let rfm = rfm_summaries(&snapshot);
    assert_eq!(rfm.len(), 2);

    let acme = rfm.iter().find(|r| r.customer_name == "Acme").unwrap();
    assert_eq!(acme.recency, 3);
    assert_eq!(acme.frequency, 2);
    assert!((acme.monetary - 100.0).abs() < 1e-9);

    let globex = rfm.iter().find(|r| r.customer_name == "Globex").unwrap();
    assert_eq!(globex.recency, 0);
}

/// Under five customers the fixed thresholds apply exactly.
#[test]
fn small_population_uses_threshold_rules() {
    let snapshot = TransactionSnapshot::new(vec![
        tx(1, reference(), 100.0, "Recent"),
        tx(2, days_ago(45), 100.0, "Cooling"),
        tx(3, days_ago(100), 100.0, "Lapsed"),
    ])
    .unwrap();

    let (report, path) = classifier().classify_with_path(&snapshot);
    assert_eq!(path, ClassificationPath::Rules);

    assert_eq!(report["Recent"].risk, RiskLevel::Low);
    assert_eq!(report["Recent"].factors, vec!["Active recently".to_string()]);

    assert_eq!(report["Cooling"].risk, RiskLevel::Medium);
    assert_eq!(report["Cooling"].factors, vec!["General engagement drop".to_string()]);

    assert_eq!(report["Lapsed"].risk, RiskLevel::High);
    assert_eq!(report["Lapsed"].factors, vec!["Inactive for 100 days".to_string()]);
}

#[test]
fn threshold_boundaries_are_exclusive() {
    let snapshot = TransactionSnapshot::new(vec![
        tx(1, reference(), 10.0, "Now"),
        tx(2, days_ago(30), 10.0, "Thirty"),
        tx(3, days_ago(90), 10.0, "Ninety"),
        tx(4, days_ago(91), 10.0, "NinetyOne"),
    ])
    .unwrap();

    let report = classifier().classify(&snapshot);
    assert_eq!(report["Now"].risk, RiskLevel::Low);
    assert_eq!(report["Thirty"].risk, RiskLevel::Low);
    assert_eq!(report["Ninety"].risk, RiskLevel::Medium);
    assert_eq!(report["NinetyOne"].risk, RiskLevel::High);
    assert_eq!(high_risk_count(&report), 1);
}

#[test]
fn lapsed_customer_is_high_risk_with_inactivity_factor() {
    let snapshot = lapsed_customer_snapshot();
    let (report, path) = classifier().classify_with_path(&snapshot);

    assert_eq!(path, ClassificationPath::Clustering);
    assert_eq!(report.len(), 6);

    let b = &report["B"];
    assert_eq!(b.risk, RiskLevel::High);
    assert!(
        b.factors.iter().any(|f| f.contains("Inactive")),
        "expected an inactivity factor, got {:?}",
        b.factors
    );
    assert!(b.factors.len() <= 3);
}

#[test]
fn low_risk_assessments_only_report_recent_activity() {
    let report = classifier().classify(&lapsed_customer_snapshot());

    let low: Vec<_> = report.values().filter(|a| a.risk == RiskLevel::Low).collect();
    assert!(!low.is_empty(), "expected at least one low-risk cluster");
    for a in low {
        assert_eq!(a.factors, vec!["Active recently".to_string()]);
    }
}

#[test]
fn every_assessment_has_a_defined_label_and_bounded_factors() {
    let report = classifier().classify(&lapsed_customer_snapshot());
    for (name, a) in &report {
        assert!(matches!(
            a.risk,
            RiskLevel::High | RiskLevel::Medium | RiskLevel::Low | RiskLevel::Unknown
        ));
        assert!(!a.factors.is_empty() && a.factors.len() <= 3, "{name}: {:?}", a.factors);
        assert_eq!(&a.customer_name, name);
    }
}

/// Identical customers give a degenerate clustering; it must still
/// terminate and produce the same answer every time.
#[test]
fn identical_customers_cluster_deterministically() {
    let rows = (0..6)
        .map(|i| tx(i, reference(), 50.0, &format!("Twin{i}")))
        .collect();
    let snapshot = TransactionSnapshot::new(rows).unwrap();

    let (a, path) = classifier().classify_with_path(&snapshot);
    let b = classifier().classify(&snapshot);
    assert_eq!(path, ClassificationPath::Clustering);
    assert_eq!(a, b);
    assert_eq!(a.len(), 6);
}

/// Monetary totals that overflow to infinity make clustering fail; the
/// whole population is then classified by the threshold rules.
#[test]
fn clustering_failure_falls_back_to_rules() {
    let mut rows = vec![
        tx(1, days_ago(120), f64::MAX, "Whale"),
        tx(2, days_ago(120), f64::MAX, "Whale"),
    ];
    for (i, (who, ago)) in [("A", 0), ("B", 10), ("C", 45), ("D", 60)].iter().enumerate() {
        rows.push(tx(10 + i as i64, days_ago(*ago), 20.0, who));
    }
    let snapshot = TransactionSnapshot::new(rows).unwrap();

    let (report, path) = classifier().classify_with_path(&snapshot);
    assert_eq!(path, ClassificationPath::RulesAfterClusteringFailure);
    assert_eq!(report["Whale"].risk, RiskLevel::High);
    assert_eq!(report["A"].risk, RiskLevel::Low);
    assert_eq!(report["B"].risk, RiskLevel::Low);
    assert_eq!(report["C"].risk, RiskLevel::Medium);
    assert_eq!(report["D"].risk, RiskLevel::Medium);
}

#[test]
fn risk_labels_serialize_to_display_strings() {
    let report = classifier().classify(&lapsed_customer_snapshot());
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["B"]["risk"], "High Risk");
    assert!(json["B"]["factors"].is_array());
    assert!(json["B"].get("customer_name").is_none());
}
