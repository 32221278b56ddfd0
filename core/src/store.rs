//! SQLite persistence adapter.
//!
//! RULE: Only store.rs talks to the database.
//! Components take snapshots and sinks; they never execute SQL directly.

use crate::{
    alerts::{AlertEvent, AlertRule, AlertSink, RawAlertRule, RuleId, Severity},
    error::{EngineError, EngineResult},
    snapshot::{TransactionRecord, TransactionSnapshot},
};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

pub struct InsightStore {
    conn: Connection,
}

impl InsightStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &str) -> EngineResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode only matters for real files; in-memory ignores it.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> EngineResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> EngineResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    // ── Transactions ───────────────────────────────────────────

    pub fn insert_transactions(&self, records: &[TransactionRecord]) -> EngineResult<usize> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO transaction_record (id, date, amount, customer_name, category)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for r in records {
                stmt.execute(params![
                    r.id,
                    r.date.format(DATE_FORMAT).to_string(),
                    r.amount,
                    r.customer_name,
                    r.category,
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// Read every transaction into a snapshot for one engine run.
    pub fn load_snapshot(&self) -> EngineResult<TransactionSnapshot> {
        let mut stmt = self.conn.prepare(
            "SELECT id, date, amount, customer_name, category
             FROM transaction_record ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let records = rows
            .into_iter()
            .map(|(id, date, amount, customer_name, category)| -> EngineResult<TransactionRecord> {
                let date = NaiveDate::parse_from_str(&date, DATE_FORMAT).map_err(|e| {
                    EngineError::InvalidTransaction { id, reason: format!("bad date '{date}': {e}") }
                })?;
                Ok(TransactionRecord { id, date, amount, customer_name, category })
            })
            .collect::<EngineResult<Vec<_>>>()?;

        TransactionSnapshot::new(records)
    }

    pub fn clear_transactions(&self) -> EngineResult<usize> {
        Ok(self.conn.execute("DELETE FROM transaction_record", [])?)
    }

    // ── Alert rules ────────────────────────────────────────────

    /// Stores the rule as given; malformed metric or condition text is
    /// rejected later, when rules are loaded for evaluation.
    pub fn insert_alert_rule(
        &self,
        name: &str,
        metric: &str,
        condition: &str,
        threshold: f64,
        is_active: bool,
    ) -> EngineResult<RuleId> {
        self.conn.execute(
            "INSERT INTO alert_rule (name, metric, condition, threshold, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![name, metric, condition, threshold, is_active],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn raw_alert_rules(&self) -> EngineResult<Vec<RawAlertRule>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, metric, condition, threshold, is_active
             FROM alert_rule ORDER BY id ASC",
        )?;
        let rules = stmt
            .query_map([], |row| {
                Ok(RawAlertRule {
                    id:        row.get(0)?,
                    name:      row.get(1)?,
                    metric:    row.get(2)?,
                    condition: row.get(3)?,
                    threshold: row.get(4)?,
                    is_active: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rules)
    }

    /// Active rules, typed. Any malformed active rule is an error.
    pub fn active_alert_rules(&self) -> EngineResult<Vec<AlertRule>> {
        self.raw_alert_rules()?
            .into_iter()
            .filter(|r| r.is_active)
            .map(AlertRule::try_from)
            .collect()
    }

    pub fn set_alert_rule_active(&self, rule_id: RuleId, is_active: bool) -> EngineResult<bool> {
        let changed = self.conn.execute(
            "UPDATE alert_rule SET is_active = ?2 WHERE id = ?1",
            params![rule_id, is_active],
        )?;
        Ok(changed > 0)
    }

    // ── Alert events ───────────────────────────────────────────

    /// Most recent first.
    pub fn alert_events(&self, limit: usize) -> EngineResult<Vec<AlertEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, rule_id, timestamp, message, severity, is_read
             FROM alert_event ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, bool>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, rule_id, timestamp, message, severity, is_read)| -> EngineResult<AlertEvent> {
                let timestamp = NaiveDateTime::parse_from_str(&timestamp, TIMESTAMP_FORMAT)
                    .map_err(|e| anyhow::anyhow!("alert_event {id}: bad timestamp '{timestamp}': {e}"))?;
                let severity = Severity::parse(&severity)
                    .ok_or_else(|| anyhow::anyhow!("alert_event {id}: unknown severity '{severity}'"))?;
                Ok(AlertEvent { id: Some(id), rule_id, timestamp, message, severity, is_read })
            })
            .collect()
    }

    pub fn mark_alert_read(&self, event_id: i64) -> EngineResult<bool> {
        let changed = self.conn.execute(
            "UPDATE alert_event SET is_read = 1 WHERE id = ?1",
            params![event_id],
        )?;
        Ok(changed > 0)
    }

    pub fn unread_alert_count(&self) -> EngineResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM alert_event WHERE is_read = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

impl AlertSink for InsightStore {
    /// All events of one evaluation land in a single transaction.
    fn append_alerts(&mut self, events: &[AlertEvent]) -> EngineResult<Vec<AlertEvent>> {
        let tx = self.conn.transaction()?;
        let mut stored = Vec::with_capacity(events.len());
        for event in events {
            tx.execute(
                "INSERT INTO alert_event (rule_id, timestamp, message, severity, is_read)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    event.rule_id,
                    event.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                    event.message,
                    event.severity.as_str(),
                    event.is_read,
                ],
            )?;
            let mut event = event.clone();
            event.id = Some(tx.last_insert_rowid());
            stored.push(event);
        }
        tx.commit()?;
        Ok(stored)
    }
}
