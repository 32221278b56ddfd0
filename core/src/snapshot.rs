//! Transaction snapshot: the complete input to one engine run.
//!
//! A snapshot is handed to the engine whole, once per invocation.
//! Every component derives its state from it from scratch; nothing
//! computed from one snapshot survives into the next run.

use crate::{
    error::{EngineError, EngineResult},
    types::{CustomerName, TransactionId, YearMonth},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id:            TransactionId,
    pub date:          NaiveDate,
    pub amount:        f64,
    pub customer_name: CustomerName,
    pub category:      String,
}

impl TransactionRecord {
    pub fn month(&self) -> YearMonth {
        YearMonth::from_date(self.date)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransactionSnapshot {
    records: Vec<TransactionRecord>,
}

impl TransactionSnapshot {
    /// Build a snapshot, rejecting negative or non-finite amounts.
    /// Record order is irrelevant; components sort as they need.
    pub fn new(records: Vec<TransactionRecord>) -> EngineResult<Self> {
        for record in &records {
            if !record.amount.is_finite() {
                return Err(EngineError::InvalidTransaction {
                    id:     record.id,
                    reason: format!("amount {} is not finite", record.amount),
                });
            }
            if record.amount < 0.0 {
                return Err(EngineError::InvalidTransaction {
                    id:     record.id,
                    reason: format!("amount {} is negative", record.amount),
                });
            }
        }
        Ok(Self { records })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransactionRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn min_date(&self) -> Option<NaiveDate> {
        self.records.iter().map(|r| r.date).min()
    }

    /// The reference "now" for every recency computation.
    pub fn max_date(&self) -> Option<NaiveDate> {
        self.records.iter().map(|r| r.date).max()
    }
}

impl<'de> Deserialize<'de> for TransactionSnapshot {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            records: Vec<TransactionRecord>,
        }
        let raw = Raw::deserialize(deserializer)?;
        Self::new(raw.records).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, amount: f64) -> TransactionRecord {
        TransactionRecord {
            id,
            date: NaiveDate::from_ymd_opt(2023, 1, 15).unwrap(),
            amount,
            customer_name: "Acme".into(),
            category: "Software".into(),
        }
    }

    #[test]
    fn rejects_negative_amounts() {
        let err = TransactionSnapshot::new(vec![record(1, 10.0), record(2, -1.0)]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransaction { id: 2, .. }));
    }

    #[test]
    fn rejects_nan_amounts() {
        assert!(TransactionSnapshot::new(vec![record(1, f64::NAN)]).is_err());
    }

    #[test]
    fn deserializing_validates_records() {
        let json = r#"{"records":[{"id":1,"date":"2023-01-15","amount":-5.0,
            "customer_name":"Acme","category":"Software"}]}"#;
        assert!(serde_json::from_str::<TransactionSnapshot>(json).is_err());
    }
}
