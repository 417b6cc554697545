use anyhow::ensure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// An open holding. At most one is active per code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub id: Uuid,
    pub code: String,
    pub entry_price: f64,
    pub quantity: f64,
    pub opened_at: DateTime<Utc>,
}

/// Input for opening (or replacing) a holding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPosition {
    pub code: String,
    pub entry_price: f64,
    pub quantity: f64,
}

impl NewPosition {
    pub fn validate(self) -> anyhow::Result<Self> {
        let code = self.code.trim().to_string();
        ensure!(!code.is_empty(), "code must be non-empty");
        ensure!(
            self.entry_price.is_finite() && self.entry_price > 0.0,
            "entry_price must be > 0 (got {})",
            self.entry_price
        );
        ensure!(
            self.quantity.is_finite() && self.quantity > 0.0,
            "quantity must be > 0 (got {})",
            self.quantity
        );
        Ok(Self { code, ..self })
    }
}

/// What the engine needs to know about a held instrument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Holding {
    pub entry_price: f64,
}

impl From<&PositionRecord> for Holding {
    fn from(p: &PositionRecord) -> Self {
        Self {
            entry_price: p.entry_price,
        }
    }
}

/// Active holdings keyed by code. Inserting an existing code replaces it.
#[derive(Debug, Clone, Default)]
pub struct Portfolio {
    positions: BTreeMap<String, PositionRecord>,
}

impl Portfolio {
    /// Rows arrive newest first; the first row per code wins.
    pub fn from_newest_first(rows: impl IntoIterator<Item = PositionRecord>) -> Self {
        let mut positions = BTreeMap::new();
        for row in rows {
            positions.entry(row.code.clone()).or_insert(row);
        }
        Self { positions }
    }

    pub fn insert(&mut self, position: PositionRecord) -> Option<PositionRecord> {
        self.positions.insert(position.code.clone(), position)
    }

    pub fn get(&self, code: &str) -> Option<&PositionRecord> {
        self.positions.get(code)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PositionRecord> {
        self.positions.values()
    }
}
