use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Buy,
    HoldWatch,
    Avoid,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLabel {
    StopLoss,
    Add,
    StrongBuy,
    Hold,
    Watch,
    Avoid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskFlag {
    StopTriggered,
    ExtremeVolatility,
    VolumeSurge,
}

impl fmt::Display for RiskFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::StopTriggered => "stop-triggered",
            Self::ExtremeVolatility => "extreme-volatility",
            Self::VolumeSurge => "volume-surge",
        })
    }
}

/// Trading horizon picked by the weighted strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HorizonMode {
    Short,
    Long,
}

impl std::str::FromStr for HorizonMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "short" => Ok(Self::Short),
            "long" => Ok(Self::Long),
            other => anyhow::bail!("unknown horizon mode: {other:?} (expected short|long)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EntryHint {
    /// Enter at market around the last close.
    Market { price: f64 },
    /// Resting limit order.
    Limit { price: f64 },
    /// Accumulate in tranches near this level.
    Staged { price: f64 },
}

impl EntryHint {
    pub fn price(&self) -> f64 {
        match *self {
            Self::Market { price } | Self::Limit { price } | Self::Staged { price } => price,
        }
    }
}

/// Engine output. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: Action,
    pub confidence_label: ConfidenceLabel,
    pub rationale: String,
    pub risk_flag: Option<RiskFlag>,
    pub entry_hint: Option<EntryHint>,
    pub exit_hint: Option<f64>,
    pub stop_hint: Option<f64>,
    pub mode: Option<HorizonMode>,
}
