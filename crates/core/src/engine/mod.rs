//! Recommendation engine.
//!
//! Pure functions from a market snapshot (and an optional holding) to a
//! [`Recommendation`]. Two strategies share the same score bands:
//!
//! - [`Strategy::Banding`]: coarse score bands, used for list views.
//! - [`Strategy::Weighted`]: short/long horizon weighting with entry, exit and
//!   stop levels, used for single-instrument views.

pub mod banding;
pub mod weighted;

use crate::domain::market::MarketRecord;
use crate::domain::position::Holding;
use crate::domain::recommendation::{HorizonMode, Recommendation};
use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Banding,
    Weighted {
        #[serde(default)]
        force_mode: Option<HorizonMode>,
    },
}

impl std::str::FromStr for Strategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "banding" => Ok(Self::Banding),
            "weighted" => Ok(Self::Weighted { force_mode: None }),
            other => anyhow::bail!("unknown strategy: {other:?} (expected banding|weighted)"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecommendationEngine {
    strategy: Strategy,
}

impl RecommendationEngine {
    pub fn new(strategy: Strategy) -> Self {
        Self { strategy }
    }

    pub fn recommend(&self, record: &MarketRecord, holding: Option<&Holding>) -> Recommendation {
        match self.strategy {
            Strategy::Banding => banding::recommend(record, holding),
            Strategy::Weighted { force_mode } => weighted::recommend(record, holding, force_mode),
        }
    }
}

/// Derived prices are shown with one decimal place.
pub fn format_price(price: f64) -> String {
    format!("{price:.1}")
}

pub fn parse_price(s: &str) -> anyhow::Result<f64> {
    s.trim()
        .parse::<f64>()
        .with_context(|| format!("invalid price: {s:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::fixtures::record;
    use crate::domain::recommendation::Action;

    #[test]
    fn dispatches_on_strategy() {
        let r = record("2330.TW", 100.0, Some(90.0));
        let banded = RecommendationEngine::new(Strategy::Banding).recommend(&r, None);
        assert_eq!(banded.mode, None);

        let weighted =
            RecommendationEngine::new(Strategy::Weighted { force_mode: None }).recommend(&r, None);
        assert!(weighted.mode.is_some());
        assert_eq!(banded.action, Action::Buy);
        assert_eq!(weighted.action, Action::Buy);
    }

    #[test]
    fn parses_strategy_names() {
        assert_eq!("Banding".parse::<Strategy>().unwrap(), Strategy::Banding);
        assert_eq!(
            "weighted".parse::<Strategy>().unwrap(),
            Strategy::Weighted { force_mode: None }
        );
        assert!("random".parse::<Strategy>().is_err());
    }

    #[test]
    fn formatted_levels_parse_back_within_rounding() {
        let r = record("2330.TW", 587.37, Some(80.0));
        for mode in [HorizonMode::Short, HorizonMode::Long] {
            for level in [weighted::stop_level(&r, mode), weighted::exit_target(&r, mode)] {
                let text = format_price(level);
                let back = parse_price(&text).unwrap();
                assert!((back - level).abs() <= 0.05 + 1e-9, "{level} -> {text}");
            }
        }
        assert_eq!(format_price(569.7489), "569.7");
        assert!(parse_price("n/a").is_err());
    }
}
