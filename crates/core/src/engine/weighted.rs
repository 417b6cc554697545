use crate::domain::market::MarketRecord;
use crate::domain::position::Holding;
use crate::domain::recommendation::{EntryHint, HorizonMode, Recommendation, RiskFlag};
use crate::engine::banding;
use serde::Serialize;

const BIAS_VOLATILITY: f64 = 3.5;
const BIAS_VOLUME_RATIO: f64 = 1.5;
const BIAS_POINTS: f64 = 10.0;

const AGGRESSIVE_ENTRY_VOLUME_RATIO: f64 = 1.8;
const EXTREME_VOLATILITY: f64 = 4.5;
const VOLUME_SURGE_RATIO: f64 = 2.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeightedScores {
    pub momentum_bias: f64,
    pub short_weight: f64,
    pub long_weight: f64,
    pub mode: HorizonMode,
}

pub fn weigh(record: &MarketRecord, force_mode: Option<HorizonMode>) -> WeightedScores {
    let mut momentum_bias = 0.0;
    if record.volatility > BIAS_VOLATILITY {
        momentum_bias += BIAS_POINTS;
    }
    if record.volume_ratio > BIAS_VOLUME_RATIO {
        momentum_bias += BIAS_POINTS;
    }

    let short_weight = record.short_term_score
        + record.volume_ratio * 5.0
        + record.volatility * 2.0
        + momentum_bias;
    let long_weight = record.long_term_score + record.roe.unwrap_or(0.0) / 2.0;

    let mode = force_mode.unwrap_or(if short_weight >= long_weight {
        HorizonMode::Short
    } else {
        HorizonMode::Long
    });

    WeightedScores {
        momentum_bias,
        short_weight,
        long_weight,
        mode,
    }
}

pub fn exit_target(record: &MarketRecord, mode: HorizonMode) -> f64 {
    record.target_price.unwrap_or_else(|| {
        record.close_price
            * match mode {
                HorizonMode::Short => 1.03,
                HorizonMode::Long => 1.10,
            }
    })
}

pub fn stop_level(record: &MarketRecord, mode: HorizonMode) -> f64 {
    record.stop_price.unwrap_or_else(|| {
        record.close_price
            * match mode {
                HorizonMode::Short => 0.97,
                HorizonMode::Long => 0.93,
            }
    })
}

pub fn entry_hint(record: &MarketRecord, mode: HorizonMode) -> EntryHint {
    match mode {
        HorizonMode::Short if record.volume_ratio > AGGRESSIVE_ENTRY_VOLUME_RATIO => {
            EntryHint::Market {
                price: record.close_price,
            }
        }
        HorizonMode::Short => EntryHint::Limit {
            price: record.close_price * 0.995,
        },
        HorizonMode::Long => EntryHint::Staged {
            price: record.close_price * 0.985,
        },
    }
}

/// At most one flag; volatility is checked before volume.
pub fn momentum_risk(record: &MarketRecord) -> Option<RiskFlag> {
    if record.volatility > EXTREME_VOLATILITY {
        Some(RiskFlag::ExtremeVolatility)
    } else if record.volume_ratio > VOLUME_SURGE_RATIO {
        Some(RiskFlag::VolumeSurge)
    } else {
        None
    }
}

pub fn recommend(
    record: &MarketRecord,
    holding: Option<&Holding>,
    force_mode: Option<HorizonMode>,
) -> Recommendation {
    let scores = weigh(record, force_mode);
    let mode = scores.mode;

    if let (Some(drop), Some(h)) = (banding::stop_loss_drop(record, holding), holding) {
        return Recommendation {
            mode: Some(mode),
            ..banding::stop_loss(record, h, drop)
        };
    }

    let (action, confidence_label, band_note) = banding::band(record, holding.is_some());
    let horizon_note = match mode {
        HorizonMode::Short => format!(
            "短線權重 {:.1} ≥ 長線權重 {:.1}，以短線操作為主。",
            scores.short_weight, scores.long_weight
        ),
        HorizonMode::Long => format!(
            "長線權重 {:.1} 高於短線權重 {:.1}，以中長線佈局為主。",
            scores.long_weight, scores.short_weight
        ),
    };

    Recommendation {
        action,
        confidence_label,
        rationale: format!("{band_note}{horizon_note}"),
        risk_flag: momentum_risk(record),
        entry_hint: Some(entry_hint(record, mode)),
        exit_hint: Some(exit_target(record, mode)),
        stop_hint: Some(stop_level(record, mode)),
        mode: Some(mode),
    }
}
