use crate::domain::market::MarketRecord;
use crate::domain::position::Holding;
use crate::domain::recommendation::{
    Action, ConfidenceLabel, EntryHint, Recommendation, RiskFlag,
};

/// Percent move from entry at or below which a held position is cut.
pub const STOP_LOSS_PCT: f64 = -5.0;
pub const BUY_SCORE: f64 = 85.0;
pub const WATCH_SCORE: f64 = 75.0;

/// Percent change of the close against the entry price.
pub fn change_from_entry_pct(close_price: f64, entry_price: f64) -> f64 {
    (close_price - entry_price) / entry_price * 100.0
}

/// Returns the percent drop when a held position has hit the stop-loss.
pub fn stop_loss_drop(record: &MarketRecord, holding: Option<&Holding>) -> Option<f64> {
    let holding = holding.filter(|h| h.entry_price > 0.0)?;
    let drop = change_from_entry_pct(record.close_price, holding.entry_price);
    (drop <= STOP_LOSS_PCT).then_some(drop)
}

pub(crate) fn stop_loss(record: &MarketRecord, holding: &Holding, drop: f64) -> Recommendation {
    Recommendation {
        action: Action::Sell,
        confidence_label: ConfidenceLabel::StopLoss,
        rationale: format!(
            "{} 現價較成本下跌 {:.1}%，已觸及 {:.0}% 停損線，建議執行停損。",
            record.name, -drop, -STOP_LOSS_PCT
        ),
        risk_flag: Some(RiskFlag::StopTriggered),
        entry_hint: None,
        exit_hint: Some(record.close_price),
        stop_hint: Some(stop_level(holding)),
        mode: None,
    }
}

/// Score band shared by both strategies: action, label and rationale.
pub(crate) fn band(record: &MarketRecord, held: bool) -> (Action, ConfidenceLabel, String) {
    let score = record.score();
    if score >= BUY_SCORE {
        let label = if held {
            ConfidenceLabel::Add
        } else {
            ConfidenceLabel::StrongBuy
        };
        (
            Action::Buy,
            label,
            format!("AI 評分 {score:.1}，動能強勁且信心度高。"),
        )
    } else if score >= WATCH_SCORE {
        let label = if held {
            ConfidenceLabel::Hold
        } else {
            ConfidenceLabel::Watch
        };
        (
            Action::HoldWatch,
            label,
            format!("AI 評分 {score:.1}，結構轉強但尚未達進場門檻。"),
        )
    } else {
        (
            Action::Avoid,
            ConfidenceLabel::Avoid,
            format!("AI 評分 {score:.1}，分數偏低，缺乏優勢。"),
        )
    }
}

fn stop_level(holding: &Holding) -> f64 {
    holding.entry_price * (1.0 + STOP_LOSS_PCT / 100.0)
}

pub fn recommend(record: &MarketRecord, holding: Option<&Holding>) -> Recommendation {
    if let (Some(drop), Some(h)) = (stop_loss_drop(record, holding), holding) {
        return stop_loss(record, h, drop);
    }

    let held = holding.is_some();
    let (action, confidence_label, rationale) = band(record, held);

    let entry_hint = (action == Action::Buy && !held).then_some(EntryHint::Market {
        price: record.close_price,
    });
    let stop_hint = record.stop_price.or_else(|| holding.map(stop_level));

    Recommendation {
        action,
        confidence_label,
        rationale,
        risk_flag: None,
        entry_hint,
        exit_hint: record.target_price,
        stop_hint,
        mode: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::fixtures::record;

    fn held(entry_price: f64) -> Holding {
        Holding { entry_price }
    }

    #[test]
    fn stop_loss_overrides_any_score() {
        for score in [None, Some(10.0), Some(80.0), Some(100.0)] {
            let r = record("2330.TW", 95.0, score);
            let rec = recommend(&r, Some(&held(100.0)));
            assert_eq!(rec.action, Action::Sell);
            assert_eq!(rec.confidence_label, ConfidenceLabel::StopLoss);
            assert_eq!(rec.risk_flag, Some(RiskFlag::StopTriggered));
        }
    }

    #[test]
    fn small_drawdown_does_not_trigger_stop() {
        let r = record("2330.TW", 95.01, Some(90.0));
        let rec = recommend(&r, Some(&held(100.0)));
        assert_eq!(rec.action, Action::Buy);
        assert_eq!(rec.confidence_label, ConfidenceLabel::Add);
        assert_eq!(rec.risk_flag, None);
        assert!((rec.stop_hint.unwrap() - 95.0).abs() < 1e-9);
    }

    #[test]
    fn unheld_records_ignore_drawdown() {
        let r = record("2330.TW", 10.0, Some(90.0));
        assert!(stop_loss_drop(&r, None).is_none());
        let rec = recommend(&r, None);
        assert_eq!(rec.action, Action::Buy);
        assert_eq!(rec.confidence_label, ConfidenceLabel::StrongBuy);
        assert_eq!(rec.entry_hint, Some(EntryHint::Market { price: 10.0 }));
    }

    #[test]
    fn band_boundaries_resolve_upward() {
        let cases = [
            (85.0, Action::Buy),
            (84.999, Action::HoldWatch),
            (75.0, Action::HoldWatch),
            (74.999, Action::Avoid),
        ];
        for (score, expected) in cases {
            let rec = recommend(&record("2317.TW", 100.0, Some(score)), None);
            assert_eq!(rec.action, expected, "score={score}");
        }
    }

    #[test]
    fn labels_depend_on_held_state() {
        let r = record("2317.TW", 100.0, Some(80.0));
        assert_eq!(recommend(&r, None).confidence_label, ConfidenceLabel::Watch);
        assert_eq!(
            recommend(&r, Some(&held(100.0))).confidence_label,
            ConfidenceLabel::Hold
        );
    }

    #[test]
    fn missing_score_is_avoid() {
        let rec = recommend(&record("1101.TW", 40.0, None), None);
        assert_eq!(rec.action, Action::Avoid);
        assert_eq!(rec.confidence_label, ConfidenceLabel::Avoid);
        assert_eq!(rec.entry_hint, None);
    }

    #[test]
    fn uses_stored_risk_levels_when_present() {
        let mut r = record("2454.TW", 1000.0, Some(78.0));
        r.stop_price = Some(950.0);
        r.target_price = Some(1100.0);
        let rec = recommend(&r, Some(&held(990.0)));
        assert_eq!(rec.stop_hint, Some(950.0));
        assert_eq!(rec.exit_hint, Some(1100.0));
    }

    #[test]
    fn identical_inputs_yield_identical_output() {
        let r = record("2330.TW", 97.0, Some(86.0));
        let h = held(100.0);
        assert_eq!(recommend(&r, Some(&h)), recommend(&r.clone(), Some(&h)));
    }
}
