use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// One instrument's analysis snapshot for one date.
///
/// Values here are already normalized: `close_price > 0`, `ai_score` within
/// `[0, 100]` when present, and momentum inputs default to 0 when the store had
/// no value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRecord {
    pub code: String,
    pub name: String,
    pub close_price: f64,
    pub ai_score: Option<f64>,
    pub roe: Option<f64>,
    pub revenue_yoy: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub volume_ratio: f64,
    pub volatility: f64,
    pub short_term_score: f64,
    pub long_term_score: f64,
    pub stop_price: Option<f64>,
    pub target_price: Option<f64>,
    pub analysis_date: NaiveDate,
    pub updated_at: Option<DateTime<Utc>>,
}

impl MarketRecord {
    /// Score used for banding and ordering; missing counts as 0.
    pub fn score(&self) -> f64 {
        self.ai_score.unwrap_or(0.0)
    }
}

pub fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, 100.0)
}

/// Keep exactly one record per code: the newest `analysis_date`, ties broken
/// by the higher score. Output is ordered by score desc, then code.
pub fn latest_per_code(records: impl IntoIterator<Item = MarketRecord>) -> Vec<MarketRecord> {
    let mut latest: BTreeMap<String, MarketRecord> = BTreeMap::new();
    for record in records {
        let replace = latest
            .get(&record.code)
            .map_or(true, |current| supersedes(&record, current));
        if replace {
            latest.insert(record.code.clone(), record);
        }
    }

    let mut out: Vec<MarketRecord> = latest.into_values().collect();
    out.sort_by(by_score_desc);
    out
}

fn supersedes(candidate: &MarketRecord, current: &MarketRecord) -> bool {
    match candidate.analysis_date.cmp(&current.analysis_date) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => candidate.score() > current.score(),
    }
}

pub fn by_score_desc(a: &MarketRecord, b: &MarketRecord) -> Ordering {
    b.score()
        .partial_cmp(&a.score())
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.code.cmp(&b.code))
}


#[cfg(test)]
mod tests {
    use super::fixtures::record;
    use super::*;

    fn dated(code: &str, day: u32, score: f64) -> MarketRecord {
        MarketRecord {
            analysis_date: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
            ..record(code, 100.0, Some(score))
        }
    }

    #[test]
    fn keeps_newest_date_per_code() {
        let out = latest_per_code(vec![
            dated("2330.TW", 1, 95.0),
            dated("2330.TW", 3, 70.0),
            dated("2330.TW", 2, 99.0),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].analysis_date, NaiveDate::from_ymd_opt(2026, 3, 3).unwrap());
    }

    #[test]
    fn same_date_tie_breaks_on_higher_score() {
        let out = latest_per_code(vec![dated("2317.TW", 3, 60.0), dated("2317.TW", 3, 88.0)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].ai_score, Some(88.0));
    }

    #[test]
    fn orders_by_score_then_code() {
        let mut missing = dated("1101.TW", 3, 0.0);
        missing.ai_score = None;
        let out = latest_per_code(vec![
            missing,
            dated("2454.TW", 3, 80.0),
            dated("2303.TW", 3, 80.0),
            dated("2330.TW", 3, 90.0),
        ]);
        let codes: Vec<_> = out.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["2330.TW", "2303.TW", "2454.TW", "1101.TW"]);
    }

    #[test]
    fn clamps_scores_into_range() {
        assert_eq!(clamp_score(140.0), 100.0);
        assert_eq!(clamp_score(-3.0), 0.0);
        assert_eq!(clamp_score(42.5), 42.5);
    }
}
