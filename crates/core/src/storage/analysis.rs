use crate::domain::market::{clamp_score, MarketRecord};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

/// Raw `stock_analysis` row. Every numeric column is nullable in the store.
#[derive(Debug, Clone, sqlx::FromRow, Deserialize)]
pub struct AnalysisRow {
    pub code: String,
    pub name: String,
    pub analysis_date: NaiveDate,
    pub close_price: Option<f64>,
    pub ai_score: Option<f64>,
    pub roe: Option<f64>,
    pub revenue_yoy: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub volatility: Option<f64>,
    pub short_term_score: Option<f64>,
    pub long_term_score: Option<f64>,
    pub stop_price: Option<f64>,
    pub target_price: Option<f64>,
    pub updated_at: Option<DateTime<Utc>>,
}

fn finite(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}

fn positive(v: Option<f64>) -> Option<f64> {
    finite(v).filter(|x| *x > 0.0)
}

impl TryFrom<AnalysisRow> for MarketRecord {
    type Error = anyhow::Error;

    fn try_from(row: AnalysisRow) -> anyhow::Result<Self> {
        let code = row.code.trim().to_string();
        anyhow::ensure!(!code.is_empty(), "code must be non-empty");
        let close_price = positive(row.close_price)
            .with_context(|| format!("close_price must be > 0 for {code} (got {:?})", row.close_price))?;

        Ok(Self {
            name: row.name.trim().to_string(),
            close_price,
            ai_score: finite(row.ai_score).map(clamp_score),
            roe: finite(row.roe),
            revenue_yoy: finite(row.revenue_yoy),
            pe_ratio: finite(row.pe_ratio),
            volume_ratio: finite(row.volume_ratio).unwrap_or(0.0).max(0.0),
            volatility: finite(row.volatility).unwrap_or(0.0).max(0.0),
            short_term_score: finite(row.short_term_score).map_or(0.0, clamp_score),
            long_term_score: finite(row.long_term_score).map_or(0.0, clamp_score),
            stop_price: positive(row.stop_price),
            target_price: positive(row.target_price),
            analysis_date: row.analysis_date,
            updated_at: row.updated_at,
            code,
        })
    }
}

/// Normalize raw rows, dropping the ones that cannot be priced.
///
/// Also returns every row's `updated_at` so freshness covers the whole batch.
pub fn normalize_rows(rows: Vec<AnalysisRow>) -> (Vec<MarketRecord>, Vec<Option<DateTime<Utc>>>) {
    let mut records = Vec::with_capacity(rows.len());
    let mut stamps = Vec::with_capacity(rows.len());
    let mut skipped: usize = 0;
    for row in rows {
        stamps.push(row.updated_at);
        match MarketRecord::try_from(row) {
            Ok(r) => records.push(r),
            Err(err) => {
                skipped += 1;
                tracing::warn!(error = %err, "skipping malformed stock_analysis row");
            }
        }
    }
    if skipped > 0 {
        tracing::debug!(skipped, kept = records.len(), "stock_analysis normalization");
    }
    (records, stamps)
}

pub async fn list_analysis(pool: &sqlx::PgPool) -> anyhow::Result<Vec<AnalysisRow>> {
    let t0 = std::time::Instant::now();
    let rows = sqlx::query_as::<_, AnalysisRow>(
        "SELECT code, name, analysis_date, close_price, ai_score, roe, revenue_yoy, pe_ratio, \
                volume_ratio, volatility, short_term_score, long_term_score, stop_price, \
                target_price, updated_at \
         FROM stock_analysis \
         ORDER BY analysis_date DESC, ai_score DESC NULLS LAST",
    )
    .persistent(false)
    .fetch_all(pool)
    .await
    .context("select stock_analysis failed")?;

    tracing::debug!(
        rows = rows.len(),
        elapsed_ms = t0.elapsed().as_millis(),
        "stock_analysis fetched"
    );
    Ok(rows)
}


#[cfg(test)]
mod tests {
    use super::fixtures::row;
    use super::*;

    #[test]
    fn normalizes_missing_numerics() {
        let record = MarketRecord::try_from(row(" 2330.TW ", Some(600.0), None)).unwrap();
        assert_eq!(record.code, "2330.TW");
        assert_eq!(record.ai_score, None);
        assert_eq!(record.volume_ratio, 0.0);
        assert_eq!(record.volatility, 0.0);
        assert_eq!(record.short_term_score, 0.0);
        assert_eq!(record.roe, None);
    }

    #[test]
    fn clamps_score_and_rejects_unpriced_rows() {
        let record = MarketRecord::try_from(row("2330.TW", Some(600.0), Some(130.0))).unwrap();
        assert_eq!(record.ai_score, Some(100.0));

        assert!(MarketRecord::try_from(row("2330.TW", None, Some(90.0))).is_err());
        assert!(MarketRecord::try_from(row("2330.TW", Some(0.0), Some(90.0))).is_err());
        assert!(MarketRecord::try_from(row("2330.TW", Some(-3.0), Some(90.0))).is_err());
    }

    #[test]
    fn drops_non_positive_risk_levels() {
        let mut r = row("2330.TW", Some(600.0), Some(80.0));
        r.stop_price = Some(0.0);
        r.target_price = Some(f64::NAN);
        r.volatility = Some(-1.0);
        let record = MarketRecord::try_from(r).unwrap();
        assert_eq!(record.stop_price, None);
        assert_eq!(record.target_price, None);
        assert_eq!(record.volatility, 0.0);
    }

    #[test]
    fn normalize_rows_keeps_every_timestamp() {
        let (records, stamps) = normalize_rows(vec![
            row("2330.TW", Some(600.0), Some(80.0)),
            row("9999.TW", None, Some(80.0)),
        ]);
        assert_eq!(records.len(), 1);
        assert_eq!(stamps.len(), 2);
    }
}
