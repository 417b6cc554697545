use crate::domain::market::{latest_per_code, MarketRecord};
use crate::domain::position::{Holding, Portfolio, PositionRecord};
use crate::domain::recommendation::{HorizonMode, Recommendation};
use crate::engine::weighted::{self, WeightedScores};
use crate::engine::{RecommendationEngine, Strategy};
use crate::storage::analysis::normalize_rows;
use crate::storage::MarketStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct DashboardRow {
    pub record: MarketRecord,
    pub position: Option<PositionRecord>,
    pub recommendation: Recommendation,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub as_of: DateTime<Utc>,
    pub strategy: Strategy,
    pub rows: Vec<DashboardRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StockDetail {
    pub as_of: DateTime<Utc>,
    pub record: MarketRecord,
    pub position: Option<PositionRecord>,
    pub scores: WeightedScores,
    pub recommendation: Recommendation,
}

struct Snapshot {
    records: Vec<MarketRecord>,
    portfolio: Portfolio,
    as_of: DateTime<Utc>,
}

// Both reads must succeed; a failure on either side drops the other.
async fn fetch_snapshot(
    store: &dyn MarketStore,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> anyhow::Result<Snapshot> {
    let (rows, holdings) =
        tokio::try_join!(store.list_analysis(), store.list_holdings(user_id))?;

    let (records, stamps) = normalize_rows(rows);
    let as_of = crate::time::freshness::resolve_as_of(stamps, now);

    Ok(Snapshot {
        records: latest_per_code(records),
        portfolio: Portfolio::from_newest_first(holdings),
        as_of,
    })
}

pub async fn load_dashboard(
    store: &dyn MarketStore,
    user_id: Uuid,
    strategy: Strategy,
    now: DateTime<Utc>,
) -> anyhow::Result<Dashboard> {
    let snapshot = fetch_snapshot(store, user_id, now).await?;
    let engine = RecommendationEngine::new(strategy);

    let mut rows: Vec<DashboardRow> = snapshot
        .records
        .into_iter()
        .map(|record| {
            let position = snapshot.portfolio.get(&record.code).cloned();
            let holding = position.as_ref().map(Holding::from);
            let recommendation = engine.recommend(&record, holding.as_ref());
            DashboardRow {
                record,
                position,
                recommendation,
            }
        })
        .collect();

    // Held first; records already arrive sorted by score, and the sort is stable.
    rows.sort_by_key(|row| row.position.is_none());

    let held = rows.iter().filter(|r| r.position.is_some()).count();
    let orphaned = snapshot
        .portfolio
        .iter()
        .filter(|p| !rows.iter().any(|r| r.record.code == p.code))
        .count();
    if orphaned > 0 {
        tracing::warn!(%user_id, orphaned, "holdings without analysis rows");
    }
    tracing::info!(
        %user_id,
        rows = rows.len(),
        held,
        as_of = %snapshot.as_of,
        "dashboard assembled"
    );

    Ok(Dashboard {
        as_of: snapshot.as_of,
        strategy,
        rows,
    })
}

pub async fn load_detail(
    store: &dyn MarketStore,
    user_id: Uuid,
    code: &str,
    force_mode: Option<HorizonMode>,
    now: DateTime<Utc>,
) -> anyhow::Result<Option<StockDetail>> {
    let snapshot = fetch_snapshot(store, user_id, now).await?;
    let code = code.trim();

    let Some(record) = snapshot.records.into_iter().find(|r| r.code == code) else {
        return Ok(None);
    };

    let position = snapshot.portfolio.get(code).cloned();
    let holding = position.as_ref().map(Holding::from);
    let recommendation = RecommendationEngine::new(Strategy::Weighted { force_mode })
        .recommend(&record, holding.as_ref());

    Ok(Some(StockDetail {
        as_of: snapshot.as_of,
        scores: weighted::weigh(&record, force_mode),
        record,
        position,
        recommendation,
    }))
}


#[cfg(test)]
mod tests {
    use super::testing::MemoryStore;
    use super::*;
    use crate::domain::position::NewPosition;
    use crate::domain::recommendation::{Action, ConfidenceLabel, RiskFlag};
    use crate::storage::analysis::fixtures::row;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
    }

    fn store() -> MemoryStore {
        let mut skewed = row("2317.TW", Some(100.0), Some(80.0));
        skewed.updated_at = Some(now() + Duration::hours(5));
        MemoryStore {
            rows: vec![
                row("2330.TW", Some(95.0), Some(90.0)),
                skewed,
                row("1101.TW", Some(40.0), Some(50.0)),
                row("9999.TW", None, Some(99.0)),
            ],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn assembles_rows_with_held_first() {
        let store = store();
        let user = Uuid::new_v4();
        store
            .add_position(
                user,
                NewPosition {
                    code: "1101.TW".to_string(),
                    entry_price: 40.0,
                    quantity: 1000.0,
                },
            )
            .await
            .unwrap();

        let dash = load_dashboard(&store, user, Strategy::Banding, now())
            .await
            .unwrap();

        let codes: Vec<_> = dash.rows.iter().map(|r| r.record.code.as_str()).collect();
        assert_eq!(codes, vec!["1101.TW", "2330.TW", "2317.TW"]);
        assert_eq!(dash.rows[0].recommendation.action, Action::Avoid);
        assert_eq!(dash.rows[1].recommendation.confidence_label, ConfidenceLabel::StrongBuy);
        // The skewed row is ignored when resolving freshness.
        assert_eq!(dash.as_of, Utc.with_ymd_and_hms(2026, 3, 2, 6, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn held_position_below_stop_sells() {
        let store = store();
        let user = Uuid::new_v4();
        store
            .add_position(
                user,
                NewPosition {
                    code: "2330.TW".to_string(),
                    entry_price: 100.0,
                    quantity: 1.0,
                },
            )
            .await
            .unwrap();

        let dash = load_dashboard(&store, user, Strategy::Banding, now())
            .await
            .unwrap();
        let row = &dash.rows[0];
        assert_eq!(row.record.code, "2330.TW");
        assert_eq!(row.recommendation.action, Action::Sell);
        assert_eq!(row.recommendation.risk_flag, Some(RiskFlag::StopTriggered));
    }

    #[tokio::test]
    async fn one_failed_fetch_fails_the_pair() {
        let store = MemoryStore {
            fail_holdings: true,
            ..store()
        };
        let res = load_dashboard(&store, Uuid::new_v4(), Strategy::Banding, now()).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn detail_uses_weighted_strategy() {
        let store = store();
        let detail = load_detail(&store, Uuid::new_v4(), "2330.TW", None, now())
            .await
            .unwrap()
            .unwrap();
        assert!(detail.recommendation.mode.is_some());
        assert_eq!(detail.recommendation.mode, Some(detail.scores.mode));

        let forced = load_detail(
            &store,
            Uuid::new_v4(),
            "2330.TW",
            Some(HorizonMode::Long),
            now(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(forced.recommendation.mode, Some(HorizonMode::Long));

        let missing = load_detail(&store, Uuid::new_v4(), "0000.TW", None, now())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn re_adding_replaces_position() {
        let store = store();
        let user = Uuid::new_v4();
        for price in [100.0, 90.0] {
            store
                .add_position(
                    user,
                    NewPosition {
                        code: "2330.TW".to_string(),
                        entry_price: price,
                        quantity: 5.0,
                    },
                )
                .await
                .unwrap();
        }
        let holdings = store.list_holdings(user).await.unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].entry_price, 90.0);
        assert!(store.remove_position(user, "2330.TW").await.unwrap());
        assert!(!store.remove_position(user, "2330.TW").await.unwrap());
    }
}
