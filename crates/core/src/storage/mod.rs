pub mod analysis;
pub mod portfolio;

use crate::domain::position::{NewPosition, PositionRecord};
use analysis::AnalysisRow;
use anyhow::Context;
use uuid::Uuid;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// Reads and writes against the hosted data store.
#[async_trait::async_trait]
pub trait MarketStore: Send + Sync {
    /// All analysis rows, newest date first, then highest score.
    async fn list_analysis(&self) -> anyhow::Result<Vec<AnalysisRow>>;

    /// Active holdings for a user, newest first.
    async fn list_holdings(&self, user_id: Uuid) -> anyhow::Result<Vec<PositionRecord>>;

    /// Replaces any active holding for the same code.
    async fn add_position(&self, user_id: Uuid, position: NewPosition)
        -> anyhow::Result<PositionRecord>;

    async fn remove_position(&self, user_id: Uuid, code: &str) -> anyhow::Result<bool>;
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: sqlx::PgPool,
}

impl PgStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("connect DATABASE_URL failed")?;
        migrate(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl MarketStore for PgStore {
    async fn list_analysis(&self) -> anyhow::Result<Vec<AnalysisRow>> {
        analysis::list_analysis(&self.pool).await
    }

    async fn list_holdings(&self, user_id: Uuid) -> anyhow::Result<Vec<PositionRecord>> {
        portfolio::list_holdings(&self.pool, user_id).await
    }

    async fn add_position(
        &self,
        user_id: Uuid,
        position: NewPosition,
    ) -> anyhow::Result<PositionRecord> {
        portfolio::add_position(&self.pool, user_id, position).await
    }

    async fn remove_position(&self, user_id: Uuid, code: &str) -> anyhow::Result<bool> {
        portfolio::remove_position(&self.pool, user_id, code).await
    }
}
