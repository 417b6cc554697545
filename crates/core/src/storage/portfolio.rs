use crate::domain::position::{NewPosition, PositionRecord};
use anyhow::Context;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub async fn list_holdings(pool: &sqlx::PgPool, user_id: Uuid) -> anyhow::Result<Vec<PositionRecord>> {
    let rows = sqlx::query_as::<_, (Uuid, String, f64, f64, DateTime<Utc>)>(
        "SELECT id, code, entry_price, quantity, created_at \
         FROM portfolio \
         WHERE user_id = $1 AND status = 'holding' \
         ORDER BY created_at DESC",
    )
    .persistent(false)
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("select portfolio holdings failed")?;

    Ok(rows
        .into_iter()
        .map(|(id, code, entry_price, quantity, opened_at)| PositionRecord {
            id,
            code,
            entry_price,
            quantity,
            opened_at,
        })
        .collect())
}

/// Open a holding, closing any active holding for the same code first.
pub async fn add_position(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    position: NewPosition,
) -> anyhow::Result<PositionRecord> {
    let position = position.validate()?;
    let mut tx = pool.begin().await.context("begin transaction failed")?;

    let closed = sqlx::query(
        "UPDATE portfolio SET status = 'closed' \
         WHERE user_id = $1 AND code = $2 AND status = 'holding'",
    )
    .persistent(false)
    .bind(user_id)
    .bind(&position.code)
    .execute(&mut *tx)
    .await
    .context("close previous portfolio holding failed")?
    .rows_affected();

    let id = Uuid::new_v4();
    let opened_at: DateTime<Utc> = sqlx::query_scalar(
        "INSERT INTO portfolio (id, user_id, code, entry_price, quantity, status) \
         VALUES ($1, $2, $3, $4, $5, 'holding') \
         RETURNING created_at",
    )
    .bind(id)
    .bind(user_id)
    .bind(&position.code)
    .bind(position.entry_price)
    .bind(position.quantity)
    .fetch_one(&mut *tx)
    .await
    .context("insert portfolio failed")?;

    tx.commit().await.context("commit transaction failed")?;

    tracing::info!(%user_id, code = %position.code, replaced = closed > 0, "portfolio holding opened");

    Ok(PositionRecord {
        id,
        code: position.code,
        entry_price: position.entry_price,
        quantity: position.quantity,
        opened_at,
    })
}

pub async fn remove_position(pool: &sqlx::PgPool, user_id: Uuid, code: &str) -> anyhow::Result<bool> {
    let res = sqlx::query(
        "DELETE FROM portfolio \
         WHERE user_id = $1 AND code = $2 AND status = 'holding'",
    )
    .persistent(false)
    .bind(user_id)
    .bind(code.trim())
    .execute(pool)
    .await
    .context("delete portfolio holding failed")?;

    Ok(res.rows_affected() > 0)
}
