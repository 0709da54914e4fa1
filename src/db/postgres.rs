use crate::models::{Mode, Position, PositionKind, Rate};
use crate::strategy::{Mixin, MixinComponent};
use crate::Result;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use uuid::Uuid;

/// Postgres persistence for quotes, positions and mixins
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to Postgres and run pending migrations
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Connected to Postgres at {}", database_url);

        Ok(Self { pool })
    }

    // ===== Rates =====

    /// Append quotes to the history table. Duplicate (market, time) pairs
    /// are dropped silently.
    pub async fn save_rates(&self, rates: &[Rate]) -> Result<()> {
        for rate in rates {
            sqlx::query(
                r#"
                INSERT INTO rates (market, time, ask, bid)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (market, time) DO NOTHING
                "#,
            )
            .bind(&rate.market)
            .bind(rate.time)
            .bind(rate.ask)
            .bind(rate.bid)
            .execute(&self.pool)
            .await?;
        }

        tracing::debug!("Saved {} quotes to Postgres", rates.len());

        Ok(())
    }

    // ===== Positions =====

    /// Save position, updating the lifecycle fields on conflict
    pub async fn save_position(&self, position: &Position) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO positions (
                id, market, smooth, mode, kind, score, entry,
                start_time, end_time, open, timeout_score,
                relative_profit, daily_profit, exit_score,
                stop_loss, stop_gap, stop_success,
                entry_mix, exit_mix, external_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                    $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            ON CONFLICT (id) DO UPDATE SET
                kind = EXCLUDED.kind,
                end_time = EXCLUDED.end_time,
                open = EXCLUDED.open,
                timeout_score = EXCLUDED.timeout_score,
                relative_profit = EXCLUDED.relative_profit,
                daily_profit = EXCLUDED.daily_profit,
                exit_score = EXCLUDED.exit_score,
                stop_loss = EXCLUDED.stop_loss,
                stop_gap = EXCLUDED.stop_gap,
                stop_success = EXCLUDED.stop_success,
                external_id = EXCLUDED.external_id,
                updated_at = NOW()
            "#,
        )
        .bind(position.id)
        .bind(&position.market)
        .bind(position.smooth as i32)
        .bind(position.mode.as_str())
        .bind(position.kind.as_str())
        .bind(position.score)
        .bind(position.entry)
        .bind(position.start)
        .bind(position.end)
        .bind(position.open)
        .bind(position.timeout_score)
        .bind(position.relative_profit)
        .bind(position.daily_profit)
        .bind(position.exit_score)
        .bind(position.stop_loss)
        .bind(position.stop_gap)
        .bind(position.stop_success)
        .bind(position.entry_mix)
        .bind(position.exit_mix)
        .bind(&position.external_id)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            "Saved position {} for {} to Postgres",
            position.id,
            position.market
        );

        Ok(())
    }

    /// Load all open positions, oldest first
    pub async fn load_open_positions(&self) -> Result<Vec<Position>> {
        let rows = sqlx::query(
            r#"
            SELECT id, market, smooth, mode, kind, score, entry,
                   start_time, end_time, open, timeout_score,
                   relative_profit, daily_profit, exit_score,
                   stop_loss, stop_gap, stop_success,
                   entry_mix, exit_mix, external_id
            FROM positions
            WHERE open = TRUE
            ORDER BY start_time ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut positions = Vec::with_capacity(rows.len());
        for row in rows {
            positions.push(Self::decode_position(&row)?);
        }

        tracing::info!("Loaded {} open positions from Postgres", positions.len());

        Ok(positions)
    }

    /// Load closed positions that ended at or after the given timestamp
    pub async fn load_closed_since(&self, since: i64) -> Result<Vec<Position>> {
        let rows = sqlx::query(
            r#"
            SELECT id, market, smooth, mode, kind, score, entry,
                   start_time, end_time, open, timeout_score,
                   relative_profit, daily_profit, exit_score,
                   stop_loss, stop_gap, stop_success,
                   entry_mix, exit_mix, external_id
            FROM positions
            WHERE open = FALSE AND end_time >= $1
            ORDER BY end_time ASC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let mut positions = Vec::with_capacity(rows.len());
        for row in rows {
            positions.push(Self::decode_position(&row)?);
        }

        Ok(positions)
    }

    /// Delete every closed position sharing one blended configuration
    pub async fn purge_combination(
        &self,
        market: &str,
        smooth: usize,
        mode: Mode,
        entry_mix: i64,
        exit_mix: i64,
    ) -> Result<usize> {
        let result = sqlx::query(
            r#"
            DELETE FROM positions
            WHERE open = FALSE
              AND market = $1 AND smooth = $2 AND mode = $3
              AND entry_mix = $4 AND exit_mix = $5
            "#,
        )
        .bind(market)
        .bind(smooth as i32)
        .bind(mode.as_str())
        .bind(entry_mix)
        .bind(exit_mix)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() as usize)
    }

    /// Delete every closed position that ended before the cutoff
    pub async fn purge_before(&self, cutoff: i64) -> Result<usize> {
        let result = sqlx::query(
            "DELETE FROM positions WHERE open = FALSE AND end_time < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() as usize)
    }

    fn decode_position(row: &sqlx::postgres::PgRow) -> Result<Position> {
        let id: Uuid = row.get("id");
        let market: String = row.get("market");
        let smooth: i32 = row.get("smooth");
        let mode_str: String = row.get("mode");
        let kind_str: String = row.get("kind");

        let mode = Mode::parse(&mode_str).ok_or("Invalid position mode")?;
        let kind = PositionKind::parse(&kind_str).ok_or("Invalid position kind")?;

        Ok(Position {
            id,
            market,
            smooth: smooth as usize,
            mode,
            kind,
            score: row.get("score"),
            entry: row.get("entry"),
            start: row.get("start_time"),
            end: row.get("end_time"),
            open: row.get("open"),
            timeout_score: row.get("timeout_score"),
            relative_profit: row.get("relative_profit"),
            daily_profit: row.get("daily_profit"),
            exit_score: row.get("exit_score"),
            stop_loss: row.get("stop_loss"),
            stop_gap: row.get("stop_gap"),
            stop_success: row.get("stop_success"),
            entry_mix: row.get("entry_mix"),
            exit_mix: row.get("exit_mix"),
            external_id: row.get("external_id"),
        })
    }

    // ===== Mixins =====

    /// Store a mixin under its content hash if it is not already known,
    /// returning the hash either way.
    pub async fn retrieve_or_persist_mixin(&self, mixin: &Mixin) -> Result<i64> {
        let components = serde_json::to_string(&mixin.components)?;

        sqlx::query(
            r#"
            INSERT INTO mixins (hash, market, smooth, components)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (hash) DO NOTHING
            "#,
        )
        .bind(mixin.hash)
        .bind(&mixin.market)
        .bind(mixin.smooth as i32)
        .bind(components)
        .execute(&self.pool)
        .await?;

        Ok(mixin.hash)
    }

    /// Load a mixin by content hash
    pub async fn load_mixin(&self, hash: i64) -> Result<Option<Mixin>> {
        let row = sqlx::query(
            r#"
            SELECT market, smooth, components
            FROM mixins
            WHERE hash = $1
            "#,
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let market: String = row.get("market");
                let smooth: i32 = row.get("smooth");
                let components: String = row.get("components");
                let components: Vec<MixinComponent> = serde_json::from_str(&components)?;
                Ok(Some(Mixin::new(market, smooth as usize, components)))
            }
            None => Ok(None),
        }
    }

    /// Delete all positions (testing only)
    #[cfg(test)]
    pub async fn clear_all_positions(&self) -> Result<()> {
        sqlx::query("DELETE FROM positions")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PositionKind;

    async fn get_test_db() -> PostgresStore {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/tickmixer_test".to_string());

        PostgresStore::new(&database_url)
            .await
            .expect("Failed to connect to test database")
    }

    fn simulation_position(market: &str) -> Position {
        Position::open(
            market,
            0,
            Mode::Long,
            PositionKind::Simulation,
            80.0,
            1.0930,
            7,
            9,
        )
    }

    #[tokio::test]
    #[ignore] // Requires Postgres running
    async fn test_save_and_load_open_position() {
        let db = get_test_db().await;
        db.clear_all_positions().await.unwrap();

        let position = simulation_position("EUR_USD");
        db.save_position(&position).await.unwrap();

        let open = db.load_open_positions().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, position.id);
        assert_eq!(open[0].market, "EUR_USD");
        assert_eq!(open[0].mode, Mode::Long);
        assert_eq!(open[0].entry_mix, 7);

        db.clear_all_positions().await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Postgres running
    async fn test_close_moves_position_out_of_open_set() {
        let db = get_test_db().await;
        db.clear_all_positions().await.unwrap();

        let mut position = simulation_position("EUR_USD");
        db.save_position(&position).await.unwrap();

        let rate = Rate::new("EUR_USD", position.start + 3_600_000, 1.1050, 1.1048);
        position.close(&rate, 90.0, false, 0.34);
        db.save_position(&position).await.unwrap();

        let open = db.load_open_positions().await.unwrap();
        assert!(open.is_empty());

        let closed = db.load_closed_since(position.start).await.unwrap();
        assert_eq!(closed.len(), 1);
        assert!(closed[0].relative_profit.unwrap() > 0.0);

        db.clear_all_positions().await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Postgres running
    async fn test_purge_combination() {
        let db = get_test_db().await;
        db.clear_all_positions().await.unwrap();

        let mut a = simulation_position("EUR_USD");
        let rate = Rate::new("EUR_USD", a.start + 60_000, 1.0920, 1.0918);
        a.close(&rate, -1.0, true, 0.34);
        db.save_position(&a).await.unwrap();

        // Same combination, still open: must survive the purge.
        let b = simulation_position("EUR_USD");
        db.save_position(&b).await.unwrap();

        let removed = db
            .purge_combination("EUR_USD", 0, Mode::Long, 7, 9)
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(db.load_open_positions().await.unwrap().len(), 1);

        db.clear_all_positions().await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Postgres running
    async fn test_mixin_round_trip() {
        use crate::curve::Variation;
        use crate::strategy::{MarginConfig, StrategyEntity};

        let db = get_test_db().await;

        let mixin = Mixin::new(
            "EUR_USD",
            2,
            vec![MixinComponent {
                entity: StrategyEntity::Margin(MarginConfig {
                    profit: 50.0,
                    loss: 100.0,
                    variation: Variation::Average,
                }),
                weight: 100.0,
            }],
        );

        let hash = db.retrieve_or_persist_mixin(&mixin).await.unwrap();
        assert_eq!(hash, mixin.hash);

        // Second persist of the same content is a no-op.
        let again = db.retrieve_or_persist_mixin(&mixin).await.unwrap();
        assert_eq!(again, hash);

        let loaded = db.load_mixin(hash).await.unwrap().unwrap();
        assert_eq!(loaded.hash, mixin.hash);
        assert_eq!(loaded.components, mixin.components);
    }
}
