//! PostgreSQL 저장소 구현.
//!
//! 테이블 (`migrations/` 참고):
//! - `daily_bars`: (symbol, timeframe, bar_date) 기본 키
//! - `bar_availability`: 종목별 연속 가용 범위
//! - `assets`: 종목 메타데이터
//!
//! 가용 범위 확장은 `LEAST`/`GREATEST` upsert 한 번으로 처리하므로
//! 여러 프로세스가 동시에 확장해도 범위가 줄어들지 않습니다.

use super::rows::{to_db_count, AssetRow, AvailabilityRow, BarRow};
use super::{AssetStore, AvailabilityRecord, BarStore};
use crate::assets::BasketCriteria;
use crate::error::{DataError, Result};
use async_trait::async_trait;
use quantify_core::{AssetRecord, Bar, DatabaseConfig, DateRange, Symbol, Timeframe};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use tracing::{debug, info, instrument};

/// 배치 INSERT 당 최대 행 수.
const INSERT_CHUNK_SIZE: usize = 500;

/// 연결 풀을 생성합니다.
pub async fn connect_pool(config: &DatabaseConfig) -> Result<PgPool> {
    info!("데이터베이스 연결 중...");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.connect_timeout())
        .connect(&config.url)
        .await
        .map_err(|e| DataError::StorageUnavailable(e.to_string()))?;

    info!("데이터베이스 연결 성공");
    Ok(pool)
}

/// 내장된 마이그레이션을 실행합니다.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    info!("마이그레이션 실행 중...");
    sqlx::migrate!("../../migrations").run(pool).await?;
    info!("마이그레이션 완료");
    Ok(())
}

/// PostgreSQL 일봉 저장소.
#[derive(Clone)]
pub struct PgBarStore {
    pool: PgPool,
}

impl PgBarStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl BarStore for PgBarStore {
    #[instrument(skip(self, bars), fields(symbol = %symbol, count = bars.len()))]
    async fn write(&self, symbol: &Symbol, timeframe: Timeframe, bars: &[Bar]) -> Result<usize> {
        if bars.is_empty() {
            return Ok(0);
        }

        let tf = timeframe.as_api_str();
        let mut total = 0;

        for chunk in bars.chunks(INSERT_CHUNK_SIZE) {
            let mut rows = Vec::with_capacity(chunk.len());
            for bar in chunk {
                rows.push((
                    bar,
                    to_db_count(bar.volume, "volume", bar.date)?,
                    to_db_count(bar.trade_count, "trade_count", bar.date)?,
                ));
            }

            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO daily_bars \
                 (symbol, timeframe, bar_date, open, high, low, close, volume, trade_count, vwap) ",
            );
            builder.push_values(rows, |mut b, (bar, volume, trade_count)| {
                b.push_bind(symbol.as_str())
                    .push_bind(tf)
                    .push_bind(bar.date)
                    .push_bind(bar.open)
                    .push_bind(bar.high)
                    .push_bind(bar.low)
                    .push_bind(bar.close)
                    .push_bind(volume)
                    .push_bind(trade_count)
                    .push_bind(bar.vwap);
            });
            builder.push(
                " ON CONFLICT (symbol, timeframe, bar_date) DO UPDATE SET \
                 open = EXCLUDED.open, high = EXCLUDED.high, low = EXCLUDED.low, \
                 close = EXCLUDED.close, volume = EXCLUDED.volume, \
                 trade_count = EXCLUDED.trade_count, vwap = EXCLUDED.vwap, fetched_at = NOW()",
            );

            let result = builder.build().execute(&self.pool).await?;
            total += result.rows_affected() as usize;
        }

        debug!(written = total, "일봉 저장 완료");
        Ok(total)
    }

    async fn read(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        range: &DateRange,
    ) -> Result<Vec<Bar>> {
        let rows: Vec<BarRow> = sqlx::query_as(
            r#"
            SELECT bar_date, open, high, low, close, volume, trade_count, vwap
            FROM daily_bars
            WHERE symbol = $1 AND timeframe = $2 AND bar_date BETWEEN $3 AND $4
            ORDER BY bar_date ASC
            "#,
        )
        .bind(symbol.as_str())
        .bind(timeframe.as_api_str())
        .bind(range.start())
        .bind(range.end())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Bar::try_from).collect()
    }

    async fn availability(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
    ) -> Result<Option<AvailabilityRecord>> {
        let row: Option<AvailabilityRow> = sqlx::query_as(
            r#"
            SELECT available_from, available_to, last_updated_at
            FROM bar_availability
            WHERE symbol = $1 AND timeframe = $2
            "#,
        )
        .bind(symbol.as_str())
        .bind(timeframe.as_api_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(AvailabilityRecord::try_from).transpose()
    }

    #[instrument(skip(self), fields(symbol = %symbol, range = %range))]
    async fn extend_availability(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        range: &DateRange,
    ) -> Result<AvailabilityRecord> {
        let row: AvailabilityRow = sqlx::query_as(
            r#"
            INSERT INTO bar_availability (symbol, timeframe, available_from, available_to, last_updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (symbol, timeframe) DO UPDATE SET
                available_from = LEAST(bar_availability.available_from, EXCLUDED.available_from),
                available_to = GREATEST(bar_availability.available_to, EXCLUDED.available_to),
                last_updated_at = NOW()
            RETURNING available_from, available_to, last_updated_at
            "#,
        )
        .bind(symbol.as_str())
        .bind(timeframe.as_api_str())
        .bind(range.start())
        .bind(range.end())
        .fetch_one(&self.pool)
        .await?;

        AvailabilityRecord::try_from(row)
    }

    async fn reset_availability(&self, symbol: &Symbol, timeframe: Timeframe) -> Result<()> {
        sqlx::query("DELETE FROM bar_availability WHERE symbol = $1 AND timeframe = $2")
            .bind(symbol.as_str())
            .bind(timeframe.as_api_str())
            .execute(&self.pool)
            .await?;
        info!(symbol = %symbol, "가용 범위 기록 초기화");
        Ok(())
    }
}

/// PostgreSQL 종목 저장소.
#[derive(Clone)]
pub struct PgAssetStore {
    pool: PgPool,
}

impl PgAssetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssetStore for PgAssetStore {
    #[instrument(skip(self, assets), fields(count = assets.len()))]
    async fn upsert_assets(&self, assets: &[AssetRecord]) -> Result<usize> {
        let mut total = 0;

        for chunk in assets.chunks(INSERT_CHUNK_SIZE) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO assets \
                 (symbol, company_name, exchange, is_delisted, is_shortable, is_suspended, date_last_updated) ",
            );
            builder.push_values(chunk, |mut b, asset| {
                b.push_bind(asset.symbol.as_str())
                    .push_bind(&asset.company_name)
                    .push_bind(&asset.exchange)
                    .push_bind(asset.is_delisted)
                    .push_bind(asset.is_shortable)
                    .push_bind(asset.is_suspended)
                    .push_bind(asset.date_last_updated);
            });
            builder.push(
                " ON CONFLICT (symbol) DO UPDATE SET \
                 company_name = EXCLUDED.company_name, exchange = EXCLUDED.exchange, \
                 is_delisted = EXCLUDED.is_delisted, is_shortable = EXCLUDED.is_shortable, \
                 is_suspended = EXCLUDED.is_suspended, date_last_updated = EXCLUDED.date_last_updated",
            );

            let result = builder.build().execute(&self.pool).await?;
            total += result.rows_affected() as usize;
        }

        Ok(total)
    }

    async fn get_asset(&self, symbol: &Symbol) -> Result<Option<AssetRecord>> {
        let row: Option<AssetRow> = sqlx::query_as(
            r#"
            SELECT symbol, company_name, exchange, is_delisted, is_shortable, is_suspended, date_last_updated
            FROM assets
            WHERE symbol = $1
            "#,
        )
        .bind(symbol.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(AssetRecord::try_from).transpose()
    }

    async fn select_symbols(&self, criteria: &BasketCriteria) -> Result<Vec<Symbol>> {
        let limit = criteria
            .limit
            .map(|l| i64::try_from(l).unwrap_or(i64::MAX));

        let rows: Vec<AssetRow> = sqlx::query_as(
            r#"
            SELECT symbol, company_name, exchange, is_delisted, is_shortable, is_suspended, date_last_updated
            FROM assets
            WHERE ($1::TEXT IS NULL OR UPPER(exchange) = UPPER($1))
              AND ($2 OR NOT is_delisted)
              AND ($3 OR NOT is_suspended)
            ORDER BY symbol ASC
            LIMIT $4
            "#,
        )
        .bind(criteria.exchange.as_deref())
        .bind(criteria.include_delisted)
        .bind(criteria.include_suspended)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| AssetRecord::try_from(row).map(|asset| asset.symbol))
            .collect()
    }
}
