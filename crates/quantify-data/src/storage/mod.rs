//! 저장소 추상화 및 구현.
//!
//! - [`BarStore`]: 종목별 일봉 시계열과 가용 범위 기록
//! - [`AssetStore`]: 종목 메타데이터와 바스켓 선택
//!
//! 구현:
//! - `postgres`: PostgreSQL (sqlx)
//! - `memory`: 프로세스 내 저장소 (테스트, 드라이런)

pub mod memory;
pub mod postgres;
pub mod rows;

use crate::assets::BasketCriteria;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use quantify_core::{AssetRecord, Bar, DateRange, Symbol, Timeframe};
use serde::Serialize;

pub use memory::{MemoryAssetStore, MemoryBarStore};
pub use postgres::{connect_pool, run_migrations, PgAssetStore, PgBarStore};

/// 저장소에 연속으로 채워진 날짜 범위.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AvailabilityRecord {
    /// `[available_from, available_to]`
    pub range: DateRange,
    /// 마지막 확장 시각
    pub last_updated: DateTime<Utc>,
}

impl AvailabilityRecord {
    pub fn new(range: DateRange, last_updated: DateTime<Utc>) -> Self {
        Self {
            range,
            last_updated,
        }
    }

    pub fn available_from(&self) -> NaiveDate {
        self.range.start()
    }

    pub fn available_to(&self) -> NaiveDate {
        self.range.end()
    }

    /// 기존 범위와 `range`의 최소/최대 경계를 합친 기록.
    pub fn extended(&self, range: &DateRange, now: DateTime<Utc>) -> Self {
        Self {
            range: self.range.hull(range),
            last_updated: now,
        }
    }
}

/// 일봉 저장소.
///
/// 연결 손실은 `DataError::StorageUnavailable`로 보고하며 재시도하지 않습니다.
#[async_trait]
pub trait BarStore: Send + Sync {
    /// 일봉을 저장합니다. 같은 날짜의 기존 봉은 덮어씁니다.
    async fn write(&self, symbol: &Symbol, timeframe: Timeframe, bars: &[Bar]) -> Result<usize>;

    /// 범위 안의 일봉을 날짜순으로 읽습니다.
    async fn read(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        range: &DateRange,
    ) -> Result<Vec<Bar>>;

    /// 종목의 가용 범위 기록 (없으면 `None`).
    async fn availability(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
    ) -> Result<Option<AvailabilityRecord>>;

    /// 가용 범위를 `range`와 합칩니다. 기록은 줄어들지 않습니다.
    ///
    /// 갱신된 기록을 반환합니다.
    async fn extend_availability(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        range: &DateRange,
    ) -> Result<AvailabilityRecord>;

    /// 가용 범위 기록을 삭제합니다 (관리 작업).
    async fn reset_availability(&self, symbol: &Symbol, timeframe: Timeframe) -> Result<()>;
}

/// 종목 메타데이터 저장소.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// 종목을 삽입하거나 갱신합니다.
    async fn upsert_assets(&self, assets: &[AssetRecord]) -> Result<usize>;

    /// 종목 하나를 조회합니다.
    async fn get_asset(&self, symbol: &Symbol) -> Result<Option<AssetRecord>>;

    /// 조건에 맞는 심볼을 알파벳순으로 반환합니다.
    async fn select_symbols(&self, criteria: &BasketCriteria) -> Result<Vec<Symbol>>;
}
