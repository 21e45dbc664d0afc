//! 저장소 행 타입과 도메인 타입 간 변환.
//!
//! DB 행은 여기서 한 번만 검증하고 도메인 타입으로 변환합니다.
//! 쿼리 코드는 행 필드를 직접 해석하지 않습니다.

use crate::error::{DataError, Result};
use crate::storage::AvailabilityRecord;
use chrono::{DateTime, NaiveDate, Utc};
use quantify_core::{AssetRecord, Bar, DateRange, Symbol};
use sqlx::FromRow;

/// `daily_bars` 테이블 행.
#[derive(Debug, Clone, FromRow)]
pub struct BarRow {
    pub bar_date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub trade_count: i64,
    pub vwap: Option<f64>,
}

impl TryFrom<BarRow> for Bar {
    type Error = DataError;

    fn try_from(row: BarRow) -> Result<Self> {
        let volume = u64::try_from(row.volume).map_err(|_| {
            DataError::InvalidData(format!("{}: 음수 거래량 {}", row.bar_date, row.volume))
        })?;
        let trade_count = u64::try_from(row.trade_count).map_err(|_| {
            DataError::InvalidData(format!("{}: 음수 체결 건수 {}", row.bar_date, row.trade_count))
        })?;

        let bar = Bar::new(
            row.bar_date,
            row.open,
            row.high,
            row.low,
            row.close,
            volume,
            trade_count,
            row.vwap,
        );
        bar.validate()?;
        Ok(bar)
    }
}

/// `bar_availability` 테이블 행.
#[derive(Debug, Clone, FromRow)]
pub struct AvailabilityRow {
    pub available_from: NaiveDate,
    pub available_to: NaiveDate,
    pub last_updated_at: DateTime<Utc>,
}

impl TryFrom<AvailabilityRow> for AvailabilityRecord {
    type Error = DataError;

    fn try_from(row: AvailabilityRow) -> Result<Self> {
        let range = DateRange::new(row.available_from, row.available_to)
            .map_err(|e| DataError::InvalidData(e.to_string()))?;
        Ok(AvailabilityRecord::new(range, row.last_updated_at))
    }
}

/// `assets` 테이블 행.
#[derive(Debug, Clone, FromRow)]
pub struct AssetRow {
    pub symbol: String,
    pub company_name: String,
    pub exchange: String,
    pub is_delisted: bool,
    pub is_shortable: bool,
    pub is_suspended: bool,
    pub date_last_updated: DateTime<Utc>,
}

impl TryFrom<AssetRow> for AssetRecord {
    type Error = DataError;

    fn try_from(row: AssetRow) -> Result<Self> {
        let symbol =
            Symbol::new(&row.symbol).map_err(|e| DataError::InvalidData(e.to_string()))?;
        Ok(AssetRecord {
            symbol,
            company_name: row.company_name,
            exchange: row.exchange.to_ascii_uppercase(),
            is_delisted: row.is_delisted,
            is_shortable: row.is_shortable,
            is_suspended: row.is_suspended,
            date_last_updated: row.date_last_updated,
        })
    }
}

/// 저장 전 일봉 수치를 DB 정수 타입으로 변환합니다.
pub(crate) fn to_db_count(value: u64, field: &str, date: NaiveDate) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| DataError::InvalidData(format!("{}: {} 값이 너무 큼 ({})", date, field, value)))
}
