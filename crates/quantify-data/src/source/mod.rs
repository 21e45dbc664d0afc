//! 원격 데이터 소스.
//!
//! - [`BarSource`]: 종목/기간 단위 과거 일봉 조회
//! - [`AssetSource`]: 거래 가능 종목 목록 조회

pub mod alpaca;

pub use alpaca::AlpacaClient;

use crate::error::Result;
use async_trait::async_trait;
use quantify_core::{AssetRecord, Bar, DateRange, Symbol, Timeframe};

/// 과거 일봉 제공자.
///
/// 반환 순서는 보장하지 않습니다. 호출자가 정렬합니다.
#[async_trait]
pub trait BarSource: Send + Sync {
    /// 소스 이름 (로그용).
    fn name(&self) -> &str;

    /// `range` 안의 봉을 조회합니다.
    async fn fetch_bars(
        &self,
        symbol: &Symbol,
        range: &DateRange,
        timeframe: Timeframe,
    ) -> Result<Vec<Bar>>;
}

/// 종목 목록 제공자.
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// 소스 이름 (로그용).
    fn name(&self) -> &str;

    /// 종목 목록을 조회합니다.
    async fn fetch_assets(&self) -> Result<Vec<AssetRecord>>;
}
