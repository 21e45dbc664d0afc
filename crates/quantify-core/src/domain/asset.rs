//! 종목 메타데이터 레코드.

use crate::types::Symbol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 거래 가능한 종목 하나의 메타데이터.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub symbol: Symbol,
    /// 회사명
    pub company_name: String,
    /// 상장 거래소 (NYSE, NASDAQ 등)
    pub exchange: String,
    /// 상장폐지 여부
    pub is_delisted: bool,
    /// 공매도 가능 여부
    pub is_shortable: bool,
    /// 거래 정지 여부
    pub is_suspended: bool,
    /// 마지막 갱신 시각
    pub date_last_updated: DateTime<Utc>,
}

impl AssetRecord {
    /// 현재 거래 가능한 종목인지 확인합니다.
    pub fn is_tradable(&self) -> bool {
        !self.is_delisted && !self.is_suspended
    }
}
