//! 일봉 미러에서 사용하는 타임프레임 정의.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 봉 타임프레임.
///
/// 조회 엔진은 일봉(`D1`)만 처리합니다. 주봉/월봉은 저장소 키와
/// 원격 API 파라미터 용도로만 존재합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    /// 일봉
    #[default]
    #[serde(rename = "1Day")]
    D1,
    /// 주봉
    #[serde(rename = "1Week")]
    W1,
    /// 월봉
    #[serde(rename = "1Month")]
    MN1,
}

impl Timeframe {
    /// Alpaca API 타임프레임 문자열로 변환합니다.
    pub fn as_api_str(&self) -> &'static str {
        match self {
            Timeframe::D1 => "1Day",
            Timeframe::W1 => "1Week",
            Timeframe::MN1 => "1Month",
        }
    }

    /// 일봉 여부.
    pub fn is_daily(&self) -> bool {
        matches!(self, Timeframe::D1)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_api_str())
    }
}

impl FromStr for Timeframe {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "1day" | "1d" | "day" => Ok(Timeframe::D1),
            "1week" | "1w" | "week" => Ok(Timeframe::W1),
            "1month" | "1mo" | "month" => Ok(Timeframe::MN1),
            _ => Err(CoreError::InvalidTimeframe(s.to_string())),
        }
    }
}
