//! 일봉(OHLCV) 데이터 구조체.

use crate::error::{CoreError, CoreResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 한 종목의 하루치 OHLCV 봉.
///
/// 종목별 시계열 안에서 `date`가 기본 키입니다 (거래일당 하나).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// 거래일
    pub date: NaiveDate,
    /// 시가
    pub open: f64,
    /// 고가
    pub high: f64,
    /// 저가
    pub low: f64,
    /// 종가
    pub close: f64,
    /// 거래량
    pub volume: u64,
    /// 체결 건수
    pub trade_count: u64,
    /// 거래량 가중 평균가
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vwap: Option<f64>,
}

impl Bar {
    /// 새 일봉을 생성합니다.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        date: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: u64,
        trade_count: u64,
        vwap: Option<f64>,
    ) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
            trade_count,
            vwap,
        }
    }

    /// 같은 값을 다른 날짜로 복제합니다 (carry-forward 채우기용).
    pub fn carried_to(&self, date: NaiveDate) -> Self {
        Self {
            date,
            ..self.clone()
        }
    }

    /// 가격 값의 유효성을 검사합니다.
    pub fn validate(&self) -> CoreResult<()> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(self.invalid("가격이 유한한 양수가 아님"));
        }
        if self.high < self.low {
            return Err(self.invalid(format!("고가({}) < 저가({})", self.high, self.low)));
        }
        if let Some(vwap) = self.vwap {
            if !vwap.is_finite() {
                return Err(self.invalid("vwap이 유한하지 않음"));
            }
        }
        Ok(())
    }

    fn invalid(&self, reason: impl Into<String>) -> CoreError {
        CoreError::InvalidBar {
            date: self.date,
            reason: reason.into(),
        }
    }
}

/// 날짜순으로 정렬하고 같은 날짜의 중복 봉은 마지막 것만 남깁니다.
pub fn sort_and_dedup(bars: &mut Vec<Bar>) {
    // 안정 정렬이므로 같은 날짜 안에서는 입력 순서가 유지됨
    bars.sort_by_key(|b| b.date);
    let mut deduped: Vec<Bar> = Vec::with_capacity(bars.len());
    for bar in bars.drain(..) {
        match deduped.last_mut() {
            Some(last) if last.date == bar.date => *last = bar,
            _ => deduped.push(bar),
        }
    }
    *bars = deduped;
}
