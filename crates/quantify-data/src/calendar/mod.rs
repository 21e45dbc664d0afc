//! 거래소별 거래 캘린더.
//!
//! `CalendarService`는 거래소 이름을 캘린더 구현에 매핑하고,
//! `(거래소, 시작일, 종료일)` 단위로 유효 거래일 목록을 캐싱합니다.
//! 같은 입력에는 항상 같은 결과를 반환합니다.

mod nyse;

pub use nyse::UsEquityCalendar;

use crate::error::{DataError, Result};
use chrono::NaiveDate;
use quantify_core::DateRange;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// 캐시 항목 수 상한. 초과하면 전체를 비웁니다.
const MAX_CACHED_WINDOWS: usize = 512;

/// 직전 거래일을 찾을 때 거슬러 올라가는 최대 일수.
const MAX_LOOKBACK_DAYS: usize = 31;

/// 거래 캘린더 제공자.
pub trait TradingCalendar: Send + Sync {
    /// 캘린더 이름.
    fn name(&self) -> &str;

    /// 해당 날짜에 거래가 열리는지 확인합니다.
    fn is_trading_day(&self, date: NaiveDate) -> bool;

    /// `[start, end]` 안의 거래일을 순서대로 반환합니다.
    fn trading_days(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| self.is_trading_day(*d))
            .collect()
    }
}

type WindowKey = (String, NaiveDate, NaiveDate);

/// 거래소 이름 → 캘린더 레지스트리 + 거래일 캐시.
pub struct CalendarService {
    calendars: HashMap<String, Arc<dyn TradingCalendar>>,
    cache: RwLock<HashMap<WindowKey, Arc<[NaiveDate]>>>,
}

impl Default for CalendarService {
    fn default() -> Self {
        Self::us_equities()
    }
}

impl CalendarService {
    /// 캘린더가 등록되지 않은 빈 서비스.
    pub fn empty() -> Self {
        Self {
            calendars: HashMap::new(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// 미국 주식 거래소(NYSE, NASDAQ 등)가 등록된 서비스.
    pub fn us_equities() -> Self {
        let calendar: Arc<dyn TradingCalendar> = Arc::new(UsEquityCalendar);
        let mut service = Self::empty();
        for name in ["NYSE", "NASDAQ", "AMEX", "ARCA", "BATS", "XNYS", "XNAS"] {
            service.register(name, calendar.clone());
        }
        service
    }

    /// 거래소 이름(대소문자 무시)에 캘린더를 등록합니다.
    pub fn register(&mut self, exchange: &str, calendar: Arc<dyn TradingCalendar>) {
        self.calendars.insert(exchange.to_ascii_uppercase(), calendar);
    }

    /// 등록된 거래소 이름 목록.
    pub fn exchanges(&self) -> Vec<String> {
        let mut names: Vec<String> = self.calendars.keys().cloned().collect();
        names.sort();
        names
    }

    fn calendar(&self, exchange: &str) -> Result<(String, &Arc<dyn TradingCalendar>)> {
        let key = exchange.trim().to_ascii_uppercase();
        match self.calendars.get(&key) {
            Some(calendar) => Ok((key, calendar)),
            None => Err(DataError::UnknownExchange(exchange.to_string())),
        }
    }

    /// 거래소에 등록된 캘린더가 있는지 확인합니다.
    pub fn ensure_known(&self, exchange: &str) -> Result<()> {
        self.calendar(exchange).map(|_| ())
    }

    /// `range` 안의 유효 거래일을 순서대로 반환합니다.
    pub fn valid_dates(&self, exchange: &str, range: &DateRange) -> Result<Arc<[NaiveDate]>> {
        let (name, calendar) = self.calendar(exchange)?;
        let key = (name, range.start(), range.end());

        if let Ok(cache) = self.cache.read() {
            if let Some(days) = cache.get(&key) {
                return Ok(days.clone());
            }
        }

        let days: Arc<[NaiveDate]> = calendar.trading_days(range.start(), range.end()).into();
        debug!(
            exchange = %key.0,
            range = %range,
            trading_days = days.len(),
            "거래일 계산"
        );

        if let Ok(mut cache) = self.cache.write() {
            if cache.len() >= MAX_CACHED_WINDOWS {
                cache.clear();
            }
            cache.insert(key, days.clone());
        }

        Ok(days)
    }

    /// `range` 안의 거래일 수.
    pub fn trading_day_count(&self, exchange: &str, range: &DateRange) -> Result<usize> {
        Ok(self.valid_dates(exchange, range)?.len())
    }

    /// 해당 날짜가 거래일인지 확인합니다.
    pub fn is_trading_day(&self, exchange: &str, date: NaiveDate) -> Result<bool> {
        let (_, calendar) = self.calendar(exchange)?;
        Ok(calendar.is_trading_day(date))
    }

    /// `date`보다 앞선(당일 제외) 가장 가까운 거래일.
    ///
    /// 당일 일봉은 장 마감 후에야 확정되므로 기본 조회 종료일로 씁니다.
    pub fn previous_trading_day(&self, exchange: &str, date: NaiveDate) -> Result<Option<NaiveDate>> {
        let (_, calendar) = self.calendar(exchange)?;
        let mut day = date;
        for _ in 0..MAX_LOOKBACK_DAYS {
            let Some(prev) = day.pred_opt() else {
                return Ok(None);
            };
            if calendar.is_trading_day(prev) {
                return Ok(Some(prev));
            }
            day = prev;
        }
        Ok(None)
    }

    /// 범위의 양 끝을 범위 안쪽의 가장 가까운 거래일로 맞춥니다.
    ///
    /// 범위 안에 거래일이 없으면 `None`을 반환합니다.
    pub fn snap(&self, exchange: &str, range: &DateRange) -> Result<Option<DateRange>> {
        let days = self.valid_dates(exchange, range)?;
        match (days.first(), days.last()) {
            (Some(first), Some(last)) => Ok(Some(DateRange::new(*first, *last)?)),
            _ => Ok(None),
        }
    }
}
