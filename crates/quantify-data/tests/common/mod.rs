//! 통합 테스트 공용 도구.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use quantify_core::{Bar, DateRange, FetchConfig, Symbol, Timeframe};
use quantify_data::{BarSource, CalendarService, DataError, MemoryBarStore, QueryFacade, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// 종목별 응답 규칙.
#[derive(Debug, Clone, Copy)]
pub enum Script {
    /// 요청 범위의 모든 거래일
    Full,
    /// 첫 `n`번 호출은 마지막 `drop`개 거래일을 빼고 응답, 이후 Full
    TailMissing { calls: usize, drop: usize },
    /// 지정한 거래일 수만큼 앞에서부터 응답
    FirstDays(usize),
    /// 항상 빈 응답
    Empty,
    /// 항상 전송 오류
    Failing,
    /// 인증 실패
    Unauthorized,
    /// 요청 범위의 모든 거래일, 단 마지막 봉은 고가 < 저가에 종가 NaN
    CorruptLast,
}

/// 규칙에 따라 응답하는 가짜 소스. 호출 기록을 남깁니다.
pub struct ScriptedSource {
    calendar: CalendarService,
    scripts: HashMap<Symbol, Script>,
    calls: Mutex<Vec<(Symbol, DateRange)>>,
}

impl ScriptedSource {
    pub fn new(scripts: &[(&str, Script)]) -> Self {
        Self {
            calendar: CalendarService::us_equities(),
            scripts: scripts
                .iter()
                .map(|(s, script)| (Symbol::new(s).unwrap(), *script))
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(Symbol, DateRange)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, symbol: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s.as_str() == symbol)
            .count()
    }
}

#[async_trait]
impl BarSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch_bars(
        &self,
        symbol: &Symbol,
        range: &DateRange,
        _timeframe: Timeframe,
    ) -> Result<Vec<Bar>> {
        let previous = {
            let mut calls = self.calls.lock().unwrap();
            let previous = calls.iter().filter(|(s, _)| s == symbol).count();
            calls.push((symbol.clone(), *range));
            previous
        };

        let days = self.calendar.valid_dates("NYSE", range)?;
        let script = self.scripts.get(symbol).copied().unwrap_or(Script::Full);
        let take = match script {
            Script::Full => days.len(),
            Script::TailMissing { calls, drop } if previous < calls => days.len().saturating_sub(drop),
            Script::TailMissing { .. } => days.len(),
            Script::FirstDays(n) => n.min(days.len()),
            Script::Empty => 0,
            Script::Failing => return Err(DataError::FetchError("HTTP 503".to_string())),
            Script::Unauthorized => return Err(DataError::ConfigError("HTTP 401".to_string())),
            Script::CorruptLast => days.len(),
        };

        let mut bars: Vec<Bar> = days[..take].iter().map(|d| bar(*d)).collect();
        if matches!(script, Script::CorruptLast) {
            if let Some(last) = bars.last_mut() {
                last.high = 5.0;
                last.low = 9.0;
                last.close = f64::NAN;
            }
        }

        // 역순으로 반환해 정렬을 확인
        bars.reverse();
        Ok(bars)
    }
}

pub fn bar(date: NaiveDate) -> Bar {
    let base = 100.0 + f64::from(date.day());
    Bar::new(date, base, base + 2.0, base - 2.0, base + 1.0, 1_000_000, 5_000, Some(base + 0.5))
}

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

pub fn sym(s: &str) -> Symbol {
    Symbol::new(s).unwrap()
}

pub fn fetch_config() -> FetchConfig {
    FetchConfig {
        max_retries: 3,
        retry_delay_secs: 60,
        concurrency: 4,
        max_trading_days: 1000,
    }
}

pub struct Harness {
    pub facade: QueryFacade,
    pub store: Arc<MemoryBarStore>,
    pub source: Arc<ScriptedSource>,
}

pub fn harness(scripts: &[(&str, Script)]) -> Harness {
    let store = Arc::new(MemoryBarStore::new());
    let source = Arc::new(ScriptedSource::new(scripts));
    let facade = QueryFacade::new(
        store.clone(),
        source.clone(),
        Arc::new(CalendarService::us_equities()),
        fetch_config(),
    );
    Harness {
        facade,
        store,
        source,
    }
}
