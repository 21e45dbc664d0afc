//! 누락 거래일 채우기.
//!
//! 값이 잘못된 봉(유한하지 않은 가격, 고가 < 저가)은 누락으로 봅니다.
//! 기대 거래일 대비 빠진 날짜가 허용치(`tolerance`) 이하면 직전 봉을
//! 복사해 날짜만 바꿔 채웁니다. 허용치를 넘거나 첫 거래일부터 빠져 있으면
//! 시계열 전체를 거부합니다.

use crate::calendar::CalendarService;
use crate::error::Result;
use chrono::NaiveDate;
use quantify_core::{sort_and_dedup, Bar, DateRange, Symbol};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// 기본 허용 누락 거래일 수.
pub const DEFAULT_TOLERANCE: usize = 3;

/// 거부 사유.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    /// 누락이 허용치를 초과
    TooManyMissing { have: usize, expected: usize },
    /// 첫 누락 날짜 앞에 복사할 봉이 없음
    NoPrecedingBar { date: NaiveDate },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::TooManyMissing { have, expected } => {
                write!(f, "too many missing days ({have} of {expected} present)")
            }
            RejectReason::NoPrecedingBar { date } => {
                write!(f, "no preceding bar to carry forward to {date}")
            }
        }
    }
}

/// 채우기 결과.
#[derive(Debug, Clone, PartialEq)]
pub enum FillOutcome {
    /// 기대 거래일마다 봉이 하나씩, 날짜순
    Accepted(Vec<Bar>),
    Rejected(RejectReason),
}

impl FillOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, FillOutcome::Accepted(_))
    }
}

/// 거래 캘린더 기반 누락 채우기.
#[derive(Clone)]
pub struct GapFiller {
    calendar: Arc<CalendarService>,
}

impl GapFiller {
    pub fn new(calendar: Arc<CalendarService>) -> Self {
        Self { calendar }
    }

    /// `requested` 구간의 시계열을 검사하고 채웁니다.
    ///
    /// 오류는 알 수 없는 거래소뿐이며, 거부는 [`FillOutcome::Rejected`]로 반환합니다.
    pub fn reconcile(
        &self,
        symbol: &Symbol,
        mut series: Vec<Bar>,
        requested: &DateRange,
        exchange: &str,
        tolerance: usize,
    ) -> Result<FillOutcome> {
        let expected = self.calendar.valid_dates(exchange, requested)?;

        let received = series.len();
        series.retain(|bar| match bar.validate() {
            Ok(()) => true,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "잘못된 봉 제외");
                false
            }
        });
        if series.len() < received {
            debug!(symbol = %symbol, invalid = received - series.len(), "잘못된 봉은 누락으로 처리");
        }

        sort_and_dedup(&mut series);
        let before = series.len();
        let mut present: BTreeMap<NaiveDate, Bar> = BTreeMap::new();
        for bar in series {
            if expected.binary_search(&bar.date).is_ok() {
                present.insert(bar.date, bar);
            }
        }
        if present.len() < before {
            warn!(
                symbol = %symbol,
                dropped = before - present.len(),
                "거래일이 아닌 날짜의 봉 제외"
            );
        }

        let have = present.len();
        let n = expected.len();

        if have + tolerance < n {
            debug!(symbol = %symbol, have, expected = n, tolerance, "누락 허용치 초과");
            return Ok(FillOutcome::Rejected(RejectReason::TooManyMissing {
                have,
                expected: n,
            }));
        }

        if have == n {
            return Ok(FillOutcome::Accepted(present.into_values().collect()));
        }

        let mut filled = Vec::with_capacity(n);
        let mut previous: Option<&Bar> = None;
        for date in expected.iter() {
            match present.get(date) {
                Some(bar) => {
                    filled.push(bar.clone());
                    previous = Some(bar);
                }
                None => match previous {
                    Some(bar) => filled.push(bar.carried_to(*date)),
                    None => {
                        debug!(symbol = %symbol, date = %date, "직전 봉 없음");
                        return Ok(FillOutcome::Rejected(RejectReason::NoPrecedingBar {
                            date: *date,
                        }));
                    }
                },
            }
        }

        debug!(symbol = %symbol, carried = n - have, "누락 거래일 채움");
        Ok(FillOutcome::Accepted(filled))
    }
}
