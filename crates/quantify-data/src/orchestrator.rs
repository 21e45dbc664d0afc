//! 다종목 원격 조회와 재시도.
//!
//! # 처리 흐름
//!
//! ```text
//! 요청 검증 (요청당 거래일 수 상한)
//!     │
//!     ▼
//! ┌─ 라운드 N ───────────────────────────────────────┐
//! │ 미해결 요청을 동시에 조회 (동시 요청 수 제한)      │
//! │     │                                            │
//! │     ▼                                            │
//! │ 분류: Complete / Partial / Empty / Failed        │
//! │   Complete → 확정                                │
//! │   Partial  → 잠정 보관, 누락 구간만 다시 요청     │
//! │   Empty / Failed → 같은 구간 다시 요청            │
//! └──────────────────────────────────────────────────┘
//!     │ 미해결 요청이 있고 재시도 횟수가 남았으면 대기 후 반복
//!     ▼
//! 잠정 Partial → succeeded, 데이터 없음 → failed
//! ```
//!
//! 요청 하나의 실패는 다른 요청에 영향을 주지 않습니다.
//! 인증 실패 같은 시스템 오류만 호출 전체를 중단합니다.

use crate::calendar::CalendarService;
use crate::error::{DataError, Result};
use crate::source::BarSource;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use quantify_core::{sort_and_dedup, Bar, DateRange, FetchConfig, Symbol, Timeframe};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// 원격 조회 작업 단위.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchRequest {
    pub symbol: Symbol,
    pub range: DateRange,
}

impl FetchRequest {
    pub fn new(symbol: Symbol, range: DateRange) -> Self {
        Self { symbol, range }
    }
}

/// 응답 한 건의 분류.
#[derive(Debug)]
pub enum FetchResult {
    /// 첫/마지막 봉이 기대 거래일 양 끝과 일치
    Complete(Vec<Bar>),
    /// 봉은 있으나 양 끝 중 하나 이상이 빠짐
    Partial {
        bars: Vec<Bar>,
        missing_dates: Vec<NaiveDate>,
    },
    /// 봉이 하나도 없음
    Empty,
    /// 전송/파싱 오류
    Failed(DataError),
}

impl FetchResult {
    /// 날짜순 정렬된 봉을 기대 거래일과 비교해 분류합니다.
    ///
    /// 기대 거래일이 아닌 날짜의 봉은 분류에 쓰지 않고 그대로 둡니다.
    pub fn classify(bars: Vec<Bar>, expected: &[NaiveDate]) -> FetchResult {
        let expected_set: HashSet<NaiveDate> = expected.iter().copied().collect();
        let present: Vec<NaiveDate> = bars
            .iter()
            .map(|b| b.date)
            .filter(|d| expected_set.contains(d))
            .collect();

        let (Some(first), Some(last)) = (present.first(), present.last()) else {
            return FetchResult::Empty;
        };

        if Some(first) == expected.first() && Some(last) == expected.last() {
            return FetchResult::Complete(bars);
        }

        let present: HashSet<NaiveDate> = present.into_iter().collect();
        let missing_dates = expected
            .iter()
            .filter(|d| !present.contains(d))
            .copied()
            .collect();
        FetchResult::Partial {
            bars,
            missing_dates,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FetchResult::Complete(_) => "complete",
            FetchResult::Partial { .. } => "partial",
            FetchResult::Empty => "empty",
            FetchResult::Failed(_) => "failed",
        }
    }
}

/// 성공한 시계열의 최종 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SeriesStatus {
    Complete,
    /// 재시도 후에도 양 끝이 채워지지 않음 (채우기 단계에서 판단)
    Partial,
}

/// 조회에 성공한 시계열.
#[derive(Debug, Clone)]
pub struct FetchedSeries {
    pub request: FetchRequest,
    /// 날짜순 정렬, 날짜 중복 없음
    pub bars: Vec<Bar>,
    pub status: SeriesStatus,
    /// 기대 거래일 중 빠진 날짜
    pub missing_dates: Vec<NaiveDate>,
}

/// 재시도 후에도 데이터를 얻지 못한 요청.
#[derive(Debug, Clone, Serialize)]
pub struct FailedRequest {
    pub request: FetchRequest,
    pub reason: String,
}

/// `fetch_all` 결과.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub succeeded: Vec<FetchedSeries>,
    pub failed: Vec<FailedRequest>,
    /// 실행한 라운드 수 (첫 라운드 포함)
    pub rounds: u32,
    /// 원격 호출 횟수
    pub calls: usize,
}

impl FetchReport {
    /// 실패한 요청이 하나라도 있는 종목.
    pub fn failed_symbols(&self) -> BTreeSet<Symbol> {
        self.failed.iter().map(|f| f.request.symbol.clone()).collect()
    }
}

/// 요청별 진행 상태.
struct Job {
    request: FetchRequest,
    expected: Arc<[NaiveDate]>,
    /// 지금까지 모은 봉 (Partial 잠정 결과)
    bars: Vec<Bar>,
    missing_dates: Vec<NaiveDate>,
    complete: bool,
    last_outcome: String,
}

impl Job {
    /// 다음 라운드에 요청할 구간.
    fn next_range(&self) -> DateRange {
        match (self.missing_dates.first(), self.missing_dates.last()) {
            (Some(first), Some(last)) if !self.bars.is_empty() => {
                DateRange::new(*first, *last).unwrap_or(self.request.range)
            }
            _ => self.request.range,
        }
    }

    /// 응답을 지금까지 모은 봉과 합쳐 분류합니다.
    ///
    /// 요청 범위 밖이거나 값이 잘못된 봉은 받지 않은 것으로 봅니다.
    /// 시스템 오류만 `Err`로 돌려줍니다.
    fn classify_response(&mut self, response: Result<Vec<Bar>>) -> Result<FetchResult> {
        let fetched = match response {
            Ok(bars) => bars,
            Err(e) if e.is_systemic() => return Err(e),
            Err(e) => return Ok(FetchResult::Failed(e)),
        };

        let range = self.request.range;
        let symbol = &self.request.symbol;
        let mut merged = std::mem::take(&mut self.bars);
        merged.extend(fetched.into_iter().filter(|b| {
            if !range.contains(b.date) {
                return false;
            }
            match b.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "잘못된 봉 제외");
                    false
                }
            }
        }));
        sort_and_dedup(&mut merged);

        Ok(FetchResult::classify(merged, &self.expected))
    }

    /// 분류 결과를 반영합니다. 다시 요청해야 하면 `true`.
    fn apply(&mut self, result: FetchResult) -> bool {
        self.last_outcome = result.kind().to_string();
        match result {
            FetchResult::Complete(bars) => {
                self.bars = bars;
                self.missing_dates.clear();
                self.complete = true;
                false
            }
            FetchResult::Partial {
                bars,
                missing_dates,
            } => {
                self.bars = bars;
                self.missing_dates = missing_dates;
                true
            }
            // 기대 거래일 안의 봉이 하나도 없음
            FetchResult::Empty => true,
            FetchResult::Failed(e) => {
                warn!(symbol = %self.request.symbol, error = %e, "조회 실패");
                self.last_outcome = e.to_string();
                true
            }
        }
    }
}

/// 다종목 원격 조회기.
pub struct FetchOrchestrator {
    source: Arc<dyn BarSource>,
    calendar: Arc<CalendarService>,
    config: FetchConfig,
    timeframe: Timeframe,
}

impl FetchOrchestrator {
    pub fn new(source: Arc<dyn BarSource>, calendar: Arc<CalendarService>, config: FetchConfig) -> Self {
        Self {
            source,
            calendar,
            config,
            timeframe: Timeframe::D1,
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// 요청 전체를 조회합니다.
    ///
    /// 첫 라운드 이후 최대 `max_retries` 라운드를 더 실행하며,
    /// 각 재시도 라운드 앞에서 `retry_delay`만큼 대기합니다.
    ///
    /// # 오류
    /// - `UnknownExchange`: 거래소 캘린더 없음
    /// - `RangeTooLarge`: 요청 하나가 거래일 수 상한 초과 (원격 호출 전에 거부)
    /// - 소스의 시스템 오류 (인증 실패 등)
    #[instrument(skip(self, requests), fields(requests = requests.len(), source = self.source.name()))]
    pub async fn fetch_all(
        &self,
        requests: Vec<FetchRequest>,
        exchange: &str,
        max_retries: u32,
    ) -> Result<FetchReport> {
        let mut jobs = Vec::with_capacity(requests.len());
        for request in requests {
            let expected = self.calendar.valid_dates(exchange, &request.range)?;
            if expected.len() > self.config.max_trading_days {
                return Err(DataError::RangeTooLarge {
                    symbol: request.symbol,
                    trading_days: expected.len(),
                    limit: self.config.max_trading_days,
                });
            }
            if expected.is_empty() {
                debug!(symbol = %request.symbol, range = %request.range, "거래일 없는 요청 제외");
                continue;
            }
            jobs.push(Job {
                request,
                expected,
                bars: Vec::new(),
                missing_dates: Vec::new(),
                complete: false,
                last_outcome: "not_fetched".to_string(),
            });
        }

        let mut report = FetchReport::default();
        let mut outstanding: Vec<(usize, DateRange)> = jobs
            .iter()
            .enumerate()
            .map(|(idx, job)| (idx, job.request.range))
            .collect();

        for round in 0..=max_retries {
            if outstanding.is_empty() {
                break;
            }
            if round > 0 {
                info!(
                    round,
                    outstanding = outstanding.len(),
                    delay_secs = self.config.retry_delay_secs,
                    "재시도 대기"
                );
                tokio::time::sleep(self.config.retry_delay()).await;
            }

            report.rounds = round + 1;
            report.calls += outstanding.len();

            let results = self.run_round(&jobs, std::mem::take(&mut outstanding)).await;

            for (idx, response) in results {
                let job = &mut jobs[idx];
                let result = job.classify_response(response)?;
                debug!(symbol = %job.request.symbol, round, outcome = result.kind(), "응답 분류");
                if job.apply(result) {
                    outstanding.push((idx, job.next_range()));
                }
            }

            debug!(round, remaining = outstanding.len(), "라운드 완료");
        }

        for job in jobs {
            if job.complete {
                report.succeeded.push(FetchedSeries {
                    request: job.request,
                    bars: job.bars,
                    status: SeriesStatus::Complete,
                    missing_dates: Vec::new(),
                });
            } else if !job.bars.is_empty() {
                report.succeeded.push(FetchedSeries {
                    request: job.request,
                    bars: job.bars,
                    status: SeriesStatus::Partial,
                    missing_dates: job.missing_dates,
                });
            } else {
                warn!(
                    symbol = %job.request.symbol,
                    range = %job.request.range,
                    outcome = %job.last_outcome,
                    "재시도 소진, 데이터 없음"
                );
                report.failed.push(FailedRequest {
                    request: job.request,
                    reason: job.last_outcome,
                });
            }
        }

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            rounds = report.rounds,
            calls = report.calls,
            "원격 조회 완료"
        );

        Ok(report)
    }

    /// 한 라운드의 요청을 동시에 실행합니다.
    async fn run_round(
        &self,
        jobs: &[Job],
        batch: Vec<(usize, DateRange)>,
    ) -> Vec<(usize, Result<Vec<Bar>>)> {
        let timeframe = self.timeframe;
        let futures: Vec<_> = batch
            .into_iter()
            .map(|(idx, range)| {
                let source = self.source.clone();
                let symbol = jobs[idx].request.symbol.clone();
                async move {
                    let result = source.fetch_bars(&symbol, &range, timeframe).await;
                    (idx, result)
                }
            })
            .collect();

        stream::iter(futures)
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 1, day).unwrap()
    }

    fn bar(date: NaiveDate) -> Bar {
        Bar::new(date, 10.0, 11.0, 9.0, 10.5, 1_000, 10, Some(10.2))
    }

    fn week() -> DateRange {
        DateRange::new(d(4), d(8)).unwrap()
    }

    /// 항상 같은 날짜 목록을 (요청 범위로 잘라) 반환하는 소스.
    struct FixedSource {
        dates: Vec<NaiveDate>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BarSource for FixedSource {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn fetch_bars(
            &self,
            _symbol: &Symbol,
            range: &DateRange,
            _timeframe: Timeframe,
        ) -> Result<Vec<Bar>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .dates
                .iter()
                .filter(|d| range.contains(**d))
                .rev()
                .map(|d| bar(*d))
                .collect())
        }
    }

    fn orchestrator(source: Arc<dyn BarSource>) -> FetchOrchestrator {
        FetchOrchestrator::new(source, Arc::new(CalendarService::us_equities()), FetchConfig::default())
    }

    #[test]
    fn test_classify() {
        let expected = vec![d(4), d(5), d(6), d(7), d(8)];

        let all: Vec<Bar> = expected.iter().map(|d| bar(*d)).collect();
        assert!(matches!(FetchResult::classify(all, &expected), FetchResult::Complete(_)));

        // 양 끝이 맞으면 중간 누락은 Complete (채우기 단계에서 처리)
        let holey = vec![bar(d(4)), bar(d(6)), bar(d(8))];
        assert!(matches!(FetchResult::classify(holey, &expected), FetchResult::Complete(_)));

        let truncated = vec![bar(d(4)), bar(d(5)), bar(d(6))];
        match FetchResult::classify(truncated, &expected) {
            FetchResult::Partial { missing_dates, .. } => {
                assert_eq!(missing_dates, vec![d(7), d(8)]);
            }
            other => panic!("unexpected {}", other.kind()),
        }

        assert!(matches!(FetchResult::classify(Vec::new(), &expected), FetchResult::Empty));
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_in_first_round_sorted() {
        let source = Arc::new(FixedSource {
            dates: vec![d(4), d(5), d(6), d(7), d(8)],
            calls: AtomicUsize::new(0),
        });
        let report = orchestrator(source.clone())
            .fetch_all(
                vec![FetchRequest::new(Symbol::new("AAPL").unwrap(), week())],
                "NYSE",
                3,
            )
            .await
            .unwrap();

        assert_eq!(report.rounds, 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.succeeded.len(), 1);
        let series = &report.succeeded[0];
        assert_eq!(series.status, SeriesStatus::Complete);
        let dates: Vec<NaiveDate> = series.bars.iter().map(|b| b.date).collect();
        assert_eq!(dates, vec![d(4), d(5), d(6), d(7), d(8)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_partial_is_reported_provisionally() {
        // 소스에 마지막 이틀이 영영 없음
        let source = Arc::new(FixedSource {
            dates: vec![d(4), d(5), d(6)],
            calls: AtomicUsize::new(0),
        });
        let report = orchestrator(source.clone())
            .fetch_all(
                vec![FetchRequest::new(Symbol::new("XYZ").unwrap(), week())],
                "NYSE",
                2,
            )
            .await
            .unwrap();

        assert_eq!(report.rounds, 3);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert!(report.failed.is_empty());
        let series = &report.succeeded[0];
        assert_eq!(series.status, SeriesStatus::Partial);
        assert_eq!(series.missing_dates, vec![d(7), d(8)]);
        assert_eq!(series.bars.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_range_too_large_issues_no_call() {
        let source = Arc::new(FixedSource {
            dates: Vec::new(),
            calls: AtomicUsize::new(0),
        });
        let orchestrator = orchestrator(source.clone());
        let huge = DateRange::new(d(4), NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()).unwrap();
        let err = orchestrator
            .fetch_all(
                vec![
                    FetchRequest::new(Symbol::new("AAPL").unwrap(), week()),
                    FetchRequest::new(Symbol::new("MSFT").unwrap(), huge),
                ],
                "NYSE",
                3,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DataError::RangeTooLarge { ref symbol, limit: 1000, .. } if symbol.as_str() == "MSFT"));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    /// 처음 `failures`번은 전송 오류, 이후에는 요청 범위의 거래일 봉 전체.
    struct FlakySource {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BarSource for FlakySource {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn fetch_bars(
            &self,
            _symbol: &Symbol,
            range: &DateRange,
            _timeframe: Timeframe,
        ) -> Result<Vec<Bar>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(DataError::FetchError("HTTP 503".to_string()));
            }
            Ok(CalendarService::us_equities()
                .valid_dates("NYSE", range)?
                .iter()
                .map(|d| bar(*d))
                .collect())
        }
    }

    fn job(range: DateRange) -> Job {
        Job {
            request: FetchRequest::new(Symbol::new("AAPL").unwrap(), range),
            expected: CalendarService::us_equities().valid_dates("NYSE", &range).unwrap(),
            bars: Vec::new(),
            missing_dates: Vec::new(),
            complete: false,
            last_outcome: "not_fetched".to_string(),
        }
    }

    #[test]
    fn test_transport_error_classified_as_failed_and_retried() {
        let mut job = job(week());

        let result = job
            .classify_response(Err(DataError::FetchError("timeout".to_string())))
            .unwrap();
        assert_eq!(result.kind(), "failed");
        assert!(job.apply(result));
        assert!(job.last_outcome.contains("timeout"));
        assert_eq!(job.next_range(), week());

        let err = job
            .classify_response(Err(DataError::ConfigError("no keys".to_string())))
            .unwrap_err();
        assert!(err.is_systemic());
    }

    #[test]
    fn test_invalid_bars_count_as_missing() {
        let mut job = job(week());
        let mut bars: Vec<Bar> = [4, 5, 6, 7].iter().map(|day| bar(d(*day))).collect();
        let mut broken = bar(d(8));
        broken.high = 5.0;
        broken.low = 9.0;
        broken.close = f64::NAN;
        bars.push(broken);

        let result = job.classify_response(Ok(bars)).unwrap();
        assert_eq!(result.kind(), "partial");
        assert!(job.apply(result));
        assert_eq!(job.missing_dates, vec![d(8)]);
        assert!(job.bars.iter().all(|b| b.validate().is_ok()));
        assert_eq!(job.next_range(), DateRange::single(d(8)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_round_is_retried_to_completion() {
        let source = Arc::new(FlakySource {
            failures: 1,
            calls: AtomicUsize::new(0),
        });
        let report = orchestrator(source.clone())
            .fetch_all(
                vec![FetchRequest::new(Symbol::new("AAPL").unwrap(), week())],
                "NYSE",
                3,
            )
            .await
            .unwrap();

        assert_eq!(report.rounds, 2);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert!(report.failed.is_empty());
        assert_eq!(report.succeeded[0].status, SeriesStatus::Complete);
        assert_eq!(report.succeeded[0].bars.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_exhaust_retries() {
        let source = Arc::new(FlakySource {
            failures: usize::MAX,
            calls: AtomicUsize::new(0),
        });
        let report = orchestrator(source.clone())
            .fetch_all(
                vec![FetchRequest::new(Symbol::new("AAPL").unwrap(), week())],
                "NYSE",
                2,
            )
            .await
            .unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert!(report.succeeded.is_empty());
        assert!(report.failed[0].reason.contains("HTTP 503"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_trading_day_limit_boundary() {
        let calendar = CalendarService::us_equities();
        let wide = DateRange::new(
            NaiveDate::from_ymd_opt(2015, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2021, 12, 31).unwrap(),
        )
        .unwrap();
        let days = calendar.valid_dates("NYSE", &wide).unwrap();
        let at_limit = DateRange::new(days[0], days[999]).unwrap();
        let over_limit = DateRange::new(days[0], days[1000]).unwrap();
        assert_eq!(calendar.trading_day_count("NYSE", &at_limit).unwrap(), 1000);

        let source = Arc::new(FixedSource {
            dates: Vec::new(),
            calls: AtomicUsize::new(0),
        });
        let orchestrator = orchestrator(source.clone());

        let report = orchestrator
            .fetch_all(
                vec![FetchRequest::new(Symbol::new("AAPL").unwrap(), at_limit)],
                "NYSE",
                0,
            )
            .await
            .unwrap();
        assert_eq!(report.calls, 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        let err = orchestrator
            .fetch_all(
                vec![FetchRequest::new(Symbol::new("AAPL").unwrap(), over_limit)],
                "NYSE",
                0,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::RangeTooLarge { trading_days: 1001, limit: 1000, .. }));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_exchange() {
        let source = Arc::new(FixedSource {
            dates: Vec::new(),
            calls: AtomicUsize::new(0),
        });
        let err = orchestrator(source)
            .fetch_all(
                vec![FetchRequest::new(Symbol::new("AAPL").unwrap(), week())],
                "LSE",
                3,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::UnknownExchange(_)));
    }
}
