//! 다종목 일봉 조회 진입점.
//!
//! ```text
//! get_data(symbols, start, end)
//!     │
//!     ├─ 1. 거래일 기준으로 범위 정규화 (양 끝 스냅, 경고만 기록)
//!     ├─ 2. 종목별 잠금 (정렬 순서로 획득, 호출 끝까지 유지)
//!     ├─ 3. AvailabilityIndex::gap → 누락 구간마다 FetchRequest
//!     ├─ 4. FetchOrchestrator::fetch_all → GapFiller::reconcile
//!     ├─ 5. Accepted: 저장 후 가용 범위 확장 (최소/최대 합집합) / Rejected, failed: 종목 제외
//!     └─ 6. 남은 종목을 저장소에서 읽어 반환 (읽기 실패 종목은 제외)
//! ```

use crate::availability::AvailabilityIndex;
use crate::calendar::CalendarService;
use crate::error::{DataError, Result};
use crate::fill::{FillOutcome, GapFiller, RejectReason};
use crate::orchestrator::{FetchOrchestrator, FetchRequest, FetchedSeries};
use crate::source::BarSource;
use crate::storage::BarStore;
use chrono::NaiveDate;
use quantify_core::{symbol_span, Bar, DateRange, FetchConfig, QueryConfig, Symbol, Timeframe};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn, Instrument};

/// 조회 요청.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub symbols: Vec<Symbol>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub exchange: String,
    /// 허용 누락 거래일 수
    pub tolerance: usize,
    /// `false`면 저장된 데이터만 사용
    pub download: bool,
}

impl QueryRequest {
    /// 설정의 기본값(거래소, 허용치, 다운로드 여부)으로 요청을 만듭니다.
    pub fn new(
        symbols: impl IntoIterator<Item = Symbol>,
        start: NaiveDate,
        end: NaiveDate,
        defaults: &QueryConfig,
    ) -> Self {
        Self {
            symbols: symbols.into_iter().collect(),
            start,
            end,
            exchange: defaults.exchange.clone(),
            tolerance: defaults.tolerance,
            download: defaults.download,
        }
    }

    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }

    pub fn with_tolerance(mut self, tolerance: usize) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_download(mut self, download: bool) -> Self {
        self.download = download;
        self
    }
}

/// 종목 제외 사유.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExclusionReason {
    /// 재시도 후에도 원격 조회 실패
    FetchFailed { reason: String },
    /// 누락 채우기 거부
    Rejected { reason: RejectReason },
    /// 다운로드 비활성화 상태에서 저장된 데이터가 부족
    NotDownloaded,
    /// 저장된 행을 읽을 수 없음
    Unreadable { reason: String },
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::FetchFailed { reason } => write!(f, "fetch failed: {reason}"),
            ExclusionReason::Rejected { reason } => write!(f, "rejected: {reason}"),
            ExclusionReason::NotDownloaded => write!(f, "not downloaded"),
            ExclusionReason::Unreadable { reason } => write!(f, "stored data unreadable: {reason}"),
        }
    }
}

/// 조회 결과.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    /// 종목별 날짜순 일봉
    pub data: BTreeMap<Symbol, Vec<Bar>>,
    pub excluded: BTreeMap<Symbol, ExclusionReason>,
    pub warnings: Vec<String>,
    /// 정규화된 조회 범위
    pub range: DateRange,
    /// 원격 조회를 요청한 종목
    pub fetched: Vec<Symbol>,
}

/// 원격 조회 대상 구간 하나.
#[derive(Debug, Clone)]
struct Piece {
    symbol: Symbol,
    range: DateRange,
}

/// 다종목 조회 서비스.
pub struct QueryFacade {
    store: Arc<dyn BarStore>,
    calendar: Arc<CalendarService>,
    index: AvailabilityIndex,
    orchestrator: FetchOrchestrator,
    filler: GapFiller,
    locks: Mutex<HashMap<Symbol, Arc<AsyncMutex<()>>>>,
    timeframe: Timeframe,
}

impl QueryFacade {
    pub fn new(
        store: Arc<dyn BarStore>,
        source: Arc<dyn BarSource>,
        calendar: Arc<CalendarService>,
        fetch: FetchConfig,
    ) -> Self {
        let timeframe = Timeframe::D1;
        Self {
            index: AvailabilityIndex::new(store.clone(), timeframe),
            orchestrator: FetchOrchestrator::new(source, calendar.clone(), fetch),
            filler: GapFiller::new(calendar.clone()),
            store,
            calendar,
            locks: Mutex::new(HashMap::new()),
            timeframe,
        }
    }

    pub fn availability(&self) -> &AvailabilityIndex {
        &self.index
    }

    pub fn calendar(&self) -> &CalendarService {
        &self.calendar
    }

    /// 요청한 종목과 기간의 일봉을 반환합니다.
    ///
    /// 누락 구간만 원격에서 가져와 채운 뒤 저장소에서 읽습니다.
    /// 종목 단위 실패는 `excluded`에 사유와 함께 기록되고,
    /// 시스템 오류(알 수 없는 거래소, 저장소 연결 불가, 잘못된 요청,
    /// 범위 초과)만 `Err`로 반환합니다.
    #[instrument(skip(self, request), fields(
        symbols = request.symbols.len(),
        exchange = %request.exchange,
        start = %request.start,
        end = %request.end
    ))]
    pub async fn get_data(&self, request: QueryRequest) -> Result<QueryResult> {
        if request.start > request.end {
            return Err(DataError::InvalidRequest(format!(
                "start {} is after end {}",
                request.start, request.end
            )));
        }
        let symbols: Vec<Symbol> = request
            .symbols
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if symbols.is_empty() {
            return Err(DataError::InvalidRequest("no symbols requested".to_string()));
        }

        let exchange = request.exchange.as_str();
        let mut warnings = Vec::new();
        let range = self.normalize(exchange, request.start, request.end, &mut warnings)?;

        let _guards = self.lock_symbols(&symbols).await;

        // 누락 구간 계획
        let mut excluded: BTreeMap<Symbol, ExclusionReason> = BTreeMap::new();
        let mut pieces: Vec<Piece> = Vec::new();
        for symbol in &symbols {
            let gap = self.index.gap(symbol, &range).await?;
            if gap.is_covered() {
                continue;
            }
            if !request.download {
                debug!(symbol = %symbol, gap = gap.kind(), "다운로드 비활성화, 제외");
                excluded.insert(symbol.clone(), ExclusionReason::NotDownloaded);
                continue;
            }
            for missing in gap.missing_ranges() {
                pieces.push(Piece {
                    symbol: symbol.clone(),
                    range: missing,
                });
            }
        }

        // 거래일 없는 구간은 조회 없이 가용 범위만 확장
        let mut fetch_pieces = Vec::with_capacity(pieces.len());
        for piece in pieces {
            if self.calendar.trading_day_count(exchange, &piece.range)? == 0 {
                self.index.extend(&piece.symbol, &piece.range).await?;
            } else {
                fetch_pieces.push(piece);
            }
        }

        let fetched: Vec<Symbol> = fetch_pieces
            .iter()
            .map(|p| p.symbol.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if !fetch_pieces.is_empty() {
            let requests = fetch_pieces
                .iter()
                .map(|p| FetchRequest::new(p.symbol.clone(), p.range))
                .collect();
            let report = self
                .orchestrator
                .fetch_all(requests, exchange, self.orchestrator.config().max_retries)
                .await?;

            let mut succeeded: HashMap<(Symbol, DateRange), FetchedSeries> = report
                .succeeded
                .into_iter()
                .map(|s| ((s.request.symbol.clone(), s.request.range), s))
                .collect();
            let failed: HashMap<(Symbol, DateRange), String> = report
                .failed
                .into_iter()
                .map(|f| ((f.request.symbol, f.request.range), f.reason))
                .collect();

            for piece in &fetch_pieces {
                let key = (piece.symbol.clone(), piece.range);
                let span = symbol_span!("commit", piece.symbol, piece.range);

                if let Some(series) = succeeded.remove(&key) {
                    let outcome = self.filler.reconcile(
                        &piece.symbol,
                        series.bars,
                        &piece.range,
                        exchange,
                        request.tolerance,
                    )?;
                    match outcome {
                        FillOutcome::Accepted(bars) => {
                            self.commit(piece, &bars).instrument(span).await?;
                        }
                        FillOutcome::Rejected(reason) => {
                            span.in_scope(|| warn!(reason = %reason, "채우기 거부, 종목 제외"));
                            excluded
                                .entry(piece.symbol.clone())
                                .or_insert(ExclusionReason::Rejected { reason });
                        }
                    }
                } else {
                    let reason = failed
                        .get(&key)
                        .cloned()
                        .unwrap_or_else(|| "no result".to_string());
                    span.in_scope(|| warn!(reason = %reason, "조회 실패, 종목 제외"));
                    excluded
                        .entry(piece.symbol.clone())
                        .or_insert(ExclusionReason::FetchFailed { reason });
                }
            }
        }

        // 남은 종목 읽기
        let mut data = BTreeMap::new();
        for symbol in &symbols {
            if excluded.contains_key(symbol) {
                continue;
            }
            match self.store.read(symbol, self.timeframe, &range).await {
                Ok(bars) => {
                    data.insert(symbol.clone(), bars);
                }
                Err(e) if e.is_systemic() => return Err(e),
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "저장된 일봉 읽기 실패, 종목 제외");
                    excluded.insert(
                        symbol.clone(),
                        ExclusionReason::Unreadable {
                            reason: e.to_string(),
                        },
                    );
                }
            }
        }

        for (symbol, reason) in &excluded {
            warnings.push(format!("{symbol} excluded: {reason}"));
        }

        info!(
            returned = data.len(),
            excluded = excluded.len(),
            fetched = fetched.len(),
            "조회 완료"
        );

        Ok(QueryResult {
            data,
            excluded,
            warnings,
            range,
            fetched,
        })
    }

    /// 요청 범위의 양 끝을 거래일로 맞춥니다.
    fn normalize(
        &self,
        exchange: &str,
        start: NaiveDate,
        end: NaiveDate,
        warnings: &mut Vec<String>,
    ) -> Result<DateRange> {
        let raw = DateRange::new(start, end)?;
        let Some(snapped) = self.calendar.snap(exchange, &raw)? else {
            return Err(DataError::NoTradingDays {
                exchange: exchange.to_string(),
                start,
                end,
            });
        };

        if snapped != raw {
            let message = format!("requested range {raw} snapped to trading days {snapped}");
            warn!(%raw, %snapped, "조회 범위를 거래일로 조정");
            warnings.push(message);
        }
        Ok(snapped)
    }

    /// 채운 구간을 저장하고 가용 범위를 확장합니다.
    async fn commit(&self, piece: &Piece, bars: &[Bar]) -> Result<()> {
        let written = self.store.write(&piece.symbol, self.timeframe, bars).await?;
        self.index.extend(&piece.symbol, &piece.range).await?;
        debug!(written, "구간 저장 완료");
        Ok(())
    }

    /// 종목별 잠금을 정렬 순서로 획득합니다.
    async fn lock_symbols(&self, symbols: &[Symbol]) -> Vec<OwnedMutexGuard<()>> {
        let locks: Vec<Arc<AsyncMutex<()>>> = {
            let mut map = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // 아무도 잡고 있지 않은 항목 정리
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            symbols
                .iter()
                .map(|s| map.entry(s.clone()).or_default().clone())
                .collect()
        };

        let mut guards = Vec::with_capacity(locks.len());
        for lock in locks {
            guards.push(lock.lock_owned().await);
        }
        guards
    }
}
