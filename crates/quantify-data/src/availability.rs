//! 종목별 저장 가용 범위와 누락 구간 계산.
//!
//! 종목마다 저장소에 연속으로 채워진 범위 `[from, to]` 하나를 기록합니다.
//! 요청 범위와 비교해 무엇을 원격에서 가져와야 하는지 계산합니다.
//!
//! ```text
//! 기록:            |=========|
//! 요청 (왼쪽):  |------|               → PartialLeft
//! 요청 (오른쪽):          |------|     → PartialRight
//! 요청 (양쪽):  |-------------------|  → PartialBoth
//! 요청 (분리): |--|                    → Disjoint (요청 전체 재조회)
//! ```
//!
//! 가져온 구간은 항상 최소/최대 경계 합집합으로 기록에 더해집니다.
//! 분리된 요청을 한 번 가져오면 사이 빈 구간까지 기록에 포함되므로
//! 같은 요청을 반복해도 다시 조회하지 않습니다.

use crate::error::Result;
use crate::storage::{AvailabilityRecord, BarStore};
use chrono::Duration;
use quantify_core::{DateRange, Symbol, Timeframe};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// 요청 범위 대비 누락 구간.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GapResult {
    /// 기록 없음, 요청 전체가 누락
    NoDataYet(DateRange),
    /// 요청 범위가 기록 안에 포함됨
    FullyCovered,
    /// 요청 시작이 기록보다 앞섬: `[requested.start, from - 1]`
    PartialLeft(DateRange),
    /// 요청 끝이 기록보다 뒤: `[to + 1, requested.end]`
    PartialRight(DateRange),
    /// 양쪽 모두 누락
    PartialBoth(DateRange, DateRange),
    /// 기록과 겹치지도 붙어 있지도 않음
    Disjoint {
        /// 다시 가져올 요청 범위
        requested: DateRange,
        /// 요청과 기록 사이의 빈 구간
        hole: DateRange,
    },
}

impl GapResult {
    /// 원격에서 가져와야 할 구간 목록 (왼쪽부터).
    pub fn missing_ranges(&self) -> Vec<DateRange> {
        match self {
            GapResult::FullyCovered => Vec::new(),
            GapResult::NoDataYet(range)
            | GapResult::PartialLeft(range)
            | GapResult::PartialRight(range) => vec![*range],
            GapResult::PartialBoth(left, right) => vec![*left, *right],
            GapResult::Disjoint { requested, .. } => vec![*requested],
        }
    }

    pub fn is_covered(&self) -> bool {
        matches!(self, GapResult::FullyCovered)
    }

    /// 로그용 이름.
    pub fn kind(&self) -> &'static str {
        match self {
            GapResult::NoDataYet(_) => "no_data_yet",
            GapResult::FullyCovered => "fully_covered",
            GapResult::PartialLeft(_) => "partial_left",
            GapResult::PartialRight(_) => "partial_right",
            GapResult::PartialBoth(_, _) => "partial_both",
            GapResult::Disjoint { .. } => "disjoint",
        }
    }
}

/// 기록과 요청 범위로 누락 구간을 계산합니다.
pub fn compute_gap(known: Option<&DateRange>, requested: &DateRange) -> GapResult {
    let Some(known) = known else {
        return GapResult::NoDataYet(*requested);
    };

    if known.covers(requested) {
        return GapResult::FullyCovered;
    }

    let one_day = Duration::days(1);

    if !known.touches(requested) {
        let hole = if requested.end() < known.start() {
            DateRange::new(requested.end() + one_day, known.start() - one_day)
        } else {
            DateRange::new(known.end() + one_day, requested.start() - one_day)
        };
        return match hole {
            Ok(hole) => GapResult::Disjoint {
                requested: *requested,
                hole,
            },
            // touches()가 false면 빈 구간은 최소 하루
            Err(_) => GapResult::NoDataYet(*requested),
        };
    }

    let left = (requested.start() < known.start())
        .then(|| DateRange::new(requested.start(), known.start() - one_day).ok())
        .flatten();
    let right = (requested.end() > known.end())
        .then(|| DateRange::new(known.end() + one_day, requested.end()).ok())
        .flatten();

    match (left, right) {
        (Some(left), Some(right)) => GapResult::PartialBoth(left, right),
        (Some(left), None) => GapResult::PartialLeft(left),
        (None, Some(right)) => GapResult::PartialRight(right),
        (None, None) => GapResult::FullyCovered,
    }
}

/// 저장소 기반 가용 범위 인덱스.
#[derive(Clone)]
pub struct AvailabilityIndex {
    store: Arc<dyn BarStore>,
    timeframe: Timeframe,
}

impl AvailabilityIndex {
    pub fn new(store: Arc<dyn BarStore>, timeframe: Timeframe) -> Self {
        Self { store, timeframe }
    }

    /// 종목의 현재 기록.
    pub async fn record(&self, symbol: &Symbol) -> Result<Option<AvailabilityRecord>> {
        self.store.availability(symbol, self.timeframe).await
    }

    /// 요청 범위 중 누락된 구간을 계산합니다. 기록은 바꾸지 않습니다.
    #[instrument(skip(self), fields(symbol = %symbol, requested = %requested))]
    pub async fn gap(&self, symbol: &Symbol, requested: &DateRange) -> Result<GapResult> {
        let record = self.record(symbol).await?;
        let gap = compute_gap(record.as_ref().map(|r| &r.range), requested);
        debug!(gap = gap.kind(), "누락 구간 계산");
        Ok(gap)
    }

    /// 새로 저장한 구간으로 기록을 확장합니다 (최소/최대 경계 합집합).
    #[instrument(skip(self), fields(symbol = %symbol, added = %added))]
    pub async fn extend(&self, symbol: &Symbol, added: &DateRange) -> Result<AvailabilityRecord> {
        let record = self
            .store
            .extend_availability(symbol, self.timeframe, added)
            .await?;
        info!(
            from = %record.available_from(),
            to = %record.available_to(),
            "가용 범위 확장"
        );
        Ok(record)
    }

    /// 기록을 삭제합니다 (관리 작업).
    pub async fn reset(&self, symbol: &Symbol) -> Result<()> {
        self.store.reset_availability(symbol, self.timeframe).await
    }
}
