//! 일봉 데이터 가용성 관리 및 조회.
//!
//! 이 crate는 다음을 제공합니다:
//! - 거래소별 거래 캘린더 ([`CalendarService`])
//! - 종목별 저장 가용 범위와 누락 구간 계산 ([`AvailabilityIndex`])
//! - 다종목 원격 조회와 재시도 ([`FetchOrchestrator`])
//! - 누락 거래일 채우기 ([`GapFiller`])
//! - PostgreSQL / 메모리 저장소 ([`BarStore`], [`AssetStore`])
//! - Alpaca 데이터 소스 ([`AlpacaClient`])
//! - 조회 진입점 ([`QueryFacade`])

pub mod assets;
pub mod availability;
pub mod calendar;
pub mod error;
pub mod fill;
pub mod orchestrator;
pub mod query;
pub mod source;
pub mod storage;

pub use assets::{AssetRefresher, BasketCriteria, SourceOutcome};
pub use availability::{compute_gap, AvailabilityIndex, GapResult};
pub use calendar::{CalendarService, TradingCalendar, UsEquityCalendar};
pub use error::{DataError, Result};
pub use fill::{FillOutcome, GapFiller, RejectReason, DEFAULT_TOLERANCE};
pub use orchestrator::{
    FailedRequest, FetchOrchestrator, FetchReport, FetchRequest, FetchResult, FetchedSeries,
    SeriesStatus,
};
pub use query::{ExclusionReason, QueryFacade, QueryRequest, QueryResult};
pub use source::{AlpacaClient, AssetSource, BarSource};
pub use storage::{
    connect_pool, run_migrations, AssetStore, AvailabilityRecord, BarStore, MemoryAssetStore,
    MemoryBarStore, PgAssetStore, PgBarStore,
};
