//! Quantify 일봉 데이터 수집기.
//!
//! 이 crate는 일봉 미러를 관리하는 바이너리를 제공합니다:
//! - 다종목 일봉 조회 (누락 구간만 원격 조회 후 저장)
//! - 종목 목록 갱신 (Alpaca)
//! - 기본 바스켓 주기 동기화 (데몬 모드)
//! - 설정 파일 관리 (API 키, 다운로드 여부)

pub mod config;
pub mod context;
pub mod error;
pub mod modules;
pub mod stats;

pub use config::ConfigFile;
pub use context::CollectorContext;
pub use error::{CollectorError, Result};
pub use stats::CollectionStats;
