//! 수집 통계 구조체.

use quantify_data::{QueryResult, SourceOutcome};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 수집 작업 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionStats {
    /// 요청한 종목 수
    pub total: usize,
    /// 결과에 포함된 종목 수
    pub success: usize,
    /// 제외된 종목 수
    pub excluded: usize,
    /// 원격 조회를 실행한 종목 수
    pub fetched: usize,
    /// 에러 횟수 (소스 단위)
    pub errors: usize,
    /// 반환/저장된 총 행 수
    pub total_rows: usize,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl CollectionStats {
    /// 새 통계 객체 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 조회 결과에서 통계 생성
    pub fn from_query(result: &QueryResult, elapsed: Duration) -> Self {
        Self {
            total: result.data.len() + result.excluded.len(),
            success: result.data.len(),
            excluded: result.excluded.len(),
            fetched: result.fetched.len(),
            errors: 0,
            total_rows: result.data.values().map(Vec::len).sum(),
            elapsed,
        }
    }

    /// 종목 목록 갱신 결과에서 통계 생성
    pub fn from_refresh(outcomes: &[SourceOutcome], elapsed: Duration) -> Self {
        let errors = outcomes.iter().filter(|o| o.error.is_some()).count();
        Self {
            total: outcomes.len(),
            success: outcomes.len() - errors,
            errors,
            total_rows: outcomes.iter().map(|o| o.upserted).sum(),
            elapsed,
            ..Self::default()
        }
    }

    /// 성공률 계산 (%)
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.success as f64 / self.total as f64) * 100.0
        }
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            total = self.total,
            success = self.success,
            excluded = self.excluded,
            fetched = self.fetched,
            errors = self.errors,
            total_rows = self.total_rows,
            success_rate = format!("{:.1}%", self.success_rate()),
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "작업 완료"
        );
    }
}
