//! 도메인 타입의 에러 정의.
//!
//! 도메인 값(심볼, 날짜 범위, 일봉 등)을 생성하거나 검증할 때 발생하는 에러입니다.

use chrono::NaiveDate;
use thiserror::Error;

/// 핵심 도메인 에러.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    /// 빈 심볼
    #[error("잘못된 심볼: 빈 문자열")]
    EmptySymbol,

    /// 시작일이 종료일보다 늦음
    #[error("잘못된 날짜 범위: {start} > {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    /// 알 수 없는 타임프레임 문자열
    #[error("잘못된 타임프레임: {0}")]
    InvalidTimeframe(String),

    /// 검증에 실패한 일봉 값
    #[error("잘못된 일봉 데이터 ({date}): {reason}")]
    InvalidBar { date: NaiveDate, reason: String },

    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),
}

/// 도메인 작업을 위한 Result 타입.
pub type CoreResult<T> = Result<T, CoreError>;

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        CoreError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::InvalidDateRange {
            start: NaiveDate::from_ymd_opt(2021, 1, 8).unwrap(),
            end: NaiveDate::from_ymd_opt(2021, 1, 4).unwrap(),
        };
        assert_eq!(err.to_string(), "잘못된 날짜 범위: 2021-01-08 > 2021-01-04");
    }
}
