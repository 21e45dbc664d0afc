//! 데이터 모듈 오류 타입.
//!
//! 종목 단위의 조회 실패(빈 응답, 부분 응답, 채우기 거부)는 오류가 아니라
//! 값으로 다룹니다. 여기 정의된 오류는 호출 전체를 중단시키는 경우입니다.

use quantify_core::{CoreError, Symbol};
use thiserror::Error;

/// 데이터 관련 오류.
#[derive(Debug, Error)]
pub enum DataError {
    /// 알 수 없는 거래소 (호출자 오류)
    #[error("Unknown exchange: {0}")]
    UnknownExchange(String),

    /// 요청 하나가 허용 거래일 수를 초과
    #[error("Range too large for {symbol}: {trading_days} trading days (limit {limit})")]
    RangeTooLarge {
        symbol: Symbol,
        trading_days: usize,
        limit: usize,
    },

    /// 저장소 연결 불가 (재시도하지 않음)
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// 잘못된 요청
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// 요청 범위에 거래일이 없음
    #[error("No trading days on {exchange} between {start} and {end}")]
    NoTradingDays {
        exchange: String,
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    /// 쿼리 실행 오류
    #[error("Query error: {0}")]
    QueryError(String),

    /// 잘못된 데이터 형식 (저장소 행 디코딩 실패 등)
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// 데이터 가져오기 오류 (외부 소스)
    #[error("Fetch error: {0}")]
    FetchError(String),

    /// 파싱 오류
    #[error("Parse error: {0}")]
    ParseError(String),

    /// 직렬화/역직렬화 오류
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// 설정 오류
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// 마이그레이션 오류
    #[error("Migration error: {0}")]
    MigrationError(String),
}

impl DataError {
    /// 호출 전체를 중단해야 하는 시스템 오류인지 확인합니다.
    pub fn is_systemic(&self) -> bool {
        matches!(
            self,
            DataError::UnknownExchange(_)
                | DataError::RangeTooLarge { .. }
                | DataError::StorageUnavailable(_)
                | DataError::InvalidRequest(_)
                | DataError::ConfigError(_)
        )
    }
}

impl From<sqlx::Error> for DataError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => DataError::StorageUnavailable(err.to_string()),
            sqlx::Error::Database(db_err) => DataError::QueryError(db_err.message().to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                DataError::InvalidData(err.to_string())
            }
            _ => DataError::QueryError(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DataError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DataError::MigrationError(err.to_string())
    }
}

impl From<reqwest::Error> for DataError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            DataError::ParseError(err.to_string())
        } else {
            DataError::FetchError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        DataError::SerializationError(err.to_string())
    }
}

impl From<CoreError> for DataError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidBar { .. } => DataError::InvalidData(err.to_string()),
            CoreError::Config(msg) => DataError::ConfigError(msg),
            other => DataError::InvalidRequest(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DataError>;
