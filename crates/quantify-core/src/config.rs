//! 설정 관리.
//!
//! 설정은 다음 순서로 병합됩니다 (뒤쪽이 우선):
//! 1. 각 섹션의 기본값
//! 2. TOML 설정 파일 (없으면 건너뜀)
//! 3. `QUANTIFY__<섹션>__<키>` 환경 변수 (`.env` 파일 포함)
//!
//! Alpaca 자격증명이 설정 파일에 없으면 `APCA_API_KEY_ID` /
//! `APCA_API_SECRET_KEY` 환경 변수를 사용합니다.

use crate::error::CoreResult;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 설정 파일 경로를 지정하는 환경 변수.
pub const CONFIG_PATH_ENV: &str = "QUANTIFY_CONFIG";

/// 기본 설정 파일 경로.
pub const DEFAULT_CONFIG_PATH: &str = "config/quantify.toml";

/// 애플리케이션 설정.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 데이터베이스 설정
    pub database: DatabaseConfig,
    /// Alpaca API 설정
    pub alpaca: AlpacaConfig,
    /// 원격 조회 설정
    pub fetch: FetchConfig,
    /// 조회(getData) 기본값
    pub query: QueryConfig,
    /// 기본 종목 바스켓
    pub basket: BasketConfig,
    /// 데몬 모드 설정
    pub daemon: DaemonConfig,
    /// 로깅 설정
    pub logging: LoggingConfig,
}

/// 데이터베이스 설정.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// 연결 URL
    pub url: String,
    /// 최대 연결 수
    pub max_connections: u32,
    /// 연결 타임아웃 (초)
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/quantify".to_string(),
            max_connections: 10,
            connect_timeout_secs: 30,
        }
    }
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Alpaca API 설정.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AlpacaConfig {
    /// API 키 ID
    pub api_key_id: Option<SecretString>,
    /// API 시크릿 키
    pub api_secret_key: Option<SecretString>,
    /// 시세 데이터 API 기본 URL
    pub data_url: String,
    /// 트레이딩 API 기본 URL (종목 목록 조회용)
    pub trading_url: String,
    /// 데이터 피드 (iex, sip)
    pub feed: String,
    /// 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
}

impl Default for AlpacaConfig {
    fn default() -> Self {
        Self {
            api_key_id: None,
            api_secret_key: None,
            data_url: "https://data.alpaca.markets".to_string(),
            trading_url: "https://paper-api.alpaca.markets".to_string(),
            feed: "iex".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl AlpacaConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// 두 자격증명이 모두 설정되어 있는지 확인합니다.
    pub fn has_credentials(&self) -> bool {
        self.api_key_id.is_some() && self.api_secret_key.is_some()
    }
}

/// 원격 조회 설정.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// 첫 라운드 이후 추가 재시도 라운드 수
    pub max_retries: u32,
    /// 재시도 라운드 사이 대기 시간 (초)
    pub retry_delay_secs: u64,
    /// 동시 요청 수 상한
    pub concurrency: usize,
    /// 요청 하나가 포함할 수 있는 최대 거래일 수
    pub max_trading_days: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_secs: 60,
            concurrency: 8,
            max_trading_days: 1000,
        }
    }
}

impl FetchConfig {
    /// 재시도 대기 시간을 Duration으로 반환
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// 조회 기본값.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// 거래 캘린더를 결정하는 거래소
    pub exchange: String,
    /// 채우기를 허용하는 최대 누락 거래일 수
    pub tolerance: usize,
    /// false면 원격 조회 없이 저장된 데이터만 반환
    pub download: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            exchange: "NYSE".to_string(),
            tolerance: 3,
            download: true,
        }
    }
}

/// 기본 종목 바스켓 선택 조건.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BasketConfig {
    /// 거래소 필터
    pub exchange: Option<String>,
    /// 상장폐지 종목 포함 여부
    pub include_delisted: bool,
    /// 거래정지 종목 포함 여부
    pub include_suspended: bool,
    /// 최대 종목 수
    pub limit: Option<usize>,
}

/// 데몬 모드 설정.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// 동기화 주기 (분 단위)
    pub interval_minutes: u64,
    /// 동기화 시 조회할 과거 일수
    pub lookback_days: i64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 24 * 60,
            lookback_days: 30,
        }
    }
}

impl DaemonConfig {
    /// 동기화 주기를 Duration으로 반환 (최소 1분)
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.max(1) * 60)
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 파일이 없으면 기본값과 환경 변수만 사용합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        dotenvy::dotenv().ok();

        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("QUANTIFY")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut config: AppConfig = builder.build()?.try_deserialize()?;
        config.apply_credential_env();
        Ok(config)
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> CoreResult<Self> {
        Self::load(default_config_path())
    }

    /// TOML 문자열에서 설정을 파싱합니다 (환경 변수 미적용).
    pub fn from_toml_str(toml: &str) -> CoreResult<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    fn apply_credential_env(&mut self) {
        if self.alpaca.api_key_id.is_none() {
            self.alpaca.api_key_id = std::env::var("APCA_API_KEY_ID").ok().map(SecretString::from);
        }
        if self.alpaca.api_secret_key.is_none() {
            self.alpaca.api_secret_key =
                std::env::var("APCA_API_SECRET_KEY").ok().map(SecretString::from);
        }
    }
}

/// 설정 파일 경로 (`QUANTIFY_CONFIG` 또는 기본 경로).
pub fn default_config_path() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}
