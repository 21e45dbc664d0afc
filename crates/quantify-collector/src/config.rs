//! TOML 설정 파일 편집.
//!
//! 설정 로드는 `quantify_core::AppConfig`가 담당하고, 여기서는
//! `set-keys` / `set-download` / `reset-config` / `show-config` 명령이
//! 사용하는 파일 수정만 다룹니다. 파일의 다른 섹션과 키는 보존합니다.

use crate::error::{CollectorError, Result};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use toml::{Table, Value};

/// 출력 시 비밀 값을 대체하는 문자열.
pub const REDACTED: &str = "********";

/// 비밀 값으로 취급하는 `[alpaca]` 키.
const SECRET_KEYS: [&str; 2] = ["api_key_id", "api_secret_key"];

/// 기본 설정 파일 내용.
pub const DEFAULT_CONFIG_TOML: &str = r#"# Quantify 설정 파일
# 환경 변수 QUANTIFY__<SECTION>__<KEY> 가 파일 값보다 우선합니다.

[database]
url = "postgres://localhost/quantify"
max_connections = 10
connect_timeout_secs = 30

[alpaca]
data_url = "https://data.alpaca.markets"
trading_url = "https://paper-api.alpaca.markets"
feed = "iex"
request_timeout_secs = 30

[fetch]
max_retries = 3
retry_delay_secs = 60
concurrency = 8
max_trading_days = 1000

[query]
exchange = "NYSE"
tolerance = 3
download = true

[basket]
include_delisted = false
include_suspended = false

[daemon]
interval_minutes = 1440
lookback_days = 30

[logging]
level = "info"
format = "pretty"
"#;

/// 편집 대상 설정 파일.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// 파일을 읽어 테이블로 파싱합니다. 파일이 없으면 빈 테이블.
    pub fn read(&self) -> Result<Table> {
        if !self.exists() {
            return Ok(Table::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(content.parse::<Table>()?)
    }

    /// Alpaca 자격증명을 기록합니다.
    ///
    /// 이미 키가 있으면 `force`가 없는 한 덮어쓰지 않습니다.
    pub fn set_keys(&self, key_id: &SecretString, secret_key: &SecretString, force: bool) -> Result<()> {
        let mut doc = self.read()?;
        let alpaca = section_mut(&mut doc, "alpaca")?;

        let has_keys = SECRET_KEYS.iter().any(|key| {
            alpaca
                .get(*key)
                .and_then(Value::as_str)
                .is_some_and(|v| !v.is_empty())
        });
        if has_keys && !force {
            return Err(CollectorError::Config(format!(
                "API keys already set in {} (use --force to overwrite)",
                self.path.display()
            )));
        }

        alpaca.insert(
            "api_key_id".to_string(),
            Value::String(key_id.expose_secret().to_string()),
        );
        alpaca.insert(
            "api_secret_key".to_string(),
            Value::String(secret_key.expose_secret().to_string()),
        );

        self.write_table(&doc)?;
        tracing::info!(path = %self.path.display(), "API 키 저장 완료");
        Ok(())
    }

    /// `[query] download` 값을 기록합니다.
    pub fn set_download(&self, enabled: bool) -> Result<()> {
        let mut doc = self.read()?;
        section_mut(&mut doc, "query")?.insert("download".to_string(), Value::Boolean(enabled));
        self.write_table(&doc)?;
        tracing::info!(path = %self.path.display(), enabled, "다운로드 설정 변경");
        Ok(())
    }

    /// 파일을 기본 설정으로 다시 씁니다. 기존 키도 삭제됩니다.
    pub fn reset(&self) -> Result<()> {
        self.write_raw(DEFAULT_CONFIG_TOML)?;
        tracing::info!(path = %self.path.display(), "설정 초기화 완료");
        Ok(())
    }

    /// 비밀 값을 가린 파일 내용. 파일이 없으면 `None`.
    pub fn redacted(&self) -> Result<Option<String>> {
        if !self.exists() {
            return Ok(None);
        }
        let mut doc = self.read()?;
        if let Some(Value::Table(alpaca)) = doc.get_mut("alpaca") {
            for key in SECRET_KEYS {
                if let Some(value) = alpaca.get_mut(key) {
                    *value = Value::String(REDACTED.to_string());
                }
            }
        }
        Ok(Some(toml::to_string_pretty(&doc)?))
    }

    fn write_table(&self, doc: &Table) -> Result<()> {
        let content = toml::to_string_pretty(doc)?;
        self.write_raw(&content)
    }

    fn write_raw(&self, content: &str) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, content)?;
        restrict_permissions(&self.path)?;
        Ok(())
    }
}

/// 최상위 섹션 테이블을 반환합니다 (없으면 생성).
fn section_mut<'a>(doc: &'a mut Table, name: &str) -> Result<&'a mut Table> {
    match doc
        .entry(name.to_string())
        .or_insert_with(|| Value::Table(Table::new()))
    {
        Value::Table(table) => Ok(table),
        _ => Err(CollectorError::Config(format!("[{}] is not a table", name))),
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quantify_core::AppConfig;
    use tempfile::tempdir;

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[test]
    fn test_default_document_matches_defaults() {
        let parsed = AppConfig::from_toml_str(DEFAULT_CONFIG_TOML).unwrap();
        let defaults = AppConfig::default();
        assert_eq!(parsed.database.url, defaults.database.url);
        assert_eq!(parsed.fetch.max_retries, defaults.fetch.max_retries);
        assert_eq!(parsed.fetch.max_trading_days, defaults.fetch.max_trading_days);
        assert_eq!(parsed.query.exchange, defaults.query.exchange);
        assert_eq!(parsed.query.tolerance, defaults.query.tolerance);
        assert_eq!(parsed.daemon.interval_minutes, defaults.daemon.interval_minutes);
        assert!(!parsed.alpaca.has_credentials());
    }

    #[test]
    fn test_set_keys_refuses_overwrite_without_force() {
        let dir = tempdir().unwrap();
        let file = ConfigFile::new(dir.path().join("config/quantify.toml"));

        file.set_keys(&secret("KEY1"), &secret("SECRET1"), false).unwrap();
        let err = file
            .set_keys(&secret("KEY2"), &secret("SECRET2"), false)
            .unwrap_err();
        assert!(matches!(err, CollectorError::Config(_)));

        file.set_keys(&secret("KEY2"), &secret("SECRET2"), true).unwrap();
        let doc = file.read().unwrap();
        assert_eq!(doc["alpaca"]["api_key_id"].as_str(), Some("KEY2"));
    }

    #[test]
    fn test_set_keys_preserves_other_sections() {
        let dir = tempdir().unwrap();
        let file = ConfigFile::new(dir.path().join("quantify.toml"));
        file.reset().unwrap();

        file.set_keys(&secret("KEY"), &secret("SECRET"), false).unwrap();
        file.set_download(false).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        let config = AppConfig::from_toml_str(&content).unwrap();
        assert!(config.alpaca.has_credentials());
        assert!(!config.query.download);
        assert_eq!(config.fetch.concurrency, 8);
        assert_eq!(config.alpaca.feed, "iex");
    }

    #[test]
    fn test_redacted_hides_secrets() {
        let dir = tempdir().unwrap();
        let file = ConfigFile::new(dir.path().join("quantify.toml"));
        assert!(file.redacted().unwrap().is_none());

        file.set_keys(&secret("PKTEST123"), &secret("s3cr3t"), false).unwrap();
        let shown = file.redacted().unwrap().unwrap();
        assert!(!shown.contains("PKTEST123"));
        assert!(!shown.contains("s3cr3t"));
        assert!(shown.contains(REDACTED));
    }

    #[test]
    fn test_reset_removes_keys() {
        let dir = tempdir().unwrap();
        let file = ConfigFile::new(dir.path().join("quantify.toml"));
        file.set_keys(&secret("KEY"), &secret("SECRET"), false).unwrap();

        file.reset().unwrap();
        let doc = file.read().unwrap();
        assert!(doc["alpaca"].get("api_key_id").is_none());
        // 초기화 후에는 force 없이 다시 설정 가능
        file.set_keys(&secret("KEY"), &secret("SECRET"), false).unwrap();
    }
}
