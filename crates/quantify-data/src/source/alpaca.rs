//! Alpaca Markets 데이터 소스.
//!
//! - 과거 봉: `GET {data_url}/v2/stocks/{symbol}/bars`
//! - 종목 목록: `GET {trading_url}/v2/assets`
//!
//! 봉 타임스탬프(UTC)는 뉴욕 시간 기준 날짜로 변환합니다.
//! 응답이 여러 페이지로 나뉘면 `next_page_token`을 따라 모두 가져옵니다.
//!
//! # 사용 예제
//!
//! ```rust,ignore
//! use quantify_data::source::{AlpacaClient, BarSource};
//!
//! let client = AlpacaClient::new(&config.alpaca)?;
//! let bars = client.fetch_bars(&symbol, &range, Timeframe::D1).await?;
//! ```

use super::{AssetSource, BarSource};
use crate::error::{DataError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::America::New_York;
use quantify_core::{AlpacaConfig, AssetRecord, Bar, DateRange, Symbol, Timeframe};
use reqwest::{StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

/// 페이지당 최대 봉 수 (API 상한).
const PAGE_LIMIT: &str = "10000";

/// 종목 목록에서 유지할 거래소.
const SUPPORTED_EXCHANGES: &[&str] = &["NYSE", "NASDAQ"];

/// 봉 조회 응답.
#[derive(Debug, Deserialize)]
struct BarsResponse {
    /// 결과가 없으면 null
    #[serde(default)]
    bars: Option<Vec<AlpacaBar>>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Alpaca 봉 레코드.
#[derive(Debug, Deserialize)]
struct AlpacaBar {
    /// 봉 시작 시각 (RFC 3339, UTC)
    t: DateTime<Utc>,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
    /// 체결 건수
    #[serde(default)]
    n: Option<u64>,
    /// 거래량 가중 평균가
    #[serde(default)]
    vw: Option<f64>,
}

impl AlpacaBar {
    fn into_bar(self) -> Bar {
        Bar::new(
            self.t.with_timezone(&New_York).date_naive(),
            self.o,
            self.h,
            self.l,
            self.c,
            self.v.max(0.0).round() as u64,
            self.n.unwrap_or(0),
            self.vw,
        )
    }
}

/// Alpaca 종목 레코드.
#[derive(Debug, Deserialize)]
struct AlpacaAsset {
    symbol: String,
    #[serde(default)]
    name: Option<String>,
    exchange: String,
    status: String,
    #[serde(default)]
    tradable: bool,
    #[serde(default)]
    shortable: bool,
}

/// Alpaca REST 클라이언트.
pub struct AlpacaClient {
    client: reqwest::Client,
    data_url: Url,
    trading_url: Url,
    feed: String,
    key_id: SecretString,
    secret_key: SecretString,
}

impl AlpacaClient {
    /// 설정에서 클라이언트를 생성합니다.
    ///
    /// 자격증명이 없으면 `ConfigError`를 반환합니다.
    pub fn new(config: &AlpacaConfig) -> Result<Self> {
        let (Some(key_id), Some(secret_key)) = (&config.api_key_id, &config.api_secret_key) else {
            return Err(DataError::ConfigError(
                "Alpaca 자격증명이 설정되지 않았습니다 (set-keys 명령 또는 APCA_API_KEY_ID/APCA_API_SECRET_KEY)"
                    .to_string(),
            ));
        };

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| DataError::ConfigError(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        Ok(Self {
            client,
            data_url: parse_base_url(&config.data_url)?,
            trading_url: parse_base_url(&config.trading_url)?,
            feed: config.feed.clone(),
            key_id: SecretString::from(key_id.expose_secret()),
            secret_key: SecretString::from(secret_key.expose_secret()),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, query: &[(&str, &str)]) -> Result<T> {
        let response = self
            .client
            .get(url)
            .header("APCA-API-KEY-ID", self.key_id.expose_secret())
            .header("APCA-API-SECRET-KEY", self.secret_key.expose_secret())
            .query(query)
            .send()
            .await
            .map_err(|e| DataError::FetchError(format!("Alpaca API 호출 실패: {}", e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(DataError::ConfigError(format!("Alpaca 인증 실패: {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DataError::FetchError(format!(
                "Alpaca API 오류: {} - {}",
                status,
                preview(&body)
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| DataError::FetchError(format!("응답 읽기 실패: {}", e)))?;

        serde_json::from_str(&text).map_err(|e| {
            DataError::ParseError(format!(
                "JSON 파싱 실패: {} - {}",
                e,
                preview(&text)
            ))
        })
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| DataError::ConfigError(format!("잘못된 Alpaca URL '{}': {}", raw, e)))?;
    if url.cannot_be_a_base() {
        return Err(DataError::ConfigError(format!("경로를 붙일 수 없는 Alpaca URL: {}", raw)));
    }
    Ok(url)
}

/// 기본 URL 뒤에 경로 세그먼트를 붙입니다.
///
/// 각 세그먼트는 퍼센트 인코딩되므로 `/`가 들어간 심볼도 하나의 세그먼트로 남습니다.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| DataError::ConfigError(format!("경로를 붙일 수 없는 Alpaca URL: {}", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// 오류 메시지에 넣을 응답 본문 앞부분.
fn preview(body: &str) -> String {
    body.chars().take(200).collect()
}

#[async_trait]
impl BarSource for AlpacaClient {
    fn name(&self) -> &str {
        "alpaca"
    }

    #[instrument(skip(self), fields(symbol = %symbol, range = %range))]
    async fn fetch_bars(
        &self,
        symbol: &Symbol,
        range: &DateRange,
        timeframe: Timeframe,
    ) -> Result<Vec<Bar>> {
        let url = endpoint(&self.data_url, &["v2", "stocks", symbol.as_str(), "bars"])?;
        let start = range.start().format("%Y-%m-%d").to_string();
        let end = range.end().format("%Y-%m-%d").to_string();

        let mut bars = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("timeframe", timeframe.as_api_str()),
                ("start", start.as_str()),
                ("end", end.as_str()),
                ("adjustment", "all"),
                ("limit", PAGE_LIMIT),
                ("feed", self.feed.as_str()),
            ];
            if let Some(token) = page_token.as_deref() {
                query.push(("page_token", token));
            }

            let page: BarsResponse = self.get_json(url.clone(), &query).await?;
            let page_bars = page.bars.unwrap_or_default();
            debug!(count = page_bars.len(), "Alpaca 봉 페이지 수신");
            bars.extend(page_bars.into_iter().map(AlpacaBar::into_bar));

            match page.next_page_token {
                Some(next) if Some(&next) != page_token.as_ref() => page_token = Some(next),
                Some(_) => {
                    warn!("같은 page_token 반복, 페이지 조회 중단");
                    break;
                }
                None => break,
            }
        }

        Ok(bars)
    }
}

#[async_trait]
impl AssetSource for AlpacaClient {
    fn name(&self) -> &str {
        "alpaca"
    }

    #[instrument(skip(self))]
    async fn fetch_assets(&self) -> Result<Vec<AssetRecord>> {
        // 상태 필터 없이 받아 비활성 종목을 상장폐지로 표시합니다.
        let url = endpoint(&self.trading_url, &["v2", "assets"])?;
        let raw: Vec<AlpacaAsset> = self.get_json(url, &[("asset_class", "us_equity")]).await?;
        let now = Utc::now();
        let total = raw.len();

        let assets: Vec<AssetRecord> = raw
            .into_iter()
            .filter(|a| SUPPORTED_EXCHANGES.contains(&a.exchange.to_ascii_uppercase().as_str()))
            .filter_map(|a| {
                let symbol = Symbol::new(&a.symbol).ok()?;
                Some(AssetRecord {
                    symbol,
                    company_name: a.name.unwrap_or_default(),
                    exchange: a.exchange.to_ascii_uppercase(),
                    is_delisted: !a.status.eq_ignore_ascii_case("active"),
                    is_shortable: a.shortable,
                    is_suspended: !a.tradable,
                    date_last_updated: now,
                })
            })
            .collect();

        debug!(total, kept = assets.len(), "Alpaca 종목 목록 수신");
        Ok(assets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use mockito::Matcher;

    fn config(url: &str) -> AlpacaConfig {
        AlpacaConfig {
            api_key_id: Some(SecretString::from("key-id")),
            api_secret_key: Some(SecretString::from("secret")),
            data_url: url.to_string(),
            trading_url: url.to_string(),
            ..Default::default()
        }
    }

    fn week() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2021, 1, 4).unwrap(),
            NaiveDate::from_ymd_opt(2021, 1, 8).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_missing_credentials() {
        let result = AlpacaClient::new(&AlpacaConfig::default());
        assert!(matches!(result, Err(DataError::ConfigError(_))));
    }

    #[test]
    fn test_invalid_base_url() {
        let result = AlpacaClient::new(&config("not a url"));
        assert!(matches!(result, Err(DataError::ConfigError(_))));
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let base = Url::parse("https://data.alpaca.markets/").unwrap();
        let url = endpoint(&base, &["v2", "stocks", "BRK/B", "bars"]).unwrap();
        assert_eq!(url.path(), "/v2/stocks/BRK%2FB/bars");

        let prefixed = Url::parse("http://127.0.0.1:1234/proxy").unwrap();
        let url = endpoint(&prefixed, &["v2", "assets"]).unwrap();
        assert_eq!(url.path(), "/proxy/v2/assets");
    }

    #[tokio::test]
    async fn test_fetch_bars_symbol_with_slash_stays_one_segment() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/stocks/BRK%2FB/bars")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"bars":[
                    {"t":"2021-01-04T05:00:00Z","o":228.0,"h":229.4,"l":225.1,"c":227.1,"v":4521000,"n":61000,"vw":227.3}
                ],"symbol":"BRK/B","next_page_token":null}"#,
            )
            .create_async()
            .await;

        let client = AlpacaClient::new(&config(&server.url())).unwrap();
        let bars = client
            .fetch_bars(&Symbol::new("brk/b").unwrap(), &week(), Timeframe::D1)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(bars.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_bars_follows_pages() {
        let mut server = mockito::Server::new_async().await;

        let first = server
            .mock("GET", "/v2/stocks/AAPL/bars")
            .match_header("APCA-API-KEY-ID", "key-id")
            .match_header("APCA-API-SECRET-KEY", "secret")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("timeframe".into(), "1Day".into()),
                Matcher::UrlEncoded("start".into(), "2021-01-04".into()),
                Matcher::UrlEncoded("end".into(), "2021-01-08".into()),
                Matcher::UrlEncoded("adjustment".into(), "all".into()),
                Matcher::Missing("page_token".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"bars":[
                    {"t":"2021-01-04T05:00:00Z","o":133.52,"h":133.6116,"l":126.76,"c":129.41,"v":143301887,"n":1310228,"vw":129.732},
                    {"t":"2021-01-05T05:00:00Z","o":128.89,"h":131.74,"l":128.43,"c":131.01,"v":97664898,"n":707583,"vw":130.717}
                ],"symbol":"AAPL","next_page_token":"page2"}"#,
            )
            .create_async()
            .await;

        let second = server
            .mock("GET", "/v2/stocks/AAPL/bars")
            .match_query(Matcher::UrlEncoded("page_token".into(), "page2".into()))
            .with_status(200)
            .with_body(
                r#"{"bars":[
                    {"t":"2021-01-06T05:00:00Z","o":127.72,"h":131.0499,"l":126.382,"c":126.6,"v":155087970,"n":1202580,"vw":128.36}
                ],"symbol":"AAPL","next_page_token":null}"#,
            )
            .create_async()
            .await;

        let client = AlpacaClient::new(&config(&server.url())).unwrap();
        let symbol = Symbol::new("AAPL").unwrap();
        let bars = client.fetch_bars(&symbol, &week(), Timeframe::D1).await.unwrap();

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2021, 1, 4).unwrap());
        assert_eq!(bars[0].volume, 143_301_887);
        assert_eq!(bars[0].trade_count, 1_310_228);
        assert_eq!(bars[2].close, 126.6);
    }

    #[tokio::test]
    async fn test_fetch_bars_null_is_empty() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/stocks/DEAD/bars")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"bars":null,"symbol":"DEAD","next_page_token":null}"#)
            .create_async()
            .await;

        let client = AlpacaClient::new(&config(&server.url())).unwrap();
        let bars = client
            .fetch_bars(&Symbol::new("DEAD").unwrap(), &week(), Timeframe::D1)
            .await
            .unwrap();
        assert!(bars.is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_is_fetch_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/stocks/AAPL/bars")
            .match_query(Matcher::Any)
            .with_status(429)
            .with_body("too many requests")
            .create_async()
            .await;

        let client = AlpacaClient::new(&config(&server.url())).unwrap();
        let err = client
            .fetch_bars(&Symbol::new("AAPL").unwrap(), &week(), Timeframe::D1)
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::FetchError(_)));
        assert!(!err.is_systemic());
    }

    #[tokio::test]
    async fn test_unauthorized_is_systemic() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/stocks/AAPL/bars")
            .match_query(Matcher::Any)
            .with_status(401)
            .create_async()
            .await;

        let client = AlpacaClient::new(&config(&server.url())).unwrap();
        let err = client
            .fetch_bars(&Symbol::new("AAPL").unwrap(), &week(), Timeframe::D1)
            .await
            .unwrap_err();
        assert!(err.is_systemic());
    }

    #[tokio::test]
    async fn test_fetch_assets_filters_exchanges() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/assets")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("asset_class".into(), "us_equity".into()),
                Matcher::Missing("status".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"[
                    {"symbol":"AAPL","name":"Apple Inc.","exchange":"NASDAQ","status":"active","tradable":true,"shortable":true},
                    {"symbol":"IBM","name":"IBM","exchange":"NYSE","status":"inactive","tradable":false,"shortable":false},
                    {"symbol":"SPY","name":"SPDR S&P 500","exchange":"ARCA","status":"active","tradable":true,"shortable":true}
                ]"#,
            )
            .create_async()
            .await;

        let client = AlpacaClient::new(&config(&server.url())).unwrap();
        let assets = client.fetch_assets().await.unwrap();

        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].symbol.as_str(), "AAPL");
        assert!(assets[0].is_tradable());
        assert!(assets[1].is_delisted);
        assert!(assets[1].is_suspended);
    }
}
