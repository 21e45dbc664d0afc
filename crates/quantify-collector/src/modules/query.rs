//! 일봉 조회 명령 (`get-data`).

use crate::{CollectionStats, CollectorError, Result};
use chrono::NaiveDate;
use quantify_core::{AppConfig, BasketConfig, Symbol};
use quantify_data::{AssetStore, BasketCriteria, QueryFacade, QueryRequest, QueryResult};
use std::io::Write;
use std::time::Instant;

/// 출력 형식
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// 전체 결과 (데이터, 제외 종목, 경고)
    #[default]
    Json,
    /// 종목별 일봉 행
    Csv,
}

/// `get-data` 옵션. 비어 있는 값은 설정 파일 기본값을 사용합니다.
#[derive(Debug, Clone, Default)]
pub struct GetDataOptions {
    /// 비어 있으면 기본 바스켓
    pub symbols: Vec<Symbol>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub exchange: Option<String>,
    pub tolerance: Option<usize>,
    pub download: Option<bool>,
}

/// 조회 대상 종목을 결정합니다.
///
/// 명시한 종목이 없으면 `[basket]` 조건으로 저장된 종목 목록에서 선택합니다.
pub async fn resolve_symbols(
    requested: Vec<Symbol>,
    assets: &dyn AssetStore,
    basket: &BasketConfig,
) -> Result<Vec<Symbol>> {
    if !requested.is_empty() {
        return Ok(requested);
    }

    let criteria = BasketCriteria::from(basket);
    let symbols = assets.select_symbols(&criteria).await?;
    tracing::info!(count = symbols.len(), exchange = ?criteria.exchange, "기본 바스켓 선택");

    if symbols.is_empty() {
        return Err(CollectorError::InvalidArgument(
            "no symbols given and the basket is empty (run refresh-assets first)".to_string(),
        ));
    }
    Ok(symbols)
}

/// 종료일 기본값: `today` 이전의 마지막 거래일.
///
/// 당일 봉은 장 마감 전에는 확정되지 않으므로 포함하지 않습니다.
fn last_completed_session(facade: &QueryFacade, exchange: &str, today: NaiveDate) -> Result<NaiveDate> {
    Ok(facade
        .calendar()
        .previous_trading_day(exchange, today)?
        .unwrap_or(today))
}

/// 일봉 조회
///
/// 종료일을 지정하지 않으면 직전 거래일까지 조회합니다.
pub async fn get_data(
    facade: &QueryFacade,
    assets: &dyn AssetStore,
    config: &AppConfig,
    options: GetDataOptions,
    today: NaiveDate,
) -> Result<(QueryResult, CollectionStats)> {
    let started = Instant::now();

    let exchange = options
        .exchange
        .unwrap_or_else(|| config.query.exchange.clone());
    let end = match options.end {
        Some(end) => end,
        None => last_completed_session(facade, &exchange, today)?,
    };
    let start = options.start.unwrap_or(end);
    let symbols = resolve_symbols(options.symbols, assets, &config.basket).await?;

    let mut request = QueryRequest::new(symbols, start, end, &config.query).with_exchange(exchange);
    if let Some(tolerance) = options.tolerance {
        request = request.with_tolerance(tolerance);
    }
    if let Some(download) = options.download {
        request = request.with_download(download);
    }

    tracing::info!(
        symbols = request.symbols.len(),
        start = %request.start,
        end = %request.end,
        exchange = %request.exchange,
        download = request.download,
        "조회 시작"
    );

    let result = facade.get_data(request).await?;
    for warning in &result.warnings {
        tracing::warn!("{}", warning);
    }

    let stats = CollectionStats::from_query(&result, started.elapsed());
    Ok((result, stats))
}

/// 결과를 지정한 형식으로 출력합니다.
pub fn render<W: Write>(result: &QueryResult, format: OutputFormat, out: &mut W) -> Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, result)?;
            writeln!(out)?;
        }
        OutputFormat::Csv => {
            writeln!(out, "symbol,date,open,high,low,close,volume,trade_count,vwap")?;
            for (symbol, bars) in &result.data {
                for bar in bars {
                    let vwap = bar.vwap.map(|v| v.to_string()).unwrap_or_default();
                    writeln!(
                        out,
                        "{},{},{},{},{},{},{},{},{}",
                        symbol,
                        bar.date.format("%Y-%m-%d"),
                        bar.open,
                        bar.high,
                        bar.low,
                        bar.close,
                        bar.volume,
                        bar.trade_count,
                        vwap
                    )?;
                }
            }
        }
    }
    Ok(())
}

/// 날짜 파싱 (YYYY-MM-DD)
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
        CollectorError::InvalidArgument(format!("Invalid date format: {}. Expected YYYY-MM-DD", s))
    })
}
