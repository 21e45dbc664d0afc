//! 기본 바스켓 동기화 (`sync`, `daemon`).

use super::query::{get_data, GetDataOptions};
use crate::{CollectionStats, Result};
use chrono::{Duration, NaiveDate};
use quantify_core::AppConfig;
use quantify_data::{AssetStore, QueryFacade};

/// 기본 바스켓을 최근 `lookback_days`일 범위로 조회해 저장소를 최신으로 유지합니다.
///
/// 종료일은 `today` 직전 거래일입니다.
/// 설정의 다운로드 여부와 관계없이 항상 원격 조회를 허용합니다.
pub async fn sync_basket(
    facade: &QueryFacade,
    assets: &dyn AssetStore,
    config: &AppConfig,
    today: NaiveDate,
) -> Result<CollectionStats> {
    let start = today - Duration::days(config.daemon.lookback_days.max(0));

    tracing::info!(
        start = %start,
        today = %today,
        lookback_days = config.daemon.lookback_days,
        "바스켓 동기화 시작"
    );

    let options = GetDataOptions {
        start: Some(start),
        download: Some(true),
        ..Default::default()
    };
    let (result, stats) = get_data(facade, assets, config, options, today).await?;

    for (symbol, reason) in &result.excluded {
        tracing::warn!(symbol = %symbol, reason = %reason, "동기화 제외");
    }

    Ok(stats)
}
