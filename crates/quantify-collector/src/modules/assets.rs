//! 종목 목록 갱신 명령 (`refresh-assets`).

use crate::{CollectionStats, Result};
use quantify_data::AssetRefresher;
use std::time::Instant;

/// 등록된 종목 소스를 순서대로 실행해 종목 목록을 갱신합니다.
pub async fn refresh_assets(refresher: &AssetRefresher) -> Result<CollectionStats> {
    let start = Instant::now();

    let sources = refresher.source_names();
    if sources.is_empty() {
        tracing::warn!("등록된 종목 소스가 없습니다 (API 키 확인)");
        return Ok(CollectionStats::new());
    }
    tracing::info!(sources = ?sources, "종목 목록 갱신 시작");

    let outcomes = refresher.refresh_all().await?;
    for outcome in &outcomes {
        match &outcome.error {
            Some(error) => tracing::error!(source = %outcome.source, error = %error, "소스 실패"),
            None => tracing::info!(source = %outcome.source, upserted = outcome.upserted, "소스 완료"),
        }
    }

    Ok(CollectionStats::from_refresh(&outcomes, start.elapsed()))
}
