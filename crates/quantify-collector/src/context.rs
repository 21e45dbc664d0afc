//! 명령 실행에 필요한 서비스 묶음.

use crate::Result;
use async_trait::async_trait;
use quantify_core::{AppConfig, Bar, DateRange, Symbol, Timeframe};
use quantify_data::{
    connect_pool, AlpacaClient, AssetRefresher, AssetSource, AssetStore, BarSource, BarStore,
    CalendarService, DataError, PgAssetStore, PgBarStore, QueryFacade,
};
use sqlx::PgPool;
use std::sync::Arc;

/// DB 연결과 조회 서비스.
pub struct CollectorContext {
    pub config: AppConfig,
    pub pool: PgPool,
    pub facade: QueryFacade,
    pub assets: Arc<dyn AssetStore>,
    pub refresher: AssetRefresher,
}

impl CollectorContext {
    /// DB에 연결하고 서비스를 구성합니다.
    ///
    /// Alpaca 키가 없으면 저장된 데이터만 조회할 수 있습니다.
    pub async fn connect(config: AppConfig) -> Result<Self> {
        let pool = connect_pool(&config.database).await?;

        let bars: Arc<dyn BarStore> = Arc::new(PgBarStore::new(pool.clone()));
        let assets: Arc<dyn AssetStore> = Arc::new(PgAssetStore::new(pool.clone()));

        let mut asset_sources: Vec<Arc<dyn AssetSource>> = Vec::new();
        let bar_source: Arc<dyn BarSource> = if config.alpaca.has_credentials() {
            let client = Arc::new(AlpacaClient::new(&config.alpaca)?);
            asset_sources.push(client.clone());
            client
        } else {
            tracing::warn!("Alpaca API 키 없음, 저장된 데이터만 조회 가능 (set-keys 참고)");
            Arc::new(OfflineSource)
        };

        let facade = QueryFacade::new(
            bars,
            bar_source,
            Arc::new(CalendarService::us_equities()),
            config.fetch.clone(),
        );
        let refresher = AssetRefresher::new(assets.clone(), asset_sources);

        Ok(Self {
            config,
            pool,
            facade,
            assets,
            refresher,
        })
    }

    /// 연결을 정리합니다.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// 자격증명 없이 구성된 소스. 호출되면 설정 오류를 반환합니다.
struct OfflineSource;

#[async_trait]
impl BarSource for OfflineSource {
    fn name(&self) -> &str {
        "offline"
    }

    async fn fetch_bars(
        &self,
        _symbol: &Symbol,
        _range: &DateRange,
        _timeframe: Timeframe,
    ) -> quantify_data::Result<Vec<Bar>> {
        Err(DataError::ConfigError(
            "Alpaca API keys are not configured (run `quantify-collector set-keys`)".to_string(),
        ))
    }
}
