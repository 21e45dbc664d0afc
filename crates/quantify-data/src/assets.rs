//! 종목 목록 갱신과 바스켓 선택.
//!
//! 종목 수집 소스는 생성 시 넘겨준 순서 그대로 실행됩니다.
//! 소스 하나의 실패는 다른 소스에 영향을 주지 않지만,
//! 저장소 오류는 갱신 전체를 중단합니다.

use crate::error::Result;
use crate::source::AssetSource;
use crate::storage::AssetStore;
use quantify_core::{AssetRecord, BasketConfig};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 바스켓 선택 조건.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BasketCriteria {
    /// 거래소 필터 (대소문자 무시)
    pub exchange: Option<String>,
    /// 상장폐지 종목 포함 여부
    pub include_delisted: bool,
    /// 거래정지 종목 포함 여부
    pub include_suspended: bool,
    /// 최대 종목 수
    pub limit: Option<usize>,
}

impl BasketCriteria {
    /// 종목이 조건에 맞는지 확인합니다 (`limit` 제외).
    pub fn matches(&self, asset: &AssetRecord) -> bool {
        if !self.include_delisted && asset.is_delisted {
            return false;
        }
        if !self.include_suspended && asset.is_suspended {
            return false;
        }
        match &self.exchange {
            Some(exchange) => asset.exchange.eq_ignore_ascii_case(exchange),
            None => true,
        }
    }
}

impl From<&BasketConfig> for BasketCriteria {
    fn from(config: &BasketConfig) -> Self {
        Self {
            exchange: config.exchange.clone(),
            include_delisted: config.include_delisted,
            include_suspended: config.include_suspended,
            limit: config.limit,
        }
    }
}

/// 소스 하나의 갱신 결과.
#[derive(Debug, Clone, Serialize)]
pub struct SourceOutcome {
    pub source: String,
    pub upserted: usize,
    pub error: Option<String>,
}

/// 종목 목록 갱신기.
pub struct AssetRefresher {
    store: Arc<dyn AssetStore>,
    sources: Vec<Arc<dyn AssetSource>>,
}

impl AssetRefresher {
    /// 실행 순서대로 나열한 소스 목록으로 생성합니다.
    pub fn new(store: Arc<dyn AssetStore>, sources: Vec<Arc<dyn AssetSource>>) -> Self {
        Self { store, sources }
    }

    /// 실행 순서대로 소스 이름을 반환합니다.
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// 모든 소스를 순서대로 실행하고 저장소에 반영합니다.
    #[instrument(skip(self), fields(sources = self.sources.len()))]
    pub async fn refresh_all(&self) -> Result<Vec<SourceOutcome>> {
        let mut outcomes = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            let name = source.name().to_string();
            match source.fetch_assets().await {
                Ok(assets) => {
                    let upserted = self.store.upsert_assets(&assets).await?;
                    info!(source = %name, fetched = assets.len(), upserted, "종목 목록 갱신");
                    outcomes.push(SourceOutcome {
                        source: name,
                        upserted,
                        error: None,
                    });
                }
                Err(e) if e.is_systemic() => return Err(e),
                Err(e) => {
                    warn!(source = %name, error = %e, "종목 소스 조회 실패");
                    outcomes.push(SourceOutcome {
                        source: name,
                        upserted: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DataError;
    use crate::storage::MemoryAssetStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use quantify_core::Symbol;
    use std::sync::Mutex;

    fn asset(symbol: &str, exchange: &str, delisted: bool, suspended: bool) -> AssetRecord {
        AssetRecord {
            symbol: Symbol::new(symbol).unwrap(),
            company_name: format!("{} Inc.", symbol),
            exchange: exchange.to_string(),
            is_delisted: delisted,
            is_shortable: true,
            is_suspended: suspended,
            date_last_updated: Utc::now(),
        }
    }

    struct StaticSource {
        name: &'static str,
        assets: Vec<AssetRecord>,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl AssetSource for StaticSource {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch_assets(&self) -> Result<Vec<AssetRecord>> {
            self.calls.lock().unwrap().push(self.name);
            Ok(self.assets.clone())
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl AssetSource for BrokenSource {
        fn name(&self) -> &str {
            "broken"
        }

        async fn fetch_assets(&self) -> Result<Vec<AssetRecord>> {
            Err(DataError::FetchError("503".to_string()))
        }
    }

    #[test]
    fn test_criteria_matches() {
        let criteria = BasketCriteria {
            exchange: Some("nyse".to_string()),
            ..Default::default()
        };
        assert!(criteria.matches(&asset("IBM", "NYSE", false, false)));
        assert!(!criteria.matches(&asset("AAPL", "NASDAQ", false, false)));
        assert!(!criteria.matches(&asset("OLD", "NYSE", true, false)));
        assert!(!criteria.matches(&asset("HALT", "NYSE", false, true)));

        let everything = BasketCriteria {
            include_delisted: true,
            include_suspended: true,
            ..Default::default()
        };
        assert!(everything.matches(&asset("OLD", "NYSE", true, true)));
    }

    #[tokio::test]
    async fn test_refresh_runs_sources_in_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let store = Arc::new(MemoryAssetStore::new());
        let refresher = AssetRefresher::new(
            store.clone(),
            vec![
                Arc::new(StaticSource {
                    name: "first",
                    assets: vec![asset("AAPL", "NASDAQ", false, false)],
                    calls: calls.clone(),
                }),
                Arc::new(BrokenSource),
                Arc::new(StaticSource {
                    name: "second",
                    assets: vec![asset("IBM", "NYSE", false, false)],
                    calls: calls.clone(),
                }),
            ],
        );

        assert_eq!(refresher.source_names(), vec!["first", "broken", "second"]);

        let outcomes = refresher.refresh_all().await.unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[1].error.is_some());
        assert_eq!(outcomes[2].upserted, 1);

        let all = store
            .select_symbols(&BasketCriteria::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }
}
