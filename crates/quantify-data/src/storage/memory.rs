//! 프로세스 내 메모리 저장소.
//!
//! PostgreSQL과 같은 계약을 따르며 테스트와 드라이런에 사용합니다.
//! `set_unavailable(true)`로 연결 손실을 흉내낼 수 있습니다.

use super::{AssetStore, AvailabilityRecord, BarStore};
use crate::assets::BasketCriteria;
use crate::error::{DataError, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use quantify_core::{AssetRecord, Bar, DateRange, Symbol, Timeframe};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

type SeriesKey = (Symbol, Timeframe);

/// 메모리 일봉 저장소.
#[derive(Default)]
pub struct MemoryBarStore {
    series: RwLock<HashMap<SeriesKey, BTreeMap<NaiveDate, Bar>>>,
    availability: RwLock<HashMap<SeriesKey, AvailabilityRecord>>,
    unavailable: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryBarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 연결 손실 상태를 설정합니다.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// 지금까지 호출된 `write` 횟수.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// 저장된 봉 수.
    pub async fn bar_count(&self, symbol: &Symbol, timeframe: Timeframe) -> usize {
        self.series
            .read()
            .await
            .get(&(symbol.clone(), timeframe))
            .map_or(0, BTreeMap::len)
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DataError::StorageUnavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BarStore for MemoryBarStore {
    async fn write(&self, symbol: &Symbol, timeframe: Timeframe, bars: &[Bar]) -> Result<usize> {
        self.check()?;
        self.writes.fetch_add(1, Ordering::SeqCst);

        let mut series = self.series.write().await;
        let entry = series.entry((symbol.clone(), timeframe)).or_default();
        for bar in bars {
            entry.insert(bar.date, bar.clone());
        }
        Ok(bars.len())
    }

    async fn read(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        range: &DateRange,
    ) -> Result<Vec<Bar>> {
        self.check()?;
        let series = self.series.read().await;
        Ok(series
            .get(&(symbol.clone(), timeframe))
            .map(|bars| {
                bars.range(range.start()..=range.end())
                    .map(|(_, bar)| bar.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn availability(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
    ) -> Result<Option<AvailabilityRecord>> {
        self.check()?;
        Ok(self
            .availability
            .read()
            .await
            .get(&(symbol.clone(), timeframe))
            .copied())
    }

    async fn extend_availability(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        range: &DateRange,
    ) -> Result<AvailabilityRecord> {
        self.check()?;
        let now = Utc::now();
        let mut records = self.availability.write().await;
        let record = match records.get(&(symbol.clone(), timeframe)) {
            Some(existing) => existing.extended(range, now),
            None => AvailabilityRecord::new(*range, now),
        };
        records.insert((symbol.clone(), timeframe), record);
        Ok(record)
    }

    async fn reset_availability(&self, symbol: &Symbol, timeframe: Timeframe) -> Result<()> {
        self.check()?;
        self.availability
            .write()
            .await
            .remove(&(symbol.clone(), timeframe));
        Ok(())
    }
}

/// 메모리 종목 저장소.
#[derive(Default)]
pub struct MemoryAssetStore {
    assets: RwLock<BTreeMap<Symbol, AssetRecord>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn upsert_assets(&self, assets: &[AssetRecord]) -> Result<usize> {
        let mut stored = self.assets.write().await;
        for asset in assets {
            stored.insert(asset.symbol.clone(), asset.clone());
        }
        Ok(assets.len())
    }

    async fn get_asset(&self, symbol: &Symbol) -> Result<Option<AssetRecord>> {
        Ok(self.assets.read().await.get(symbol).cloned())
    }

    async fn select_symbols(&self, criteria: &BasketCriteria) -> Result<Vec<Symbol>> {
        let stored = self.assets.read().await;
        let matching = stored
            .values()
            .filter(|asset| criteria.matches(asset))
            .map(|asset| asset.symbol.clone());

        Ok(match criteria.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 1, day).unwrap()
    }

    fn bar(day: u32, close: f64) -> Bar {
        Bar::new(d(day), close, close, close, close, 100, 1, None)
    }

    #[tokio::test]
    async fn test_write_overwrites_same_date() {
        let store = MemoryBarStore::new();
        let symbol = Symbol::new("AAPL").unwrap();

        store
            .write(&symbol, Timeframe::D1, &[bar(4, 1.0), bar(5, 2.0)])
            .await
            .unwrap();
        store
            .write(&symbol, Timeframe::D1, &[bar(5, 3.0)])
            .await
            .unwrap();

        let range = DateRange::new(d(1), d(31)).unwrap();
        let bars = store.read(&symbol, Timeframe::D1, &range).await.unwrap();
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![1.0, 3.0]);
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let store = MemoryBarStore::new();
        store.set_unavailable(true);
        let symbol = Symbol::new("AAPL").unwrap();
        let err = store.availability(&symbol, Timeframe::D1).await.unwrap_err();
        assert!(matches!(err, DataError::StorageUnavailable(_)));
    }

    #[tokio::test]
    async fn test_extend_and_reset() {
        let store = MemoryBarStore::new();
        let symbol = Symbol::new("AAPL").unwrap();

        store
            .extend_availability(&symbol, Timeframe::D1, &DateRange::new(d(11), d(15)).unwrap())
            .await
            .unwrap();
        let record = store
            .extend_availability(&symbol, Timeframe::D1, &DateRange::new(d(4), d(8)).unwrap())
            .await
            .unwrap();
        assert_eq!(record.range, DateRange::new(d(4), d(15)).unwrap());

        store.reset_availability(&symbol, Timeframe::D1).await.unwrap();
        assert!(store
            .availability(&symbol, Timeframe::D1)
            .await
            .unwrap()
            .is_none());
    }
}
