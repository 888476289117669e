use chrono::NaiveDate;
use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::time::Instant;
use tracing::debug;

use crate::{
    metrics::MetricsCollector,
    types::{MatchRecord, Sport},
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub sport: Sport,
    pub league: String,
    pub date: NaiveDate,
}

impl CacheKey {
    pub fn new(sport: Sport, league: &str, date: NaiveDate) -> Self {
        Self {
            sport,
            league: league.to_ascii_uppercase(),
            date,
        }
    }
}

struct Entry {
    stored_at: Instant,
    records: Arc<Vec<MatchRecord>>,
}

type Slot = Arc<tokio::sync::Mutex<Option<Entry>>>;

/// Short-lived store of normalized fixtures.
///
/// Each key owns an async mutex that is held across the producer call, so
/// concurrent misses on one key wait for a single fetch and share its result.
/// Different keys never contend beyond the map lookup. Failures are not stored.
pub struct ResultCache {
    ttl: Duration,
    slots: Mutex<HashMap<CacheKey, Slot>>,
    metrics: MetricsCollector,
}

impl ResultCache {
    pub fn new(ttl: Duration, metrics: MetricsCollector) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    fn slot(&self, key: &CacheKey) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        // Drop expired entries nobody is working on. Empty slots stay, a
        // caller may hold them between lookup and lock.
        slots.retain(|_, slot| match slot.try_lock() {
            Ok(entry) => entry
                .as_ref()
                .map_or(true, |e| now.duration_since(e.stored_at) < self.ttl),
            Err(_) => true,
        });
        slots.entry(key.clone()).or_default().clone()
    }

    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        key: &CacheKey,
        producer: F,
    ) -> Result<Arc<Vec<MatchRecord>>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<MatchRecord>, E>>,
    {
        let slot = self.slot(key);
        let mut entry = slot.lock().await;

        if let Some(cached) = entry.as_ref() {
            if cached.stored_at.elapsed() < self.ttl {
                debug!("Cache hit for {:?}", key);
                self.metrics.record_cache_hit();
                return Ok(cached.records.clone());
            }
        }

        debug!("Cache miss for {:?}", key);
        self.metrics.record_cache_miss();
        let records = Arc::new(producer().await?);
        *entry = Some(Entry {
            stored_at: Instant::now(),
            records: records.clone(),
        });
        Ok(records)
    }

    /// Number of stored fixture lists still inside the TTL. Slots that are
    /// being filled, or whose fetch failed, are not counted.
    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .values()
            .filter(|slot| match slot.try_lock() {
                Ok(entry) => entry
                    .as_ref()
                    .is_some_and(|e| e.stored_at.elapsed() < self.ttl),
                Err(_) => false,
            })
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
