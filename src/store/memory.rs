//! In-memory reading store

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::RwLock;

use super::ReadingStore;
use crate::error::Result;
use crate::reading::{Reading, SensorId};

/// Default readings kept per sensor
pub const DEFAULT_RETENTION: usize = 10_000;

/// Bounded per-sensor history held in memory
#[derive(Debug)]
pub struct MemoryStore {
    history: RwLock<HashMap<SensorId, VecDeque<Reading>>>,
    retention: usize,
}

impl MemoryStore {
    /// Store with the default retention
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    /// Store that keeps at most `retention` readings per sensor
    pub fn with_retention(retention: usize) -> Self {
        Self {
            history: RwLock::new(HashMap::new()),
            retention: retention.max(1),
        }
    }

    /// Total readings held
    pub async fn len(&self) -> usize {
        self.history.read().await.values().map(VecDeque::len).sum()
    }

    /// Whether nothing is stored
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadingStore for MemoryStore {
    fn insert_reading(&self, reading: Reading) -> BoxFuture<'_, Result<()>> {
        async move {
            let mut history = self.history.write().await;
            let entries = history.entry(reading.sensor_id.clone()).or_default();

            // Keep entries ordered by timestamp; producers almost always append.
            let at = entries.partition_point(|r| r.timestamp <= reading.timestamp);
            entries.insert(at, reading);

            while entries.len() > self.retention {
                entries.pop_front();
            }
            Ok(())
        }
        .boxed()
    }

    fn query_range<'a>(
        &'a self,
        sensor_id: &'a SensorId,
        since: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<Vec<Reading>>> {
        async move {
            let history = self.history.read().await;
            Ok(history
                .get(sensor_id)
                .map(|entries| {
                    entries
                        .iter()
                        .filter(|r| r.timestamp >= since)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }
        .boxed()
    }
}
