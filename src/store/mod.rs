//! Persistence collaborator
//!
//! The pipeline forwards every accepted reading to an optional
//! [`ReadingStore`]. Forwarding is best-effort: the ingest worker hands
//! readings to a bounded queue and never waits on the store, and store errors
//! are logged, not propagated.

pub mod memory;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::reading::{Reading, SensorId};

pub use memory::MemoryStore;

/// Durable storage for readings
pub trait ReadingStore: Send + Sync + 'static {
    /// Store one reading
    fn insert_reading(&self, reading: Reading) -> BoxFuture<'_, Result<()>>;

    /// Readings for one sensor at or after `since`, oldest first
    fn query_range<'a>(
        &'a self,
        sensor_id: &'a SensorId,
        since: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<Vec<Reading>>>;
}

/// Start the task that drains the persistence queue into `store`
///
/// The task ends once every sender is dropped and the queue is empty.
pub fn spawn_persistence(
    store: Arc<dyn ReadingStore>,
    capacity: usize,
) -> (mpsc::Sender<Reading>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Reading>(capacity.max(1));

    let handle = tokio::spawn(async move {
        while let Some(reading) = rx.recv().await {
            let sensor = reading.sensor_id.clone();
            if let Err(e) = store.insert_reading(reading).await {
                tracing::warn!(sensor = %sensor, error = %e, "Failed to persist reading");
            }
        }
        tracing::debug!("Persistence queue closed");
    });

    (tx, handle)
}

#[cfg(test)]
mod tests {
    use futures_util::FutureExt;

    use super::*;
    use crate::error::Error;
    use crate::reading::Measurements;
    use crate::testing::epoch;

    struct BrokenStore;

    impl ReadingStore for BrokenStore {
        fn insert_reading(&self, _reading: Reading) -> BoxFuture<'_, Result<()>> {
            async { Err(Error::Store("disk full".to_string())) }.boxed()
        }

        fn query_range<'a>(
            &'a self,
            _sensor_id: &'a SensorId,
            _since: DateTime<Utc>,
        ) -> BoxFuture<'a, Result<Vec<Reading>>> {
            async { Ok(Vec::new()) }.boxed()
        }
    }

    fn reading(sensor: &str) -> Reading {
        Reading::new(
            SensorId::new(sensor),
            Measurements {
                pm25: 10.0,
                pm10: 17.0,
                co2: 420.0,
                temperature: 20.0,
                humidity: 50.0,
                pressure: None,
            },
            41,
            "Test",
            epoch(),
        )
    }

    #[tokio::test]
    async fn test_persistence_drains_queue() {
        let store = Arc::new(MemoryStore::new());
        let (tx, handle) = spawn_persistence(store.clone(), 8);

        tx.send(reading("a")).await.unwrap();
        tx.send(reading("b")).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_store_errors_do_not_stop_the_task() {
        let (tx, handle) = spawn_persistence(Arc::new(BrokenStore), 8);

        tx.send(reading("a")).await.unwrap();
        tx.send(reading("b")).await.unwrap();
        drop(tx);

        assert!(handle.await.is_ok());
    }
}
