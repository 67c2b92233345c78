//! In-process row change feed.
//!
//! Stores publish every row they insert; consumers subscribe per table with a
//! row predicate. The predicate runs inside the feed so a consumer only ever
//! sees rows addressed to it. Dropping a [`Subscription`] unsubscribes.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

pub const DEFAULT_FEED_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Serialize)]
pub struct RowChange {
    pub table: String,
    pub kind: ChangeKind,
    pub record: Value,
    pub observed_at: DateTime<Utc>,
}

type RowPredicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

#[derive(Debug)]
pub struct ChangeFeed {
    /// Table name → broadcast sender
    tables: RwLock<HashMap<String, broadcast::Sender<RowChange>>>,
    capacity: usize,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub async fn publish(&self, table: &str, kind: ChangeKind, record: Value) {
        let tables = self.tables.read().await;
        if let Some(tx) = tables.get(table) {
            let change = RowChange {
                table: table.to_string(),
                kind,
                record,
                observed_at: Utc::now(),
            };
            // No receivers is not an error; nobody is listening yet.
            let delivered = tx.send(change).unwrap_or(0);
            debug!("Published {:?} on {} to {} subscribers", kind, table, delivered);
        }
    }

    pub async fn publish_insert(&self, table: &str, record: Value) {
        self.publish(table, ChangeKind::Insert, record).await;
    }

    /// Subscribe to inserts on `table` whose row satisfies `predicate`.
    pub async fn subscribe<F>(&self, table: &str, predicate: F) -> Subscription
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        let mut tables = self.tables.write().await;
        let tx = tables
            .entry(table.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);

        Subscription {
            table: table.to_string(),
            receiver: tx.subscribe(),
            predicate: Arc::new(predicate),
        }
    }

    pub async fn subscriber_count(&self, table: &str) -> usize {
        let tables = self.tables.read().await;
        tables.get(table).map(|tx| tx.receiver_count()).unwrap_or(0)
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

pub struct Subscription {
    table: String,
    receiver: broadcast::Receiver<RowChange>,
    predicate: RowPredicate,
}

impl Subscription {
    /// Next matching insert, or `None` once the feed is gone.
    pub async fn next(&mut self) -> Option<RowChange> {
        loop {
            match self.receiver.recv().await {
                Ok(change) => {
                    if change.kind == ChangeKind::Insert && (self.predicate)(&change.record) {
                        return Some(change);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Subscription on {} lagged, skipped {} changes", self.table, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn into_stream(self) -> impl Stream<Item = RowChange> + Send {
        stream::unfold(self, |mut subscription| async move {
            subscription.next().await.map(|change| (change, subscription))
        })
    }
}
