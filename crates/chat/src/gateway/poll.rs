//! Polling change feed
//!
//! Turns any [`RowGateway`] into a [`ChangeFeed`] by re-selecting the
//! subscribed table on an interval and delivering rows whose `created_at` is
//! newer than the last row seen. This is how live updates reach the hosted
//! backend, which this client talks to over plain HTTP.

use anyhow::{Context, Result};
use log::{debug, warn};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use super::{
    ChangeCallback, ChangeEvent, ChangeFeed, ChangeSubscription, Filter, Query, Row, RowGateway,
    Subscription,
};

/// How often a subscription re-reads its table by default
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

const CURSOR_COLUMN: &str = "created_at";

/// Change feed backed by periodic selects
pub struct PollingFeed {
    gateway: Arc<dyn RowGateway>,
    interval: Duration,
}

impl PollingFeed {
    pub fn new(gateway: Arc<dyn RowGateway>) -> Self {
        Self {
            gateway,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Stop signal shared by a poll thread and its handle
struct PollControl {
    cancelled: AtomicBool,
    /// Held while callbacks run, so cancel can wait out a delivery
    delivering: Mutex<()>,
}

impl PollControl {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn lock_delivery(&self) -> MutexGuard<'_, ()> {
        match self.delivering.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Read position of one subscription
struct Cursor {
    gateway: Arc<dyn RowGateway>,
    subscription: ChangeSubscription,
    last_seen: Option<Value>,
}

impl Cursor {
    /// Start after the newest row that already exists
    fn start(gateway: Arc<dyn RowGateway>, subscription: ChangeSubscription) -> Result<Self> {
        let mut cursor = Self {
            gateway,
            subscription,
            last_seen: None,
        };
        let newest = cursor
            .gateway
            .select(&cursor.base_query().order_by(CURSOR_COLUMN, false).limit(1))?;
        cursor.last_seen = newest.first().and_then(|row| row.get(CURSOR_COLUMN).cloned());
        Ok(cursor)
    }

    fn base_query(&self) -> Query {
        let query = Query::table(self.subscription.table);
        match &self.subscription.filter {
            Some(filter) => query.filter(filter.clone()),
            None => query,
        }
    }

    /// Rows inserted since the previous call, oldest first
    fn poll(&mut self) -> Result<Vec<Row>> {
        let mut query = self.base_query().order_by(CURSOR_COLUMN, true);
        if let Some(last_seen) = &self.last_seen {
            query = query.filter(Filter::gt(CURSOR_COLUMN, last_seen.clone()));
        }
        let rows = self.gateway.select(&query)?;
        if let Some(newest) = rows.last().and_then(|row| row.get(CURSOR_COLUMN)) {
            self.last_seen = Some(newest.clone());
        }
        Ok(rows
            .into_iter()
            .filter(|row| {
                self.subscription
                    .matches(self.subscription.table, ChangeEvent::Insert, row)
            })
            .collect())
    }
}

impl ChangeFeed for PollingFeed {
    fn subscribe(&self, subscription: ChangeSubscription, callback: ChangeCallback) -> Result<Subscription> {
        let table = subscription.table;
        let mut cursor = Cursor::start(self.gateway.clone(), subscription)
            .with_context(|| format!("Failed to read {} before polling", table))?;

        let control = Arc::new(PollControl {
            cancelled: AtomicBool::new(false),
            delivering: Mutex::new(()),
        });
        let interval = self.interval;
        let worker = control.clone();
        let handle = thread::Builder::new()
            .name(format!("poll-{}", table))
            .spawn(move || {
                loop {
                    thread::sleep(interval);
                    if worker.is_cancelled() {
                        break;
                    }
                    let rows = match cursor.poll() {
                        Ok(rows) => rows,
                        Err(e) => {
                            warn!("Polling {} failed: {:#}", table, e);
                            continue;
                        }
                    };
                    let _delivering = worker.lock_delivery();
                    for row in &rows {
                        if worker.is_cancelled() {
                            return;
                        }
                        callback(row);
                    }
                }
                debug!("Stopped polling {}", table);
            })
            .context("Failed to start poll thread")?;

        let poll_thread = handle.thread().id();
        debug!("Polling {} every {:?}", table, interval);
        Ok(Subscription::new(move || {
            control.cancelled.store(true, Ordering::SeqCst);
            // A callback cancelling its own subscription already holds the delivery lock
            if thread::current().id() != poll_thread {
                drop(control.lock_delivery());
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{InMemoryBackend, Table};
    use serde_json::json;
    use std::time::Instant;

    fn backend() -> Arc<InMemoryBackend> {
        let backend = Arc::new(InMemoryBackend::new());
        for id in ["c1", "c2"] {
            backend
                .seed(
                    Table::Conversations,
                    json!({ "id": id, "status": "active", "last_message_at": "2024-01-01T00:00:00Z" }),
                )
                .unwrap();
        }
        backend
    }

    fn seed_message(backend: &InMemoryBackend, conversation: &str, content: &str, at: &str) {
        backend
            .seed(
                Table::Messages,
                json!({
                    "conversation_id": conversation,
                    "content": content,
                    "sender_type": "bot",
                    "created_at": at,
                }),
            )
            .unwrap();
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, ChangeCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ChangeCallback = Arc::new(move |row: &Row| {
            let content = row["content"].as_str().unwrap_or_default().to_string();
            sink.lock().unwrap().push(content);
        });
        (seen, callback)
    }

    fn wait_for(seen: &Mutex<Vec<String>>, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while seen.lock().unwrap().len() < count && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn feed(backend: &Arc<InMemoryBackend>) -> PollingFeed {
        PollingFeed::new(backend.clone()).with_interval(Duration::from_millis(10))
    }

    fn messages_in(conversation: &str) -> ChangeSubscription {
        ChangeSubscription::inserts(Table::Messages)
            .with_filter(Filter::eq("conversation_id", conversation))
    }

    #[test]
    fn test_delivers_only_new_rows_for_the_filter() {
        let backend = backend();
        seed_message(&backend, "c1", "before", "2024-01-01T00:00:00Z");

        let (seen, callback) = recorder();
        let sub = feed(&backend).subscribe(messages_in("c1"), callback).unwrap();

        seed_message(&backend, "c2", "elsewhere", "2024-01-01T00:00:01Z");
        seed_message(&backend, "c1", "first", "2024-01-01T00:00:02Z");
        seed_message(&backend, "c1", "second", "2024-01-01T00:00:03Z");
        wait_for(&seen, 2);

        assert_eq!(
            seen.lock().unwrap().as_slice(),
            ["first".to_string(), "second".to_string()]
        );
        sub.cancel();
    }

    #[test]
    fn test_cancel_stops_delivery() {
        let backend = backend();
        let (seen, callback) = recorder();
        let sub = feed(&backend).subscribe(messages_in("c1"), callback).unwrap();

        seed_message(&backend, "c1", "first", "2024-01-01T00:00:01Z");
        wait_for(&seen, 1);

        sub.cancel();
        sub.cancel();
        assert!(!sub.is_active());
        seed_message(&backend, "c1", "late", "2024-01-01T00:00:02Z");
        thread::sleep(Duration::from_millis(60));

        assert_eq!(seen.lock().unwrap().as_slice(), ["first".to_string()]);
    }

    #[test]
    fn test_failed_poll_is_retried() {
        let backend = backend();
        let (seen, callback) = recorder();
        let _sub = feed(&backend).subscribe(messages_in("c1"), callback).unwrap();

        backend.fail_next(Table::Messages, "connection reset");
        seed_message(&backend, "c1", "after outage", "2024-01-01T00:00:01Z");
        wait_for(&seen, 1);

        assert_eq!(seen.lock().unwrap().as_slice(), ["after outage".to_string()]);
    }

    #[test]
    fn test_subscribe_fails_when_table_unreadable() {
        let backend = backend();
        backend.fail_next(Table::Messages, "permission denied for table messages");
        let (_, callback) = recorder();

        let err = feed(&backend).subscribe(messages_in("c1"), callback).unwrap_err();
        assert!(format!("{:#}", err).contains("permission denied"));
    }
}
