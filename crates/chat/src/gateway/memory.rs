//! In-memory backend implementation
//!
//! Implements the row gateway, auth lookup and change feed against plain
//! collections. It is used by tests and for offline demos, and enforces the
//! same key constraints the hosted schema does.

use anyhow::{Result, anyhow};
use chrono::{SecondsFormat, Utc};
use log::debug;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use super::{
    AuthProvider, ChangeCallback, ChangeEvent, ChangeFeed, ChangeSubscription, Filter, Query, Row,
    RowGateway, Subscription, Table,
};
use super::traits::compare_values;
use crate::error::BackendError;
use crate::models::User;

type RpcHandler = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;
type Listeners = HashMap<u64, (ChangeSubscription, ChangeCallback)>;

/// Column sets that must be unique per table
fn unique_keys(table: Table) -> &'static [&'static [&'static str]] {
    match table {
        Table::ConversationTags => &[&["conversation_id", "tag_id"]],
        Table::ChatbotConfigs => &[&["id"], &["user_id"]],
        Table::DomainVerifications => &[&["id"], &["user_id", "domain"]],
        _ => &[&["id"]],
    }
}

/// (column, referenced table) pairs; references always target `id`
fn foreign_keys(table: Table) -> &'static [(&'static str, Table)] {
    match table {
        Table::Messages => &[("conversation_id", Table::Conversations)],
        Table::ConversationTags => &[
            ("conversation_id", Table::Conversations),
            ("tag_id", Table::Tags),
        ],
        _ => &[],
    }
}

/// Rows removed along with a deleted parent: (child table, referencing column)
fn cascades(table: Table) -> &'static [(Table, &'static str)] {
    match table {
        Table::Conversations => &[
            (Table::Messages, "conversation_id"),
            (Table::ConversationTags, "conversation_id"),
        ],
        Table::Tags => &[(Table::ConversationTags, "tag_id")],
        _ => &[],
    }
}

fn now_value() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
}

fn poisoned() -> anyhow::Error {
    anyhow!("in-memory backend lock poisoned")
}

fn matches_all(filters: &[Filter], row: &Row) -> bool {
    filters.iter().all(|f| f.matches(row))
}

fn same_key(key: &[&str], a: &Row, b: &Row) -> bool {
    key.iter().all(|col| match (a.get(*col), b.get(*col)) {
        (Some(x), Some(y)) => !x.is_null() && x == y,
        _ => false,
    })
}

/// In-memory implementation of the backend contracts
pub struct InMemoryBackend {
    tables: RwLock<HashMap<Table, Vec<Row>>>,
    current_user: RwLock<Option<User>>,
    listeners: Arc<RwLock<Listeners>>,
    next_listener_id: AtomicU64,
    rpc_handlers: RwLock<HashMap<String, RpcHandler>>,
    /// One-shot failures keyed by table
    failures: Mutex<HashMap<Table, String>>,
    /// Select counts per table, for observing refresh behavior
    reads: Mutex<HashMap<Table, usize>>,
}

impl InMemoryBackend {
    /// Create an empty backend with no signed-in user
    pub fn new() -> Self {
        let backend = Self {
            tables: RwLock::new(HashMap::new()),
            current_user: RwLock::new(None),
            listeners: Arc::new(RwLock::new(HashMap::new())),
            next_listener_id: AtomicU64::new(1),
            rpc_handlers: RwLock::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            reads: Mutex::new(HashMap::new()),
        };
        backend.register_rpc("generate_chatbot_token", |_args| {
            Ok(Value::String(format!("cbt_{}", uuid::Uuid::new_v4().simple())))
        });
        backend
    }

    /// Sign a user in; later `current_user` calls return it
    pub fn sign_in(&self, user: User) {
        if let Ok(mut guard) = self.current_user.write() {
            *guard = Some(user);
        }
    }

    pub fn sign_out(&self) {
        if let Ok(mut guard) = self.current_user.write() {
            *guard = None;
        }
    }

    /// Insert a JSON object literal, applying the usual constraints
    pub fn seed(&self, table: Table, value: Value) -> Result<Row> {
        let Value::Object(row) = value else {
            return Err(anyhow!("seed rows must be JSON objects"));
        };
        self.insert(table, row)
    }

    /// Snapshot of every row in a table, in insertion order
    pub fn rows(&self, table: Table) -> Vec<Row> {
        self.tables
            .read()
            .map(|t| t.get(&table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Make the next operation touching `table` fail with `message`
    pub fn fail_next(&self, table: Table, message: impl Into<String>) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(table, message.into());
        }
    }

    /// Number of selects issued against `table` so far
    pub fn read_count(&self, table: Table) -> usize {
        self.reads
            .lock()
            .map(|r| r.get(&table).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Number of change listeners currently registered
    pub fn active_listener_count(&self) -> usize {
        self.listeners.read().map(|l| l.len()).unwrap_or(0)
    }

    /// Register (or replace) a server-side function
    pub fn register_rpc(
        &self,
        name: impl Into<String>,
        handler: impl Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    ) {
        if let Ok(mut handlers) = self.rpc_handlers.write() {
            handlers.insert(name.into(), Arc::new(handler));
        }
    }

    fn take_failure(&self, table: Table) -> Result<()> {
        let failure = self.failures.lock().map_err(|_| poisoned())?.remove(&table);
        match failure {
            Some(message) => Err(BackendError::new(message).into()),
            None => Ok(()),
        }
    }

    fn prepare_insert(table: Table, mut row: Row) -> Row {
        if table != Table::ConversationTags {
            row.entry("id")
                .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));
            row.entry("created_at").or_insert_with(now_value);
        }
        if table == Table::ChatbotConfigs {
            row.entry("updated_at").or_insert_with(now_value);
        }
        row
    }

    fn check_unique(table: Table, rows: &[Row], candidate: &Row, skip: Option<usize>) -> Result<()> {
        for key in unique_keys(table) {
            let clash = rows
                .iter()
                .enumerate()
                .any(|(i, existing)| Some(i) != skip && same_key(key, existing, candidate));
            if clash {
                return Err(BackendError::new(format!(
                    "duplicate key value violates unique constraint \"{}_{}_key\"",
                    table,
                    key.join("_")
                ))
                .into());
            }
        }
        Ok(())
    }

    fn check_foreign_keys(tables: &HashMap<Table, Vec<Row>>, table: Table, row: &Row) -> Result<()> {
        for (column, parent) in foreign_keys(table) {
            let value = row.get(*column).filter(|v| !v.is_null());
            let exists = value.is_some_and(|v| {
                tables
                    .get(parent)
                    .is_some_and(|rows| rows.iter().any(|r| r.get("id") == Some(v)))
            });
            if !exists {
                return Err(BackendError::new(format!(
                    "insert or update on table \"{}\" violates foreign key constraint \"{}_{}_fkey\"",
                    table, table, column
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Deliver change events to matching listeners. Must be called without table locks held.
    fn emit(&self, table: Table, event: ChangeEvent, row: &Row) {
        let callbacks: Vec<ChangeCallback> = match self.listeners.read() {
            Ok(listeners) => listeners
                .values()
                .filter(|(sub, _)| sub.matches(table, event, row))
                .map(|(_, cb)| cb.clone())
                .collect(),
            Err(_) => return,
        };
        debug!("Delivering {:?} on {} to {} listener(s)", event, table, callbacks.len());
        for callback in callbacks {
            callback(row);
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RowGateway for InMemoryBackend {
    fn select(&self, query: &Query) -> Result<Vec<Row>> {
        self.take_failure(query.table)?;
        if let Ok(mut reads) = self.reads.lock() {
            *reads.entry(query.table).or_default() += 1;
        }

        let tables = self.tables.read().map_err(|_| poisoned())?;
        let mut rows: Vec<Row> = tables
            .get(&query.table)
            .map(|rows| {
                rows.iter()
                    .filter(|r| matches_all(&query.filters, r))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        // Stable sort keeps insertion order for ties
        rows.sort_by(|a, b| {
            for order in &query.order {
                let null = Value::Null;
                let left = a.get(&order.column).unwrap_or(&null);
                let right = b.get(&order.column).unwrap_or(&null);
                let ord = compare_values(left, right);
                let ord = if order.ascending { ord } else { ord.reverse() };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });

        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    fn insert(&self, table: Table, row: Row) -> Result<Row> {
        self.take_failure(table)?;
        let row = Self::prepare_insert(table, row);
        {
            let mut tables = self.tables.write().map_err(|_| poisoned())?;
            Self::check_foreign_keys(&tables, table, &row)?;
            let rows = tables.entry(table).or_default();
            Self::check_unique(table, rows, &row, None)?;
            rows.push(row.clone());
        }
        self.emit(table, ChangeEvent::Insert, &row);
        Ok(row)
    }

    fn update(&self, table: Table, filters: &[Filter], patch: Row) -> Result<Vec<Row>> {
        self.take_failure(table)?;
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let mut candidate = tables.get(&table).cloned().unwrap_or_default();

        let mut updated = Vec::new();
        for i in 0..candidate.len() {
            if !matches_all(filters, &candidate[i]) {
                continue;
            }
            let mut row = candidate[i].clone();
            for (key, value) in &patch {
                row.insert(key.clone(), value.clone());
            }
            Self::check_unique(table, &candidate, &row, Some(i))?;
            Self::check_foreign_keys(&tables, table, &row)?;
            candidate[i] = row.clone();
            updated.push(row);
        }

        tables.insert(table, candidate);
        Ok(updated)
    }

    fn delete(&self, table: Table, filters: &[Filter]) -> Result<usize> {
        self.take_failure(table)?;
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let rows = tables.entry(table).or_default();

        let (removed, kept): (Vec<Row>, Vec<Row>) =
            rows.drain(..).partition(|r| matches_all(filters, r));
        *rows = kept;

        let removed_ids: Vec<Value> = removed.iter().filter_map(|r| r.get("id").cloned()).collect();
        if !removed_ids.is_empty() {
            for (child, column) in cascades(table) {
                if let Some(children) = tables.get_mut(child) {
                    children.retain(|r| !r.get(*column).is_some_and(|v| removed_ids.contains(v)));
                }
            }
        }

        Ok(removed.len())
    }

    fn upsert(&self, table: Table, row: Row, on_conflict: &[&str]) -> Result<Row> {
        self.take_failure(table)?;
        let stored = {
            let mut tables = self.tables.write().map_err(|_| poisoned())?;
            let rows = tables.entry(table).or_default();
            let existing = rows.iter().position(|r| same_key(on_conflict, r, &row));

            match existing {
                Some(i) => {
                    let mut merged = rows[i].clone();
                    for (key, value) in row {
                        merged.insert(key, value);
                    }
                    Self::check_unique(table, rows, &merged, Some(i))?;
                    rows[i] = merged.clone();
                    return Ok(merged);
                }
                None => {
                    let row = Self::prepare_insert(table, row);
                    Self::check_unique(table, rows, &row, None)?;
                    Self::check_foreign_keys(&tables, table, &row)?;
                    tables.entry(table).or_default().push(row.clone());
                    row
                }
            }
        };
        self.emit(table, ChangeEvent::Insert, &stored);
        Ok(stored)
    }

    fn rpc(&self, function: &str, args: Value) -> Result<Value> {
        let handler = self
            .rpc_handlers
            .read()
            .map_err(|_| poisoned())?
            .get(function)
            .cloned();
        match handler {
            Some(handler) => handler(&args),
            None => Err(BackendError::new(format!(
                "Could not find the function public.{} in the schema cache",
                function
            ))
            .into()),
        }
    }
}

impl AuthProvider for InMemoryBackend {
    fn current_user(&self) -> Result<Option<User>> {
        Ok(self.current_user.read().map_err(|_| poisoned())?.clone())
    }
}

impl ChangeFeed for InMemoryBackend {
    fn subscribe(&self, subscription: ChangeSubscription, callback: ChangeCallback) -> Result<Subscription> {
        let id = self.next_listener_id.fetch_add(1, AtomicOrdering::SeqCst);
        debug!("Registering listener {} on {}", id, subscription.table);
        self.listeners
            .write()
            .map_err(|_| poisoned())?
            .insert(id, (subscription, callback));

        let listeners: Weak<RwLock<Listeners>> = Arc::downgrade(&self.listeners);
        Ok(Subscription::new(move || {
            if let Some(listeners) = listeners.upgrade()
                && let Ok(mut guard) = listeners.write()
            {
                guard.remove(&id);
                debug!("Removed listener {}", id);
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn backend_with_conversation() -> InMemoryBackend {
        let backend = InMemoryBackend::new();
        backend
            .seed(
                Table::Conversations,
                json!({ "id": "c1", "status": "active", "last_message_at": "2024-01-01T00:00:00Z" }),
            )
            .unwrap();
        backend
    }

    #[test]
    fn test_insert_assigns_id_and_created_at() {
        let backend = InMemoryBackend::new();
        let row = backend
            .seed(Table::Tags, json!({ "name": "urgent", "color": "red" }))
            .unwrap();
        assert!(row["id"].is_string());
        assert!(row["created_at"].is_string());
    }

    #[test]
    fn test_message_requires_existing_conversation() {
        let backend = backend_with_conversation();
        let err = backend
            .seed(Table::Messages, json!({ "conversation_id": "nope", "content": "hi" }))
            .unwrap_err();
        assert!(err.to_string().contains("foreign key"));
        assert!(backend.rows(Table::Messages).is_empty());

        backend
            .seed(Table::Messages, json!({ "conversation_id": "c1", "content": "hi" }))
            .unwrap();
        assert_eq!(backend.rows(Table::Messages).len(), 1);
    }

    #[test]
    fn test_conversation_tag_pair_is_unique() {
        let backend = backend_with_conversation();
        backend.seed(Table::Tags, json!({ "id": "t1", "name": "a", "color": "red" })).unwrap();
        backend
            .seed(Table::ConversationTags, json!({ "conversation_id": "c1", "tag_id": "t1" }))
            .unwrap();
        let err = backend
            .seed(Table::ConversationTags, json!({ "conversation_id": "c1", "tag_id": "t1" }))
            .unwrap_err();
        assert!(err.to_string().contains("duplicate key"));
    }

    #[test]
    fn test_delete_tag_cascades_to_join() {
        let backend = backend_with_conversation();
        backend.seed(Table::Tags, json!({ "id": "t1", "name": "a", "color": "red" })).unwrap();
        backend
            .seed(Table::ConversationTags, json!({ "conversation_id": "c1", "tag_id": "t1" }))
            .unwrap();

        let removed = backend.delete(Table::Tags, &[Filter::eq("id", "t1")]).unwrap();
        assert_eq!(removed, 1);
        assert!(backend.rows(Table::ConversationTags).is_empty());
        assert_eq!(backend.rows(Table::Conversations).len(), 1);
    }

    #[test]
    fn test_select_orders_timestamps_as_instants() {
        let backend = InMemoryBackend::new();
        // Lexically "…00.5Z" sorts before "…00Z"; as instants it is later.
        backend
            .seed(Table::Conversations, json!({ "id": "late", "last_message_at": "2024-01-01T00:00:00.5Z" }))
            .unwrap();
        backend
            .seed(Table::Conversations, json!({ "id": "early", "last_message_at": "2024-01-01T00:00:00Z" }))
            .unwrap();

        let rows = backend
            .select(&Query::table(Table::Conversations).order_by("last_message_at", true))
            .unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r["id"].as_str().unwrap().to_string()).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[test]
    fn test_update_merges_patch() {
        let backend = backend_with_conversation();
        let mut patch = Row::new();
        patch.insert("is_starred".to_string(), json!(true));
        let updated = backend
            .update(Table::Conversations, &[Filter::eq("id", "c1")], patch)
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0]["is_starred"], true);
        assert_eq!(updated[0]["status"], "active");
    }

    #[test]
    fn test_upsert_merges_on_conflict() {
        let backend = InMemoryBackend::new();
        backend
            .seed(Table::ChatbotConfigs, json!({ "user_id": "u1", "name": "Bot", "position": "right" }))
            .unwrap();

        let mut row = Row::new();
        row.insert("user_id".to_string(), json!("u1"));
        row.insert("name".to_string(), json!("Helper"));
        let merged = backend.upsert(Table::ChatbotConfigs, row, &["user_id"]).unwrap();

        assert_eq!(merged["name"], "Helper");
        assert_eq!(merged["position"], "right");
        assert_eq!(backend.rows(Table::ChatbotConfigs).len(), 1);
    }

    #[test]
    fn test_fail_next_is_one_shot() {
        let backend = InMemoryBackend::new();
        backend.fail_next(Table::Tags, "permission denied for table tags");
        let err = backend.select(&Query::table(Table::Tags)).unwrap_err();
        assert_eq!(err.to_string(), "permission denied for table tags");
        assert!(backend.select(&Query::table(Table::Tags)).is_ok());
    }

    #[test]
    fn test_change_feed_delivers_matching_inserts() {
        let backend = backend_with_conversation();
        backend
            .seed(Table::Conversations, json!({ "id": "c2", "last_message_at": "2024-01-01T00:00:00Z" }))
            .unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let sub = backend
            .subscribe(
                ChangeSubscription::inserts(Table::Messages)
                    .with_filter(Filter::eq("conversation_id", "c1")),
                Arc::new(move |_row: &Row| {
                    counter.fetch_add(1, AtomicOrdering::SeqCst);
                }),
            )
            .unwrap();
        assert_eq!(backend.active_listener_count(), 1);

        backend.seed(Table::Messages, json!({ "conversation_id": "c1", "content": "a" })).unwrap();
        backend.seed(Table::Messages, json!({ "conversation_id": "c2", "content": "b" })).unwrap();
        assert_eq!(hits.load(AtomicOrdering::SeqCst), 1);

        sub.cancel();
        assert_eq!(backend.active_listener_count(), 0);
        backend.seed(Table::Messages, json!({ "conversation_id": "c1", "content": "c" })).unwrap();
        assert_eq!(hits.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn test_rpc_token_and_unknown_function() {
        let backend = InMemoryBackend::new();
        let token = backend.rpc("generate_chatbot_token", json!({ "user_id": "u1" })).unwrap();
        assert!(token.as_str().unwrap().starts_with("cbt_"));
        assert!(backend.rpc("does_not_exist", json!({})).is_err());
    }
}
