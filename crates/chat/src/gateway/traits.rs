//! Gateway trait definitions
//!
//! The hosted backend is reached through three narrow contracts: row
//! reads/writes, current-user lookup, and change-event subscriptions.

use anyhow::Result;
use chrono::DateTime;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::models::User;

/// A backend row: a JSON object keyed by column name
pub type Row = Map<String, Value>;

/// Backend tables used by the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Conversations,
    Messages,
    Tags,
    ConversationTags,
    ChatbotConfigs,
    DomainVerifications,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Conversations => "conversations",
            Table::Messages => "messages",
            Table::Tags => "tags",
            Table::ConversationTags => "conversation_tags",
            Table::ChatbotConfigs => "chatbot_configs",
            Table::DomainVerifications => "domain_verifications",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row predicate on a single column
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    In(String, Vec<Value>),
    /// Strictly greater than; RFC 3339 strings compare as instants
    Gt(String, Value),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(column.into(), value.into())
    }

    pub fn is_in<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In(column.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Gt(column.into(), value.into())
    }

    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(column, _) | Filter::In(column, _) | Filter::Gt(column, _) => column,
        }
    }

    /// Evaluate the predicate against a row. A missing column never matches.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Filter::Eq(column, value) => row.get(column) == Some(value),
            Filter::In(column, values) => row.get(column).is_some_and(|v| values.contains(v)),
            Filter::Gt(column, value) => row
                .get(column)
                .is_some_and(|v| compare_values(v, value) == Ordering::Greater),
        }
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over column values. RFC 3339 strings compare as instants.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::String(a), Value::String(b)) => {
            match (
                DateTime::parse_from_rfc3339(a),
                DateTime::parse_from_rfc3339(b),
            ) {
                (Ok(a), Ok(b)) => a.cmp(&b),
                _ => a.cmp(b),
            }
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Sort key for a select
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// A select against one table
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: Table,
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn table(table: Table) -> Self {
        Self {
            table,
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::eq(column, value))
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order.push(Order {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Trait for row reads and writes against the hosted backend
///
/// Every method returns either the affected rows or an error; callers treat
/// any error as fatal to the action that issued it.
pub trait RowGateway: Send + Sync {
    /// Select rows matching all filters, in the requested order
    fn select(&self, query: &Query) -> Result<Vec<Row>>;

    /// Insert a row and return it as stored (with generated columns)
    fn insert(&self, table: Table, row: Row) -> Result<Row>;

    /// Merge `patch` into every row matching all filters; returns the updated rows
    fn update(&self, table: Table, filters: &[Filter], patch: Row) -> Result<Vec<Row>>;

    /// Delete every row matching all filters; returns the number removed
    fn delete(&self, table: Table, filters: &[Filter]) -> Result<usize>;

    /// Insert, or merge into the row that shares the `on_conflict` columns
    fn upsert(&self, table: Table, row: Row, on_conflict: &[&str]) -> Result<Row>;

    /// Call a named server-side function
    fn rpc(&self, function: &str, args: Value) -> Result<Value>;
}

/// Trait for looking up the signed-in user
pub trait AuthProvider: Send + Sync {
    /// The authenticated identity, or `None` when signed out
    fn current_user(&self) -> Result<Option<User>>;
}

/// Kind of row change a listener is interested in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeEvent {
    Insert,
}

/// What a change listener is scoped to
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSubscription {
    pub table: Table,
    pub event: ChangeEvent,
    pub filter: Option<Filter>,
}

impl ChangeSubscription {
    pub fn inserts(table: Table) -> Self {
        Self {
            table,
            event: ChangeEvent::Insert,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn matches(&self, table: Table, event: ChangeEvent, row: &Row) -> bool {
        self.table == table
            && self.event == event
            && self.filter.as_ref().is_none_or(|f| f.matches(row))
    }
}

/// Callback invoked with the new row for each matching change
pub type ChangeCallback = Arc<dyn Fn(&Row) + Send + Sync>;

/// Trait for real-time change delivery
pub trait ChangeFeed: Send + Sync {
    /// Register a listener; it stays active until the returned handle is cancelled or dropped
    fn subscribe(&self, subscription: ChangeSubscription, callback: ChangeCallback) -> Result<Subscription>;
}

/// Handle to an active registration
///
/// Cancellation is synchronous and idempotent. Dropping the handle cancels it.
pub struct Subscription {
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    /// Deregister. Later calls do nothing.
    pub fn cancel(&self) {
        let cancel = match self.cancel.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        self.cancel.lock().map(|g| g.is_some()).unwrap_or(false)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_filter_matches() {
        let r = row(json!({ "conversation_id": "c1", "sender_type": "user" }));
        assert!(Filter::eq("conversation_id", "c1").matches(&r));
        assert!(!Filter::eq("conversation_id", "c2").matches(&r));
        assert!(!Filter::eq("missing", "c1").matches(&r));
        assert!(Filter::is_in("sender_type", ["bot", "user"]).matches(&r));
        assert!(!Filter::is_in("sender_type", Vec::<String>::new()).matches(&r));
    }

    #[test]
    fn test_filter_gt_compares_timestamps_as_instants() {
        let r = row(json!({ "created_at": "2024-01-01T10:00:00.500+00:00" }));
        assert!(Filter::gt("created_at", "2024-01-01T10:00:00Z").matches(&r));
        // 11:00+01:00 is 10:00Z
        assert!(Filter::gt("created_at", "2024-01-01T11:00:00+01:00").matches(&r));
        assert!(!Filter::gt("created_at", "2024-01-01T10:00:00.500Z").matches(&r));
        assert!(!Filter::gt("created_at", "2024-01-01T12:00:00+01:00").matches(&r));
        assert!(!Filter::gt("missing", "2024-01-01T10:00:00Z").matches(&r));
    }

    #[test]
    fn test_change_subscription_matches() {
        let sub = ChangeSubscription::inserts(Table::Messages)
            .with_filter(Filter::eq("conversation_id", "c1"));
        let r = row(json!({ "conversation_id": "c1" }));
        assert!(sub.matches(Table::Messages, ChangeEvent::Insert, &r));
        assert!(!sub.matches(Table::Conversations, ChangeEvent::Insert, &r));
        assert!(!sub.matches(
            Table::Messages,
            ChangeEvent::Insert,
            &row(json!({ "conversation_id": "c2" }))
        ));
    }

    #[test]
    fn test_subscription_cancel_is_idempotent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let sub = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(sub.is_active());
        sub.cancel();
        sub.cancel();
        assert!(!sub.is_active());
        drop(sub);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscription_drop_cancels() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        drop(Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
