#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use voice_social::{
    components::{
        backend::{Backend, BackendError, Filter, OrderDirection, RowQuery},
        configuration::MatchingConfig,
        notifier::{ChannelNotifier, Notice},
        realtime::{ChangeFeed, ChangeFilter, ChangeKind, Subscription, TableChange},
        session::AuthContext,
    },
    domain::error::CommonError,
    SocialContext,
};

pub const ME: &str = "me";

/// Failure to inject into the next writes whose fields match every filter.
#[derive(Debug, Clone)]
struct InjectedFailure {
    table: String,
    filters: Vec<Filter>,
}

fn matches_all(filters: &[Filter], row: &Value) -> bool {
    filters.iter().all(|filter| filter.matches(row))
}

fn injected_error(table: &str) -> BackendError {
    BackendError::Http {
        status: 500,
        message: format!("injected failure on {table}"),
    }
}

fn sort_key(row: &Value, column: &str) -> String {
    match row.get(column) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Tables kept in memory with the same filter semantics as the REST backend.
/// `friends` rows are unique per `(user_id, friend_id)`.
#[derive(Default)]
pub struct InMemoryBackend {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    procedures: Mutex<HashMap<String, Value>>,
    queries: Mutex<HashMap<String, usize>>,
    failing_inserts: Mutex<Vec<InjectedFailure>>,
    failing_updates: Mutex<Vec<InjectedFailure>>,
    failing_deletes: Mutex<Vec<String>>,
    failing_queries: Mutex<Vec<String>>,
    next_id: AtomicU64,
}

impl InMemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed(&self, table: &str, row: Value) {
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn rows_where(&self, table: &str, filters: &[Filter]) -> Vec<Value> {
        self.rows(table)
            .into_iter()
            .filter(|row| matches_all(filters, row))
            .collect()
    }

    pub fn query_count(&self, table: &str) -> usize {
        self.queries
            .lock()
            .unwrap()
            .get(table)
            .copied()
            .unwrap_or_default()
    }

    pub fn set_procedure_response(&self, name: &str, response: Value) {
        self.procedures
            .lock()
            .unwrap()
            .insert(name.to_string(), response);
    }

    pub fn fail_inserts_matching(&self, table: &str, filters: Vec<Filter>) {
        self.failing_inserts.lock().unwrap().push(InjectedFailure {
            table: table.to_string(),
            filters,
        });
    }

    pub fn fail_updates_matching(&self, table: &str, filters: Vec<Filter>) {
        self.failing_updates.lock().unwrap().push(InjectedFailure {
            table: table.to_string(),
            filters,
        });
    }

    pub fn fail_deletes(&self, table: &str) {
        self.failing_deletes.lock().unwrap().push(table.to_string());
    }

    pub fn fail_queries(&self, table: &str) {
        self.failing_queries.lock().unwrap().push(table.to_string());
    }

    fn should_fail(failures: &Mutex<Vec<InjectedFailure>>, table: &str, fields: &Value) -> bool {
        failures
            .lock()
            .unwrap()
            .iter()
            .any(|failure| failure.table == table && matches_all(&failure.filters, fields))
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn query_rows(&self, table: &str, query: &RowQuery) -> Result<Vec<Value>, BackendError> {
        *self
            .queries
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default() += 1;
        if self.failing_queries.lock().unwrap().iter().any(|t| t == table) {
            return Err(injected_error(table));
        }

        let mut rows = self.rows_where(table, &query.filters);
        if let Some(order) = &query.order {
            rows.sort_by_key(|row| sort_key(row, &order.column));
            if order.direction == OrderDirection::Descending {
                rows.reverse();
            }
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert_row(&self, table: &str, fields: Value) -> Result<Value, BackendError> {
        if Self::should_fail(&self.failing_inserts, table, &fields) {
            return Err(injected_error(table));
        }

        let mut row = fields;
        if row.get("id").is_none() {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            row["id"] = json!(format!("{table}-{id}"));
        }
        if row.get("created_at").is_none() {
            row["created_at"] = json!(Utc::now().to_rfc3339());
        }

        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table.to_string()).or_default();
        if table == "friends" {
            let pair = [
                Filter::eq("user_id", row["user_id"].clone()),
                Filter::eq("friend_id", row["friend_id"].clone()),
            ];
            if rows.iter().any(|existing| matches_all(&pair, existing)) {
                return Err(BackendError::Duplicate(
                    "duplicate key value violates unique constraint".to_string(),
                ));
            }
        }
        rows.push(row.clone());
        Ok(row)
    }

    async fn update_rows(
        &self,
        table: &str,
        filters: &[Filter],
        fields: Value,
    ) -> Result<Vec<Value>, BackendError> {
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table.to_string()).or_default();

        let failing = self.failing_updates.lock().unwrap();
        let mut updated = Vec::new();
        for row in rows.iter_mut().filter(|row| matches_all(filters, row)) {
            let mut candidate = row.clone();
            if let (Some(target), Some(changes)) = (candidate.as_object_mut(), fields.as_object()) {
                for (column, value) in changes {
                    target.insert(column.clone(), value.clone());
                }
            }
            if failing
                .iter()
                .any(|failure| failure.table == table && matches_all(&failure.filters, &candidate))
            {
                return Err(injected_error(table));
            }
            *row = candidate.clone();
            updated.push(candidate);
        }
        Ok(updated)
    }

    async fn delete_rows(&self, table: &str, filters: &[Filter]) -> Result<(), BackendError> {
        if self.failing_deletes.lock().unwrap().iter().any(|t| t == table) {
            return Err(injected_error(table));
        }

        if let Some(rows) = self.tables.lock().unwrap().get_mut(table) {
            rows.retain(|row| !matches_all(filters, row));
        }
        Ok(())
    }

    async fn call_procedure(&self, name: &str, _args: Value) -> Result<Value, BackendError> {
        *self
            .queries
            .lock()
            .unwrap()
            .entry(format!("rpc/{name}"))
            .or_default() += 1;

        self.procedures
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| BackendError::Http {
                status: 404,
                message: format!("no procedure {name}"),
            })
    }
}

struct FakeSubscriber {
    filter: ChangeFilter,
    sink: mpsc::Sender<TableChange>,
    active: Arc<AtomicBool>,
}

/// A change feed driven by the test through `emit`.
#[derive(Default)]
pub struct FakeChangeFeed {
    subscribers: Mutex<Vec<FakeSubscriber>>,
}

impl FakeChangeFeed {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Delivers `change` to every active subscription whose filter accepts it.
    pub async fn emit(&self, change: TableChange) {
        let sinks: Vec<_> = self
            .subscribers
            .lock()
            .unwrap()
            .iter()
            .filter(|subscriber| {
                subscriber.active.load(Ordering::SeqCst) && subscriber.filter.accepts(&change)
            })
            .map(|subscriber| subscriber.sink.clone())
            .collect();

        for sink in sinks {
            sink.send(change.clone()).await.unwrap();
        }
    }

    pub fn active_topics(&self) -> Vec<String> {
        self.subscribers
            .lock()
            .unwrap()
            .iter()
            .filter(|subscriber| subscriber.active.load(Ordering::SeqCst))
            .map(|subscriber| subscriber.filter.topic())
            .collect()
    }
}

#[async_trait]
impl ChangeFeed for FakeChangeFeed {
    async fn subscribe(
        &self,
        filter: ChangeFilter,
        sink: mpsc::Sender<TableChange>,
    ) -> Result<Subscription, CommonError> {
        let active = Arc::new(AtomicBool::new(true));
        let topic = filter.topic();
        self.subscribers.lock().unwrap().push(FakeSubscriber {
            filter,
            sink,
            active: active.clone(),
        });

        Ok(Subscription::spawn(topic, move |stopped| async move {
            let _ = stopped.await;
            active.store(false, Ordering::SeqCst);
        }))
    }
}

pub fn matching_config() -> MatchingConfig {
    MatchingConfig {
        procedure: "match_random_user".to_string(),
        status_table: "matchmaking".to_string(),
        poll_interval_ms: 3000,
        max_attempts: 10,
    }
}

/// A context signed in as `ME` whose alerts land in the returned receiver.
pub fn social_context(
    backend: Arc<InMemoryBackend>,
) -> (Arc<SocialContext>, mpsc::UnboundedReceiver<Notice>) {
    let (sender, notices) = mpsc::unbounded_channel();
    let ctx = SocialContext::new(
        AuthContext {
            user_id: ME.to_string(),
            access_token: "token".to_string(),
        },
        backend,
        Arc::new(ChannelNotifier::new(sender)),
        matching_config(),
    );
    (Arc::new(ctx), notices)
}

pub fn user(id: &str, username: &str) -> Value {
    json!({ "id": id, "username": username })
}

pub fn friendship(user_id: &str, friend_id: &str) -> Value {
    json!({
        "id": format!("f-{user_id}-{friend_id}"),
        "user_id": user_id,
        "friend_id": friend_id,
        "nickname": null,
        "created_at": "2023-01-10T10:00:00Z",
    })
}

pub fn friend_request(id: &str, from: &str, to: &str, status: &str) -> Value {
    json!({
        "id": id,
        "from_user_id": from,
        "to_user_id": to,
        "status": status,
        "created_at": "2023-01-10T10:00:00Z",
        "responded_at": null,
    })
}

pub fn voice_message(id: &str, from: &str, to: &str, created_at: &str) -> Value {
    json!({
        "id": id,
        "sender_id": from,
        "recipient_id": to,
        "content": null,
        "media_url": format!("voice/{id}.m4a"),
        "created_at": created_at,
        "listened_at": null,
        "play_count": 0,
        "expiry_type": "view",
        "expiry_value": null,
    })
}

pub fn change(table: &str, kind: ChangeKind, record: Value, old_record: Value) -> TableChange {
    TableChange {
        table: table.to_string(),
        kind,
        record,
        old_record,
    }
}
