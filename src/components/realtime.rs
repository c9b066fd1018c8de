use std::{future::Future, time::Duration};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{interval_at, Instant},
};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use super::{backend::Filter, configuration::Config, health::Healthy};
use crate::domain::error::CommonError;

const PROTOCOL_VERSION: &str = "1.0.0";
const PHOENIX_TOPIC: &str = "phoenix";
const JOIN_EVENT: &str = "phx_join";
const LEAVE_EVENT: &str = "phx_leave";
const HEARTBEAT_EVENT: &str = "heartbeat";
const CHANGES_EVENT: &str = "postgres_changes";
const SCHEMA: &str = "public";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match *self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }
}

/// A table change delivered by the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct TableChange {
    pub table: String,
    pub kind: ChangeKind,
    pub record: Value,
    pub old_record: Value,
}

impl TableChange {
    /// The row the change is about: the new version, or the old one for deletes.
    pub fn row(&self) -> &Value {
        let is_empty = match &self.record {
            Value::Null => true,
            Value::Object(fields) => fields.is_empty(),
            _ => false,
        };
        if is_empty {
            &self.old_record
        } else {
            &self.record
        }
    }

    pub fn field(&self, column: &str) -> Option<&str> {
        self.row().get(column).and_then(Value::as_str)
    }
}

/// Which changes a subscription wants: one table, one `column = value` condition,
/// and a set of change kinds (empty means all of them).
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeFilter {
    pub table: String,
    pub column: String,
    pub value: String,
    pub events: Vec<ChangeKind>,
}

impl ChangeFilter {
    pub fn new(table: &str, column: &str, value: &str) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            value: value.to_string(),
            events: vec![],
        }
    }

    pub fn on(mut self, kind: ChangeKind) -> Self {
        if !self.events.contains(&kind) {
            self.events.push(kind);
        }
        self
    }

    pub fn topic(&self) -> String {
        format!("realtime:{}:{}", self.table, self.postgres_filter())
    }

    fn postgres_filter(&self) -> String {
        format!("{}=eq.{}", self.column, self.value)
    }

    pub fn accepts(&self, change: &TableChange) -> bool {
        if change.table != self.table
            || !(self.events.is_empty() || self.events.contains(&change.kind))
        {
            return false;
        }

        let row = change.row();
        // Deletes without a full replica identity only carry the key; the channel filter
        // already ran on the server
        if change.kind == ChangeKind::Delete && row.get(&self.column).is_none() {
            return true;
        }
        Filter::eq(&self.column, self.value.as_str()).matches(row)
    }

    fn join_payload(&self, access_token: Option<&str>) -> Value {
        let changes: Vec<Value> = if self.events.len() == 1 {
            vec![self.change_config(self.events[0].as_str())]
        } else {
            // The server takes one event type or "*" per entry
            vec![self.change_config("*")]
        };

        let mut payload = json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": changes,
            }
        });
        if let Some(token) = access_token {
            payload["access_token"] = Value::String(token.to_string());
        }
        payload
    }

    fn change_config(&self, event: &str) -> Value {
        json!({
            "event": event,
            "schema": SCHEMA,
            "table": self.table,
            "filter": self.postgres_filter(),
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct ChannelMessage {
    topic: String,
    event: String,
    payload: Value,
    #[serde(rename = "ref")]
    reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    join_ref: Option<String>,
}

impl ChannelMessage {
    fn new(topic: &str, event: &str, payload: Value, reference: u64) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            reference: Some(reference.to_string()),
            join_ref: None,
        }
    }

    fn to_frame(&self) -> Result<WsMessage, serde_json::Error> {
        serde_json::to_string(self).map(WsMessage::Text)
    }
}

#[derive(Deserialize, Debug)]
struct ChangesPayload {
    data: ChangeData,
}

#[derive(Deserialize, Debug)]
struct ChangeData {
    table: String,
    #[serde(rename = "type")]
    kind: ChangeKind,
    #[serde(default)]
    record: Value,
    #[serde(default)]
    old_record: Value,
}

/// Decodes a text frame. Frames that aren't table changes (replies, heartbeats, presence)
/// decode to `None`.
pub fn decode_change(frame: &str) -> Result<Option<TableChange>, serde_json::Error> {
    let message: ChannelMessage = serde_json::from_str(frame)?;
    if message.event != CHANGES_EVENT {
        return Ok(None);
    }

    let payload: ChangesPayload = serde_json::from_value(message.payload)?;
    Ok(Some(TableChange {
        table: payload.data.table,
        kind: payload.data.kind,
        record: payload.data.record,
        old_record: payload.data.old_record,
    }))
}

/// A live change subscription. Cancelling it, or dropping it, stops delivery.
pub struct Subscription {
    topic: String,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Subscription {
    /// Runs `worker` until it returns or the subscription is cancelled; the worker is
    /// expected to finish once the given receiver resolves.
    pub fn spawn<F, W>(topic: String, worker: W) -> Self
    where
        W: FnOnce(oneshot::Receiver<()>) -> F,
        F: Future<Output = ()> + Send + 'static,
    {
        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(worker(stopped));
        Self {
            topic,
            stop: Some(stop),
            task: Some(task),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().map_or(false, |task| !task.is_finished())
    }

    /// Stops delivery and waits for the worker to wind down.
    pub async fn cancel(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                log::error!("Subscription {} > Worker failed: {err}", self.topic);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Starts delivering changes accepted by `filter` into `sink`.
    async fn subscribe(
        &self,
        filter: ChangeFilter,
        sink: mpsc::Sender<TableChange>,
    ) -> Result<Subscription, CommonError>;
}

#[derive(Clone)]
pub struct RealtimeComponent {
    url: String,
    anon_key: String,
    access_token: Option<String>,
    heartbeat_every: Duration,
}

impl std::fmt::Debug for RealtimeComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeComponent")
            .field("url", &self.url)
            .field("heartbeat_every", &self.heartbeat_every)
            .finish()
    }
}

impl RealtimeComponent {
    pub fn new(config: &Config, access_token: Option<&str>) -> Self {
        Self {
            url: config.realtime_url(),
            anon_key: config.backend.anon_key.clone(),
            access_token: access_token.map(str::to_string),
            heartbeat_every: Duration::from_secs(config.realtime.heartbeat_interval_seconds.max(1)),
        }
    }

    fn socket_url(&self) -> String {
        format!(
            "{}?apikey={}&vsn={}",
            self.url, self.anon_key, PROTOCOL_VERSION
        )
    }
}

#[async_trait]
impl ChangeFeed for RealtimeComponent {
    #[tracing::instrument(name = "Subscribe to table changes", skip(self, sink))]
    async fn subscribe(
        &self,
        filter: ChangeFilter,
        sink: mpsc::Sender<TableChange>,
    ) -> Result<Subscription, CommonError> {
        let topic = filter.topic();

        let (socket, _) = connect_async(self.socket_url()).await.map_err(|err| {
            log::error!("Realtime > Subscribe {topic} > Couldn't connect: {err}");
            CommonError::Unknown("Couldn't connect to realtime updates".to_owned())
        })?;
        let (mut write, mut read) = socket.split();

        let mut join = ChannelMessage::new(
            &topic,
            JOIN_EVENT,
            filter.join_payload(self.access_token.as_deref()),
            1,
        );
        join.join_ref = Some(crate::generate_uuid_v4());
        let join_frame = join.to_frame().map_err(|err| {
            log::error!("Realtime > Subscribe {topic} > Couldn't encode join: {err}");
            CommonError::Unknown("Couldn't subscribe to realtime updates".to_owned())
        })?;
        write.send(join_frame).await.map_err(|err| {
            log::error!("Realtime > Subscribe {topic} > Couldn't send join: {err}");
            CommonError::Unknown("Couldn't subscribe to realtime updates".to_owned())
        })?;

        log::debug!("Subscribed to {topic}");

        let heartbeat_every = self.heartbeat_every;
        let worker_topic = topic.clone();
        Ok(Subscription::spawn(topic, move |mut stopped| async move {
            let topic = worker_topic;
            let mut heartbeat = interval_at(Instant::now() + heartbeat_every, heartbeat_every);
            let mut reference: u64 = 1;

            loop {
                tokio::select! {
                    _ = &mut stopped => {
                        reference += 1;
                        let leave = ChannelMessage::new(&topic, LEAVE_EVENT, json!({}), reference);
                        if let Ok(frame) = leave.to_frame() {
                            let _ = write.send(frame).await;
                        }
                        let _ = write.close().await;
                        log::debug!("Realtime > {topic} > Left channel");
                        break;
                    }
                    _ = heartbeat.tick() => {
                        reference += 1;
                        let beat = ChannelMessage::new(PHOENIX_TOPIC, HEARTBEAT_EVENT, json!({}), reference);
                        let sent = match beat.to_frame() {
                            Ok(frame) => write.send(frame).await.is_ok(),
                            Err(_) => false,
                        };
                        if !sent {
                            log::warn!("Realtime > {topic} > Heartbeat failed, closing subscription");
                            break;
                        }
                    }
                    frame = read.next() => match frame {
                        Some(Ok(WsMessage::Text(text))) => match decode_change(&text) {
                            Ok(Some(change)) if filter.accepts(&change) => {
                                if sink.send(change).await.is_err() {
                                    log::debug!("Realtime > {topic} > Receiver dropped");
                                    break;
                                }
                            }
                            Ok(_) => {}
                            Err(err) => log::error!("Realtime > {topic} > Couldn't decode frame: {err}"),
                        },
                        Some(Ok(WsMessage::Close(_))) | None => {
                            log::warn!("Realtime > {topic} > Socket closed by the server");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            log::error!("Realtime > {topic} > Socket error: {err}");
                            break;
                        }
                    }
                }
            }
        }))
    }
}

#[async_trait]
impl Healthy for RealtimeComponent {
    async fn is_healthy(&self) -> bool {
        match connect_async(self.socket_url()).await {
            Ok((mut socket, _)) => {
                let _ = socket.close(None).await;
                true
            }
            Err(err) => {
                log::debug!("Realtime health check failed: {err}");
                false
            }
        }
    }
}
