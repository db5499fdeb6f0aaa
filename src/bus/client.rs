//! The device-bus websocket session.
//!
//! # Connection protocol
//! ```text
//! connect ws://host/api/websocket
//!   ◀ {"type": "auth_required"}
//!   ▶ {"type": "auth", "access_token": "..."}
//!   ◀ {"type": "auth_ok"}          (anything else is fatal)
//! spawn receiver task
//! ```
//!
//! # Request/response correlation
//! Every outgoing command carries a monotonically increasing integer `id`.
//! Outstanding requests are held in an `id → oneshot` map; the receiver
//! resolves the sender when a frame with a matching `id` arrives.  Event
//! frames are dispatched to registered subscription callbacks instead.
//!
//! On connection close the session flips to disconnected and all outstanding
//! requests fail with [`BusError::Disconnected`]; reconnection is the
//! caller's responsibility (the agent and orchestrator loops treat it as a
//! transient cycle failure and retry next tick).

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::{
    net::TcpStream,
    sync::{oneshot, Mutex},
};
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{protocol::WebSocketConfig, Message},
    MaybeTlsStream, WebSocketStream,
};
use url::Url;

use async_trait::async_trait;

use crate::error::BusError;

use super::{frames::EntityState, traits::DeviceBus};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Invoked by the receiver for each matching subscription event.
pub type EventCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// State dumps can exceed 10 MiB on large installations.
const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_STATES_TIMEOUT: Duration = Duration::from_secs(60);

struct Subscription {
    /// Entity ids to forward; empty forwards everything.
    entities: Vec<String>,
    callback: EventCallback,
}

struct Shared {
    pending: Mutex<HashMap<u64, oneshot::Sender<Value>>>,
    subscriptions: Mutex<HashMap<u64, Subscription>>,
    connected: AtomicBool,
    next_id: AtomicU64,
}

/// Authenticated bidirectional session with the device bus.
pub struct HaClient {
    sink: Mutex<WsSink>,
    shared: Arc<Shared>,
    request_timeout: Duration,
    states_timeout: Duration,
}

impl HaClient {
    /// Connect with the default timeouts (10 s per request, 60 s for state
    /// dumps).
    pub async fn connect(base_url: &str, access_token: &str) -> Result<Arc<Self>, BusError> {
        Self::connect_with_timeouts(
            base_url,
            access_token,
            DEFAULT_REQUEST_TIMEOUT,
            DEFAULT_STATES_TIMEOUT,
        )
        .await
    }

    /// Connect and authenticate.  Auth rejection is fatal
    /// ([`BusError::AuthFailed`]) and must not be retried.
    pub async fn connect_with_timeouts(
        base_url: &str,
        access_token: &str,
        request_timeout: Duration,
        states_timeout: Duration,
    ) -> Result<Arc<Self>, BusError> {
        let ws_url = derive_ws_url(base_url)?;

        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(MAX_FRAME_BYTES);
        config.max_frame_size = Some(MAX_FRAME_BYTES);

        let (mut stream, _) = connect_async_with_config(ws_url.clone(), Some(config), false).await?;

        // ── Auth handshake ────────────────────────────────────────────────
        let first = read_json_frame(&mut stream).await?;
        if first["type"] != "auth_required" {
            return Err(BusError::Protocol(format!(
                "expected auth_required, got: {first}"
            )));
        }

        stream
            .send(Message::Text(
                json!({"type": "auth", "access_token": access_token}).to_string(),
            ))
            .await?;

        let verdict = read_json_frame(&mut stream).await?;
        if verdict["type"] != "auth_ok" {
            return Err(BusError::AuthFailed(verdict.to_string()));
        }

        let (sink, read) = stream.split();
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
            connected: AtomicBool::new(true),
            next_id: AtomicU64::new(0),
        });

        tokio::spawn(receive_loop(read, Arc::clone(&shared)));

        log::info!("device bus session established at {ws_url}");
        Ok(Arc::new(Self {
            sink: Mutex::new(sink),
            shared,
            request_timeout,
            states_timeout,
        }))
    }

    // ── Correlation plumbing ─────────────────────────────────────────────────

    async fn request(&self, frame: Value, timeout: Duration) -> Result<Value, BusError> {
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.request_with_id(id, frame, timeout).await
    }

    async fn request_with_id(
        &self,
        id: u64,
        mut frame: Value,
        timeout: Duration,
    ) -> Result<Value, BusError> {
        if !self.shared.connected.load(Ordering::SeqCst) {
            return Err(BusError::Disconnected);
        }

        frame["id"] = json!(id);
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().await.insert(id, tx);

        let send_result = {
            let mut sink = self.sink.lock().await;
            sink.send(Message::Text(frame.to_string())).await
        };
        if let Err(e) = send_result {
            self.shared.connected.store(false, Ordering::SeqCst);
            self.shared.pending.lock().await.remove(&id);
            return Err(BusError::Transport(e));
        }

        match tokio::time::timeout(timeout, rx).await {
            Err(_) => {
                self.shared.pending.lock().await.remove(&id);
                Err(BusError::Timeout(timeout.as_secs()))
            }
            // Sender dropped: the receiver exited and drained the map.
            Ok(Err(_)) => Err(BusError::Disconnected),
            Ok(Ok(response)) => {
                if response["success"] == json!(true) {
                    Ok(response.get("result").cloned().unwrap_or(Value::Null))
                } else {
                    let error = response
                        .get("error")
                        .map(Value::to_string)
                        .unwrap_or_else(|| response.to_string());
                    Err(BusError::CommandFailed(error))
                }
            }
        }
    }
}

#[async_trait]
impl DeviceBus for HaClient {
    /// Full state registry (no filter) or a single entity's state.
    async fn get_states(&self, entity_id: Option<&str>) -> Result<Vec<EntityState>, BusError> {
        let result = self
            .request(json!({"type": "get_states"}), self.states_timeout)
            .await?;
        let states: Vec<EntityState> = serde_json::from_value(result)
            .map_err(|e| BusError::Protocol(format!("malformed state dump: {e}")))?;

        match entity_id {
            None => Ok(states),
            Some(id) => states
                .into_iter()
                .find(|s| s.entity_id == id)
                .map(|s| vec![s])
                .ok_or_else(|| BusError::EntityNotFound(id.to_string())),
        }
    }

    /// Capability introspection: `domain → service → schema`.
    async fn get_services(&self) -> Result<Value, BusError> {
        self.request(json!({"type": "get_services"}), self.request_timeout)
            .await
    }

    /// Fire-and-acknowledge service call.  `entity_id` is merged into the
    /// service data.
    async fn call_service(
        &self,
        domain: &str,
        service: &str,
        entity_id: Option<&str>,
        data: Value,
    ) -> Result<Value, BusError> {
        let mut service_data = match data {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                return Err(BusError::Protocol(format!(
                    "service data must be an object, got: {other}"
                )))
            }
        };
        if let Some(id) = entity_id {
            service_data.insert("entity_id".to_string(), Value::String(id.to_string()));
        }

        self.request(
            json!({
                "type": "call_service",
                "domain": domain,
                "service": service,
                "service_data": service_data,
            }),
            self.request_timeout,
        )
        .await
    }

    /// Subscribe to bus events of `event_type`, forwarding matching events to
    /// `callback`.  An empty `entities` filter forwards everything.  Returns
    /// the subscription id.
    async fn subscribe_events(
        &self,
        event_type: &str,
        entities: Vec<String>,
        callback: EventCallback,
    ) -> Result<u64, BusError> {
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst) + 1;

        // Register before awaiting confirmation so no event can race past.
        self.shared
            .subscriptions
            .lock()
            .await
            .insert(id, Subscription { entities, callback });

        let result = self
            .request_with_id(
                id,
                json!({"type": "subscribe_events", "event_type": event_type}),
                self.request_timeout,
            )
            .await;

        if result.is_err() {
            self.shared.subscriptions.lock().await.remove(&id);
        }
        result.map(|_| id)
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Mark the session closed and send a websocket close frame.
    async fn disconnect(&self) {
        self.shared.connected.store(false, Ordering::SeqCst);
        let mut sink = self.sink.lock().await;
        let _ = sink.send(Message::Close(None)).await;
    }
}

/// Demultiplex incoming frames: events to subscriptions, results to pending
/// requests.  Exits on close or read error, failing all outstanding requests.
async fn receive_loop(
    mut read: futures::stream::SplitStream<WsStream>,
    shared: Arc<Shared>,
) {
    while let Some(message) = read.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                log::warn!("device bus read error: {e}");
                break;
            }
        };

        let frame: Value = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("unparseable device bus frame: {e}");
                continue;
            }
        };

        let Some(id) = frame.get("id").and_then(Value::as_u64) else {
            continue;
        };

        if frame["type"] == "event" {
            let subscriptions = shared.subscriptions.lock().await;
            if let Some(subscription) = subscriptions.get(&id) {
                let event = frame.get("event").cloned().unwrap_or(Value::Null);
                let entity = event
                    .pointer("/data/entity_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if subscription.entities.is_empty()
                    || subscription.entities.iter().any(|e| e == entity)
                {
                    (subscription.callback)(event);
                }
            }
            continue;
        }

        if let Some(sender) = shared.pending.lock().await.remove(&id) {
            let _ = sender.send(frame);
        }
    }

    shared.connected.store(false, Ordering::SeqCst);
    // Dropping the senders wakes every outstanding request with Disconnected.
    shared.pending.lock().await.clear();
    log::warn!("device bus connection closed");
}

async fn read_json_frame(stream: &mut WsStream) -> Result<Value, BusError> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                return serde_json::from_str(&text)
                    .map_err(|e| BusError::Protocol(format!("bad frame: {e}")))
            }
            Some(Ok(Message::Close(_))) | None => return Err(BusError::Disconnected),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(BusError::Transport(e)),
        }
    }
}

/// `http(s)://host[:port][/path]` → `ws(s)://host[:port][/path]/api/websocket`.
fn derive_ws_url(base_url: &str) -> Result<String, BusError> {
    let parsed = Url::parse(base_url)
        .map_err(|e| BusError::Protocol(format!("invalid bus url '{base_url}': {e}")))?;
    let scheme = match parsed.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    let host = parsed
        .host_str()
        .ok_or_else(|| BusError::Protocol(format!("bus url has no host: {base_url}")))?;
    let port = parsed.port().map(|p| format!(":{p}")).unwrap_or_default();
    let path = parsed.path().trim_end_matches('/');
    Ok(format!("{scheme}://{host}{port}{path}/api/websocket"))
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::traits::DeviceBus;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    #[test]
    fn ws_url_derivation() {
        assert_eq!(
            derive_ws_url("http://hass.local:8123").unwrap(),
            "ws://hass.local:8123/api/websocket"
        );
        assert_eq!(
            derive_ws_url("https://home.example/").unwrap(),
            "wss://home.example/api/websocket"
        );
        assert_eq!(
            derive_ws_url("http://10.0.0.2:8123/ingress").unwrap(),
            "ws://10.0.0.2:8123/ingress/api/websocket"
        );
        assert!(derive_ws_url("not a url").is_err());
    }

    /// Minimal bus peer: performs the auth handshake, then answers
    /// `get_states` and `call_service` with canned results.
    async fn spawn_mock_bus(expected_token: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            ws.send(Message::Text(json!({"type": "auth_required"}).to_string()))
                .await
                .unwrap();

            let auth: Value = match ws.next().await {
                Some(Ok(Message::Text(text))) => serde_json::from_str(&text).unwrap(),
                other => panic!("expected auth frame, got {other:?}"),
            };
            if auth["access_token"] != expected_token {
                ws.send(Message::Text(json!({"type": "auth_invalid"}).to_string()))
                    .await
                    .unwrap();
                return;
            }
            ws.send(Message::Text(json!({"type": "auth_ok"}).to_string()))
                .await
                .unwrap();

            while let Some(Ok(Message::Text(text))) = ws.next().await {
                let frame: Value = serde_json::from_str(&text).unwrap();
                let id = frame["id"].clone();
                let response = match frame["type"].as_str() {
                    Some("get_states") => json!({
                        "id": id, "type": "result", "success": true,
                        "result": [
                            {"entity_id": "light.kitchen", "state": "on", "attributes": {}},
                            {"entity_id": "climate.bedroom", "state": "heat",
                             "attributes": {"temperature": 21.0, "current_temperature": 19.0}},
                        ]
                    }),
                    Some("call_service") => json!({
                        "id": id, "type": "result", "success": true, "result": {}
                    }),
                    Some("slow_op") => continue, // never answered
                    _ => json!({
                        "id": id, "type": "result", "success": false,
                        "error": {"code": "unknown_command"}
                    }),
                };
                ws.send(Message::Text(response.to_string())).await.unwrap();
            }
        });

        port
    }

    #[tokio::test]
    async fn handshake_and_state_fetch() {
        let port = spawn_mock_bus("token-123").await;
        let client = HaClient::connect(&format!("http://127.0.0.1:{port}"), "token-123")
            .await
            .unwrap();

        assert!(client.is_connected());

        let states = client.get_states(None).await.unwrap();
        assert_eq!(states.len(), 2);

        let climate = client.climate_state("climate.bedroom").await.unwrap();
        assert_eq!(climate.target_temperature, Some(21.0));
        assert_eq!(climate.current_temperature, Some(19.0));
    }

    #[tokio::test]
    async fn single_entity_lookup_and_missing_entity() {
        let port = spawn_mock_bus("token-123").await;
        let client = HaClient::connect(&format!("http://127.0.0.1:{port}"), "token-123")
            .await
            .unwrap();

        let state = client.get_state("light.kitchen").await.unwrap();
        assert_eq!(state.state, "on");

        let missing = client.get_state("light.garage").await;
        assert!(matches!(missing, Err(BusError::EntityNotFound(_))));
    }

    #[tokio::test]
    async fn bad_token_is_fatal_auth_error() {
        let port = spawn_mock_bus("token-123").await;
        let result = HaClient::connect(&format!("http://127.0.0.1:{port}"), "wrong").await;
        assert!(matches!(result, Err(BusError::AuthFailed(_))));
    }

    #[tokio::test]
    async fn call_service_acknowledged() {
        let port = spawn_mock_bus("token-123").await;
        let client = HaClient::connect(&format!("http://127.0.0.1:{port}"), "token-123")
            .await
            .unwrap();

        let result = client
            .call_service(
                "light",
                "turn_on",
                Some("light.kitchen"),
                json!({"brightness_pct": 50}),
            )
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn unknown_command_surfaces_failure() {
        let port = spawn_mock_bus("token-123").await;
        let client = HaClient::connect(&format!("http://127.0.0.1:{port}"), "token-123")
            .await
            .unwrap();

        let result = client
            .request(json!({"type": "bogus_command"}), Duration::from_secs(2))
            .await;
        assert!(matches!(result, Err(BusError::CommandFailed(_))));
    }

    #[tokio::test]
    async fn unanswered_request_times_out_and_cleans_up() {
        let port = spawn_mock_bus("token-123").await;
        let client = HaClient::connect(&format!("http://127.0.0.1:{port}"), "token-123")
            .await
            .unwrap();

        let result = client
            .request(json!({"type": "slow_op"}), Duration::from_millis(200))
            .await;
        assert!(matches!(result, Err(BusError::Timeout(_))));
        assert!(client.shared.pending.lock().await.is_empty());
    }
}
