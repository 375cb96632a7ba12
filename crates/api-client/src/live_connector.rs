use crate::error::ApiError;
use crate::requests::PingRequest;
use crate::responses::decode;
use configuration::DerivConfig;
use futures_util::future::join_all;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::ORIGIN;
use url::Url;

const DEFAULT_LANGUAGE: &str = "en";

/// Deriv drops idle connections after two minutes.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// How long `close` waits for the connection tasks before aborting them.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Where incoming messages go, keyed by the `req_id` they echo.
#[derive(Default)]
struct RouteTable {
    closed: bool,
    /// One-shot requests waiting for their single response.
    pending: HashMap<u64, oneshot::Sender<Value>>,
    /// Subscriptions receiving every message tagged with their `req_id`.
    streams: HashMap<u64, mpsc::UnboundedSender<Value>>,
}

#[derive(Default)]
struct Routes {
    table: Mutex<RouteTable>,
}

impl Routes {
    async fn dispatch(&self, text: &str) {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to parse message from Deriv.");
                return;
            }
        };
        let Some(req_id) = value.get("req_id").and_then(Value::as_u64) else {
            tracing::trace!(msg_type = ?value.get("msg_type"), "Dropping message without req_id.");
            return;
        };

        let mut guard = self.table.lock().await;
        let table = &mut *guard;
        if let Some(stream) = table.streams.get(&req_id) {
            if stream.send(value).is_err() {
                table.streams.remove(&req_id);
            }
            return;
        }
        match table.pending.remove(&req_id) {
            Some(waiter) => {
                let _ = waiter.send(value);
            }
            None => tracing::debug!(req_id, "Dropping response nobody is waiting for."),
        }
    }

    /// Fails every outstanding request and ends every subscription.
    async fn shutdown(&self) {
        let mut table = self.table.lock().await;
        table.closed = true;
        table.pending.clear();
        table.streams.clear();
    }
}

/// The updates of one subscription, in arrival order.
pub struct Subscription {
    pub req_id: u64,
    pub updates: mpsc::UnboundedReceiver<Value>,
}

/// Owns the WebSocket connection to Deriv and multiplexes requests over it.
///
/// A writer task drains the outgoing queue and keeps the connection alive; a
/// reader task routes every incoming message to the request or subscription
/// that carries the same `req_id`.
pub struct LiveConnector {
    outgoing: mpsc::UnboundedSender<Message>,
    routes: Arc<Routes>,
    next_req_id: AtomicU64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl LiveConnector {
    /// Opens the connection described by `config`.
    pub async fn connect(config: &DerivConfig) -> Result<Self, ApiError> {
        let mut url = Url::parse(&config.endpoint)?;
        url.query_pairs_mut()
            .append_pair("app_id", &config.app_id.to_string())
            .append_pair("l", DEFAULT_LANGUAGE);

        let mut request = url.as_str().into_client_request()?;
        if !config.origin.is_empty() {
            let origin = HeaderValue::from_str(&config.origin)
                .map_err(|e| ApiError::InvalidData(format!("Invalid origin header: {e}")))?;
            request.headers_mut().insert(ORIGIN, origin);
        }

        tracing::info!(endpoint = %config.endpoint, app_id = config.app_id, "Connecting to Deriv...");
        let (stream, _) = connect_async(request).await?;
        tracing::info!("Deriv connection established.");

        let (mut sink, mut source) = stream.split();
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
        let routes = Arc::new(Routes::default());

        let keepalive_text = serde_json::to_string(&PingRequest { ping: 1 })?;
        let writer = tokio::spawn(async move {
            let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
            keepalive.tick().await;
            loop {
                tokio::select! {
                    message = outgoing_rx.recv() => {
                        let Some(message) = message else { break };
                        let closing = matches!(message, Message::Close(_));
                        if let Err(e) = sink.send(message).await {
                            tracing::error!(error = %e, "Failed to write to the Deriv connection.");
                            break;
                        }
                        if closing {
                            break;
                        }
                    }
                    _ = keepalive.tick() => {
                        if let Err(e) = sink.send(Message::Text(keepalive_text.clone())).await {
                            tracing::error!(error = %e, "Failed to send keep-alive ping.");
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Deriv writer stopped.");
        });

        let reader_routes = Arc::clone(&routes);
        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => reader_routes.dispatch(&text).await,
                    Ok(Message::Close(frame)) => {
                        tracing::info!(?frame, "Deriv connection closed.");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "Deriv connection failed.");
                        break;
                    }
                }
            }
            reader_routes.shutdown().await;
            tracing::debug!("Deriv reader stopped.");
        });

        Ok(Self {
            outgoing,
            routes,
            next_req_id: AtomicU64::new(1),
            tasks: Mutex::new(vec![writer, reader]),
        })
    }

    /// Sends a request and waits for its single response.
    pub async fn request<Req, Resp>(&self, payload: &Req) -> Result<Resp, ApiError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let req_id = self.next_req_id.fetch_add(1, Ordering::Relaxed);
        let text = encode_request(payload, req_id)?;
        let (waiter, response) = oneshot::channel();
        {
            let mut table = self.routes.table.lock().await;
            if table.closed {
                return Err(ApiError::Disconnected);
            }
            table.pending.insert(req_id, waiter);
        }

        if self.outgoing.send(Message::Text(text)).is_err() {
            self.routes.table.lock().await.pending.remove(&req_id);
            return Err(ApiError::Disconnected);
        }

        let value = response.await.map_err(|_| ApiError::Disconnected)?;
        decode(value)
    }

    /// Sends a subscribing request. Every message Deriv tags with its `req_id`,
    /// including the first acknowledgement or error, lands in the returned
    /// subscription.
    pub async fn subscribe<Req>(&self, payload: &Req) -> Result<Subscription, ApiError>
    where
        Req: Serialize + ?Sized,
    {
        let req_id = self.next_req_id.fetch_add(1, Ordering::Relaxed);
        let text = encode_request(payload, req_id)?;
        let (updates_tx, updates) = mpsc::unbounded_channel();
        {
            let mut table = self.routes.table.lock().await;
            if table.closed {
                return Err(ApiError::Disconnected);
            }
            table.streams.insert(req_id, updates_tx);
        }

        if self.outgoing.send(Message::Text(text)).is_err() {
            self.unsubscribe(req_id).await;
            return Err(ApiError::Disconnected);
        }
        Ok(Subscription { req_id, updates })
    }

    /// Stops routing messages to a subscription.
    pub async fn unsubscribe(&self, req_id: u64) {
        self.routes.table.lock().await.streams.remove(&req_id);
    }

    /// Registers a task that `close` must wait for. Finished tasks are
    /// forgotten on the way.
    pub async fn track(&self, handle: JoinHandle<()>) {
        track_task(&mut *self.tasks.lock().await, handle);
    }

    /// Closes the connection and waits for every tracked task to finish.
    pub async fn close(&self) {
        let _ = self.outgoing.send(Message::Close(None));

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        let aborts: Vec<_> = tasks.iter().map(JoinHandle::abort_handle).collect();
        if tokio::time::timeout(CLOSE_GRACE, join_all(tasks)).await.is_err() {
            tracing::warn!("Deriv connection did not close in time, aborting its tasks.");
            aborts.iter().for_each(|task| task.abort());
        }
        self.routes.shutdown().await;
        tracing::info!("Deriv connection closed.");
    }
}

fn track_task(tasks: &mut Vec<JoinHandle<()>>, handle: JoinHandle<()>) {
    tasks.retain(|task| !task.is_finished());
    tasks.push(handle);
}

/// Serializes `payload` and tags it with `req_id`.
pub fn encode_request<Req: Serialize + ?Sized>(payload: &Req, req_id: u64) -> Result<String, ApiError> {
    let mut value = serde_json::to_value(payload)?;
    let Value::Object(fields) = &mut value else {
        return Err(ApiError::InvalidData(
            "Deriv requests must serialize to a JSON object".to_string(),
        ));
    };
    fields.insert("req_id".to_string(), Value::from(req_id));
    Ok(serde_json::to_string(&value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::TicksRequest;
    use serde_json::json;

    #[test]
    fn request_is_tagged_with_req_id() {
        let text = encode_request(&TicksRequest { ticks: "R_100", subscribe: 1 }, 7).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"ticks": "R_100", "subscribe": 1, "req_id": 7}));
    }

    #[test]
    fn non_object_payloads_are_rejected() {
        let err = encode_request(&[1, 2, 3], 1).unwrap_err();
        assert!(matches!(err, ApiError::InvalidData(_)));
    }

    #[tokio::test]
    async fn dispatch_routes_by_req_id() {
        let routes = Routes::default();
        let (waiter, response) = oneshot::channel();
        let (stream_tx, mut stream_rx) = mpsc::unbounded_channel();
        {
            let mut table = routes.table.lock().await;
            table.pending.insert(1, waiter);
            table.streams.insert(2, stream_tx);
        }

        routes.dispatch(r#"{"msg_type":"tick","req_id":2,"tick":{}}"#).await;
        routes.dispatch(r#"{"msg_type":"tick","req_id":2,"tick":{}}"#).await;
        routes.dispatch(r#"{"msg_type":"authorize","req_id":1}"#).await;
        routes.dispatch(r#"{"msg_type":"ping","ping":"pong"}"#).await;

        assert_eq!(response.await.unwrap()["msg_type"], "authorize");
        assert_eq!(stream_rx.recv().await.unwrap()["req_id"], 2);
        assert_eq!(stream_rx.recv().await.unwrap()["req_id"], 2);
        assert!(routes.table.lock().await.pending.is_empty());
    }

    #[tokio::test]
    async fn dispatch_drops_dead_subscriptions() {
        let routes = Routes::default();
        let (stream_tx, stream_rx) = mpsc::unbounded_channel();
        routes.table.lock().await.streams.insert(5, stream_tx);
        drop(stream_rx);

        routes.dispatch(r#"{"req_id":5}"#).await;
        assert!(routes.table.lock().await.streams.is_empty());
    }

    #[tokio::test]
    async fn tracking_forgets_finished_tasks() {
        let mut tasks = Vec::new();
        for _ in 0..3 {
            let done = tokio::spawn(async {});
            while !done.is_finished() {
                tokio::task::yield_now().await;
            }
            track_task(&mut tasks, done);
        }
        assert_eq!(tasks.len(), 1);

        let running = tokio::spawn(std::future::pending::<()>());
        track_task(&mut tasks, running);
        track_task(&mut tasks, tokio::spawn(std::future::pending::<()>()));
        assert_eq!(tasks.len(), 2);
        tasks.iter().for_each(JoinHandle::abort);
    }

    #[tokio::test]
    async fn shutdown_fails_pending_requests() {
        let routes = Routes::default();
        let (waiter, response) = oneshot::channel::<Value>();
        routes.table.lock().await.pending.insert(1, waiter);

        routes.shutdown().await;
        assert!(response.await.is_err());
        assert!(routes.table.lock().await.closed);
    }
}
