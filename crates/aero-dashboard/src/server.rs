//! HTTP and WebSocket server implementation using axum.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use aero_telemetry::Metrics;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use futures_util::stream::{Stream, StreamExt};
use futures_util::{Sink, SinkExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::DashboardConfig;
use crate::error::{DashboardError, DashboardResult};
use crate::relay::IngestRelay;
use crate::types::{ChannelMessage, LatestReading};
use crate::viewer::Viewer;

/// Connection limiter to prevent too many concurrent WebSocket connections.
#[derive(Debug)]
pub struct ConnectionLimiter {
    current: AtomicUsize,
    max: usize,
}

impl ConnectionLimiter {
    pub fn new(max: usize) -> Self {
        Self {
            current: AtomicUsize::new(0),
            max,
        }
    }

    /// Take a slot. The returned guard releases it on drop, so it can be
    /// moved into the upgraded connection task.
    pub fn try_acquire(self: &Arc<Self>) -> Option<ConnectionGuard> {
        loop {
            let current = self.current.load(Ordering::Acquire);
            if current >= self.max {
                return None;
            }
            if self
                .current
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                Metrics::ws_connected();
                return Some(ConnectionGuard {
                    limiter: Arc::clone(self),
                });
            }
        }
    }

    pub fn current_count(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct ConnectionGuard {
    limiter: Arc<ConnectionLimiter>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.limiter.current.fetch_sub(1, Ordering::Release);
        Metrics::ws_disconnected();
    }
}

/// Shared application state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    relay: Arc<IngestRelay>,
    connection_limiter: Arc<ConnectionLimiter>,
    config: DashboardConfig,
}

impl AppState {
    pub fn new(relay: Arc<IngestRelay>, config: DashboardConfig) -> Self {
        Self {
            relay,
            connection_limiter: Arc::new(ConnectionLimiter::new(config.max_connections)),
            config,
        }
    }
}

/// Create the axum router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(serve_index))
        .route("/ws", get(ws_handler))
        .route("/api/latest", get(get_latest))
        .route("/metrics", get(get_metrics))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the dashboard page.
async fn serve_index(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Html<&'static str>, Response> {
    authorize(&state, &headers)?;
    Ok(Html(include_str!("../static/index.html")))
}

/// Last stored reading with derived VPD.
async fn get_latest(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    match state.relay.latest() {
        Some(reading) => Json(LatestReading::from(&reading)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// Prometheus text exposition.
async fn get_metrics(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    match Metrics::encode() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

/// WebSocket upgrade handler.
async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    let guard = match state.connection_limiter.try_acquire() {
        Some(guard) => guard,
        None => {
            warn!(
                current = state.connection_limiter.current_count(),
                max = state.config.max_connections,
                "WebSocket connection limit reached"
            );
            return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
        }
    };

    info!(
        connections = state.connection_limiter.current_count(),
        "Client connected"
    );

    ws.on_upgrade(move |socket| handle_ws_connection(socket, state, guard))
}

/// Handle a WebSocket connection.
///
/// Inbound `sensorData` frames go to the relay; broadcast readings are
/// forwarded as `newReading` frames from this connection's viewer.
async fn handle_ws_connection(socket: WebSocket, state: AppState, _guard: ConnectionGuard) {
    let mut viewer = match state.relay.viewer(state.config.live_window) {
        Ok(viewer) => viewer,
        Err(e) => {
            warn!(error = %e, "Failed to attach viewer");
            return;
        }
    };

    let (sender, receiver) = socket.split();
    run_connection(sender, receiver, Arc::clone(&state.relay), &mut viewer).await;

    info!(
        connections = state.connection_limiter.current_count().saturating_sub(1),
        window = viewer.readings().len(),
        "Client disconnected"
    );
}

/// Drive one connection until either direction ends.
///
/// The reader task never outlives this call, so a connection whose outbound
/// side is gone stops feeding the relay.
async fn run_connection<S, R, E>(
    mut sender: S,
    mut receiver: R,
    relay: Arc<IngestRelay>,
    viewer: &mut Viewer,
) where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Send + Unpin + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let (reply_tx, mut reply_rx) = mpsc::channel::<ChannelMessage>(16);

    let mut incoming_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    handle_frame(&relay, text.as_str(), &reply_tx).await;
                }
                Ok(Message::Binary(_)) => {
                    let _ = reply_tx
                        .send(ChannelMessage::error("binary frames are not supported"))
                        .await;
                }
                Ok(Message::Close(_)) => {
                    debug!("Client sent close frame");
                    break;
                }
                Err(e) => {
                    debug!(error = %e, "WebSocket receive error");
                    break;
                }
                // Ping/pong is answered by axum.
                Ok(_) => {}
            }
        }
    });

    loop {
        tokio::select! {
            event = viewer.next_event() => {
                let Some(event) = event else {
                    break;
                };
                if !send_frame(&mut sender, &ChannelMessage::NewReading(event)).await {
                    debug!("Failed to send reading, client disconnected");
                    break;
                }
            }
            Some(reply) = reply_rx.recv() => {
                if !send_frame(&mut sender, &reply).await {
                    break;
                }
            }
            _ = &mut incoming_task => {
                debug!("Incoming task completed, closing connection");
                break;
            }
        }
    }

    if !incoming_task.is_finished() {
        incoming_task.abort();
        let _ = incoming_task.await;
    }
}

/// Route one inbound text frame.
async fn handle_frame(relay: &IngestRelay, text: &str, reply_tx: &mpsc::Sender<ChannelMessage>) {
    match serde_json::from_str::<ChannelMessage>(text) {
        Ok(ChannelMessage::SensorData(event)) => {
            // Persist failures are logged by the relay and stay invisible to clients.
            relay.receive(event).await;
        }
        Ok(other) => {
            warn!(?other, "Unexpected event from client");
            let _ = reply_tx
                .send(ChannelMessage::error("only sensorData events are accepted"))
                .await;
        }
        Err(e) => {
            warn!(error = %e, "Malformed frame");
            Metrics::reading_rejected();
            let _ = reply_tx
                .send(ChannelMessage::error(format!("invalid frame: {e}")))
                .await;
        }
    }
}

async fn send_frame<S>(sender: &mut S, msg: &ChannelMessage) -> bool
where
    S: Sink<Message> + Unpin,
{
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            debug!(error = %e, "Failed to serialize frame");
            true
        }
    }
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    if state.config.auth_enabled() && !check_basic_auth(headers, &state.config) {
        return Err(unauthorized_response());
    }
    Ok(())
}

/// Check basic authentication.
fn check_basic_auth(headers: &HeaderMap, config: &DashboardConfig) -> bool {
    let Some(auth_header) = headers.get(header::AUTHORIZATION) else {
        return false;
    };

    let Ok(auth_str) = auth_header.to_str() else {
        return false;
    };

    let Some(encoded) = auth_str.strip_prefix("Basic ") else {
        return false;
    };

    let Some(decoded) = base64_decode(encoded) else {
        return false;
    };

    decoded == format!("{}:{}", config.username, config.password)
}

/// Minimal base64 decode for basic auth credentials.
fn base64_decode(input: &str) -> Option<String> {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

    fn decode_char(c: u8) -> Option<u32> {
        ALPHABET.iter().position(|&x| x == c).map(|p| p as u32)
    }

    let input = input.trim_end_matches('=');
    let mut result = Vec::with_capacity(input.len() * 3 / 4);

    for chunk in input.as_bytes().chunks(4) {
        let mut buf = 0u32;
        let mut bits = 0;

        for &c in chunk {
            buf = (buf << 6) | decode_char(c)?;
            bits += 6;
        }

        while bits >= 8 {
            bits -= 8;
            result.push(((buf >> bits) & 0xFF) as u8);
        }
    }

    String::from_utf8(result).ok()
}

fn unauthorized_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"Dashboard\"")],
        "Unauthorized",
    )
        .into_response()
}

struct RunningServer {
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

/// Lifecycle owner for the dashboard server.
///
/// Created once at process start. `start` is idempotent: once a server is
/// running, later calls return the address it is already bound to.
pub struct DashboardServer {
    relay: Arc<IngestRelay>,
    config: DashboardConfig,
    running: Option<RunningServer>,
}

impl DashboardServer {
    pub fn new(relay: Arc<IngestRelay>, config: DashboardConfig) -> Self {
        Self {
            relay,
            config,
            running: None,
        }
    }

    /// Bind and start serving in a background task.
    pub async fn start(&mut self) -> DashboardResult<SocketAddr> {
        if let Some(running) = &self.running {
            info!(addr = %running.local_addr, "Socket server already running");
            return Ok(running.local_addr);
        }
        self.relay.check_window(self.config.live_window)?;

        let listener =
            TcpListener::bind((self.config.bind_address.as_str(), self.config.port)).await?;
        let local_addr = listener.local_addr()?;

        let app = create_router(AppState::new(
            Arc::clone(&self.relay),
            self.config.clone(),
        ));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        info!(addr = %local_addr, "Starting dashboard server");
        self.running = Some(RunningServer {
            local_addr,
            shutdown_tx,
            task,
        });

        Ok(local_addr)
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    pub fn relay(&self) -> &Arc<IngestRelay> {
        &self.relay
    }

    /// Stop accepting requests and wait for the server task.
    pub async fn shutdown(&mut self) -> DashboardResult<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        info!(addr = %running.local_addr, "Stopping dashboard server");
        let _ = running.shutdown_tx.send(());
        running
            .task
            .await
            .map_err(|e| DashboardError::Task(e.to_string()))??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aero_core::SensorEvent;
    use aero_persistence::MemoryStore;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_state(config: DashboardConfig) -> AppState {
        let relay = IngestRelay::shared(Arc::new(MemoryStore::new()), 64);
        AppState::new(relay, config)
    }

    async fn get(app: Router, uri: &str, auth: Option<&str>) -> Response {
        let mut builder = Request::builder().uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        app.oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[test]
    fn test_base64_decode() {
        assert_eq!(
            base64_decode("Z3Jvd2VyOnNlY3JldA==").as_deref(),
            Some("grower:secret")
        );
        assert_eq!(base64_decode("!!!!"), None);
    }

    #[test]
    fn test_connection_limiter() {
        let limiter = Arc::new(ConnectionLimiter::new(2));
        let first = limiter.try_acquire().unwrap();
        let _second = limiter.try_acquire().unwrap();
        assert!(limiter.try_acquire().is_none());

        drop(first);
        assert_eq!(limiter.current_count(), 1);
        assert!(limiter.try_acquire().is_some());
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_router(test_state(DashboardConfig::default()));
        let response = get(app, "/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_latest_empty_then_populated() {
        let state = test_state(DashboardConfig::default());
        let relay = Arc::clone(&state.relay);
        let app = create_router(state);

        let response = get(app.clone(), "/api/latest", None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        relay.receive(SensorEvent::new(25.0, 60.0)).await;

        let response = get(app, "/api/latest", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let latest: LatestReading = serde_json::from_slice(&body).unwrap();
        assert_eq!(latest.temperature, 25.0);
        assert!((latest.vpd_kpa - 1.267).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_basic_auth() {
        let config = DashboardConfig {
            username: "grower".to_string(),
            password: "secret".to_string(),
            ..Default::default()
        };
        let app = create_router(test_state(config));

        let response = get(app.clone(), "/", None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = get(app.clone(), "/", Some("Basic Z3Jvd2VyOnNlY3JldA==")).await;
        assert_eq!(response.status(), StatusCode::OK);

        // Health stays open for probes.
        let response = get(app, "/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let app = create_router(test_state(DashboardConfig::default()));
        Metrics::reading_rejected();
        let response = get(app, "/metrics", None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let relay = IngestRelay::shared(Arc::new(MemoryStore::new()), 64);
        let config = DashboardConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            ..Default::default()
        };
        let mut server = DashboardServer::new(relay, config);

        let first = server.start().await.unwrap();
        let second = server.start().await.unwrap();
        assert_eq!(first, second);
        assert!(server.is_running());

        server.shutdown().await.unwrap();
        assert!(!server.is_running());
        assert!(server.local_addr().is_none());
    }

    #[tokio::test]
    async fn test_start_rejects_window_beyond_broadcast_capacity() {
        let relay = IngestRelay::shared(Arc::new(MemoryStore::new()), 8);
        let config = DashboardConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            live_window: 50,
            ..Default::default()
        };
        let mut server = DashboardServer::new(relay, config);

        let err = server.start().await.unwrap_err();
        assert!(matches!(err, DashboardError::WindowExceedsCapacity { .. }));
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_reader_stops_when_outbound_side_fails() {
        use futures_util::{sink, stream};
        use std::convert::Infallible;
        use std::time::Duration;

        let store = Arc::new(MemoryStore::new());
        let relay = IngestRelay::shared(store.clone(), 64);
        let mut viewer = relay.viewer(50).unwrap();

        let (in_tx, in_rx) = mpsc::channel::<Result<Message, Infallible>>(8);
        let inbound = Box::pin(stream::unfold(in_rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        }));
        let closed_outbound = Box::pin(sink::unfold((), |(), _msg: Message| async {
            Err::<(), _>(std::io::Error::other("peer gone"))
        }));

        let frame = r#"{"event":"sensorData","data":{"temperature":20,"humidity":50}}"#;
        in_tx.send(Ok(Message::Text(frame.into()))).await.unwrap();

        // The echo of the first reading cannot be delivered, which ends the connection.
        tokio::time::timeout(
            Duration::from_secs(2),
            run_connection(closed_outbound, inbound, Arc::clone(&relay), &mut viewer),
        )
        .await
        .unwrap();
        assert_eq!(store.len(), 1);

        // The reader is gone with it; later frames never reach the relay.
        assert!(in_tx.is_closed());
        assert!(in_tx.send(Ok(Message::Text(frame.into()))).await.is_err());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.len(), 1);
    }
}
