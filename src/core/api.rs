//! HTTP + WebSocket bridge for Avatar Sync
//!
//! Endpoints:
//! - GET /health - Health check
//! - GET /status - Orchestrator status snapshot
//! - POST /events/server - One backend event
//! - POST /events/runtime - One runtime frame message
//! - POST /events/callback - One in-process runtime callback
//! - POST /events/custom - One window custom event
//! - POST /events/audio - Audio element callback
//! - POST /connection - Socket connection status
//! - POST /audio/ready - Local audio initialized
//! - POST /introduction/reset - Back to pending introduction
//! - GET /effects - Drain pending effects
//! - WS /ws/runtime - Embedded runtime bridge

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::core::channel::{DeliveryError, RuntimeEndpoint, RuntimeHost};
use crate::core::clock::SystemClock;
use crate::core::orchestrator::Orchestrator;
use crate::core::simulated::SimulatedAudio;
use crate::core::visitor::VisitorStore;
use crate::types::{AudioEvent, ConnectionStatus, Effect, ServerEvent, StatusSnapshot};

/// Interval of the background tick task
const TICK_INTERVAL: Duration = Duration::from_millis(10);

/// Buffered runtime payloads per subscriber
const RUNTIME_BUFFER: usize = 256;

/// Runtime host backed by the `/ws/runtime` subscribers
#[derive(Debug, Clone)]
pub struct BridgeRuntime {
    tx: broadcast::Sender<String>,
}

impl BridgeRuntime {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(RUNTIME_BUFFER);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.tx.receiver_count() > 0
    }
}

impl Default for BridgeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeHost for BridgeRuntime {
    fn acquire(&mut self) -> Option<Box<dyn RuntimeEndpoint>> {
        if !self.is_connected() {
            return None;
        }
        Some(Box::new(BridgeEndpoint { tx: self.tx.clone() }))
    }
}

struct BridgeEndpoint {
    tx: broadcast::Sender<String>,
}

impl RuntimeEndpoint for BridgeEndpoint {
    fn send_message(&mut self, object: &str, method: &str, payload: &str) -> Result<(), DeliveryError> {
        debug!(object, method, "forwarding to runtime socket");
        self.tx
            .send(payload.to_string())
            .map(|_| ())
            .map_err(|_| DeliveryError::Unavailable)
    }
}

/// App state
pub struct AppState {
    pub core: Mutex<Orchestrator>,
    pub runtime: BridgeRuntime,
    pub audio: SimulatedAudio,
}

impl AppState {
    pub fn new(config: SyncConfig, store: Box<dyn VisitorStore>) -> Self {
        let runtime = BridgeRuntime::new();
        let audio = SimulatedAudio::new();
        let core = Orchestrator::new(
            config,
            Box::new(runtime.clone()),
            audio.sink(),
            store,
            Box::new(SystemClock::new()),
        );
        Self {
            core: Mutex::new(core),
            runtime,
            audio,
        }
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Connection status request
#[derive(Debug, Deserialize)]
pub struct ConnectionRequest {
    pub status: ConnectionStatus,
}

/// Runtime callback request
#[derive(Debug, Deserialize)]
pub struct CallbackRequest {
    pub name: String,
    #[serde(default)]
    pub argument: Option<String>,
}

/// Custom event request
#[derive(Debug, Deserialize)]
pub struct CustomEventRequest {
    pub name: String,
}

/// Effects produced while handling a request
#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub effects: Vec<Effect>,
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/events/server", post(server_event))
        .route("/events/runtime", post(runtime_event))
        .route("/events/callback", post(callback_event))
        .route("/events/custom", post(custom_event))
        .route("/events/audio", post(audio_event))
        .route("/connection", post(connection))
        .route("/audio/ready", post(audio_ready))
        .route("/introduction/reset", post(reset_introduction))
        .route("/effects", get(effects))
        .route("/ws/runtime", get(websocket_handler))
        .with_state(state)
}

/// Health check endpoint
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
    })
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusSnapshot> {
    let mut core = state.core.lock().await;
    core.tick();
    Json(core.status())
}

async fn server_event(
    State(state): State<Arc<AppState>>,
    Json(event): Json<ServerEvent>,
) -> Json<EventResponse> {
    let mut core = state.core.lock().await;
    core.handle_server_event(event);
    Json(EventResponse {
        effects: core.drain_effects(),
    })
}

/// Unrecognized frame messages are answered with 422
async fn runtime_event(
    State(state): State<Arc<AppState>>,
    Json(message): Json<Value>,
) -> Result<Json<EventResponse>, StatusCode> {
    let mut core = state.core.lock().await;
    if !core.handle_frame_message(&message) {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    Ok(Json(EventResponse {
        effects: core.drain_effects(),
    }))
}

/// Unrecognized callback names are answered with 422
async fn callback_event(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CallbackRequest>,
) -> Result<Json<EventResponse>, StatusCode> {
    let mut core = state.core.lock().await;
    if !core.handle_callback(&req.name, req.argument.as_deref()) {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    Ok(Json(EventResponse {
        effects: core.drain_effects(),
    }))
}

async fn custom_event(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CustomEventRequest>,
) -> Result<Json<EventResponse>, StatusCode> {
    let mut core = state.core.lock().await;
    if !core.handle_custom_event(&req.name) {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    Ok(Json(EventResponse {
        effects: core.drain_effects(),
    }))
}

async fn audio_event(
    State(state): State<Arc<AppState>>,
    Json(event): Json<AudioEvent>,
) -> Json<EventResponse> {
    let mut core = state.core.lock().await;
    core.handle_audio_event(event);
    Json(EventResponse {
        effects: core.drain_effects(),
    })
}

async fn connection(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConnectionRequest>,
) -> Json<EventResponse> {
    let mut core = state.core.lock().await;
    core.set_connection_status(req.status);
    Json(EventResponse {
        effects: core.drain_effects(),
    })
}

async fn audio_ready(State(state): State<Arc<AppState>>) -> Json<EventResponse> {
    let mut core = state.core.lock().await;
    core.mark_audio_initialized();
    Json(EventResponse {
        effects: core.drain_effects(),
    })
}

async fn reset_introduction(State(state): State<Arc<AppState>>) -> StatusCode {
    state.core.lock().await.reset_introduction();
    StatusCode::NO_CONTENT
}

async fn effects(State(state): State<Arc<AppState>>) -> Json<Vec<Effect>> {
    let mut core = state.core.lock().await;
    core.tick();
    Json(core.drain_effects())
}

/// WebSocket handler for the embedded runtime
async fn websocket_handler(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let rx = state.runtime.subscribe();
    ws.on_upgrade(move |socket| handle_runtime_socket(socket, rx, state))
}

/// Commands go out as text frames; text frames coming back are runtime
/// frame messages.
async fn handle_runtime_socket(socket: WebSocket, mut rx: broadcast::Receiver<String>, state: Arc<AppState>) {
    info!("runtime socket connected");
    let (mut sender, mut receiver) = socket.split();

    let mut forward = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(payload) => {
                    if sender.send(Message::Text(payload)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "runtime socket lagging, commands skipped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let inbound_state = Arc::clone(&state);
    let mut inbound = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => match serde_json::from_str::<Value>(&text) {
                    Ok(value) => {
                        inbound_state.core.lock().await.handle_frame_message(&value);
                    }
                    Err(e) => debug!(error = %e, "runtime frame is not JSON"),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut forward => inbound.abort(),
        _ = &mut inbound => forward.abort(),
    }
    info!("runtime socket closed");
}

/// Drive timers off the system clock
pub fn spawn_ticker(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        loop {
            interval.tick().await;
            state.core.lock().await.tick();
        }
    })
}

/// Run the API server
pub async fn run_server(
    addr: &str,
    config: SyncConfig,
    store: Box<dyn VisitorStore>,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState::new(config, store));
    let router = create_router(Arc::clone(&state));
    let ticker = spawn_ticker(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr, "avatar sync bridge listening");
    let result = axum::serve(listener, router).await;
    ticker.abort();
    result?;
    Ok(())
}
