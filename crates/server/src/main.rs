use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::{State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use server_api::{
    get_psu_state, handle_command, record_activity, run_sensing, ui_settings, ApiContext,
    CommandReply,
};
use shared::{
    domain::PsuState,
    error::{ApiError, ErrorCode},
    protocol::{ActivityReport, PluginMessage, UiSettings},
};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;

use app_state::AppState;
use config::load_settings;

const PLUGIN_ROUTE: &str = "/api/plugin/psuoff";
const MAX_BODY_BYTES: usize = 16 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let api = ApiContext::start(settings.service_options()).await;

    if settings.sense_interval_secs > 0 {
        tokio::spawn(run_sensing(
            api.clone(),
            Duration::from_secs(settings.sense_interval_secs),
        ));
    }
    if api.idle.enabled() {
        tokio::spawn(api.idle.clone().run(api.clone()));
    }

    let app = build_router(Arc::new(AppState { api }));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(PLUGIN_ROUTE, post(http_command).get(http_get_state))
        .route(&format!("{PLUGIN_ROUTE}/settings"), get(http_ui_settings))
        .route(&format!("{PLUGIN_ROUTE}/activity"), post(http_activity))
        .route("/ws", get(ws_handler))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidCommand => StatusCode::BAD_REQUEST,
        ErrorCode::HardwareTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorCode::HardwareUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn http_command(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<CommandReply>, (StatusCode, Json<ApiError>)> {
    let reply = handle_command(&state.api, &body).await.map_err(|e| {
        if e.code == ErrorCode::InvalidCommand {
            warn!(message = %e.message, "rejected psu command");
        }
        (status_for(e.code), Json(e))
    })?;
    Ok(Json(reply))
}

async fn http_get_state(State(state): State<Arc<AppState>>) -> Json<PsuState> {
    Json(get_psu_state(&state.api))
}

async fn http_ui_settings(State(state): State<Arc<AppState>>) -> Json<UiSettings> {
    Json(ui_settings(&state.api))
}

async fn http_activity(
    State(state): State<Arc<AppState>>,
    Json(report): Json<ActivityReport>,
) -> StatusCode {
    record_activity(&state.api, &report.gcode);
    StatusCode::NO_CONTENT
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: Arc<AppState>, socket: axum::extract::ws::WebSocket) {
    use axum::extract::ws::Message;
    use futures::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();
    let mut subscription = state.api.subscribe();
    let session_id = subscription.session_id();
    // subscribed first, so this snapshot is never older than what follows
    let initial = PluginMessage::state(get_psu_state(&state.api));
    info!(%session_id, "session connected");

    let send_task = tokio::spawn(async move {
        let mut next = Some(initial);
        while let Some(message) = next.take() {
            if let Ok(text) = serde_json::to_string(&message) {
                if sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            next = subscription.recv().await;
        }
    });

    while let Some(Ok(_msg)) = receiver.next().await {}

    send_task.abort();
    info!(%session_id, "session disconnected");
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
