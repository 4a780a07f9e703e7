use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::scheduler::NotificationScheduler;
use crate::streaks::StreakUpdater;

#[derive(Clone)]
pub struct DaemonState {
    pub scheduler: Arc<NotificationScheduler>,
    pub streaks: Arc<StreakUpdater>,
    pub api_token: Option<String>,
    pub started_at: Instant,
}

pub fn build_router(state: DaemonState) -> Router {
    let api = Router::new()
        .route("/trigger", post(trigger_handler))
        .route("/instances/{id}/completion", post(completion_handler))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health_handler))
        .merge(api)
        .with_state(state)
}

/// Start the HTTP server: health, manual trigger and completion toggles.
pub async fn start_server(bind: &str, port: u16, state: DaemonState) -> anyhow::Result<()> {
    let app = build_router(state);

    let addr: std::net::SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("HTTP server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn auth_middleware(
    State(state): State<DaemonState>,
    headers: HeaderMap,
    request: axum::extract::Request,
    next: Next,
) -> Result<impl IntoResponse, StatusCode> {
    if let Some(expected) = state.api_token.as_deref() {
        let token = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .unwrap_or("");
        if token != expected {
            return Err(StatusCode::UNAUTHORIZED);
        }
    }
    Ok(next.run(request).await)
}

async fn health_handler(State(state): State<DaemonState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

async fn trigger_handler(
    State(state): State<DaemonState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    match state.scheduler.tick().await {
        Ok(report) => Ok(Json(json!(report))),
        Err(e) => {
            error!("Triggered tick failed: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionRequest {
    completed: bool,
}

async fn completion_handler(
    State(state): State<DaemonState>,
    Path(id): Path<String>,
    Json(body): Json<CompletionRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    match state.streaks.toggle(&id, body.completed).await {
        Ok(Some(outcome)) => Ok(Json(json!(outcome))),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!(instance = %id, "Completion toggle failed: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[cfg(target_os = "linux")]
const SERVICE_UNIT_PATH: &str = "/etc/systemd/system/habitd.service";

/// systemd unit that runs the daemon against `config_path`. The working
/// directory is the config's directory so a relative `db_path` keeps
/// resolving next to it.
#[cfg(any(target_os = "linux", test))]
fn service_unit(exe: &std::path::Path, config_path: &std::path::Path) -> String {
    let working_dir = config_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("/"));
    let lines = [
        "[Unit]".to_string(),
        "Description=habitd recurring task and reminder scheduler".to_string(),
        "Wants=network-online.target".to_string(),
        "After=network-online.target".to_string(),
        String::new(),
        "[Service]".to_string(),
        format!("ExecStart={}", exe.display()),
        format!("WorkingDirectory={}", working_dir.display()),
        format!("Environment={}={}", crate::CONFIG_ENV, config_path.display()),
        "Environment=RUST_LOG=info,sqlx=warn".to_string(),
        "Restart=on-failure".to_string(),
        "RestartSec=10".to_string(),
        String::new(),
        "[Install]".to_string(),
        "WantedBy=multi-user.target".to_string(),
    ];
    let mut unit = lines.join("\n");
    unit.push('\n');
    unit
}

/// Write the systemd unit for this binary and `config_path` (Linux).
#[cfg(target_os = "linux")]
pub fn install_service(config_path: &std::path::Path) -> anyhow::Result<()> {
    let exe = std::env::current_exe()?;
    let config_path = if config_path.is_absolute() {
        config_path.to_path_buf()
    } else {
        std::env::current_dir()?.join(config_path)
    };

    std::fs::write(SERVICE_UNIT_PATH, service_unit(&exe, &config_path))?;
    println!("Wrote {} (config: {})", SERVICE_UNIT_PATH, config_path.display());
    println!("Enable with: systemctl daemon-reload && systemctl enable --now habitd");
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn install_service(_config_path: &std::path::Path) -> anyhow::Result<()> {
    anyhow::bail!("install-service only writes systemd units; run habitd under your own supervisor")
}
