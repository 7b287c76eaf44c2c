use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Component, PathBuf};
use tower::ServiceExt;
use tower_http::services::ServeFile;

use super::ControlServer;
use crate::importer::{GameInfo, ImportError};

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    #[serde(default)]
    pub repo_url: String,
}

/// GET /api/status
pub async fn status(State(state): State<ControlServer>) -> impl IntoResponse {
    Json(state.importer.status().await)
}

/// POST /api/import - blocks until the import is Ready or Failed
pub async fn import(
    State(state): State<ControlServer>,
    payload: Option<Json<ImportRequest>>,
) -> Result<impl IntoResponse, ImportError> {
    let url = payload.map(|Json(p)| p.repo_url).unwrap_or_default();
    let descriptor = state.importer.import(&url).await?;
    Ok(Json(json!({
        "success": true,
        "status": state.importer.state(),
        "game": descriptor,
    })))
}

/// POST /api/reset
pub async fn reset(State(state): State<ControlServer>) -> Result<impl IntoResponse, ImportError> {
    state.importer.reset().await?;
    Ok(Json(json!({ "success": true, "status": state.importer.state() })))
}

/// GET /api/game_info - fresh detection over the imported directory
pub async fn game_info(State(state): State<ControlServer>) -> Result<Json<GameInfo>, ImportError> {
    Ok(Json(state.importer.game_info().await?))
}

/// POST /api/launch/start
pub async fn launch_start(
    State(state): State<ControlServer>,
) -> Result<impl IntoResponse, ImportError> {
    let report = state.importer.start_launch().await?;
    Ok(Json(json!({
        "success": true,
        "launch": report.info,
        "warnings": report.warnings,
    })))
}

/// POST /api/launch/stop
pub async fn launch_stop(State(state): State<ControlServer>) -> impl IntoResponse {
    let stopped = state.importer.stop_launch().await;
    Json(json!({ "success": true, "stopped": stopped }))
}

/// GET /api/launch/console?since=0&count=100
pub async fn launch_console(
    State(state): State<ControlServer>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let since = params
        .get("since")
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);
    let count = params.get("count").and_then(|c| c.parse::<usize>().ok());

    let lines = state.importer.console(since, count).await;
    Json(json!({
        "lines": lines,
        "launch": state.importer.launch_info(),
    }))
}

/// GET /game/*path - a file from the imported game
pub async fn game_file(
    State(state): State<ControlServer>,
    Path(path): Path<String>,
    request: Request,
) -> Response {
    let Some(root) = state.importer.game_path() else {
        return ImportError::NoGame.into_response();
    };
    let Some(rel) = sanitize(&path) else {
        return (StatusCode::BAD_REQUEST, "Invalid path").into_response();
    };

    match ServeFile::new(root.join(rel)).oneshot(request).await {
        Ok(resp) => resp.into_response(),
        Err(never) => match never {},
    }
}

/// Only plain path segments; anything that could leave the game root is refused.
fn sanitize(path: &str) -> Option<PathBuf> {
    let rel = PathBuf::from(path);
    let mut clean = PathBuf::new();
    for component in rel.components() {
        match component {
            Component::Normal(seg) => clean.push(seg),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!clean.as_os_str().is_empty()).then_some(clean)
}
