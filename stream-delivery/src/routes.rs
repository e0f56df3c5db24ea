use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{DeliveryError, DeliveryErrorResponse};
use crate::serve;
use crate::state::DeliveryState;

/// Create the delivery router with all endpoints.
pub fn delivery_router(state: Arc<DeliveryState>) -> Router {
    Router::new()
        .route("/start/{camera}", get(start_stream_handler))
        .route("/stop/{session}", get(stop_stream_handler))
        .route("/play/{session}/{file}", get(play_handler))
        .with_state(state)
}

/// Start a live session for a camera.
///
/// Resolves the camera's source URL through the configured resolver,
/// starts a stream-mode recorder and returns the session id as the
/// response body.
async fn start_stream_handler(
    Path(camera): Path<String>,
    State(state): State<Arc<DeliveryState>>,
) -> Result<impl IntoResponse, DeliveryErrorResponse> {
    tracing::debug!("Start stream called for cam: {}", camera);
    let session = state.start_stream(&camera).await?;
    Ok(session.to_string())
}

/// Stop a live session and remove its temp artifacts.
async fn stop_stream_handler(
    Path(session): Path<String>,
    State(state): State<Arc<DeliveryState>>,
) -> Result<impl IntoResponse, DeliveryErrorResponse> {
    let id = Uuid::parse_str(&session)
        .map_err(|_| DeliveryError::UnknownSession(session.clone()))?;
    if state.stop_stream(&id).await {
        Ok(StatusCode::OK)
    } else {
        Err(DeliveryError::UnknownSession(session).into())
    }
}

/// Serve a session's manifest or one of its segments.
///
/// The session and file parts of the URL are opaque identifiers; they are
/// validated before any filesystem access. A request racing the encoder's
/// first write gets a 404 naming the missing artifact.
async fn play_handler(
    Path((session, file)): Path<(String, String)>,
    headers: HeaderMap,
    State(state): State<Arc<DeliveryState>>,
) -> Result<Response, DeliveryErrorResponse> {
    tracing::debug!("Play called for stream: {}/{}", session, file);
    let path = state.artifact_path(&session, &file)?;
    match serve::serve_artifact(&path, serve::accepts_gzip(&headers)).await {
        Ok(resp) => Ok(resp),
        Err(DeliveryError::ArtifactNotFound(_)) => {
            Err(DeliveryError::ArtifactNotFound(format!("{}/{}", session, file)).into())
        }
        Err(err) => Err(err.into()),
    }
}
