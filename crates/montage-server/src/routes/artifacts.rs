use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use montage::ArtifactHandle;
use tokio_util::io::ReaderStream;

use crate::{error::ApiError, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new().route("/artifacts/{handle}", get(stream_artifact))
}

/// Streams a stored blob without loading it into memory.
async fn stream_artifact(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> Result<Response, ApiError> {
    let handle = ArtifactHandle::new(handle);
    let artifacts = state.orchestrator.artifacts();

    let file = artifacts.open(&handle).await?;
    let size = artifacts.size(&handle)?;
    let content_type = mime_guess::from_path(handle.as_str())
        .first_or_octet_stream()
        .to_string();

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_LENGTH, size.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", handle),
            ),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}
