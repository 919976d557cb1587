use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Multipart, Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::Stream;
use montage::{
    Job, JobEvent, JobState, Match, MatchEdit, NewJob, ReviewSnapshot, VideoSource,
};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};

use crate::{error::ApiError, response::ApiResponse, state::AppState};

// ─── Payloads ───

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub job_id: String,
    pub state: JobState,
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub state: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct JobList {
    pub jobs: Vec<Job>,
    pub total: u64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMatchesRequest {
    pub matches: Vec<MatchEdit>,
}

#[derive(Debug, Serialize)]
pub struct MatchList {
    pub matches: Vec<Match>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadLink {
    pub download_url: String,
    pub handle: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload))
        .route("/process/{job_id}", post(process))
        .route("/jobs", get(list_jobs))
        .route("/jobs/{job_id}", get(get_job).delete(purge_job))
        .route("/jobs/{job_id}/review", get(review))
        .route("/jobs/{job_id}/events", get(job_events))
        .route("/jobs/{job_id}/retry", post(retry))
        .route("/jobs/{job_id}/cancel", post(cancel))
        .route("/matches/{job_id}", post(update_matches))
        .route("/generate/{job_id}", post(generate))
        .route("/download/{job_id}", get(download))
}

// ─── Upload ───

/// Accepts `video` (file) and `summary` (text) fields. The video is
/// spooled to disk chunk by chunk.
async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<UploadResponse>>, ApiError> {
    let mut summary: Option<String> = None;
    let mut video: Option<(String, tempfile::NamedTempFile)> = None;

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("summary") => summary = Some(field.text().await?),
            Some("video") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let spool = tempfile::Builder::new()
                    .prefix("upload-")
                    .tempfile_in(state.upload_directory())?;
                let mut file = tokio::fs::File::from_std(spool.reopen()?);

                let mut written: u64 = 0;
                while let Some(chunk) = field.chunk().await? {
                    written += chunk.len() as u64;
                    file.write_all(&chunk).await?;
                }
                file.flush().await?;
                tracing::debug!(bytes = written, "Upload spooled");

                video = Some((filename, spool));
            }
            Some(other) => tracing::debug!(field = %other, "Ignoring unknown upload field"),
            None => {}
        }
    }

    let (filename, spool) =
        video.ok_or_else(|| ApiError::BadRequest("Missing 'video' file field".to_string()))?;

    let job = state
        .orchestrator
        .submit(NewJob {
            filename,
            summary: summary.unwrap_or_default(),
            video: VideoSource::File(spool.path().to_path_buf()),
        })
        .await?;
    // The spool file has been moved into the artifact store by now.
    drop(spool);

    Ok(Json(ApiResponse::ok(UploadResponse {
        job_id: job.id,
        state: job.state,
    })))
}

// ─── Jobs ───

async fn process(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<ApiResponse<Job>>, ApiError> {
    let job = state.orchestrator.process(&job_id).await?;
    Ok(Json(ApiResponse::ok(job)))
}

async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<ApiResponse<JobList>>, ApiError> {
    let filter = match query.state.as_deref() {
        Some(raw) => Some(raw.parse::<JobState>().map_err(ApiError::BadRequest)?),
        None => None,
    };
    let (jobs, total) = state
        .orchestrator
        .list_jobs(filter, query.limit, query.offset)?;
    Ok(Json(ApiResponse::ok(JobList { jobs, total })))
}

async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<ApiResponse<Job>>, ApiError> {
    Ok(Json(ApiResponse::ok(state.orchestrator.job(&job_id)?)))
}

async fn review(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<ApiResponse<ReviewSnapshot>>, ApiError> {
    Ok(Json(ApiResponse::ok(state.orchestrator.review(&job_id)?)))
}

/// Streams the job's events, starting with its current state.
async fn job_events(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    // Subscribe before reading the job so no transition falls in between.
    let receiver = state.orchestrator.subscribe();
    let job = state.orchestrator.job(&job_id)?;

    let current = tokio_stream::once(JobEvent::for_job(&job, "Current state"));
    let updates = BroadcastStream::new(receiver).filter_map(move |result| match result {
        Ok(event) if event.job_id == job_id => Some(event),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(error = %e, "Event subscriber lagged");
            None
        }
    });

    let stream = current
        .chain(updates)
        .filter_map(|event| Event::default().event("job").json_data(&event).ok())
        .map(Ok);

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

async fn retry(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<ApiResponse<Job>>, ApiError> {
    Ok(Json(ApiResponse::ok(state.orchestrator.retry(&job_id).await?)))
}

async fn cancel(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<ApiResponse<Job>>, ApiError> {
    Ok(Json(ApiResponse::ok(state.orchestrator.cancel(&job_id).await?)))
}

async fn purge_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.orchestrator.purge(&job_id).await?;
    Ok(Json(ApiResponse::ok(())))
}

// ─── Review and output ───

async fn update_matches(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(request): Json<UpdateMatchesRequest>,
) -> Result<Json<ApiResponse<MatchList>>, ApiError> {
    let matches = state
        .orchestrator
        .update_matches(&job_id, &request.matches)
        .await?;
    Ok(Json(ApiResponse::ok(MatchList { matches })))
}

async fn generate(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<ApiResponse<Job>>, ApiError> {
    Ok(Json(ApiResponse::ok(state.orchestrator.finalize(&job_id).await?)))
}

async fn download(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<ApiResponse<DownloadLink>>, ApiError> {
    let handle = state.orchestrator.download(&job_id)?;
    Ok(Json(ApiResponse::ok(DownloadLink {
        download_url: format!("/api/artifacts/{}", handle),
        handle: handle.to_string(),
    })))
}
