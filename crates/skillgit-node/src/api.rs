//! HTTP API for the skillgit node.
//!
//! Serves each skill as a read-only git repository over both the dumb and
//! the smart HTTP protocols. Repositories are synthesized per request.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use skillgit_git::{
    create_git_pack_at, generate_head, generate_info_refs, generate_smart_info_refs, get_object,
    parse_object_path, parse_upload_pack_request, respond_to_upload_pack, service_announcement,
    GitPack, DEFAULT_COMMIT_TIMESTAMP, UPLOAD_PACK_SERVICE,
};
use std::io::Read;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::source::SkillSource;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Skill content lookup.
    pub skills: Arc<dyn SkillSource>,
}

impl AppState {
    /// Creates state over `skills`.
    pub fn new(skills: Arc<dyn SkillSource>) -> Self {
        Self { skills }
    }

    /// Synthesizes the repository for `repo` (with or without `.git`).
    fn pack_for(&self, repo: &str) -> Result<GitPack, ApiError> {
        let identifier = repo.strip_suffix(".git").unwrap_or(repo);
        let skill = self
            .skills
            .get(identifier)
            .ok_or_else(|| ApiError::SkillNotFound(identifier.to_string()))?;

        let pack = create_git_pack_at(
            &skill.identifier,
            &skill.primary,
            Some(&skill.files),
            &skill.executables,
            skill.timestamp.unwrap_or(DEFAULT_COMMIT_TIMESTAMP),
        )?;
        Ok(pack)
    }
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("skill not found: {0}")]
    SkillNotFound(String),
    #[error("object not found: {0}")]
    ObjectNotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("service not available: {0}")]
    Forbidden(String),
    #[error("git error: {0}")]
    Git(#[from] skillgit_git::GitError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::SkillNotFound(_) | ApiError::ObjectNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Git(e) => {
                tracing::error!(error = %e, "Failed to build repository");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Query string of `info/refs`.
#[derive(Debug, Deserialize)]
pub struct InfoRefsQuery {
    pub service: Option<String>,
}

/// Creates the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/{repo}/info/refs", get(git_info_refs))
        .route("/{repo}/HEAD", get(git_head))
        .route("/{repo}/objects/{dir}/{file}", get(git_object))
        .route("/{repo}/git-upload-pack", post(git_upload_pack))
        .route("/{repo}/git-receive-pack", any(git_receive_pack))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "skills": state.skills.len(),
    }))
}

/// `info/refs`: smart advertisement when a service is requested, the dumb
/// ref list otherwise.
async fn git_info_refs(
    State(state): State<AppState>,
    Path(repo): Path<String>,
    Query(query): Query<InfoRefsQuery>,
) -> Result<Response, ApiError> {
    match query.service.as_deref() {
        Some(UPLOAD_PACK_SERVICE) => {
            let pack = state.pack_for(&repo)?;
            let mut body = service_announcement(UPLOAD_PACK_SERVICE)?;
            body.extend_from_slice(&generate_smart_info_refs(&pack)?);

            tracing::info!(repo = %repo, head = %pack.head_commit, "Advertised refs");

            Ok((
                [
                    (
                        header::CONTENT_TYPE,
                        "application/x-git-upload-pack-advertisement",
                    ),
                    (header::CACHE_CONTROL, "no-cache"),
                ],
                body,
            )
                .into_response())
        }
        Some(other) => Err(ApiError::Forbidden(other.to_string())),
        None => {
            let pack = state.pack_for(&repo)?;
            Ok((
                [
                    (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
                    (header::CACHE_CONTROL, "no-cache"),
                ],
                generate_info_refs(&pack),
            )
                .into_response())
        }
    }
}

/// Dumb protocol `HEAD`.
async fn git_head(
    State(state): State<AppState>,
    Path(repo): Path<String>,
) -> Result<Response, ApiError> {
    // 404 for unknown skills even though the content never varies
    state.pack_for(&repo)?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        generate_head(),
    )
        .into_response())
}

/// Dumb protocol loose object.
async fn git_object(
    State(state): State<AppState>,
    Path((repo, dir, file)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    let path = format!("objects/{}/{}", dir, file);
    let sha = parse_object_path(&path).ok_or_else(|| ApiError::ObjectNotFound(path.clone()))?;

    let pack = state.pack_for(&repo)?;
    let object = get_object(&pack, &sha).ok_or(ApiError::ObjectNotFound(sha))?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/x-git-loose-object"),
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
        ],
        object.data.clone(),
    )
        .into_response())
}

/// Smart protocol fetch.
async fn git_upload_pack(
    State(state): State<AppState>,
    Path(repo): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let body = decode_body(&headers, body)?;
    let request = parse_upload_pack_request(&body);

    if request.truncated {
        tracing::warn!(
            repo = %repo,
            wants = request.wants.len(),
            "Upload-pack request stopped at malformed input"
        );
    }
    if request.wants.is_empty() {
        return Err(ApiError::BadRequest("no wants in request".to_string()));
    }

    let pack = state.pack_for(&repo)?;
    let head = pack.head_commit.to_hex();
    if let Some(unknown) = request.wants.iter().find(|w| **w != head) {
        tracing::warn!(repo = %repo, want = %unknown, head = %head, "Client wants a stale commit");
    }

    let response = respond_to_upload_pack(&pack, &request)?;

    tracing::info!(
        repo = %repo,
        depth = ?request.depth,
        done = request.done,
        objects = pack.len(),
        bytes = response.len(),
        "Served upload-pack"
    );

    Ok((
        [
            (header::CONTENT_TYPE, "application/x-git-upload-pack-result"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        response,
    )
        .into_response())
}

/// Pushing is not supported.
async fn git_receive_pack(Path(repo): Path<String>) -> ApiError {
    ApiError::Forbidden(format!("git-receive-pack on {}", repo))
}

/// Undoes `Content-Encoding: gzip`, which git uses for larger requests.
fn decode_body(headers: &HeaderMap, body: Bytes) -> Result<Bytes, ApiError> {
    let gzip = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("gzip"));
    if !gzip {
        return Ok(body);
    }

    let mut decoded = Vec::new();
    GzDecoder::new(body.as_ref())
        .read_to_end(&mut decoded)
        .map_err(|e| ApiError::BadRequest(format!("invalid gzip body: {}", e)))?;
    Ok(Bytes::from(decoded))
}
