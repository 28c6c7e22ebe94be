use axum::Json;
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query};
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Router, extract::State, http::StatusCode, routing::get};
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::*;
use crate::state::AppState;

/// Multipart framing on top of the file itself.
const UPLOAD_OVERHEAD_BYTES: usize = 1024 * 1024;

#[derive(Deserialize)]
struct DownloadParams {
    email: Option<String>,
}

pub fn router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.max_curriculum_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(UPLOAD_OVERHEAD_BYTES);

    Router::new()
        .route("/health", get(health))
        .route("/courses/", get(list_courses))
        .route("/courses/{slug}/", get(course_detail))
        .route("/courses/{slug}/batch-schedules/", get(course_batch_schedules))
        .route("/batch-schedules/all/", get(all_batch_schedules))
        .route("/courses/{slug}/curriculum-info/", get(curriculum_info))
        .route("/courses/{slug}/download-curriculum/", get(download_curriculum))
        .route("/courses/{slug}/enroll-download/", post(enroll_for_course))
        .route("/enroll/", post(enroll))
        .route("/verify-email/", post(verify_email))
        .route("/admin/courses/{slug}/curriculum/", post(upload_curriculum))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(&state.db).await?;
    Ok(StatusCode::OK)
}

async fn list_courses(State(state): State<AppState>) -> Result<Json<Vec<CourseSummary>>, AppError> {
    let courses = state.catalog().list_courses().await?;
    Ok(Json(courses))
}

async fn course_detail(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<CourseDetail>, AppError> {
    let detail = state.catalog().course_detail(&slug).await?;
    Ok(Json(detail))
}

async fn course_batch_schedules(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<CourseBatchSchedulesResponse>, AppError> {
    let batches = state.catalog().course_batches(&slug).await?;
    Ok(Json(batches))
}

async fn all_batch_schedules(
    State(state): State<AppState>,
) -> Result<Json<AllBatchSchedulesResponse>, AppError> {
    let batches = state.catalog().all_batches().await?;
    Ok(Json(batches))
}

async fn curriculum_info(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<CurriculumInfo>, AppError> {
    let info = state.catalog().curriculum_info(&slug).await?;
    Ok(Json(info))
}

async fn download_curriculum(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(params): Query<DownloadParams>,
) -> Result<Response, AppError> {
    let document = state
        .catalog()
        .download_curriculum(&slug, params.email.as_deref())
        .await?;

    let content_type = HeaderValue::from_str(&document.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&attachment_disposition(&document.filename))
        .map_err(|e| AppError::Internal(format!("invalid content-disposition: {}", e)))?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_LENGTH, HeaderValue::from(document.bytes.len())),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from(document.bytes),
    )
        .into_response())
}

async fn enroll(
    State(state): State<AppState>,
    payload: Result<Json<EnrollmentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EnrollmentResponse>), AppError> {
    let Json(req) = payload?;
    let response = state.enrollment().enroll(req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn enroll_for_course(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    payload: Result<Json<EnrollmentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EnrollmentResponse>), AppError> {
    let Json(mut req) = payload?;
    req.course_slug = slug;
    let response = state.enrollment().enroll(req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn verify_email(
    State(state): State<AppState>,
    payload: Result<Json<VerifyEmailRequest>, JsonRejection>,
) -> Result<Json<VerifyEmailResponse>, AppError> {
    let Json(req) = payload?;
    if req.email.trim().is_empty() {
        return Err(AppError::BadRequest("Email is required".to_string()));
    }
    Ok(Json(state.enrollment().verify_email(&req.email).await))
}

async fn upload_curriculum(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<CurriculumInfo>), AppError> {
    authorize_admin(&state, &headers)?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("curriculum").to_string();
        let bytes = field.bytes().await?;
        info!(slug = %slug, file = %file_name, size = bytes.len(), "curriculum upload received");

        let info = state
            .catalog()
            .upload_curriculum(&slug, &file_name, &bytes)
            .await?;
        return Ok((StatusCode::CREATED, Json(info)));
    }

    Err(AppError::BadRequest("Missing multipart field 'file'".to_string()))
}

fn authorize_admin(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(expected) = state.config.admin_token.as_deref() else {
        warn!("curriculum upload attempted but ADMIN_TOKEN is not configured");
        return Err(AppError::Forbidden("Curriculum upload is disabled".to_string()));
    };

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    match presented {
        Some(token) if token == expected => Ok(()),
        _ => Err(AppError::Unauthorized),
    }
}

/// `attachment; filename="..."` with characters that cannot appear in a quoted header value replaced.
/// When anything was replaced the exact name follows as an RFC 5987 `filename*` parameter.
fn attachment_disposition(filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    if safe == filename {
        return format!("attachment; filename=\"{}\"", safe);
    }
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        safe,
        encode_ext_value(filename)
    )
}

/// Percent-encodes every UTF-8 byte outside the RFC 5987 `attr-char` set.
fn encode_ext_value(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'!' | b'#' | b'$' | b'&' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}
