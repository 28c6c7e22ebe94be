use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EnrollmentRecord {
    pub id: i64,
    pub email: String,
    pub course_id: i64,
    pub student_name: String,
    pub phone: String,
    pub extra_info: String,
    pub is_verified: bool,
    pub verification_token: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEnrollment {
    pub email: String,
    pub course_id: i64,
    pub student_name: String,
    pub phone: String,
    pub extra_info: String,
    pub is_verified: bool,
}

/// Body of `POST /enroll/`. Absent fields deserialize as empty and are rejected later.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrollmentRequest {
    #[serde(default, alias = "student_name")]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub extra_info: String,
    #[serde(default)]
    pub course_slug: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SideEffectResult {
    pub attempted: bool,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SideEffectResult {
    pub fn skipped() -> Self {
        Self::default()
    }

    pub fn succeeded() -> Self {
        Self {
            attempted: true,
            succeeded: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            attempted: true,
            succeeded: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SideEffectReport {
    pub webhook: SideEffectResult,
    pub student_email: SideEffectResult,
    pub operations_email: SideEffectResult,
    pub curriculum_attached: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curriculum_download_url: Option<String>,
    pub side_effects: SideEffectReport,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyEmailRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyEmailResponse {
    pub is_valid: bool,
    pub reason: String,
}
