use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BatchSchedule {
    pub id: i64,
    pub course_id: i64,
    pub batch_number: i64,
    pub title: String,
    pub subtitle: String,
    pub start_date: NaiveDate,
    pub start_day: String,
    pub time_slot: String,
    pub duration: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBatchSchedule {
    pub batch_number: i64,
    pub title: String,
    #[serde(default = "default_subtitle")]
    pub subtitle: String,
    pub start_date: NaiveDate,
    pub start_day: String,
    pub time_slot: String,
    pub duration: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_subtitle() -> String {
    "(Mon-Fri)".to_string()
}

fn default_active() -> bool {
    true
}

/// Batch as shown to prospective students.
#[derive(Debug, Clone, Serialize)]
pub struct BatchScheduleView {
    pub id: i64,
    pub batch_number: i64,
    pub title: String,
    pub subtitle: String,
    pub start_date: NaiveDate,
    pub formatted_date: String,
    pub start_day: String,
    pub time_slot: String,
    pub duration: String,
    pub is_active: bool,
}

impl From<BatchSchedule> for BatchScheduleView {
    fn from(batch: BatchSchedule) -> Self {
        Self {
            id: batch.id,
            batch_number: batch.batch_number,
            formatted_date: batch.start_date.format("%d %b %Y").to_string(),
            title: batch.title,
            subtitle: batch.subtitle,
            start_date: batch.start_date,
            start_day: batch.start_day,
            time_slot: batch.time_slot,
            duration: batch.duration,
            is_active: batch.is_active,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseBatchSchedulesResponse {
    pub course_title: String,
    pub course_slug: String,
    pub batch_schedules: Vec<BatchScheduleView>,
    pub total_batches: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseBatches {
    pub course_title: String,
    pub course_slug: String,
    pub batches: Vec<BatchScheduleView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AllBatchSchedulesResponse {
    pub courses_with_batches: Vec<CourseBatches>,
    pub total_courses: usize,
    pub total_batches: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
