use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::batch::BatchScheduleView;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Course {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub image: Option<String>,
    pub students_enrolled: i64,
    pub duration: String,
    pub level: String,
    pub rating: f64,
    pub modules_count: i64,
    /// Path relative to the media root, e.g. `curriculum_files/<slug>/<name>_<ts>.pdf`.
    pub curriculum_file: Option<String>,
    pub file_uploaded_at: Option<DateTime<Utc>>,
}

impl Course {
    fn stored_extension(&self) -> Option<&str> {
        let name = self.curriculum_file.as_deref()?;
        let file_name = name.rsplit('/').next().unwrap_or(name);
        file_name
            .rfind('.')
            .filter(|&idx| idx > 0)
            .map(|idx| &file_name[idx..])
    }

    /// Lowercased extension of the stored curriculum file, including the dot.
    pub fn curriculum_extension(&self) -> Option<String> {
        self.stored_extension().map(str::to_ascii_lowercase)
    }

    /// Filename offered to downloaders: `{title}_Curriculum{ext}`, keeping the stored extension.
    pub fn curriculum_filename(&self) -> Option<String> {
        self.curriculum_file.as_ref()?;
        let ext = self.stored_extension().unwrap_or_default();
        Some(format!("{}_Curriculum{}", self.title, ext))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCourse {
    pub title: String,
    /// Derived from the title when absent.
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub students_enrolled: i64,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub modules_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseSummary {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub image: Option<String>,
    pub students_enrolled: i64,
    pub duration: String,
    pub level: String,
    pub rating: f64,
    pub modules_count: i64,
    pub has_curriculum_file: bool,
}

impl From<&Course> for CourseSummary {
    fn from(course: &Course) -> Self {
        Self {
            id: course.id,
            title: course.title.clone(),
            slug: course.slug.clone(),
            description: course.description.clone(),
            image: course.image.clone(),
            students_enrolled: course.students_enrolled,
            duration: course.duration.clone(),
            level: course.level.clone(),
            rating: course.rating,
            modules_count: course.modules_count,
            has_curriculum_file: course.curriculum_file.is_some(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Overview {
    #[serde(skip_serializing)]
    pub course_id: i64,
    pub average_package: String,
    pub average_hike: String,
    pub transitions: String,
    pub salary_min: String,
    pub salary_avg: String,
    pub salary_max: String,
    pub priority_percentage: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOverview {
    pub average_package: String,
    pub average_hike: String,
    pub transitions: String,
    pub salary_min: String,
    pub salary_avg: String,
    pub salary_max: String,
    pub priority_percentage: String,
}

/// A course point: a curriculum highlight when `is_bullet`, otherwise a feature.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Highlight {
    pub id: i64,
    pub course_id: i64,
    pub point: String,
    pub is_bullet: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Module {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Topic {
    pub id: i64,
    pub module_id: i64,
    pub title: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleDetail {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseDetail {
    #[serde(flatten)]
    pub course: CourseSummary,
    pub overview: Option<Overview>,
    pub highlights: Vec<String>,
    pub features: Vec<String>,
    pub curriculum: Vec<ModuleDetail>,
    pub batch_schedules: Vec<BatchScheduleView>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct CurriculumInfo {
    pub has_file: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_extension: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
