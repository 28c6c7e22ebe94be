use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::db::repository;
use crate::error::AppError;
use crate::models::{
    AllBatchSchedulesResponse, BatchScheduleView, Course, CourseBatchSchedulesResponse,
    CourseBatches, CourseDetail, CourseSummary, CurriculumInfo, ModuleDetail,
};
use crate::storage::{CurriculumDocument, CurriculumFile, CurriculumStore, format_file_size};

/// Read side of the catalog plus curriculum transfer.
pub struct CatalogService {
    db: SqlitePool,
    curriculum: CurriculumStore,
    config: Arc<AppConfig>,
}

impl CatalogService {
    pub fn new(db: SqlitePool, curriculum: CurriculumStore, config: Arc<AppConfig>) -> Self {
        Self {
            db,
            curriculum,
            config,
        }
    }

    async fn course(&self, slug: &str) -> Result<Course, AppError> {
        repository::find_course_by_slug(&self.db, slug)
            .await?
            .ok_or_else(|| {
                warn!(slug = %slug, "course not found");
                AppError::NotFound("Course not found".to_string())
            })
    }

    pub async fn list_courses(&self) -> Result<Vec<CourseSummary>, AppError> {
        let courses = repository::fetch_courses(&self.db).await?;
        Ok(courses.iter().map(CourseSummary::from).collect())
    }

    pub async fn course_detail(&self, slug: &str) -> Result<CourseDetail, AppError> {
        let course = self.course(slug).await?;

        let overview = repository::fetch_overview(&self.db, course.id).await?;
        let (highlights, features): (Vec<_>, Vec<_>) = repository::fetch_highlights(&self.db, course.id)
            .await?
            .into_iter()
            .partition(|h| h.is_bullet);

        let mut topics_by_module: HashMap<i64, Vec<String>> = HashMap::new();
        for topic in repository::fetch_topics_for_course(&self.db, course.id).await? {
            topics_by_module.entry(topic.module_id).or_default().push(topic.title);
        }

        let curriculum = repository::fetch_modules(&self.db, course.id)
            .await?
            .into_iter()
            .map(|module| ModuleDetail {
                topics: topics_by_module.remove(&module.id).unwrap_or_default(),
                id: module.id,
                title: module.title,
                description: module.description,
            })
            .collect();

        let batch_schedules = repository::fetch_active_batches(&self.db, course.id)
            .await?
            .into_iter()
            .map(BatchScheduleView::from)
            .collect();

        Ok(CourseDetail {
            course: CourseSummary::from(&course),
            overview,
            highlights: highlights.into_iter().map(|h| h.point).collect(),
            features: features.into_iter().map(|h| h.point).collect(),
            curriculum,
            batch_schedules,
        })
    }

    pub async fn course_batches(&self, slug: &str) -> Result<CourseBatchSchedulesResponse, AppError> {
        let course = self.course(slug).await?;
        let batch_schedules: Vec<BatchScheduleView> = repository::fetch_active_batches(&self.db, course.id)
            .await?
            .into_iter()
            .map(BatchScheduleView::from)
            .collect();

        let message = batch_schedules
            .is_empty()
            .then(|| "No active batch schedules available for this course".to_string());

        Ok(CourseBatchSchedulesResponse {
            course_title: course.title,
            course_slug: course.slug,
            total_batches: batch_schedules.len(),
            batch_schedules,
            message,
        })
    }

    pub async fn all_batches(&self) -> Result<AllBatchSchedulesResponse, AppError> {
        let rows = repository::fetch_all_active_batches(&self.db).await?;
        let total_batches = rows.len();

        let mut courses_with_batches: Vec<CourseBatches> = Vec::new();
        let mut group_index: HashMap<String, usize> = HashMap::new();
        for row in rows {
            match group_index.get(&row.course_slug) {
                Some(&idx) => courses_with_batches[idx].batches.push(row.batch.into()),
                None => {
                    group_index.insert(row.course_slug.clone(), courses_with_batches.len());
                    courses_with_batches.push(CourseBatches {
                        course_title: row.course_title,
                        course_slug: row.course_slug,
                        batches: vec![row.batch.into()],
                    });
                }
            }
        }

        let message = (total_batches == 0).then(|| "No active batch schedules available".to_string());

        Ok(AllBatchSchedulesResponse {
            total_courses: courses_with_batches.len(),
            courses_with_batches,
            total_batches,
            message,
        })
    }

    pub async fn curriculum_info(&self, slug: &str) -> Result<CurriculumInfo, AppError> {
        let course = self.course(slug).await?;

        match self.curriculum.inspect(&course).await {
            CurriculumFile::Present { size, .. } => Ok(CurriculumInfo {
                has_file: true,
                file_name: course.curriculum_filename(),
                file_extension: course.curriculum_extension(),
                file_size: Some(format_file_size(size)),
                file_size_bytes: Some(size),
                uploaded_at: course.file_uploaded_at,
                download_url: Some(format!("/courses/{}/download-curriculum/", course.slug)),
                message: None,
            }),
            CurriculumFile::Absent | CurriculumFile::Missing { .. } => Ok(CurriculumInfo {
                has_file: false,
                message: Some("No curriculum file available".to_string()),
                ..CurriculumInfo::default()
            }),
        }
    }

    /// Loads the curriculum for download. When downloads are gated, `email` must belong to a verified enrollee.
    pub async fn download_curriculum(
        &self,
        slug: &str,
        email: Option<&str>,
    ) -> Result<CurriculumDocument, AppError> {
        let course = self.course(slug).await?;

        if self.config.download_requires_enrollment {
            let email = email
                .map(|e| e.trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .ok_or_else(|| AppError::Forbidden("An enrolled email is required to download the curriculum".to_string()))?;
            if !repository::is_verified_enrollee(&self.db, &email, course.id).await? {
                warn!(slug = %slug, email = %email, "curriculum download refused for non-enrollee");
                return Err(AppError::Forbidden(
                    "Email is not enrolled in this course".to_string(),
                ));
            }
        }

        match self.curriculum.inspect(&course).await {
            CurriculumFile::Absent => Err(AppError::NotFound(
                "No curriculum file available for this course".to_string(),
            )),
            CurriculumFile::Missing { .. } => {
                Err(AppError::NotFound("Curriculum file not found".to_string()))
            }
            CurriculumFile::Present { .. } => {
                let document = self
                    .curriculum
                    .load(&course)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Curriculum file not found".to_string()))?;
                info!(slug = %slug, file = %document.filename, "serving curriculum download");
                Ok(document)
            }
        }
    }

    /// Stores an uploaded curriculum file and points the course at it.
    pub async fn upload_curriculum(
        &self,
        slug: &str,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<CurriculumInfo, AppError> {
        let course = self.course(slug).await?;
        let relative = self.curriculum.store(&course.slug, original_name, bytes).await?;
        repository::set_curriculum_file(&self.db, course.id, Some(&relative), Some(Utc::now())).await?;
        self.curriculum_info(slug).await
    }
}
