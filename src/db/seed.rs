//! Bulk catalog loading from a JSON document.

use serde::Deserialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info};

use super::repository;
use crate::models::{NewBatchSchedule, NewCourse, NewOverview};
use crate::slug::slugify;

/// Batches shown per course.
pub const MAX_BATCHES_PER_COURSE: usize = 4;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("invalid catalog file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("course {slug:?} lists {count} batches, at most {max} are allowed", max = MAX_BATCHES_PER_COURSE)]
    TooManyBatches { slug: String, count: usize },

    #[error("course title must not be empty")]
    MissingTitle,
}

#[derive(Debug, Deserialize)]
pub struct CatalogSeed {
    pub courses: Vec<CourseSeed>,
}

#[derive(Debug, Deserialize)]
pub struct CourseSeed {
    #[serde(flatten)]
    pub course: NewCourse,
    #[serde(default)]
    pub overview: Option<NewOverview>,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub modules: Vec<ModuleSeed>,
    #[serde(default)]
    pub batches: Vec<NewBatchSchedule>,
}

#[derive(Debug, Deserialize)]
pub struct ModuleSeed {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub topics: Vec<String>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedStats {
    pub created: usize,
    pub skipped: usize,
}

impl CatalogSeed {
    pub fn from_json(raw: &str) -> Result<Self, SeedError> {
        Ok(serde_json::from_str(raw)?)
    }
}

impl CourseSeed {
    /// The explicit slug, or the slugified title. No timestamp suffix, so reruns find the same row.
    fn slug(&self) -> String {
        self.course
            .slug
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| slugify(&self.course.title))
    }
}

/// Loads every course in one transaction. Existing slugs are skipped.
/// Without `apply` the transaction is rolled back and only the counts are reported.
pub async fn load_catalog(
    pool: &SqlitePool,
    seed: CatalogSeed,
    apply: bool,
) -> Result<SeedStats, SeedError> {
    for course in &seed.courses {
        if course.course.title.trim().is_empty() {
            return Err(SeedError::MissingTitle);
        }
        if course.batches.len() > MAX_BATCHES_PER_COURSE {
            return Err(SeedError::TooManyBatches {
                slug: course.slug(),
                count: course.batches.len(),
            });
        }
    }

    let mut stats = SeedStats::default();
    let mut tx = pool.begin().await?;

    for entry in seed.courses {
        let slug = entry.slug();
        if repository::find_course_by_slug(&mut *tx, &slug).await?.is_some() {
            debug!(slug = %slug, "course already present, skipping");
            stats.skipped += 1;
            continue;
        }

        let course = repository::insert_course(
            &mut *tx,
            NewCourse {
                slug: Some(slug),
                ..entry.course
            },
        )
        .await?;

        if let Some(overview) = &entry.overview {
            repository::insert_overview(&mut *tx, course.id, overview).await?;
        }
        for point in &entry.highlights {
            repository::insert_highlight(&mut *tx, course.id, point, true).await?;
        }
        for point in &entry.features {
            repository::insert_highlight(&mut *tx, course.id, point, false).await?;
        }
        for module in &entry.modules {
            let inserted =
                repository::insert_module(&mut *tx, course.id, &module.title, &module.description)
                    .await?;
            for topic in &module.topics {
                repository::insert_topic(&mut *tx, inserted.id, topic).await?;
            }
        }
        for batch in &entry.batches {
            repository::insert_batch_schedule(&mut *tx, course.id, batch).await?;
        }

        info!(slug = %course.slug, modules = entry.modules.len(), batches = entry.batches.len(), "course loaded");
        stats.created += 1;
    }

    if apply {
        tx.commit().await?;
    } else {
        tx.rollback().await?;
    }

    Ok(stats)
}
