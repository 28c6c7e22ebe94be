#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use chrono::{NaiveDate, Utc};
use http_body_util::BodyExt;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::ServiceExt;

use catalog_backend::api::router;
use catalog_backend::config::AppConfig;
use catalog_backend::db::{self, repository};
use catalog_backend::mail::{Mailer, RecordingMailer, TemplateEngine};
use catalog_backend::models::{Course, NewBatchSchedule, NewCourse};
use catalog_backend::state::AppState;
use catalog_backend::storage::CurriculumStore;
use catalog_backend::validation::{MxOutcome, StaticMxResolver};
use catalog_backend::webhook::{RecordingWebhookClient, WebhookClient};

pub const NO_MX_DOMAIN: &str = "nonexistent-domain-xyz123.invalid";

pub struct TestApp {
    pub pool: SqlitePool,
    pub state: AppState,
    pub webhook: Arc<RecordingWebhookClient>,
    pub mailer: Arc<RecordingMailer>,
    pub media: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(AppConfig::default()).await
    }

    pub async fn with_config(config: AppConfig) -> Self {
        let pool = db::connect_in_memory().await.expect("db");
        let media = tempfile::tempdir().expect("tempdir");
        let resolver = StaticMxResolver::new(MxOutcome::Found).with(NO_MX_DOMAIN, MxOutcome::NoRecords);
        let webhook = Arc::new(RecordingWebhookClient::default());
        let mailer = Arc::new(RecordingMailer::default());

        let config = AppConfig {
            media_root: media.path().to_path_buf(),
            public_base_url: "http://catalog.test".to_string(),
            ..config
        };

        let state = AppState {
            db: pool.clone(),
            curriculum: CurriculumStore::new(media.path(), config.max_curriculum_bytes),
            config: Arc::new(config),
            resolver: Arc::new(resolver),
            webhook: Some(webhook.clone() as Arc<dyn WebhookClient>),
            mailer: Some(mailer.clone() as Arc<dyn Mailer>),
            templates: TemplateEngine::new().expect("templates"),
        };

        Self {
            pool,
            state,
            webhook,
            mailer,
            media,
        }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router().oneshot(request).await.expect("response")
    }

    pub async fn add_course(&self, title: &str, slug: &str) -> Course {
        repository::insert_course(
            &self.pool,
            NewCourse {
                title: title.to_string(),
                slug: Some(slug.to_string()),
                description: format!("{} course", title),
                image: None,
                students_enrolled: 120,
                duration: "8-12 weeks".to_string(),
                level: "Beginner".to_string(),
                rating: 4.7,
                modules_count: 6,
            },
        )
        .await
        .expect("insert course")
    }

    pub async fn add_batch(&self, course_id: i64, number: i64, start: NaiveDate, active: bool) {
        repository::insert_batch_schedule(
            &self.pool,
            course_id,
            &NewBatchSchedule {
                batch_number: number,
                title: format!("Batch {}", number),
                subtitle: "(Mon-Fri)".to_string(),
                start_date: start,
                start_day: "Monday".to_string(),
                time_slot: "7:00 PM - 9:00 PM".to_string(),
                duration: "10 weeks".to_string(),
                is_active: active,
            },
        )
        .await
        .expect("insert batch");
    }

    /// Writes a curriculum file through the store and points the course at it.
    pub async fn attach_curriculum(&self, course: &Course, name: &str, bytes: &[u8]) -> String {
        let relative = self
            .state
            .curriculum
            .store(&course.slug, name, bytes)
            .await
            .expect("store curriculum");
        repository::set_curriculum_file(&self.pool, course.id, Some(&relative), Some(Utc::now()))
            .await
            .expect("set curriculum");
        relative
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).expect("json body")
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes()
        .to_vec()
}
