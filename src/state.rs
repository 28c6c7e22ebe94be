use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::AppConfig;
use crate::mail::{Mailer, TemplateEngine};
use crate::services::{CatalogService, EnrollmentService};
use crate::storage::CurriculumStore;
use crate::validation::{EmailValidator, MxResolver};
use crate::webhook::WebhookClient;

/// Shared handles for request handlers. Unconfigured integrations are `None`.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<AppConfig>,
    pub resolver: Arc<dyn MxResolver>,
    pub webhook: Option<Arc<dyn WebhookClient>>,
    pub mailer: Option<Arc<dyn Mailer>>,
    pub templates: TemplateEngine,
    pub curriculum: CurriculumStore,
}

impl AppState {
    pub fn catalog(&self) -> CatalogService {
        CatalogService::new(self.db.clone(), self.curriculum.clone(), self.config.clone())
    }

    pub fn enrollment(&self) -> EnrollmentService {
        EnrollmentService::new(
            self.db.clone(),
            EmailValidator::new(self.resolver.clone()),
            self.webhook.clone(),
            self.mailer.clone(),
            self.templates.clone(),
            self.curriculum.clone(),
            self.config.clone(),
        )
    }
}
