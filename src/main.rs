use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use catalog_backend::api::router;
use catalog_backend::config::AppConfig;
use catalog_backend::db;
use catalog_backend::mail::{Mailer, SmtpMailer, TemplateEngine};
use catalog_backend::state::AppState;
use catalog_backend::storage::CurriculumStore;
use catalog_backend::validation::HickoryMxResolver;
use catalog_backend::webhook::{HttpWebhookClient, WebhookClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "catalog_backend=debug,tower_http=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(AppConfig::from_env()?);

    let pool = db::connect(&config.database_url).await?;

    let webhook: Option<Arc<dyn WebhookClient>> = match &config.webhook_url {
        Some(url) => Some(Arc::new(HttpWebhookClient::new(url.clone(), config.webhook_timeout)?)),
        None => {
            warn!("ENROLLMENT_WEBHOOK_URL not set, enrollment webhook disabled");
            None
        }
    };

    let mailer: Option<Arc<dyn Mailer>> = match &config.smtp {
        Some(smtp) => Some(Arc::new(SmtpMailer::new(smtp.clone())?)),
        None => {
            warn!("SMTP_HOST not set, enrollment emails disabled");
            None
        }
    };

    let state = AppState {
        db: pool,
        config: config.clone(),
        resolver: Arc::new(HickoryMxResolver::new(config.dns_timeout)),
        webhook,
        mailer,
        templates: TemplateEngine::new()?,
        curriculum: CurriculumStore::new(config.media_root.clone(), config.max_curriculum_bytes),
    };

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
