use std::env;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use catalog_backend::config::AppConfig;
use catalog_backend::db;
use catalog_backend::db::seed::{CatalogSeed, load_catalog};

fn is_dry_run() -> bool {
    !env::args().any(|a| a == "--apply")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "catalog_backend=info,seed_catalog=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let Some(path) = env::args().skip(1).find(|a| !a.starts_with("--")) else {
        eprintln!("usage: seed_catalog <catalog.json> [--apply]");
        std::process::exit(2);
    };

    let config = AppConfig::from_env()?;
    let raw = tokio::fs::read_to_string(&path).await?;
    let seed = CatalogSeed::from_json(&raw)?;

    let pool = db::connect(&config.database_url).await?;
    let dry_run = is_dry_run();
    let stats = load_catalog(&pool, seed, !dry_run).await?;

    if dry_run {
        println!(
            "[DRY RUN] Would create {} courses, skip {} existing",
            stats.created, stats.skipped
        );
    } else {
        info!(created = stats.created, skipped = stats.skipped, "catalog seeded");
        println!("Courses created: {}, skipped: {}", stats.created, stats.skipped);
    }

    Ok(())
}
