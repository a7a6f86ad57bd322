use actix_web::{web, App, HttpServer};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use postflow::config::AppConfig;
use postflow::delivery::HttpDelivery;
use postflow::lifecycle::{Collaborators, Engine};
use postflow::openapi::ApiDoc;
use postflow::repo::Repo;
use postflow::tasks::Background;
use postflow::{routes_config, telemetry, AppState};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env automatically only in debug builds.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    telemetry::init_tracing();

    let cfg = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    info!("Bootstrapping postflow");

    let metrics = match telemetry::install_metrics() {
        Ok(h) => Some(h),
        Err(e) => {
            warn!(error = %e, "metrics recorder not installed");
            None
        }
    };

    let repo = match build_repo(&cfg).await {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "failed to initialise repository");
            std::process::exit(1);
        }
    };

    if cfg.settings.review_group.is_none() {
        warn!("REVIEW_GROUP_ID not set, submissions will be refused");
    }

    let engine = Arc::new(Engine::new(
        Collaborators {
            repo,
            delivery: Arc::new(HttpDelivery::new(cfg.bot_api_base.clone(), cfg.bot_token.clone())),
            channels: Arc::new(cfg.channel_policy()),
            tags: Arc::new(cfg.tags.clone()),
            quota: Arc::new(cfg.post_options.clone()),
        },
        cfg.settings.clone(),
    ));
    let background = Background::start(engine.clone(), cfg.sweep_every, cfg.expiry_every);

    let state = AppState { engine, intake_token: cfg.intake_token.clone(), metrics };
    let openapi = ApiDoc::openapi();
    info!("OpenAPI spec generated");

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(routes_config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind(cfg.bind.as_str())?;

    info!(bind = %cfg.bind, "Listening");
    let result = server.run().await;
    background.shutdown().await;
    result
}

#[cfg(not(feature = "postgres-store"))]
async fn build_repo(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    use postflow::repo::inmem::InMemRepo;
    let repo = match cfg.data_dir.as_deref() {
        Some(dir) => {
            info!(dir, "Using in-memory repository with snapshots");
            InMemRepo::with_snapshot(dir)
        }
        None => {
            info!("Using in-memory repository backend");
            InMemRepo::new()
        }
    };
    Ok(Arc::new(repo))
}

#[cfg(feature = "postgres-store")]
async fn build_repo(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    use anyhow::Context;
    use postflow::repo::pg::PgRepo;
    use sqlx::postgres::PgPoolOptions;

    let url = cfg.database_url.as_deref().context("DATABASE_URL must be set for postgres-store")?;
    let pool = PgPoolOptions::new().max_connections(5).connect_lazy(url)?;
    let repo = PgRepo::new(pool);
    repo.migrate().await?;
    info!("Using Postgres repository backend");
    Ok(Arc::new(repo))
}
