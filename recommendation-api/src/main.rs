use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::{anyhow, Result};
use clap::Parser;
use soilsense_api::{
    api::{self, auth::JwtVerifier},
    config::ApiConfig,
    services::ChangeListener,
    storage::{create_db_pool, verify_schema, PgResultSink},
    AppState,
};
use soilsense_inference::{load_layered, HttpImageFetcher, Pipeline};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config/soilsense.yaml")]
    config: String,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[actix_web::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level)?;

    let config: ApiConfig = load_layered(&args.config)?;
    if let Err(problems) = config.validate() {
        for problem in &problems {
            error!("{}", problem);
        }
        return Err(anyhow!("invalid configuration: {}", problems.join("; ")));
    }

    // Database
    let db_pool = create_db_pool(
        &config.database.url,
        config.database.max_connections,
        config.database.run_migrations,
    )
    .await?;
    verify_schema(&db_pool).await?;

    if config.listener.enabled {
        let listener = ChangeListener::new(db_pool.clone());
        tokio::spawn(async move {
            if let Err(e) = listener.start().await {
                error!("Change listener failed: {}", e);
            }
        });
    }

    // Models and reference tables
    let images = Arc::new(HttpImageFetcher::new(&config.inference.fetch)?);
    let sink = Arc::new(PgResultSink::new(db_pool));
    let pipeline = Pipeline::from_config(&config.inference, images, sink)?;

    let app_state = web::Data::new(AppState {
        pipeline: Arc::new(pipeline),
        verifier: Arc::new(JwtVerifier::new(&config.auth.jwt_secret)),
    });

    let server_config = config.server.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(api::cors(&server_config.cors_origins))
            .service(web::scope(&server_config.api_prefix).configure(api::configure))
    })
    .bind((config.server.host.clone(), config.server.port))?
    .run();

    info!(
        "SoilSense API listening on {}:{}",
        config.server.host, config.server.port
    );

    server.await?;

    info!("SoilSense API stopped");
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}
