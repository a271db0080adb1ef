mod config;
mod error;
mod inference;
mod routes;
mod storage;

use actix_web::{middleware::Logger, web, App, HttpServer};
use config::ServiceConfig;
use inference::classifier::Classifier;
use inference::engine::load_engine;
use routes::{configure_routes, cors, UploadLimits};
use std::env;
use storage::upload_store::UploadStore;

fn startup_error(context: &str, e: impl std::fmt::Display) -> std::io::Error {
    log::error!("{}: {}", context, e);
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = ServiceConfig::load().map_err(|e| startup_error("Invalid configuration", e))?;
    log::info!("Loaded configuration: {:?}", config);

    let engine = load_engine(&config.model.path)
        .map_err(|e| startup_error("Failed to load model at startup", e))?;
    let classifier = Classifier::new(engine, config.model.confidence_threshold);
    classifier
        .self_check()
        .map_err(|e| startup_error("Model failed the startup check", e))?;
    log::info!(
        "Model {} ready, confidence threshold {}",
        config.model.path.display(),
        classifier.threshold()
    );

    let store = UploadStore::new(&config.storage.upload_dir)
        .map_err(|e| startup_error("Failed to prepare upload storage", e))?;
    log::info!("Storing uploads in {}", store.upload_dir().display());

    let limits = UploadLimits {
        max_upload_bytes: config.server.max_upload_bytes,
    };
    let classifier = web::Data::new(classifier);
    let store = web::Data::new(store);
    let limits = web::Data::new(limits);

    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(cors())
            .wrap(Logger::default())
            .app_data(classifier.clone())
            .app_data(store.clone())
            .app_data(limits.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
