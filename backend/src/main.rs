mod chat;
mod config;
mod routes;
mod speech;
mod vision;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use chat::ChatService;
use config::ServerConfig;
use routes::configure_routes;
use speech::SpeechRecognizer;
use speech::listener::ListenOptions;
use speech::microphone::default_microphone;
use speech::synthesis::{CommandSynthesizer, SynthesisService};
use std::sync::Arc;
use vision::PredictionService;
use vision::metadata::ClassMetadata;
use vision::model::load_classifier;

fn startup_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    log::error!("{}: {}", context, err);
    std::io::Error::other(format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = std::env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    }

    let config = ServerConfig::load().map_err(|e| startup_error("Invalid configuration", e))?;

    let metadata = ClassMetadata::load(&config.model.class_names_path)
        .map_err(|e| startup_error("Failed to load class names", e))?;
    if metadata.is_empty() {
        log::warn!("Class names file is empty; every prediction will be Unknown");
    }
    let classifier = load_classifier(&config.model.model_path)
        .map_err(|e| startup_error("Model loading failed", e))?;
    let prediction =
        PredictionService::new(classifier, Arc::new(metadata), config.max_upload_bytes);

    let recognizer = SpeechRecognizer::new(
        default_microphone(),
        speech::transcribe::from_config(&config.speech),
        ListenOptions::from(&config.speech),
    );
    let chat = ChatService::new(chat::generator::from_config(&config.chat), recognizer);
    let synthesis = SynthesisService::new(Arc::new(CommandSynthesizer::from_config(
        &config.synthesis,
    )));

    let bind_address = config.bind_addr();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(web::Data::new(prediction.clone()))
            .app_data(web::Data::new(chat.clone()))
            .app_data(web::Data::new(synthesis.clone()))
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
