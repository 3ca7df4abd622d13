// src/main.rs
use actix_files::Files;
use actix_web::{App, HttpServer, middleware, web};
use log::{info, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

mod config;
mod errors;
mod handlers;
mod models;
mod services;

use crate::config::AppConfig;
use crate::handlers::configure_routes;
use crate::services::{ImagePipeline, ImageProcessor, LLMService};

pub struct AppState {
    pipeline: Arc<ImagePipeline>,
    vision_provider: String,
    max_payload_bytes: usize,
    started_at: Instant,
}

impl AppState {
    pub fn new(
        pipeline: Arc<ImagePipeline>,
        vision_provider: impl Into<String>,
        max_payload_bytes: usize,
    ) -> Self {
        Self {
            pipeline,
            vision_provider: vision_provider.into(),
            max_payload_bytes,
            started_at: Instant::now(),
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting Snapscribe service...");

    let config = AppConfig::from_env()?;

    let llm_service = Arc::new(LLMService::from_config(&config)?);
    let image_processor = Arc::new(ImageProcessor::new(
        config.max_image_dimension,
        config.resize_target,
    ));
    let vision_provider = llm_service.vision_provider().to_string();
    let pipeline = Arc::new(ImagePipeline::new(llm_service, image_processor));

    let app_state = web::Data::new(AppState::new(
        pipeline,
        vision_provider.clone(),
        config.max_payload_bytes,
    ));

    let static_dir = config
        .static_dir
        .clone()
        .filter(|dir| {
            let exists = Path::new(dir).is_dir();
            if !exists {
                warn!("STATIC_DIR {} is not a directory, UI will not be served", dir);
            }
            exists
        });

    let max_payload_bytes = config.max_payload_bytes;
    info!(
        "Starting HTTP server on {} (vision provider: {}, image model: {})",
        config.bind_addr, vision_provider, config.image_model
    );

    HttpServer::new(move || {
        let mut app = App::new()
            .app_data(app_state.clone())
            .wrap(middleware::Logger::default())
            .configure(|cfg| configure_routes(cfg, max_payload_bytes));

        if let Some(dir) = &static_dir {
            app = app.service(Files::new("/", dir).index_file("index.html"));
        }
        app
    })
    .bind(config.bind_addr.as_str())?
    .run()
    .await?;

    Ok(())
}
