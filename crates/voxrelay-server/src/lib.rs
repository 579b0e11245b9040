//! Voice relay server library logic.

pub mod api;
pub mod api_voice;
pub mod background;
pub mod config;
pub mod multipart;
pub mod pipeline;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue},
    routing::{get, post},
    Extension, Router,
};
use config::Config;
use pipeline::VoicePipeline;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Request orchestrator.
    pub pipeline: Arc<VoicePipeline>,
    /// Deployment root for static assets.
    pub static_dir: PathBuf,
    /// Directory synthesized replies are served from.
    pub audio_dir: PathBuf,
    /// URL prefix `audio_dir` is mounted under.
    pub audio_url_prefix: String,
    /// Maximum request body size.
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(pipeline: Arc<VoicePipeline>, config: &Config) -> Self {
        Self {
            audio_dir: pipeline.tts().output_dir().to_path_buf(),
            pipeline,
            static_dir: config.server.static_dir.clone(),
            audio_url_prefix: config.tts.url_prefix.trim_end_matches('/').to_string(),
            max_upload_bytes: config.server.max_upload_bytes,
        }
    }
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let router = Router::new()
        .route("/health", get(api::health))
        .route("/api/voice-send", post(api_voice::voice_send_handler))
        .route("/api/reset", post(api_voice::reset_handler))
        .route("/api/voices", get(api_voice::voices_handler));

    // Synthesized replies under /audio/*
    tracing::info!(path = %state.audio_dir.display(), prefix = %state.audio_url_prefix, "serving synthesized audio");
    let router = router.nest_service(&state.audio_url_prefix, ServeDir::new(&state.audio_dir));

    // Everything else is a static asset, never cached.
    if !state.static_dir.exists() {
        tracing::info!(path = %state.static_dir.display(), "static directory not found, fallback will 404");
    }
    let static_files = ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::PRAGMA,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::EXPIRES,
            HeaderValue::from_static("0"),
        ))
        .service(ServeDir::new(&state.static_dir));
    let router = router.fallback_service(static_files);

    router
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(CatchPanicLayer::custom(api::panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
