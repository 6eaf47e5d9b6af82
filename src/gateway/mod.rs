//! HTTP gateway for the chatbot frontend.

pub mod api;

use crate::chat::ChatService;
use crate::config::{Config, GatewayConfig};
use crate::mail::{MailError, SmtpMailer, TranscriptMailer};
use crate::observability::{self, Observer};
use crate::prompts::PromptCatalog;
use crate::providers::{self, ModelSelector};
use crate::sessions::{self, Clock, SystemClock, TranscriptStore};
use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Shared, immutable request context. Cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
    pub store: Arc<dyn TranscriptStore>,
    pub prompts: Arc<PromptCatalog>,
    pub mailer: Option<Arc<dyn TranscriptMailer>>,
    pub observer: Arc<dyn Observer>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Wire every collaborator from config.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = sessions::create_transcript_store(&config.transcript_dir());
        let provider = providers::create_provider(&config.provider)?;
        let observer = observability::create_observer(&config.observability);
        let chat = ChatService::new(
            store.clone(),
            provider,
            ModelSelector::from_config(&config.provider),
            observer.clone(),
            config.transcript.context_window,
            config.provider.max_output_tokens,
        );

        let mailer: Option<Arc<dyn TranscriptMailer>> = match SmtpMailer::from_config(&config.smtp)
        {
            Ok(mailer) => Some(Arc::new(mailer)),
            Err(MailError::NotConfigured) => {
                tracing::info!("smtp.server not set; /send_transcript is disabled");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "SMTP configuration rejected; /send_transcript is disabled");
                None
            }
        };

        Ok(Self {
            chat: Arc::new(chat),
            store,
            prompts: Arc::new(PromptCatalog::new(config.prompts_path())),
            mailer,
            observer,
            clock: Arc::new(SystemClock),
        })
    }
}

fn cors_layer(config: &GatewayConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    }
}

/// All routes with body-size, timeout and CORS layers applied.
pub fn build_router(state: AppState, config: &GatewayConfig) -> Router {
    Router::new()
        .route("/start_conversation", post(api::handle_start_conversation))
        .route("/get_response", post(api::handle_get_response))
        .route("/get_conversation", get(api::handle_get_conversation))
        .route("/clear_conversation", post(api::handle_clear_conversation))
        .route("/send_transcript", post(api::handle_send_transcript))
        .route("/data", get(api::handle_get_data))
        .route("/save_prompt", post(api::handle_save_prompt))
        .route("/update_prompt", post(api::handle_update_prompt))
        .route("/delete_prompt", post(api::handle_delete_prompt))
        .route("/health", get(api::handle_health))
        .route("/metrics", get(api::handle_metrics))
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )))
        .layer(cors_layer(config))
}

/// Bind and serve until Ctrl-C.
pub async fn run_gateway(host: &str, port: u16, config: Config) -> Result<()> {
    let transcript_dir = config.transcript_dir();
    tokio::fs::create_dir_all(&transcript_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create transcript directory: {}",
                transcript_dir.display()
            )
        })?;

    let state = AppState::from_config(&config)?;
    let app = build_router(state, &config.gateway);

    let listener = TcpListener::bind(format!("{host}:{port}"))
        .await
        .with_context(|| format!("Failed to bind gateway to {host}:{port}"))?;
    let addr = listener.local_addr()?;

    tracing::info!(
        addr = %addr,
        transcripts = %transcript_dir.display(),
        prompts = %config.prompts_path().display(),
        context_window = config.transcript.context_window,
        "Gateway listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutting down gateway");
        })
        .await
        .context("Gateway server error")
}
