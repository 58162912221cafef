use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use tracing::{info, warn};

mod config;
mod error;
mod handlers;
mod llm;
mod state;
mod store;
mod styling;
mod utils;

use config::CONFIG;
use handlers::create_router;
use llm::GeminiClient;
use state::AppState;
use store::ObjectStoreWardrobe;
use styling::{PipelineSettings, Stylist};
use utils::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let _guards = init_logging(&CONFIG.log_dir, &CONFIG.log_level);

    if !CONFIG.has_gemini_api_key() {
        warn!("GEMINI_API_KEY is not set; analysis requests will be rejected");
    }
    if CONFIG.wardrobe_store_url.is_empty() {
        return Err(anyhow!("WARDROBE_STORE_URL is required"));
    }

    let model = GeminiClient::from_config(&CONFIG);
    let store = ObjectStoreWardrobe::from_config(&CONFIG)?;
    info!(
        text_model = %model.text_model,
        image_model = %model.image_model,
        angle_model = %model.angle_model,
        store = %CONFIG.wardrobe_store_url,
        angle_views = CONFIG.enable_angle_views,
        "Starting wardrobe stylist"
    );

    let stylist = Stylist::new(
        Arc::new(model),
        Arc::new(store),
        PipelineSettings::from_config(&CONFIG),
    );
    let app = create_router(Arc::new(AppState::new(stylist)), CONFIG.max_request_bytes);

    let listener = tokio::net::TcpListener::bind(CONFIG.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", CONFIG.bind_addr))?;
    info!("Listening on http://{}", CONFIG.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
