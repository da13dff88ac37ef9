use recipe_core::observability::init_tracing;
use recipe_service::config::RecipeConfig;
use recipe_service::services::init_metrics;
use recipe_service::Application;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Configuration comes first so logging can honour LOG_LEVEL and
    // OTLP_ENDPOINT; failures here go to stderr.
    let config = RecipeConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    init_tracing(
        "recipe-service",
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );
    init_metrics();

    let application = Application::build(config).await.map_err(|e| {
        tracing::error!("Failed to start recipe-service: {}", e);
        std::io::Error::other(format!("Startup error: {}", e))
    })?;

    application.run_until_stopped().await
}
