use axum::{Router, middleware};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use vita_coach::AppState;
use vita_coach::handlers::{
    auth_middleware, chat_relay_handler, health_check, recommendations_handler,
};
use vita_coach::init::app_init;

fn create_app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/coach/chat", axum::routing::post(chat_relay_handler))
        .route(
            "/api/coach/recommendations",
            axum::routing::post(recommendations_handler),
        )
        .route_layer(middleware::from_fn(auth_middleware))
        .route("/health", axum::routing::get(health_check))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("🚀 Starting AI Health Coach relay...");
    dotenv::dotenv().ok();
    let (config, state) = app_init().await?;
    log::info!("✅ Application state initialized");
    let app = create_app_router(state);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    log::info!("");
    log::info!("🎉 Server started!");
    log::info!("📍 http://{}", addr);
    log::info!("📡 Chat relay: http://{}/api/coach/chat", addr);
    log::info!("💡 Recommendations: http://{}/api/coach/recommendations", addr);
    log::info!("❤️  Health: http://{}/health", addr);
    log::info!("");
    log::info!("🤖 Gateway: {} ({})", config.ai.base_url, config.ai.chat_model);
    if config.database_url.is_some() {
        log::info!("📊 Analytics: ai_request_logs");
    }
    log::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
