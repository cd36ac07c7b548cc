use tokio::net::TcpListener;
use grad_finder::{api::routes::create_router, config::Config, telemetry, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init();

    let config = Config::load()?;
    let server_addr = config.server_addr;
    if config.search_api_key.is_none() {
        tracing::warn!("TAVILY_API_KEY not set; every request will fail with a configuration error");
    }
    if config.llm_api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY not set; results will fall back to raw search hits");
    }

    let app = create_router(AppState::new(config));
    let listener = TcpListener::bind(server_addr).await?;
    tracing::info!(%server_addr, version = env!("CARGO_PKG_VERSION"), "grad-finder listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("ctrl-c received; shutting down"),
                Err(err) => tracing::error!(error = %err, "failed to listen for ctrl-c; shutting down"),
            }
        })
        .await?;

    Ok(())
}
