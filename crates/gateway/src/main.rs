use common::init_observability;
use gateway::{AppState, GatewayConfig, annotate::load_font, router, uploads::UploadStore};
use inference::{Detector, InferenceConfig, backend::ort::OrtBackend};
use posts::PostStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env();

    let _telemetry = init_observability("gateway", config.otel_endpoint.as_deref(), config.environment)?;

    let inference_config = InferenceConfig::from_env()?;
    tracing::info!(
        config = ?config,
        inference = ?inference_config,
        "Loaded configuration"
    );

    let detector = tokio::task::spawn_blocking(move || {
        Detector::<OrtBackend>::load(&inference_config)
    })
    .await??;

    let posts = PostStore::open(config.posts_path()).await?;
    let uploads = UploadStore::open(config.uploads_dir()).await?;
    let font = load_font(&config.font_path);

    let state = AppState::new(detector, posts, uploads, font);
    tracing::info!(
        device = %state.device,
        model = %state.model_name,
        "Detector ready"
    );

    let app = router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.addr).await?;
    tracing::info!(addr = %config.addr, "Gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
