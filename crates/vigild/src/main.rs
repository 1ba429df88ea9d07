use anyhow::Result;
use tracing_subscriber::EnvFilter;

use vigil_core::Verifier;
use vigil_store::Store;

use vigild::config::Config;
use vigild::engine::spawn_engine;
use vigild::router::build_router;
use vigild::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    tracing::info!(
        backend = ?config.backend,
        db = %config.db_path.display(),
        "vigild starting"
    );

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = Store::open(&config.db_path).await?;

    let backend = config.build_backend();
    let backend_label = backend.label();
    let verifier = Verifier::new(backend).with_tolerance(config.tolerance);
    let engine = spawn_engine(verifier);

    let state = AppState::new(store, engine, &config, backend_label);
    let router = build_router(state);

    let addr = format!("0.0.0.0:{}", config.listen_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "vigild listening");
    axum::serve(listener, router).await?;

    Ok(())
}
