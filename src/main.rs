use std::sync::Arc;

use assessment_engine::{
    config::{get_config, init_config},
    database::{
        pool::create_pool, AttemptSessionStore, InMemoryAttemptStore, InMemoryTestStore, PgStore,
        TestDefinitionStore,
    },
    routes,
    services::scheduler_service::SchedulerConfig,
    utils::time::SystemClock,
    AppState,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_config()?;
    let config = get_config()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("assessment_engine=info,tower_http=info"));
    if config.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let tests: Arc<dyn TestDefinitionStore>;
    let attempts: Arc<dyn AttemptSessionStore>;
    match config.database_url.as_deref() {
        Some(url) => {
            let pool = create_pool(url).await?;
            let store = PgStore::new(pool);
            store.migrate().await?;
            info!("Using Postgres stores");
            tests = Arc::new(store.clone());
            attempts = Arc::new(store);
        }
        None => {
            info!("DATABASE_URL not set, using in-memory stores");
            tests = Arc::new(InMemoryTestStore::new());
            attempts = Arc::new(InMemoryAttemptStore::new());
        }
    }

    let scheduler_config = SchedulerConfig {
        autosave_interval: config.autosave_interval(),
        countdown_tick: config.countdown_tick(),
    };
    let app_state = AppState::new(
        tests,
        attempts,
        Arc::new(SystemClock),
        scheduler_config,
        config.jwt_secret.clone(),
    );

    let shutdown = CancellationToken::new();

    {
        let attempt_svc = app_state.attempt_service.clone();
        let token = shutdown.clone();
        let period = config.deadline_sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = attempt_svc.force_submit_expired().await {
                            tracing::error!(error = ?e, "Deadline sweep error");
                        }
                    }
                }
            }
        });
    }

    let app = routes::router(app_state.clone());

    let listener = TcpListener::bind(&config.server_address).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    app_state.schedulers.shutdown();
    Ok(())
}

async fn shutdown_signal(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
    token.cancel();
}
