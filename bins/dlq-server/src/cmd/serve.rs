use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use dlq_api_server::AppState;
use dlq_engine::discovery::TopicDiscovery;
use dlq_engine::fetch::TailFetcher;
use dlq_engine::policy::InMemoryPolicyStore;
use dlq_engine::replay::Replayer;
use dlq_kafka::KafkaBroker;

use crate::config::{ServeArgs, ServerConfig};
use crate::error::ServerError;

/// How long in-flight requests get to unwind after Ctrl+C.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(args: ServeArgs) -> Result<(), ServerError> {
    tracing::info!("dlq-server starting");

    // --- Load config ---
    let config = ServerConfig::load(&args.config)?.with_overrides(&args);
    tracing::info!(
        config = %args.config,
        bootstrap_servers = %config.kafka.bootstrap_servers,
        "loaded config"
    );

    // --- CancellationToken for graceful shutdown ---
    let token = CancellationToken::new();

    // --- Broker + engines ---
    let broker = Arc::new(KafkaBroker::new(config.kafka.clone())?);
    let state = AppState {
        discovery: Arc::new(TopicDiscovery::new(broker.clone(), &config.engine.discovery)?),
        fetcher: Arc::new(TailFetcher::new(
            broker.clone(),
            broker.clone(),
            config.engine.fetch.clone(),
        )),
        replayer: Arc::new(Replayer::new(broker, config.engine.replay.clone())),
        policies: Arc::new(InMemoryPolicyStore::new()),
        shutdown: token.clone(),
    };

    // --- API server ---
    let api_port = config.api_port;
    let api_token = token.clone();
    let mut api_handle = tokio::spawn(async move {
        dlq_api_server::run(api_port, state, api_token).await
    });
    tracing::info!(port = api_port, "server ready");

    // --- Wait for Ctrl+C or an early api failure ---
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            tracing::info!("shutting down...");
        }
        res = &mut api_handle => {
            token.cancel();
            return match res {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(ServerError::Api(e)),
                Err(e) => Err(ServerError::Api(format!("api task: {e}"))),
            };
        }
    }

    // Cancels every in-flight fetch and replay through its child token.
    token.cancel();

    match tokio::time::timeout(DRAIN_TIMEOUT, &mut api_handle).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => tracing::error!(error = %e, "api server error"),
        Ok(Err(e)) => tracing::error!(error = %e, "api task failed"),
        Err(_) => {
            tracing::warn!("api did not stop in time, aborting");
            api_handle.abort();
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}
