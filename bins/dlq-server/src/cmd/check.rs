use crate::config::{ServeArgs, ServerConfig};
use crate::error::ServerError;

pub fn run(args: ServeArgs) -> Result<(), ServerError> {
    let config = ServerConfig::load(&args.config)?.with_overrides(&args);
    let engine = &config.engine;

    let mut allow: Vec<&str> = engine
        .replay
        .header_allow_list
        .as_set()
        .iter()
        .map(String::as_str)
        .collect();
    allow.sort_unstable();

    tracing::info!(
        config = %args.config,
        api_port = config.api_port,
        bootstrap_servers = %config.kafka.bootstrap_servers,
        "configuration ok"
    );
    tracing::info!(
        pattern = %engine.discovery.pattern,
        default_limit = engine.fetch.default_limit,
        max_limit = engine.fetch.max_limit,
        deadline_ms = engine.fetch.deadline_ms,
        poll_wait_ms = engine.fetch.poll_wait_ms,
        throttle_per_sec = engine.replay.throttle_per_sec,
        header_allow_list = %allow.join(","),
        "engine settings"
    );
    Ok(())
}
