use std::path::Path;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use dlq_engine::config::EngineConfig;
use dlq_kafka::KafkaConfig;

use crate::error::ServerError;

#[derive(Parser)]
#[command(name = "dlq-server", about = "Dead-letter topic explorer and replay service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP service.
    Serve(ServeArgs),
    /// Load and validate the configuration, then print the effective settings.
    CheckConfig(ServeArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Path to TOML config file.
    #[arg(long, default_value = "config.toml", env = "DLQ_CONFIG")]
    pub config: String,

    /// Overrides `kafka.bootstrap_servers`.
    #[arg(long, env = "KAFKA_BOOTSTRAP_SERVERS")]
    pub bootstrap_servers: Option<String>,

    /// Overrides `api_port`.
    #[arg(long, env = "DLQ_API_PORT")]
    pub port: Option<u16>,
}

// ---- TOML Config ----

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default)]
    pub kafka: KafkaConfig,
    /// `[discovery]`, `[fetch]` and `[replay]`.
    #[serde(flatten)]
    pub engine: EngineConfig,
}

fn default_api_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            kafka: KafkaConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from `path`. A missing file yields the built-in defaults.
    pub fn load(path: &str) -> Result<Self, ServerError> {
        if !Path::new(path).exists() {
            tracing::warn!(config = %path, "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| ServerError::Config {
            context: "read",
            detail: format!("'{path}': {e}"),
        })?;
        Self::parse(&content).map_err(|e| match e {
            ServerError::Config { context, detail } => ServerError::Config {
                context,
                detail: format!("'{path}': {detail}"),
            },
            other => other,
        })
    }

    pub fn parse(content: &str) -> Result<Self, ServerError> {
        let config: Self = toml::from_str(content).map_err(|e| ServerError::Config {
            context: "parse",
            detail: e.to_string(),
        })?;
        config.engine.validate().map_err(|e| ServerError::Config {
            context: "validate",
            detail: e.to_string(),
        })?;
        Ok(config)
    }

    /// Apply command-line and environment overrides.
    pub fn with_overrides(mut self, args: &ServeArgs) -> Self {
        if let Some(servers) = &args.bootstrap_servers {
            self.kafka.bootstrap_servers = servers.clone();
        }
        if let Some(port) = args.port {
            self.api_port = port;
        }
        self
    }
}
