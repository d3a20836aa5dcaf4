//! Application wiring: configuration, backend selection and shared state

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use siemq_api::AppState;
use siemq_context::ContextStore;
use siemq_conversation::ConversationManager;
use siemq_core::{AppConfig, BackendConfig, BackendKind, SchemaRegistry};
use siemq_infra::{ElasticsearchExecutor, InMemoryExecutor, QueryExecutor};

use crate::cli::Args;
use crate::server::Server;

pub struct App {
    config: AppConfig,
    state: AppState,
    sweeper: JoinHandle<()>,
}

impl App {
    /// Build the application with all dependencies
    pub fn build(args: Args) -> Result<Self> {
        args.validate().context("Invalid command line arguments")?;

        let config = load_config(&args)?;
        let schema = Arc::new(SchemaRegistry::standard());

        let store = Arc::new(ContextStore::with_system_clock(config.context.clone()));
        let sweeper = store.spawn_sweeper(config.context.sweep_interval());

        let backend = build_backend(&config.backend, schema.clone())?;
        let manager = ConversationManager::new(schema, store, backend, &config.query);

        Ok(Self {
            config,
            state: AppState::new(Arc::new(manager)),
            sweeper,
        })
    }

    pub async fn run(self) -> Result<()> {
        let result = Server::new(self.config.server.clone(), self.state)
            .run()
            .await;
        self.sweeper.abort();
        result
    }
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let path = path
                .to_str()
                .context("Configuration path is not valid UTF-8")?;
            info!(path, "Loading configuration file");
            AppConfig::load_from_file(path)
        }
        None => AppConfig::load(),
    }
    .context("Failed to load configuration")?;

    if let Some(port) = args.port {
        config.server.port = port;
    }
    Ok(config)
}

fn build_backend(
    config: &BackendConfig,
    schema: Arc<SchemaRegistry>,
) -> Result<Arc<dyn QueryExecutor>> {
    let backend: Arc<dyn QueryExecutor> = match config.kind {
        BackendKind::Memory => match &config.events_file {
            Some(path) => {
                let executor = InMemoryExecutor::from_json_file(path)
                    .context("Failed to load events file")?;
                info!(path = %path, events = executor.len(), "Loaded events file");
                Arc::new(executor)
            }
            None => {
                let executor = InMemoryExecutor::with_sample_events(Utc::now());
                info!(events = executor.len(), "Using built-in sample events");
                Arc::new(executor)
            }
        },
        BackendKind::Elasticsearch => Arc::new(
            ElasticsearchExecutor::from_config(config, schema)
                .context("Invalid Elasticsearch backend configuration")?,
        ),
    };
    Ok(backend)
}
