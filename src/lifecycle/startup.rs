//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize all subsystems in dependency order
//! - Start background tasks (change feed, schema pipeline, reconciliation)
//! - Bind the listener and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - The listener starts last (traffic only when ready)

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::time::MissedTickBehavior;

use crate::config::{ReconciliationConfig, RegistryConfig};
use crate::http::{AppState, HttpServer};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::shutdown_on_signal;
use crate::policy::{OpaCompiler, PolicyAttachmentManager, ScratchArea};
use crate::registry::Registry;
use crate::repository::ResourceRepository;
use crate::storage::{self, StoreError};
use crate::sync::{ChangeFeed, SchemaBroadcast, SchemaSyncPipeline};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to initialize storage: {0}")]
    Storage(#[from] StoreError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// The wired core, before any task is spawned.
pub struct Components {
    pub registry: Arc<Registry>,
    pub schema: SchemaBroadcast,
    pub state: AppState,
}

pub fn build_components(config: &RegistryConfig) -> Result<Components, StartupError> {
    let store = storage::from_config(&config.storage)?;
    let backend = store.backend_name();
    let repository = Arc::new(ResourceRepository::new(store));

    let scratch_dir = &config.policy.scratch_dir;
    let compiler = OpaCompiler::new(config.policy.opa_binary.clone(), scratch_dir.join("build"));
    let attachments =
        PolicyAttachmentManager::new(ScratchArea::new(scratch_dir.join("attachments"))).with_compiler(Arc::new(compiler));

    let registry = Arc::new(Registry::new(repository, attachments, config.retries.clone()));
    let schema = SchemaBroadcast::new();
    let state = AppState {
        registry: registry.clone(),
        schema: schema.clone(),
        admin_api_key: config.admin.api_key.as_deref().map(Arc::from),
        backend,
    };

    Ok(Components {
        registry,
        schema,
        state,
    })
}

/// Start every subsystem and serve until a termination signal arrives.
pub async fn run(config: RegistryConfig) -> Result<(), StartupError> {
    let components = build_components(&config)?;
    let shutdown = Shutdown::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    let snapshots = ChangeFeed::new(
        components.registry.repository().clone(),
        Duration::from_millis(config.sync.poll_interval_ms),
        config.sync.watch_filesystem,
    )
    .spawn(shutdown.subscribe());
    tokio::spawn(SchemaSyncPipeline::new(components.schema.clone()).run(snapshots));

    if config.reconciliation.enabled {
        tokio::spawn(reconcile_periodically(
            components.registry.clone(),
            config.reconciliation.clone(),
            shutdown.clone(),
        ));
    }

    let address = config.listener.bind_address.clone();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind { address, source })?;

    HttpServer::new(&config.listener, components.state)
        .run(listener, shutdown.signalled())
        .await
        .map_err(StartupError::Serve)?;

    // The server may also stop on its own; make sure the background tasks follow.
    shutdown.trigger();
    Ok(())
}

async fn reconcile_periodically(registry: Arc<Registry>, config: ReconciliationConfig, shutdown: Shutdown) {
    let mut stop = shutdown.subscribe();
    let mut ticker = tokio::time::interval(Duration::from_secs(config.interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop.recv() => break,
            _ = ticker.tick() => match registry.reconcile().await {
                Ok(report) if report.is_clean() => tracing::debug!("Policy attachments consistent"),
                Ok(report) => tracing::info!(
                    regenerated = report.regenerated.len(),
                    removed = report.removed.len(),
                    failed = report.failed.len(),
                    "Reconciliation sweep repaired attachments"
                ),
                Err(e) => tracing::warn!(error = %e, "Reconciliation sweep failed"),
            },
        }
    }
    tracing::info!("Reconciliation loop stopped");
}
