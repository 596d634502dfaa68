//! Ignition – assembles the running dashboard from a [`Config`].
//!
//! Boot order: reading store, event bus, dashboard loop, cockpit server.
//! Everything async runs on one multi-threaded tokio runtime owned by
//! [`Station`]; the REPL thread drives it through [`Station::block_on`].

use std::future::Future;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use heatex_cockpit::CockpitServer;
use heatex_memory::SqliteReadingStore;
use heatex_middleware::{
    DatabaseRoundTripAdapter, EventBus, HttpNegotiator, PublishClient, SimulatorAdapter,
    WsConnector,
};
use heatex_runtime::{BusDisplaySink, DataSources, Dashboard, DashboardConfig, DashboardHandle};
use tokio::runtime::Runtime;
use tracing::{error, warn};

use crate::config::Config;

const BUS_CAPACITY: usize = 256;

/// A booted dashboard and the clients the REPL needs alongside it.
pub struct Station {
    runtime: Runtime,
    pub dashboard: DashboardHandle,
    pub bus: EventBus,
    pub store: Arc<SqliteReadingStore>,
    pub negotiator: Arc<HttpNegotiator>,
    pub publisher: PublishClient,
    pub simulator: SimulatorAdapter,
    pub pubsub_configured: bool,
    pub cockpit_port: u16,
}

impl Station {
    /// Boot every layer, printing one line per step.
    pub fn ignite(cfg: &Config) -> Result<Self, String> {
        let runtime = Runtime::new().map_err(|e| format!("Failed to start async runtime: {e}"))?;

        println!("{}", "═══════════════════════════════════════".bold());
        println!("{}", "        Heat Exchanger Dashboard       ".bold().cyan());
        println!("{}", "═══════════════════════════════════════".bold());

        // ── Step 1 – Reading store ──────────────────────────────────────────
        step(1, "Opening reading store (SQLite)");
        let store = match open_store(&cfg.database_path) {
            StoreOpen::File(store) => {
                println!("{} {}", "OK".green(), store.location().dimmed());
                store
            }
            StoreOpen::Fallback(store, reason) => {
                println!("{} {}", "IN-MEMORY".yellow(), reason.dimmed());
                store
            }
            StoreOpen::Failed(reason) => {
                println!("{}", "FAILED".red());
                return Err(reason);
            }
        };
        let store = Arc::new(store);

        // ── Step 2 – Event bus ──────────────────────────────────────────────
        step(2, "Initializing Event Bus");
        let bus = EventBus::new(BUS_CAPACITY);
        println!("{}", "OK".green());

        // ── Step 3 – Dashboard loop ─────────────────────────────────────────
        step(3, &format!("Starting dashboard (mode: {})", cfg.initial_mode));
        let negotiator = Arc::new(
            HttpNegotiator::new(cfg.pubsub_url.clone()).with_access_key(cfg.pubsub_access_key.clone()),
        );
        let sources = DataSources {
            simulator: Arc::new(SimulatorAdapter::new()),
            database: Arc::new(
                DatabaseRoundTripAdapter::new(store.clone()).with_settle_delay(cfg.settle_delay()),
            ),
            negotiator: negotiator.clone(),
            connector: Arc::new(WsConnector::new()),
        };
        let dashboard_config = DashboardConfig {
            initial_mode: cfg.initial_mode,
            poll_interval: cfg.poll_interval(),
            backoff: cfg.backoff(),
        };
        let (dashboard, handle) =
            Dashboard::new(dashboard_config, sources, Arc::new(BusDisplaySink::new(bus.clone())));
        runtime.spawn(dashboard.run());
        println!("{}", "OK".green());

        // ── Step 4 – Cockpit ────────────────────────────────────────────────
        step(4, &format!("Serving cockpit on http://localhost:{}", cfg.cockpit_port));
        let cockpit = CockpitServer::new(bus.clone(), handle.clone()).with_port(cfg.cockpit_port);
        runtime.spawn(async move {
            if let Err(e) = cockpit.run().await {
                error!(error = %e, "cockpit server stopped");
            }
        });
        println!("{}", "OK".green());
        println!("{}", "═══════════════════════════════════════".bold());

        Ok(Self {
            runtime,
            dashboard: handle,
            bus,
            store,
            negotiator,
            publisher: PublishClient::new(cfg.pubsub_url.clone())
                .with_access_key(cfg.pubsub_access_key.clone()),
            simulator: SimulatorAdapter::new(),
            pubsub_configured: !cfg.pubsub_url.trim().is_empty(),
            cockpit_port: cfg.cockpit_port,
        })
    }

    /// Run `future` to completion on the station's runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Stop the dashboard loop, then the runtime.
    pub fn shutdown(self) {
        if let Err(e) = self.runtime.block_on(self.dashboard.shutdown()) {
            warn!(error = %e, "dashboard already stopped");
        }
        self.runtime.shutdown_timeout(Duration::from_secs(2));
    }
}

fn step(n: usize, label: &str) {
    print!("  [{n}/4] {} … ", label.bold());
    io::stdout().flush().ok();
}

pub(crate) enum StoreOpen {
    File(SqliteReadingStore),
    /// The file could not be opened; readings live in memory for this run.
    Fallback(SqliteReadingStore, String),
    Failed(String),
}

/// Open the SQLite file at `path`, falling back to an in-memory database.
pub(crate) fn open_store(path: &str) -> StoreOpen {
    let file = Path::new(path)
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map_or(Ok(()), std::fs::create_dir_all)
        .map_err(|e| e.to_string())
        .and_then(|()| SqliteReadingStore::open(path).map_err(|e| e.to_string()));

    match file {
        Ok(store) => StoreOpen::File(store),
        Err(reason) => {
            warn!(path, error = %reason, "reading store unavailable, using in-memory database");
            match SqliteReadingStore::open_in_memory() {
                Ok(store) => StoreOpen::Fallback(store, reason),
                Err(e) => StoreOpen::Failed(format!("Failed to open reading store: {e}")),
            }
        }
    }
}
