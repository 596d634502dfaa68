//! Database round-trip adapter.
//!
//! One cycle:
//!
//! 1. draw a simulated reading,
//! 2. `insert` it into the [`ReadingStore`],
//! 3. wait the settle delay,
//! 4. `list_recent(1)` and return that row's reading.
//!
//! The read never starts before the write has completed.  A failed write
//! ends the cycle with an error and no read is attempted.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use heatex_memory::ReadingStore;
use heatex_types::{DashboardError, Reading};
use tracing::{debug, warn};

use crate::adapter::ReadingSource;
use crate::simulator::SimulatorAdapter;

/// Default wait between the write and the read-back.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(50);

pub struct DatabaseRoundTripAdapter {
    simulator: SimulatorAdapter,
    store: Arc<dyn ReadingStore>,
    settle_delay: Duration,
}

impl DatabaseRoundTripAdapter {
    pub fn new(store: Arc<dyn ReadingStore>) -> Self {
        Self {
            simulator: SimulatorAdapter::new(),
            store,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn with_simulator(mut self, simulator: SimulatorAdapter) -> Self {
        self.simulator = simulator;
        self
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }
}

#[async_trait]
impl ReadingSource for DatabaseRoundTripAdapter {
    async fn produce_reading(&self) -> Result<Reading, DashboardError> {
        let generated = self.simulator.sample();

        let written = self.store.insert(&generated).await.map_err(|e| {
            warn!(error = %e, "reading insert failed, skipping read-back");
            DashboardError::from(e)
        })?;
        debug!(id = %written.id, "reading persisted");

        tokio::time::sleep(self.settle_delay).await;

        let latest = self.store.list_recent(1).await.map_err(|e| {
            warn!(error = %e, "reading read-back failed");
            DashboardError::from(e)
        })?;
        latest
            .into_iter()
            .next()
            .map(|row| row.reading)
            .ok_or_else(|| DashboardError::Persistence("no readings available".to_string()))
    }

    fn name(&self) -> &'static str {
        "database"
    }
}
