//! The polled data-source seam.
//!
//! The dashboard's cadence loop never talks to a random generator or a
//! database directly.  It asks whichever [`ReadingSource`] matches the
//! current mode for one fresh reading per tick.
//!
//! # Overview
//!
//! - [`ReadingSource`] – the trait every polled adapter implements.
//! - [`SimulatorAdapter`][crate::simulator::SimulatorAdapter] – in-process
//!   random readings.
//! - [`DatabaseRoundTripAdapter`][crate::database::DatabaseRoundTripAdapter]
//!   – simulate, persist, read back.
//!
//! The realtime channel is push-driven and lives in [`crate::realtime`].

use async_trait::async_trait;
use heatex_types::{DashboardError, Reading};

/// Every polled data source implements this trait.
///
/// # Contract
///
/// `produce_reading` returns a complete, confirmed [`Reading`] or an error.
/// It never returns a synthetic stand-in on failure; the caller keeps the
/// last good reading instead.
#[async_trait]
pub trait ReadingSource: Send + Sync {
    async fn produce_reading(&self) -> Result<Reading, DashboardError>;

    /// Short label used in logs, e.g. `"simulator"`.
    fn name(&self) -> &'static str;
}
