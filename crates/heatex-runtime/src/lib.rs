//! `heatex-runtime` – The Dashboard Engine
//!
//! Turns readings from whichever data source is active into display frames,
//! and keeps the realtime channel alive.
//!
//! # Modules
//!
//! - [`dashboard`] – [`Dashboard`][dashboard::Dashboard]: the mode switcher.
//!   A single task owning the sample store and the reconnect controller,
//!   driven by operator commands, a polling cadence and channel events.
//!   [`DashboardHandle`][dashboard::DashboardHandle] is its operator surface.
//! - [`efficiency`] – [`efficiency`][efficiency::efficiency]: supply-air
//!   temperature efficiency, clamped to `[0, 100]`.
//! - [`sample_store`] – [`SampleStore`][sample_store::SampleStore]: the
//!   current reading and the last 20 efficiency values.
//! - [`status`] – the visible status label for each mode and channel state.
//! - [`display`] – [`DisplaySink`][display::DisplaySink] and the event-bus
//!   backed [`BusDisplaySink`][display::BusDisplaySink].
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: initialises
//!   the global `tracing` subscriber with an optional OTLP span exporter.

pub mod dashboard;
pub mod display;
pub mod efficiency;
pub mod sample_store;
pub mod status;
pub mod telemetry;

pub use dashboard::{DataSources, Dashboard, DashboardConfig, DashboardHandle};
pub use display::{BusDisplaySink, DisplaySink};
pub use efficiency::efficiency;
pub use sample_store::SampleStore;
pub use telemetry::{init_tracing, LogFormat, TracerProviderGuard};
