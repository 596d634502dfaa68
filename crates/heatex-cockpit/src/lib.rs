//! `heatex-cockpit` – Browser Dashboard Server
//!
//! Boots a lightweight HTTP + WebSocket server (default port `8080`) that:
//!
//! 1. **Serves** the embedded dashboard page (four temperature gauges, the
//!    efficiency figure, the efficiency history chart and the mode selector)
//!    at every non-WebSocket HTTP path.
//!
//! 2. **Answers** `GET /api/status` with the dashboard status query as JSON.
//!
//! 3. **Bridges** the internal [`EventBus`] to every connected browser tab
//!    over a persistent WebSocket connection so that display frames and
//!    channel status changes stream to the page as they happen.
//!
//! 4. **Accepts** operator commands from the page:
//!    - `"/dashboard/mode"` with `msg.mode` → selects the data source.
//!    - `"/dashboard/reconnect"` → manual reconnect of the realtime channel.
//!    - `"/dashboard/status"` → replies with the current status.
//!
//! # Usage
//!
//! ```rust,no_run
//! use heatex_cockpit::CockpitServer;
//! # async fn boot(bus: heatex_middleware::EventBus, dashboard: heatex_runtime::DashboardHandle) {
//! CockpitServer::new(bus, dashboard)
//!     .with_port(8080)
//!     .run()
//!     .await
//!     .ok();
//! # }
//! ```
//!
//! [`EventBus`]: heatex_middleware::EventBus

pub mod server;

pub use server::{CockpitServer, DEFAULT_PORT, UpstreamCommand, parse_upstream};
