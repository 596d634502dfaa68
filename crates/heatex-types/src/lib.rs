use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// One atomic set of heat-exchanger temperatures in degrees Celsius.
///
/// The four channels are always replaced together; there is no API for
/// mutating a single field from a data source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// T1: outdoor air entering the exchanger.
    pub t1_outdoor_air_in: f64,
    /// T2: supply air delivered to the building.
    pub t2_supply_air: f64,
    /// T3: extract air leaving the building.
    pub t3_extract_air: f64,
    /// T4: exhaust air leaving the exchanger.
    pub t4_exhaust_air_out: f64,
}

impl Reading {
    /// Nominal operating point; also the value shown before the first commit.
    pub const BASELINE: Reading = Reading {
        t1_outdoor_air_in: 5.0,
        t2_supply_air: 18.0,
        t3_extract_air: 20.0,
        t4_exhaust_air_out: 8.0,
    };

    pub fn new(t1: f64, t2: f64, t3: f64, t4: f64) -> Self {
        Self {
            t1_outdoor_air_in: t1,
            t2_supply_air: t2,
            t3_extract_air: t3,
            t4_exhaust_air_out: t4,
        }
    }

    /// The temperatures in T1..T4 order.
    pub fn as_array(&self) -> [f64; 4] {
        [
            self.t1_outdoor_air_in,
            self.t2_supply_air,
            self.t3_extract_air,
            self.t4_exhaust_air_out,
        ]
    }
}

impl Default for Reading {
    fn default() -> Self {
        Self::BASELINE
    }
}

/// A reading as confirmed by the persistence endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedReading {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub reading: Reading,
}

/// Which data path feeds the dashboard.  Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DataSourceMode {
    /// Random readings generated in-process.
    #[serde(rename = "simulator")]
    Simulator,
    /// Simulated readings written to and read back from the database.
    #[serde(rename = "database", alias = "postgres", alias = "database_round_trip")]
    DatabaseRoundTrip,
    /// Readings pushed by the hosted publish/subscribe channel.
    #[default]
    #[serde(rename = "realtime", alias = "pubsub", alias = "realtime_channel")]
    RealtimeChannel,
}

impl DataSourceMode {
    pub const ALL: [DataSourceMode; 3] = [
        DataSourceMode::Simulator,
        DataSourceMode::DatabaseRoundTrip,
        DataSourceMode::RealtimeChannel,
    ];
}

impl fmt::Display for DataSourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourceMode::Simulator => write!(f, "simulator"),
            DataSourceMode::DatabaseRoundTrip => write!(f, "database"),
            DataSourceMode::RealtimeChannel => write!(f, "realtime"),
        }
    }
}

impl FromStr for DataSourceMode {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simulator" | "sim" => Ok(DataSourceMode::Simulator),
            "database" | "db" | "postgres" | "database_round_trip" => {
                Ok(DataSourceMode::DatabaseRoundTrip)
            }
            "realtime" | "pubsub" | "realtime_channel" => Ok(DataSourceMode::RealtimeChannel),
            other => Err(DashboardError::Config(format!(
                "unknown data source mode '{other}' (expected simulator, database or realtime)"
            ))),
        }
    }
}

/// Lifecycle state of the realtime channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    #[default]
    Idle,
    Connecting,
    Open,
    AwaitingRetry,
    Failed,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ChannelState::Idle => "idle",
            ChannelState::Connecting => "connecting",
            ChannelState::Open => "open",
            ChannelState::AwaitingRetry => "awaiting_retry",
            ChannelState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Answer to the operator's status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectStatus {
    pub mode: DataSourceMode,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub has_pending_retry: bool,
    pub channel_state: ChannelState,
}

/// One point of the efficiency chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// Wall-clock label, e.g. `"14:03:27"`.
    pub label: String,
    pub efficiency: f64,
}

/// Everything the rendering surface needs after a commit or status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayUpdate {
    pub reading: Reading,
    pub efficiency: f64,
    pub history: Vec<HistoryPoint>,
    pub status: String,
}

/// Unified event wrapper for the dashboard event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "heatex-runtime::dashboard"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` with a fresh id and the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    /// A new frame for the rendering surface.
    Display(DisplayUpdate),
    /// The realtime channel changed state.
    Channel(ReconnectStatus),
}

/// Error type shared by every dashboard layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DashboardError {
    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Persistence Error: {0}")]
    Persistence(String),

    #[error("Negotiation Failed: {0}")]
    Negotiation(String),

    #[error("Channel Transport Error: {0}")]
    Transport(String),

    #[error("Unrecognised Message: {0}")]
    Protocol(String),

    #[error("Operation requires {expected} mode, current mode is {current}")]
    ModeMismatch {
        expected: DataSourceMode,
        current: DataSourceMode,
    },

    #[error("Dashboard runtime has shut down")]
    Shutdown,

    #[error("Serialization Error: {0}")]
    Serialization(String),
}

impl DashboardError {
    /// Configuration errors need operator action; everything else may clear
    /// up on its own.
    pub fn is_configuration(&self) -> bool {
        matches!(self, DashboardError::Config(_))
    }
}
