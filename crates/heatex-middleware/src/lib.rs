//! `heatex-middleware` – Data Paths
//!
//! Everything that moves readings between the dashboard and the outside
//! world, without deciding what the dashboard does with them.
//!
//! # Modules
//!
//! - [`bus`] – broadcast event bus carrying display frames and channel
//!   status to every rendering surface.
//! - [`adapter`] – [`ReadingSource`][adapter::ReadingSource], the seam every
//!   polled data source implements.
//! - [`simulator`] – [`SimulatorAdapter`][simulator::SimulatorAdapter]:
//!   random readings around the nominal operating point.
//! - [`database`] – [`DatabaseRoundTripAdapter`][database::DatabaseRoundTripAdapter]:
//!   simulate, persist, wait, read the newest row back.
//! - [`protocol`] – decoding of realtime push messages.
//! - [`realtime`] – negotiation of the hosted channel URL and the WebSocket
//!   transport carrying push messages.
//! - [`publisher`] – [`PublishClient`][publisher::PublishClient]: pushes a
//!   reading into the hosted channel through its HTTP publish endpoint.

pub mod adapter;
pub mod bus;
pub mod database;
pub mod protocol;
pub mod publisher;
pub mod realtime;
pub mod simulator;

pub use adapter::ReadingSource;
pub use bus::{EventBus, Topic, TopicReceiver};
pub use database::DatabaseRoundTripAdapter;
pub use protocol::{PushMessage, parse_push_message};
pub use publisher::PublishClient;
pub use realtime::{
    ChannelConnector, ChannelEvent, ConnectionDescriptor, HttpNegotiator, Negotiator, WsConnector,
};
pub use simulator::SimulatorAdapter;
