//! `heatex-memory` – Reading Persistence.
//!
//! The database round-trip mode writes every simulated reading and reads the
//! newest row back before it reaches the display.  This crate owns that
//! store.
//!
//! # Modules
//!
//! - [`store`] – [`ReadingStore`][store::ReadingStore]: the async persistence
//!   seam, and [`SqliteReadingStore`][store::SqliteReadingStore], its local
//!   SQLite implementation.

pub mod store;

pub use store::{ReadingStore, SqliteReadingStore, StoreError, StoreInfo};
