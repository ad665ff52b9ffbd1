//! Remote data gateway
//!
//! This module defines the contracts the dashboard uses to reach the hosted
//! backend. The trait-based design allows swapping between the in-memory
//! backend and the REST client; the polling feed adds live updates on top of
//! either.

mod memory;
mod poll;
mod rest;
mod rows;
mod traits;

pub use memory::InMemoryBackend;
pub use poll::{DEFAULT_POLL_INTERVAL, PollingFeed};
pub use rest::RestGateway;
pub use rows::{from_row, from_rows, select_as, select_optional, to_row};
pub use traits::{
    AuthProvider, ChangeCallback, ChangeEvent, ChangeFeed, ChangeSubscription, Filter, Order,
    Query, Row, RowGateway, Subscription, Table,
};
