//! Broker client abstraction.
//!
//! The outbox publisher only needs [`BrokerClient::publish`]; the remaining
//! operations cover topic/queue administration. [`InMemoryBroker`] implements
//! the whole port in-process.

mod client;
mod error;
mod memory;

pub use client::BrokerClient;
pub use error::{BrokerError, BrokerResult};
pub use memory::{InMemoryBroker, PublishedMessage};
