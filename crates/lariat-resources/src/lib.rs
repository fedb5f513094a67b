//! Topic and queue addressing.
//!
//! Standard resources have names fully derived from structured fields:
//!
//! ```text
//! <instance>-<kind>-fanout-<publisher>-<type>[.fifo]          topic
//! <instance>-<kind>-queue-<publisher>-<type>[-<dest>][.fifo]  queue
//! ```
//!
//! Anything else is a custom resource: the name is kept as-is and the parsed
//! fields are absent.

mod error;
mod naming;
mod queue;
mod resource;
mod topic;

pub use error::{ResourceError, ResourceResult};
pub use naming::{Protocol, FIFO_SUFFIX};
pub use queue::Queue;
pub use resource::{Resource, Tag};
pub use topic::Topic;
