//! Ordered, deduplicated delivery of messages between durable entities.
//!
//! Entities and orchestrations exchange [request messages][RequestMessage]
//! over queues which may reorder, duplicate or delay them. A
//! [`MessageSorter`] on each side restores the original send order, and
//! filters duplicates, for every message that arrives within a configurable
//! [reorder window][Config::reorder_window] of being sent.

#![cfg_attr(docsrs, feature(doc_cfg))]

mod config;
mod error;
mod id;
mod message;
pub mod sorter;
mod time;

pub use config::Config;
pub use error::Error;
pub use id::{EntityId, InstanceId};
pub use message::{Label, RequestMessage};
pub use sorter::{Inbox, MessageSorter, Outbox, Stats};
#[cfg(feature = "clock")]
#[cfg_attr(docsrs, doc(cfg(feature = "clock")))]
pub use time::Clock;
pub use time::Timestamp;
pub use uuid::Uuid;
