//! Event System - task event publish/subscribe
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     EventBroadcaster                         │
//! │  publish(TaskEvent::Exited | TaskEvent::OutputEntryFound)    │
//! │         │                                                    │
//! │         ▼  (synchronous, subscription order)                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐       │
//! │  │  Client 1    │  │  Client 2    │  │  Client N    │       │
//! │  │  (CLI)       │  │  (Channel)   │  │  (Remote)    │       │
//! │  └──────────────┘  └──────────────┘  └──────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod bus;
pub mod types;

pub use bus::{ChannelClient, EventBroadcaster, SubscriptionId, TaskClient};

pub use types::{
    ParsedEntry, Severity, TaskEvent, TaskExitEvent, TaskId, TaskInfo, TaskOutputEntryEvent,
};
