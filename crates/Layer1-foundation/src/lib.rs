//! # taskforge-foundation
//!
//! Foundation layer for TaskForge:
//! - Error: shared error type
//! - Event: task events and the broadcaster that fans them out to clients
//! - Storage: file access, change watching, JSON settings
//! - Config: service settings and diagnostic matcher schema
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  taskforge-cli                                │
//! │        │                                      │
//! │        ▼                                      │
//! │  taskforge-task (TaskServer, matchers, PTY)   │
//! │        │                                      │
//! │        ▼                                      │
//! │  taskforge-foundation                         │
//! │  ├── event   (TaskEvent, EventBroadcaster)    │
//! │  ├── storage (FileStore, ChangeWatcher)       │
//! │  └── config  (ServiceConfig, MatcherConfig)   │
//! └──────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Event
// ============================================================================
pub use event::{
    ChannelClient, EventBroadcaster, ParsedEntry, Severity, SubscriptionId, TaskClient,
    TaskEvent, TaskExitEvent, TaskId, TaskInfo, TaskOutputEntryEvent,
};

// ============================================================================
// Storage
// ============================================================================
pub use storage::{
    ChangeKind, ChangeSubscription, ChangeWatcher, FileChange, FileStore, JsonStore,
    LocalFileStore, NotifyWatcher,
};

// ============================================================================
// Config
// ============================================================================
pub use config::{
    FileLocationKind, MatcherConfig, PatternConfig, PtySizeConfig, ServiceConfig, ServiceConfigOverlay,
};
