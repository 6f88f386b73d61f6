//! Config - task service settings
//!
//! - `service.rs` - ServiceConfig (debounce, drain timeout, PTY size)
//! - `matcher.rs` - diagnostic matcher schema

mod matcher;
mod service;

pub use matcher::{FileLocationKind, MatcherConfig, PatternConfig};
pub use service::{
    PtySizeConfig, ServiceConfig, ServiceConfigOverlay, DEFAULT_TASKS_FILE, SERVICE_CONFIG_FILE,
};
