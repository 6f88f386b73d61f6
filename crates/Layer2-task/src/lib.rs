//! # taskforge-task
//!
//! Task execution for TaskForge.
//! Resolves commands, runs them as raw or PTY processes, extracts diagnostics
//! from their output and reports exits.
//!
//! ## Features
//!
//! - Command resolution (absolute, workspace-relative, search path)
//! - Task registry with monotonic ids and deletion listeners
//! - Live task definitions catalog with debounced reload
//! - Streaming output matchers (tsc, gcc, rustc, configured)
//! - **Exactly one exit event per task, after all of its diagnostics**

pub mod definitions;
pub mod manager;
pub mod matcher;
pub mod process;
pub mod resolver;
pub mod server;
pub mod state;
pub mod task;
pub mod workspace;

// Task system
pub use definitions::{Catalog, TaskDefinitionStore};
pub use manager::{RunningTask, TaskManager, TaskResources};
pub use resolver::CommandResolver;
pub use server::{TaskServer, TaskServerBuilder};
pub use state::TaskState;
pub use task::{ProcessKind, RunRequest, TaskSpecification};
pub use workspace::{absolutize, WorkspaceRootProvider};

// Process launchers
pub use process::{
    LaunchOptions, NativeLauncher, ProcessExit, ProcessHandle, ProcessLauncher, PtyProcess,
    RawProcess, SpawnedProcess,
};

// Output matchers
pub use matcher::{builtin_matchers, CompiledMatcher, MatcherRegistry, OutputParser};
