//! Process launchers
//!
//! Two backends behind one [`ProcessLauncher`]:
//! - `raw` - plain child process, stdout and stderr merged into one stream
//! - `pty` - process attached to a pseudo-terminal (portable-pty)
//!
//! Spawning returns a [`SpawnedProcess`]: a shared [`ProcessHandle`] for
//! control, plus the output chunk stream and a one-shot exit notification that
//! the caller consumes exactly once.

pub mod pty;
pub mod raw;

use crate::task::ProcessKind;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use taskforge_foundation::{PtySizeConfig, Result};
use tokio::sync::{mpsc, oneshot};

pub use pty::PtyProcess;
pub use raw::RawProcess;

/// Capacity of the output chunk channel
pub(crate) const OUTPUT_CHANNEL_CAPACITY: usize = 256;

/// Read buffer size for process output
pub(crate) const READ_BUFFER_SIZE: usize = 4096;

/// How a process ended
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessExit {
    /// Exit code for a normal exit
    pub code: Option<i32>,

    /// Signal name when the process was terminated by a signal
    pub signal: Option<String>,
}

impl ProcessExit {
    pub fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn signal(signal: impl Into<String>) -> Self {
        Self {
            code: None,
            signal: Some(signal.into()),
        }
    }
}

/// Control surface of a spawned process
pub trait ProcessHandle: Send + Sync {
    /// OS process id, if the OS reported one
    fn pid(&self) -> Option<u32>;

    /// Launcher-assigned id, unique per launcher
    fn process_id(&self) -> u64;

    /// Terminal id; only PTY processes have one
    fn terminal_id(&self) -> Option<u64> {
        None
    }

    /// Ask the process to terminate. Returns once the request is sent; the
    /// exit notification reports the outcome.
    fn kill(&self) -> Result<()>;

    /// Write to the process input
    fn write_input(&self, data: &[u8]) -> Result<()>;
}

/// Result of a successful spawn
pub struct SpawnedProcess {
    pub handle: Arc<dyn ProcessHandle>,

    /// Output chunks in arrival order; closed when the process closes its output
    pub output: mpsc::Receiver<Vec<u8>>,

    /// Fires once with the exit status; dropped without a value if the exit
    /// could not be observed
    pub exit: oneshot::Receiver<ProcessExit>,
}

/// What to spawn
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Resolved executable
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub kind: ProcessKind,
}

/// Spawns processes for tasks
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn spawn(&self, options: &LaunchOptions) -> Result<SpawnedProcess>;
}

/// [`ProcessLauncher`] for the local machine
pub struct NativeLauncher {
    pty_size: PtySizeConfig,
    next_process_id: AtomicU64,
}

impl NativeLauncher {
    pub fn new(pty_size: PtySizeConfig) -> Self {
        Self {
            pty_size,
            next_process_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_process_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for NativeLauncher {
    fn default() -> Self {
        Self::new(PtySizeConfig::default())
    }
}

#[async_trait]
impl ProcessLauncher for NativeLauncher {
    async fn spawn(&self, options: &LaunchOptions) -> Result<SpawnedProcess> {
        let process_id = self.next_id();
        match options.kind {
            ProcessKind::Raw => raw::spawn(options, process_id),
            ProcessKind::Terminal => pty::spawn(options, process_id, self.pty_size),
        }
    }
}
