//! PTY process - command attached to a pseudo-terminal
//!
//! Uses portable-pty. The PTY master is a single bidirectional stream: output
//! is read on a blocking thread and forwarded as chunks, input is written
//! through the master's writer. Each PTY process carries a terminal id for
//! terminal clients.

use super::{
    LaunchOptions, ProcessExit, ProcessHandle, SpawnedProcess, OUTPUT_CHANNEL_CAPACITY,
    READ_BUFFER_SIZE,
};
use parking_lot::Mutex;
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use std::sync::Arc;
use taskforge_foundation::{Error, PtySizeConfig, Result};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

pub struct PtyProcess {
    pid: Option<u32>,
    process_id: u64,
    terminal_id: u64,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    writer: Mutex<Option<Box<dyn Write + Send>>>,
    // Kept open for the lifetime of the handle
    _master: Mutex<Box<dyn MasterPty + Send>>,
}

impl PtyProcess {
    pub fn size_of(config: PtySizeConfig) -> PtySize {
        PtySize {
            rows: config.rows,
            cols: config.cols,
            pixel_width: 0,
            pixel_height: 0,
        }
    }
}

impl ProcessHandle for PtyProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn process_id(&self) -> u64 {
        self.process_id
    }

    fn terminal_id(&self) -> Option<u64> {
        Some(self.terminal_id)
    }

    fn kill(&self) -> Result<()> {
        match self.killer.lock().kill() {
            Ok(()) => Ok(()),
            // Already gone; the exit notification is on its way
            Err(e) => {
                debug!(process_id = self.process_id, "PTY kill: {}", e);
                Ok(())
            }
        }
    }

    fn write_input(&self, data: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock();
        let writer = writer.as_mut().ok_or_else(|| {
            Error::Process(format!("Terminal {} input is closed", self.terminal_id))
        })?;
        writer.write_all(data)?;
        writer.flush()?;
        Ok(())
    }
}

pub(crate) fn spawn(
    options: &LaunchOptions,
    process_id: u64,
    size: PtySizeConfig,
) -> Result<SpawnedProcess> {
    let pty = native_pty_system()
        .openpty(PtyProcess::size_of(size))
        .map_err(|e| Error::Spawn(format!("Failed to open PTY: {}", e)))?;

    let mut cmd = CommandBuilder::new(&options.program);
    cmd.args(&options.args);
    cmd.cwd(&options.cwd);

    let mut child = pty
        .slave
        .spawn_command(cmd)
        .map_err(|e| Error::Spawn(format!("{}: {}", options.program.display(), e)))?;
    // The child holds its own copy; keeping ours would prevent EOF on the master
    drop(pty.slave);

    let pid = child.process_id();
    let killer = child.clone_killer();

    let reader = pty
        .master
        .try_clone_reader()
        .map_err(|e| Error::Spawn(format!("Failed to clone PTY reader: {}", e)))?;
    let writer = match pty.master.take_writer() {
        Ok(writer) => Some(writer),
        Err(e) => {
            warn!(process_id, "PTY input unavailable: {}", e);
            None
        }
    };

    info!(
        process_id,
        pid = ?pid,
        program = %options.program.display(),
        "Spawned PTY process"
    );

    let (output_tx, output_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
    tokio::task::spawn_blocking(move || read_output(reader, output_tx));

    let (exit_tx, exit_rx) = oneshot::channel();
    tokio::task::spawn_blocking(move || {
        match child.wait() {
            Ok(status) => {
                let exit = match status.signal() {
                    Some(signal) => ProcessExit::signal(signal),
                    None => ProcessExit::code(status.exit_code() as i32),
                };
                debug!(process_id, code = ?exit.code, signal = ?exit.signal, "PTY process exited");
                let _ = exit_tx.send(exit);
            }
            Err(e) => warn!(process_id, "Failed to wait for PTY process: {}", e),
        }
    });

    Ok(SpawnedProcess {
        handle: Arc::new(PtyProcess {
            pid,
            process_id,
            terminal_id: process_id,
            killer: Mutex::new(killer),
            writer: Mutex::new(writer),
            _master: Mutex::new(pty.master),
        }),
        output: output_rx,
        exit: exit_rx,
    })
}

fn read_output(mut reader: Box<dyn Read + Send>, tx: mpsc::Sender<Vec<u8>>) {
    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.blocking_send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            // EIO once the slave side is closed on Linux
            Err(_) => break,
        }
    }
}
