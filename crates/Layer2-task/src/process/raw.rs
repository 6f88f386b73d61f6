//! Raw process - plain child process with merged stdout/stderr
//!
//! stdin is closed. A waiter task owns the child: it reaps the exit status and
//! serves kill requests, so a signal is never sent to a pid that was already
//! reaped.

use super::{
    LaunchOptions, ProcessExit, ProcessHandle, SpawnedProcess, OUTPUT_CHANNEL_CAPACITY,
    READ_BUFFER_SIZE,
};
use std::process::Stdio;
use std::sync::Arc;
use taskforge_foundation::{Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

pub struct RawProcess {
    pid: Option<u32>,
    process_id: u64,
    kill_tx: mpsc::UnboundedSender<()>,
}

impl ProcessHandle for RawProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn process_id(&self) -> u64 {
        self.process_id
    }

    fn kill(&self) -> Result<()> {
        // Closed channel means the waiter already reaped the process
        let _ = self.kill_tx.send(());
        Ok(())
    }

    fn write_input(&self, _data: &[u8]) -> Result<()> {
        Err(Error::Process(format!(
            "Process {} has no input stream",
            self.process_id
        )))
    }
}

pub(crate) fn spawn(options: &LaunchOptions, process_id: u64) -> Result<SpawnedProcess> {
    let mut cmd = Command::new(&options.program);
    cmd.args(&options.args)
        .current_dir(&options.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|e| {
        Error::Spawn(format!("{}: {}", options.program.display(), e))
    })?;
    let pid = child.id();

    info!(
        process_id,
        pid = ?pid,
        program = %options.program.display(),
        "Spawned raw process"
    );

    let (output_tx, output_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(pump(stdout, output_tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(pump(stderr, output_tx.clone()));
    }
    drop(output_tx);

    let (kill_tx, kill_rx) = mpsc::unbounded_channel();
    let (exit_tx, exit_rx) = oneshot::channel();
    tokio::spawn(wait_for_exit(child, process_id, kill_rx, exit_tx));

    Ok(SpawnedProcess {
        handle: Arc::new(RawProcess {
            pid,
            process_id,
            kill_tx,
        }),
        output: output_rx,
        exit: exit_rx,
    })
}

/// Unterminated output held per stream before it is forwarded anyway
const MAX_PENDING_LINE: usize = 64 * 1024;

/// Forward one stream's output in whole lines
///
/// stdout and stderr share one channel, so a line started on one stream must
/// not be split by output from the other. A final unterminated line is
/// forwarded with a newline added.
async fn pump<R: AsyncRead + Unpin>(mut reader: R, tx: mpsc::Sender<Vec<u8>>) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut pending: Vec<u8> = Vec::new();
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                pending.extend_from_slice(&buf[..n]);
                let ready: Vec<u8> = match pending.iter().rposition(|&b| b == b'\n') {
                    Some(last) => pending.drain(..=last).collect(),
                    None if pending.len() > MAX_PENDING_LINE => std::mem::take(&mut pending),
                    None => continue,
                };
                if tx.send(ready).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                debug!("Output read ended: {}", e);
                break;
            }
        }
    }
    if !pending.is_empty() {
        pending.push(b'\n');
        let _ = tx.send(pending).await;
    }
}

enum Wake {
    Exited(std::io::Result<std::process::ExitStatus>),
    Kill,
    Detached,
}

async fn wait_for_exit(
    mut child: Child,
    process_id: u64,
    mut kill_rx: mpsc::UnboundedReceiver<()>,
    exit_tx: oneshot::Sender<ProcessExit>,
) {
    let mut detached = false;
    let status = loop {
        let wake = if detached {
            Wake::Exited(child.wait().await)
        } else {
            tokio::select! {
                status = child.wait() => Wake::Exited(status),
                request = kill_rx.recv() => match request {
                    Some(()) => Wake::Kill,
                    None => Wake::Detached,
                },
            }
        };

        match wake {
            Wake::Exited(status) => break status,
            Wake::Kill => terminate(&mut child, process_id),
            Wake::Detached => detached = true,
        }
    };

    match status {
        Ok(status) => {
            let exit = exit_from_status(status);
            debug!(process_id, code = ?exit.code, signal = ?exit.signal, "Raw process exited");
            let _ = exit_tx.send(exit);
        }
        // exit_tx is dropped, the receiver sees the exit as unobservable
        Err(e) => warn!(process_id, "Failed to wait for process: {}", e),
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child, process_id: u64) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match child.id() {
        Some(pid) => {
            debug!(process_id, pid, "Sending SIGTERM");
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                warn!(process_id, pid, "Failed to send SIGTERM: {}", e);
            }
        }
        None => debug!(process_id, "Kill requested after exit"),
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child, process_id: u64) {
    debug!(process_id, "Killing process");
    if let Err(e) = child.start_kill() {
        warn!(process_id, "Failed to kill process: {}", e);
    }
}

#[cfg(unix)]
fn exit_from_status(status: std::process::ExitStatus) -> ProcessExit {
    use nix::sys::signal::Signal;
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => ProcessExit::code(code),
        (None, Some(signo)) => {
            let name = Signal::try_from(signo)
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|_| format!("signal {}", signo));
            ProcessExit::signal(name)
        }
        (None, None) => ProcessExit::default(),
    }
}

#[cfg(not(unix))]
fn exit_from_status(status: std::process::ExitStatus) -> ProcessExit {
    match status.code() {
        Some(code) => ProcessExit::code(code),
        None => ProcessExit::default(),
    }
}
