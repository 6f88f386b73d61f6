//! Non-interactive commands

use anyhow::{bail, Context};
use std::path::PathBuf;
use taskforge_foundation::{ParsedEntry, TaskEvent, TaskExitEvent};
use taskforge_task::{ProcessKind, RunRequest, TaskServer, TaskSpecification};

/// Where and how results are printed
pub struct Output {
    json: bool,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    fn event(&self, event: &TaskEvent) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(event)?);
            return Ok(());
        }
        match event {
            TaskEvent::OutputEntryFound(found) => println!("{}", format_entry(&found.entry)),
            TaskEvent::Exited(exit) => eprintln!("{}", format_exit(exit)),
        }
        Ok(())
    }
}

/// Print the task labels from the definitions file
pub fn list(server: &TaskServer, output: &Output) -> anyhow::Result<()> {
    let labels = server.labels();
    if output.json {
        println!("{}", serde_json::to_string(&labels)?);
        return Ok(());
    }

    if labels.is_empty() {
        println!(
            "No tasks defined in {}",
            server.definitions().path().display()
        );
        return Ok(());
    }

    println!("{:<24} {:<10} {}", "Label", "Type", "Command");
    println!("{}", "-".repeat(72));
    for label in labels {
        let Ok(spec) = server.definitions().resolve(&label) else {
            continue;
        };
        let kind = match spec.process_type {
            ProcessKind::Raw => "raw",
            ProcessKind::Terminal => "terminal",
        };
        println!("{:<24} {:<10} {}", truncate(&label, 24), kind, spec.command_line());
    }
    Ok(())
}

/// Print the registered diagnostic matchers
pub fn matchers(server: &TaskServer, output: &Output) -> anyhow::Result<()> {
    let registry = server.matchers();
    let configs: Vec<_> = registry
        .names()
        .iter()
        .filter_map(|name| registry.get(name))
        .map(|m| m.config().clone())
        .collect();

    if output.json {
        println!("{}", serde_json::to_string(&configs)?);
        return Ok(());
    }

    for config in configs {
        let label = config.label.as_deref().unwrap_or("");
        println!("{:<12} {:<10} {}", config.name, config.owner, label);
    }
    Ok(())
}

/// Start a task and stream its diagnostics until it exits
///
/// Returns the status the CLI should exit with. Ctrl-C kills the task and
/// keeps waiting for its exit event.
pub async fn run(server: &TaskServer, output: &Output, request: RunRequest) -> anyhow::Result<i32> {
    let (subscription, mut events) = server.events().channel();

    let info = match server.run(request).await {
        Ok(info) => info,
        Err(e) => {
            server.events().unsubscribe(subscription);
            return Err(e.into());
        }
    };
    tracing::debug!(
        task_id = %info.task_id,
        pid = ?info.os_process_id,
        "Task started"
    );

    let mut interrupted = false;
    let status = loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    bail!("Event stream closed before task {} exited", info.task_id);
                };
                if event.task_id() != info.task_id {
                    continue;
                }
                output.event(&event)?;
                if let TaskEvent::Exited(exit) = event {
                    break exit_status(&exit);
                }
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                eprintln!("Interrupted, killing task {}", info.task_id);
                server.kill(info.task_id);
            }
        }
    };

    server.events().unsubscribe(subscription);
    Ok(status)
}

/// Build an inline specification from command line arguments
pub fn inline_spec(
    label: &str,
    command: Vec<String>,
    pty: bool,
    matcher: Option<String>,
    cwd: Option<PathBuf>,
    build: bool,
) -> anyhow::Result<TaskSpecification> {
    let mut parts = command.into_iter();
    let program = parts.next().context("No command given")?;
    if label.trim().is_empty() {
        bail!("Task label must not be empty");
    }

    let kind = if pty {
        ProcessKind::Terminal
    } else {
        ProcessKind::Raw
    };
    let mut spec = TaskSpecification::new(label, program)
        .with_args(parts)
        .with_process_type(kind);
    if let Some(matcher) = matcher {
        spec = spec.with_matcher(matcher);
    }
    if let Some(cwd) = cwd {
        spec = spec.with_cwd(cwd);
    }
    if build {
        spec = spec.as_build();
    }
    Ok(spec)
}

/// `file:line:column: severity[code]: message (owner)`
fn format_entry(entry: &ParsedEntry) -> String {
    let code = entry
        .code
        .as_deref()
        .map(|c| format!("[{}]", c))
        .unwrap_or_default();
    format!(
        "{}:{}:{}: {}{}: {} ({})",
        entry.file.display(),
        entry.line,
        entry.column,
        entry.severity,
        code,
        entry.message,
        entry.owner
    )
}

fn format_exit(exit: &TaskExitEvent) -> String {
    match (&exit.signal, exit.code) {
        (Some(signal), _) => format!("Task {} killed by {}", exit.task_id, signal),
        (None, Some(code)) => format!("Task {} exited with code {}", exit.task_id, code),
        (None, None) => format!("Task {} ended without an exit status", exit.task_id),
    }
}

/// Mirror the task's exit code; signals and unknown statuses map to 1
fn exit_status(exit: &TaskExitEvent) -> i32 {
    match (&exit.signal, exit.code) {
        (None, Some(code)) => code,
        _ => 1,
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
