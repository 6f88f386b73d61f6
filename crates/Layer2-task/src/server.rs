//! Task Server - runs tasks and reports what happens to them
//!
//! Per run:
//! 1. a label is looked up in the definitions catalog (inline specifications
//!    skip this)
//! 2. the command is resolved and the process spawned
//! 3. the task is registered and an output pump binds the named matcher
//! 4. an exit watcher waits for the exit and for the pump to drain, publishes
//!    the exit event and deletes the task; deletion releases its resources
//!
//! Diagnostic entries are published as they are found, always before the
//! task's exit event.

use crate::definitions::TaskDefinitionStore;
use crate::manager::{RunningTask, TaskManager};
use crate::matcher::{parse, MatcherRegistry, OutputParser};
use crate::process::{LaunchOptions, NativeLauncher, ProcessExit, ProcessLauncher, SpawnedProcess};
use crate::resolver::CommandResolver;
use crate::state::TaskState;
use crate::task::{RunRequest, TaskSpecification};
use crate::workspace::WorkspaceRootProvider;
use chrono::Utc;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use taskforge_foundation::{
    ChangeWatcher, Error, EventBroadcaster, FileStore, LocalFileStore, NotifyWatcher, Result,
    ServiceConfig, TaskExitEvent, TaskId, TaskInfo, TaskOutputEntryEvent,
};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct TaskServer {
    workspace: Arc<dyn WorkspaceRootProvider>,
    resolver: CommandResolver,
    manager: Arc<TaskManager>,
    definitions: Arc<TaskDefinitionStore>,
    matchers: Arc<MatcherRegistry>,
    launcher: Arc<dyn ProcessLauncher>,
    events: Arc<EventBroadcaster>,
    output_drain_timeout: Duration,
}

impl TaskServer {
    pub fn builder(workspace: impl WorkspaceRootProvider + 'static) -> TaskServerBuilder {
        TaskServerBuilder::new(Arc::new(workspace))
    }

    /// Run a task by label or from an inline specification
    pub async fn run(&self, request: impl Into<RunRequest>) -> Result<TaskInfo> {
        let specification = match request.into() {
            RunRequest::Label(label) => self.definitions.resolve(&label).map_err(|e| {
                error!(label = %label, "Error occurred while creating task: {}", e);
                e
            })?,
            RunRequest::Inline(spec) => Arc::new(spec),
        };

        match self.start(Arc::clone(&specification)).await {
            Ok(info) => Ok(info),
            Err(e) => {
                error!(label = %specification.label, "Error occurred while creating task: {}", e);
                Err(e)
            }
        }
    }

    async fn start(&self, specification: Arc<TaskSpecification>) -> Result<TaskInfo> {
        let label = specification.label.as_str();
        debug!(
            label,
            state = %TaskState::Resolving,
            command = %specification.command_line(),
            "Run requested"
        );

        let root = self.workspace.root().await?;
        let program = self.resolver.resolve(&specification.command, &root).await?;

        debug!(
            label,
            state = %TaskState::Spawning,
            program = %program.display(),
            "Command resolved"
        );
        let options = LaunchOptions {
            program,
            args: specification.args.clone(),
            cwd: specification.working_dir(&root),
            kind: specification.process_type,
        };
        let SpawnedProcess {
            handle,
            output,
            exit,
        } = self.launcher.spawn(&options).await?;

        let task = self.manager.register(Arc::clone(&specification), handle);
        let parser = self.bind_parser(&specification, &root);

        let (drained_tx, drained_rx) = oneshot::channel();
        let pump = tokio::spawn(pump_output(
            task.id(),
            parser,
            output,
            Arc::clone(&self.events),
            task.cancel_token(),
            drained_tx,
        ));
        task.track(pump);

        tokio::spawn(watch_exit(
            Arc::clone(&task),
            exit,
            drained_rx,
            Arc::clone(&self.manager),
            Arc::clone(&self.events),
            self.output_drain_timeout,
        ));

        let info = task.info();
        info!(
            task_id = %info.task_id,
            label,
            pid = ?info.os_process_id,
            terminal_id = ?info.terminal_id,
            "Task started"
        );
        Ok(info)
    }

    fn bind_parser(&self, specification: &TaskSpecification, root: &Path) -> Option<OutputParser> {
        let name = specification.error_matcher_name.trim();
        if name.is_empty() {
            return None;
        }
        match self.matchers.get(name) {
            Some(matcher) => Some(OutputParser::new(matcher, root)),
            None => {
                warn!(
                    label = %specification.label,
                    matcher = name,
                    "Unknown output matcher, running without diagnostics"
                );
                None
            }
        }
    }

    /// Ask a task to terminate; unknown or finished ids are ignored
    pub fn kill(&self, id: TaskId) {
        match self.manager.get(id) {
            Some(task) => {
                info!(task_id = %id, label = %task.label(), "Killing task");
                if let Err(e) = task.request_kill() {
                    warn!(task_id = %id, "Failed to signal task: {}", e);
                }
            }
            None => debug!(task_id = %id, "Kill for a task that is not running"),
        }
    }

    /// Write to a running task's terminal
    pub fn send_input(&self, id: TaskId, data: &[u8]) -> Result<()> {
        let task = self
            .manager
            .get(id)
            .ok_or_else(|| Error::Process(format!("Task {} is not running", id)))?;
        task.process().write_input(data)
    }

    /// Labels of the definitions catalog
    pub fn labels(&self) -> Vec<String> {
        self.definitions.labels()
    }

    pub async fn add_definition(&self, specification: TaskSpecification) -> Result<()> {
        self.definitions.add_definition(specification).await
    }

    pub fn events(&self) -> &Arc<EventBroadcaster> {
        &self.events
    }

    pub fn manager(&self) -> &Arc<TaskManager> {
        &self.manager
    }

    pub fn definitions(&self) -> &Arc<TaskDefinitionStore> {
        &self.definitions
    }

    pub fn matchers(&self) -> &Arc<MatcherRegistry> {
        &self.matchers
    }

    /// Stop watching definitions and kill every running task
    pub async fn shutdown(&self) {
        self.definitions.shutdown().await;
        for id in self.manager.running_ids() {
            self.kill(id);
        }
    }
}

/// Feed output to the parser, publishing each entry right away
///
/// Without a parser the output is still drained so the process never blocks
/// on a full pipe.
async fn pump_output(
    task_id: TaskId,
    parser: Option<OutputParser>,
    mut output: mpsc::Receiver<Vec<u8>>,
    events: Arc<EventBroadcaster>,
    cancel: CancellationToken,
    drained: oneshot::Sender<()>,
) {
    let drive = async move {
        match parser {
            Some(parser) => {
                parse(parser, output, |entry| {
                    events.publish_entry(TaskOutputEntryEvent { task_id, entry });
                })
                .await
            }
            None => while output.recv().await.is_some() {},
        }
    };

    tokio::select! {
        _ = drive => {}
        _ = cancel.cancelled() => debug!(task_id = %task_id, "Output pump cancelled"),
    }
    let _ = drained.send(());
}

async fn watch_exit(
    task: Arc<RunningTask>,
    exit: oneshot::Receiver<ProcessExit>,
    mut drained: oneshot::Receiver<()>,
    manager: Arc<TaskManager>,
    events: Arc<EventBroadcaster>,
    drain_timeout: Duration,
) {
    let task_id = task.id();
    let exit = exit.await;

    if tokio::time::timeout(drain_timeout, &mut drained).await.is_err() {
        warn!(task_id = %task_id, "Output still open after exit, dropping the rest");
        task.cancel_token().cancel();
        let _ = drained.await;
    }

    let (event, state) = match exit {
        Ok(exit) => {
            let state = if task.kill_requested() {
                TaskState::Killed
            } else {
                TaskState::Exited
            };
            let event = TaskExitEvent {
                task_id,
                code: exit.code,
                signal: exit.signal,
            };
            (event, state)
        }
        Err(_) => {
            error!(task_id = %task_id, "Exit status of task could not be observed");
            let event = TaskExitEvent {
                task_id,
                code: None,
                signal: None,
            };
            (event, TaskState::Failed)
        }
    };

    info!(
        task_id = %task_id,
        label = %task.label(),
        duration_ms = (Utc::now() - task.started_at()).num_milliseconds(),
        code = ?event.code,
        signal = ?event.signal,
        state = %state,
        "Task finished"
    );
    events.publish_exit(event);
    task.set_state(state);
    manager.delete(task_id);
}

// ============================================================================
// Builder
// ============================================================================

pub struct TaskServerBuilder {
    workspace: Arc<dyn WorkspaceRootProvider>,
    config: ServiceConfig,
    files: Arc<dyn FileStore>,
    watcher: Arc<dyn ChangeWatcher>,
    launcher: Option<Arc<dyn ProcessLauncher>>,
    events: Arc<EventBroadcaster>,
    search_path: Option<OsString>,
}

impl TaskServerBuilder {
    fn new(workspace: Arc<dyn WorkspaceRootProvider>) -> Self {
        Self {
            workspace,
            config: ServiceConfig::default(),
            files: Arc::new(LocalFileStore),
            watcher: Arc::new(NotifyWatcher),
            launcher: None,
            events: Arc::new(EventBroadcaster::new()),
            search_path: None,
        }
    }

    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_file_store(mut self, files: Arc<dyn FileStore>) -> Self {
        self.files = files;
        self
    }

    pub fn with_watcher(mut self, watcher: Arc<dyn ChangeWatcher>) -> Self {
        self.watcher = watcher;
        self
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Share a broadcaster with other components
    pub fn with_events(mut self, events: Arc<EventBroadcaster>) -> Self {
        self.events = events;
        self
    }

    /// Search path for bare command names instead of `PATH`
    pub fn with_search_path(mut self, search_path: impl Into<OsString>) -> Self {
        self.search_path = Some(search_path.into());
        self
    }

    /// Register matchers, open the definitions store and wire up the manager
    ///
    /// Fails when a configured matcher is invalid.
    pub async fn build(self) -> Result<TaskServer> {
        let root = self.workspace.root().await?;

        let matchers = Arc::new(MatcherRegistry::with_builtins());
        matchers.register_all(self.config.matchers.iter().cloned())?;

        let tasks_path: PathBuf = self.config.tasks_path(&root);
        let definitions = TaskDefinitionStore::open(
            tasks_path,
            Arc::clone(&self.files),
            self.watcher.as_ref(),
            self.config.reload_debounce(),
        )
        .await;

        let manager = Arc::new(TaskManager::new());
        manager.on_delete(|task| task.dispose());

        let mut resolver = CommandResolver::new(Arc::clone(&self.files));
        if let Some(search_path) = self.search_path {
            resolver = resolver.with_search_path(search_path);
        }

        let pty_size = self.config.pty;
        let launcher = self.launcher.unwrap_or_else(|| {
            let native: Arc<dyn ProcessLauncher> = Arc::new(NativeLauncher::new(pty_size));
            native
        });

        info!(
            workspace = %root.display(),
            matchers = ?matchers.names(),
            "Task server ready"
        );

        Ok(TaskServer {
            workspace: self.workspace,
            resolver,
            manager,
            definitions,
            matchers,
            launcher,
            events: self.events,
            output_drain_timeout: self.config.output_drain_timeout(),
        })
    }
}
