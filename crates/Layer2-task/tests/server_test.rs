//! TaskServer integration tests
//!
//! `cargo test -p taskforge-task --test server_test`

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use taskforge_foundation::{
    Error, ParsedEntry, ServiceConfig, TaskEvent, TaskExitEvent, TaskId,
};
use taskforge_task::{ProcessKind, TaskServer, TaskSpecification};
use tokio::sync::mpsc::UnboundedReceiver;

const WAIT: Duration = Duration::from_secs(10);

async fn server(workspace: &Path) -> TaskServer {
    let config = ServiceConfig {
        reload_debounce_ms: 20,
        ..ServiceConfig::default()
    };
    TaskServer::builder(workspace.to_path_buf())
        .with_config(config)
        .build()
        .await
        .expect("server failed to start")
}

fn write_tasks(workspace: &Path, content: &str) -> PathBuf {
    let path = workspace.join(".taskforge/tasks.json");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, content).unwrap();
    path
}

/// Entries for `id` up to and including its exit event
async fn run_to_exit(
    rx: &mut UnboundedReceiver<TaskEvent>,
    id: TaskId,
) -> (Vec<ParsedEntry>, TaskExitEvent) {
    let mut entries = Vec::new();
    let collect = async {
        while let Some(event) = rx.recv().await {
            match event {
                TaskEvent::OutputEntryFound(e) if e.task_id == id => entries.push(e.entry),
                TaskEvent::Exited(e) if e.task_id == id => return e,
                _ => {}
            }
        }
        panic!("event stream closed");
    };
    let exit = tokio::time::timeout(WAIT, collect)
        .await
        .expect("no exit event");
    (entries, exit)
}

async fn wait_until_deleted(server: &TaskServer, id: TaskId) {
    let deleted = async {
        while server.manager().get(id).is_some() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(WAIT, deleted)
        .await
        .expect("task never deleted");
}

#[tokio::test]
async fn test_echo_by_label() {
    let ws = tempfile::tempdir().unwrap();
    write_tasks(
        ws.path(),
        r#"{
            // plain echo
            "tasks": [{ "label": "t1", "command": "/bin/echo", "args": ["hi"], "processType": "raw" }]
        }"#,
    );
    let server = server(ws.path()).await;
    assert_eq!(server.labels(), vec!["t1"]);
    let (_, mut rx) = server.events().channel();

    let info = server.run("t1").await.unwrap();
    assert!(info.terminal_id.is_none());
    assert!(info.os_process_id.is_some());

    let (entries, exit) = run_to_exit(&mut rx, info.task_id).await;
    assert!(entries.is_empty());
    assert_eq!(exit.code, Some(0));
    assert_eq!(exit.signal, None);

    wait_until_deleted(&server, info.task_id).await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_unknown_command_issues_no_task() {
    let ws = tempfile::tempdir().unwrap();
    let server = server(ws.path()).await;
    let (_, mut rx) = server.events().channel();

    let err = server
        .run(TaskSpecification::new("bogus", "thisisnotavalidcommand"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CommandNotFound(ref c) if c == "thisisnotavalidcommand"));
    assert!(err.is_run_rejection());
    assert!(server.manager().is_empty());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_unknown_label() {
    let ws = tempfile::tempdir().unwrap();
    let server = server(ws.path()).await;

    let err = server.run("nope").await.unwrap_err();
    assert!(matches!(err, Error::TaskNotFound(ref l) if l == "nope"));
    assert_eq!(err.to_string(), "Task with label nope not found");
}

#[tokio::test]
async fn test_spawn_failure_leaves_no_task() {
    let ws = tempfile::tempdir().unwrap();
    let script = ws.path().join("not-executable.sh");
    std::fs::write(&script, "#!/bin/sh\necho never\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o644)).unwrap();

    let server = server(ws.path()).await;
    let err = server
        .run(TaskSpecification::new("script", "not-executable.sh"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Spawn(_)));
    assert!(server.manager().is_empty());
}

#[tokio::test]
async fn test_kill_produces_single_signaled_exit() {
    let ws = tempfile::tempdir().unwrap();
    let server = server(ws.path()).await;
    let (_, mut rx) = server.events().channel();

    let info = server
        .run(TaskSpecification::new("sleeper", "sleep").with_args(["30"]))
        .await
        .unwrap();
    assert!(server.manager().get(info.task_id).is_some());

    server.kill(info.task_id);
    server.kill(info.task_id);
    server.kill(info.task_id);

    let (_, exit) = run_to_exit(&mut rx, info.task_id).await;
    assert!(exit.is_signaled());
    assert_eq!(exit.code, None);
    assert_eq!(exit.signal.as_deref(), Some("SIGTERM"));

    wait_until_deleted(&server, info.task_id).await;
    server.kill(info.task_id);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(rx.try_recv().is_err(), "duplicate exit event");
}

#[tokio::test]
async fn test_kill_unknown_id_is_harmless() {
    let ws = tempfile::tempdir().unwrap();
    let server = server(ws.path()).await;
    let (_, mut rx) = server.events().channel();

    server.kill(TaskId(999));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_exit_code_reported() {
    let ws = tempfile::tempdir().unwrap();
    let server = server(ws.path()).await;
    let (_, mut rx) = server.events().channel();

    let info = server
        .run(TaskSpecification::new("fail", "/bin/sh").with_args(["-c", "exit 7"]))
        .await
        .unwrap();
    let (_, exit) = run_to_exit(&mut rx, info.task_id).await;
    assert_eq!(exit.code, Some(7));
    assert!(!exit.is_signaled());
}

#[tokio::test]
async fn test_entries_arrive_before_exit() {
    let ws = tempfile::tempdir().unwrap();
    let server = server(ws.path()).await;
    let (_, mut rx) = server.events().channel();

    let script = "printf 'pkg: src/a.ts(3,4): error TS1005: boom\\n'; \
                  printf 'noise\\n'; \
                  printf 'pkg: src/b.ts(5,6): error TS2304: bang\\n'";
    let info = server
        .run(
            TaskSpecification::new("tsc", "/bin/sh")
                .with_args(["-c", script])
                .with_matcher("tsc"),
        )
        .await
        .unwrap();

    let (entries, exit) = run_to_exit(&mut rx, info.task_id).await;
    assert_eq!(exit.code, Some(0));
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].file, ws.path().join("src/a.ts"));
    assert_eq!((entries[0].line, entries[0].column), (3, 4));
    assert_eq!(entries[0].code.as_deref(), Some("TS1005"));
    assert_eq!(entries[1].file, ws.path().join("src/b.ts"));
    assert_eq!(entries[1].message, "bang");
}

#[tokio::test]
async fn test_stderr_between_halves_of_a_stdout_line() {
    let ws = tempfile::tempdir().unwrap();
    let server = server(ws.path()).await;
    let (_, mut rx) = server.events().channel();

    let script = "printf 'pkg: src/a.ts(1,1): err'; sleep 0.2; \
                  printf 'noise\\n' >&2; sleep 0.2; \
                  printf 'or TS1: x\\n'";
    let info = server
        .run(
            TaskSpecification::new("tsc", "/bin/sh")
                .with_args(["-c", script])
                .with_matcher("tsc"),
        )
        .await
        .unwrap();

    let (entries, exit) = run_to_exit(&mut rx, info.task_id).await;
    assert_eq!(exit.code, Some(0));
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].file, ws.path().join("src/a.ts"));
    assert_eq!(entries[0].code.as_deref(), Some("TS1"));
    assert_eq!(entries[0].message, "x");
}

#[tokio::test]
async fn test_unknown_matcher_still_runs() {
    let ws = tempfile::tempdir().unwrap();
    let server = server(ws.path()).await;
    let (_, mut rx) = server.events().channel();

    let info = server
        .run(
            TaskSpecification::new("echo", "/bin/echo")
                .with_args(["pkg: a.ts(1,1): error TS1: x"])
                .with_matcher("no-such-matcher"),
        )
        .await
        .unwrap();
    let (entries, exit) = run_to_exit(&mut rx, info.task_id).await;
    assert!(entries.is_empty());
    assert_eq!(exit.code, Some(0));
}

#[tokio::test]
async fn test_relative_cwd() {
    let ws = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(ws.path().join("sub")).unwrap();
    let server = server(ws.path()).await;
    let (_, mut rx) = server.events().channel();

    let info = server
        .run(
            TaskSpecification::new("cwd", "/bin/sh")
                .with_args(["-c", "test \"$(basename \"$(pwd -P)\")\" = sub"])
                .with_cwd("sub"),
        )
        .await
        .unwrap();
    let (_, exit) = run_to_exit(&mut rx, info.task_id).await;
    assert_eq!(exit.code, Some(0));
}

#[tokio::test]
async fn test_pty_task() {
    let ws = tempfile::tempdir().unwrap();
    let server = server(ws.path()).await;
    let (_, mut rx) = server.events().channel();

    let info = server
        .run(
            TaskSpecification::new("pty", "/bin/echo")
                .with_args(["pkg: src/t.ts(9,1): error TS9: from pty"])
                .with_process_type(ProcessKind::Terminal)
                .with_matcher("tsc"),
        )
        .await
        .unwrap();
    assert!(info.terminal_id.is_some());
    assert_eq!(info.terminal_id, Some(info.process_id));

    let (entries, exit) = run_to_exit(&mut rx, info.task_id).await;
    assert_eq!(exit.code, Some(0));
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].message, "from pty");
}

#[tokio::test]
async fn test_send_input() {
    let ws = tempfile::tempdir().unwrap();
    let server = server(ws.path()).await;
    let (_, mut rx) = server.events().channel();

    let info = server
        .run(TaskSpecification::new("cat", "/bin/cat").with_process_type(ProcessKind::Terminal))
        .await
        .unwrap();
    server.send_input(info.task_id, b"hello\n").unwrap();

    // raw processes have no input
    let raw = server
        .run(TaskSpecification::new("sleep", "/bin/sleep").with_args(["30"]))
        .await
        .unwrap();
    assert!(server.send_input(raw.task_id, b"x").is_err());
    assert!(server.send_input(TaskId(999), b"x").is_err());

    server.shutdown().await;
    run_to_exit(&mut rx, info.task_id).await;
    wait_until_deleted(&server, raw.task_id).await;
    assert!(server.manager().is_empty());
}

#[tokio::test]
async fn test_add_definition_then_run() {
    let ws = tempfile::tempdir().unwrap();
    let server = server(ws.path()).await;
    let (_, mut rx) = server.events().channel();

    server
        .add_definition(TaskSpecification::new("greet", "echo").with_args(["hello"]))
        .await
        .unwrap();
    assert_eq!(server.labels(), vec!["greet"]);
    assert!(ws.path().join(".taskforge/tasks.json").is_file());

    let err = server
        .add_definition(TaskSpecification::new("greet", "echo"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateLabel(_)));

    let info = server.run("greet").await.unwrap();
    let (_, exit) = run_to_exit(&mut rx, info.task_id).await;
    assert_eq!(exit.code, Some(0));
}

#[tokio::test]
async fn test_definitions_follow_file_changes() {
    let ws = tempfile::tempdir().unwrap();
    write_tasks(ws.path(), r#"{ "tasks": [] }"#);
    let server = server(ws.path()).await;
    let mut reloads = server.definitions().subscribe_reloads();
    reloads.borrow_and_update();

    write_tasks(
        ws.path(),
        r#"{ "tasks": [
            { "label": "build", "command": "make" },
            { "label": "build", "command": "ignored" }
        ] }"#,
    );

    let reloaded = async {
        loop {
            reloads.changed().await.unwrap();
            if !server.labels().is_empty() {
                break;
            }
        }
    };
    tokio::time::timeout(WAIT, reloaded)
        .await
        .expect("definitions not reloaded");

    assert_eq!(server.labels(), vec!["build"]);
    let spec = server.definitions().resolve("build").unwrap();
    assert_eq!(spec.command, "make");
    server.shutdown().await;
}
