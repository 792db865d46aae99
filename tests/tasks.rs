#![cfg(unix)]

mod common;

use std::time::Duration;

use hearth::tasks::{TaskEvent, TaskSupervisor};

use common::Fixture;

async fn next_message(rx: &mut tokio::sync::broadcast::Receiver<TaskEvent>) -> serde_json::Value {
    loop {
        match rx.recv().await.unwrap() {
            TaskEvent::Message { message, .. } => return message,
            TaskEvent::Exited { .. } => continue,
        }
    }
}

#[tokio::test]
async fn test_tasks_start_on_listen_and_stop_with_app() {
    let fixture = Fixture::new();
    fixture.write_app("tasks/sleeper.sh", "exec sleep 5\n");

    let app = fixture.app(|_| {});
    app.boot().unwrap();
    let supervisor = app.container().resolve::<TaskSupervisor>("tasks").unwrap();
    assert_eq!(supervisor.running(), 0);

    app.listen().await.unwrap();
    assert_eq!(supervisor.running(), 1);
    assert_eq!(supervisor.active_ids(), vec!["sleeper"]);

    let code = tokio::time::timeout(Duration::from_secs(5), app.stop(None))
        .await
        .unwrap();
    assert_eq!(code, 0);
    assert_eq!(supervisor.running(), 0);
    assert!(supervisor.active_ids().is_empty());
}

#[tokio::test]
async fn test_task_sees_application_environment() {
    let fixture = Fixture::new();
    fixture.write_app(
        "tasks/reporter.sh",
        "echo \"{\\\"app\\\":\\\"$HEARTH_APP\\\",\\\"env\\\":\\\"$HEARTH_ENV\\\"}\"\nexec sleep 5\n",
    );

    let app = fixture.app(|_| {});
    app.boot().unwrap();
    let supervisor = app.container().resolve::<TaskSupervisor>("tasks").unwrap();
    let mut rx = supervisor.subscribe();
    app.listen().await.unwrap();

    let message = tokio::time::timeout(Duration::from_secs(5), next_message(&mut rx))
        .await
        .unwrap();
    assert_eq!(message, serde_json::json!({ "app": "main", "env": "test" }));

    app.stop(None).await;
}

#[tokio::test]
async fn test_configured_task_files_are_added() {
    let fixture = Fixture::with_config("tasks:\n  files:\n    - ../jobs/cleanup.sh\n");
    fixture.write_app("jobs/cleanup.sh", "exec sleep 5\n");
    std::fs::create_dir_all(fixture.app_path("tasks")).unwrap();

    let app = fixture.app(|_| {});
    app.boot().unwrap();
    assert!(!app.phases().tasks);

    let supervisor = app.container().resolve::<TaskSupervisor>("tasks").unwrap();
    assert_eq!(supervisor.files(), vec![fixture.app_path("tasks/../jobs/cleanup.sh")]);

    app.listen().await.unwrap();
    assert_eq!(supervisor.active_ids(), vec!["cleanup"]);

    app.stop(None).await;
    assert_eq!(supervisor.running(), 0);
}

#[tokio::test]
async fn test_message_round_trip_through_app_task() {
    let fixture = Fixture::new();
    fixture.write_app("tasks/echo.sh", "while read line; do echo \"$line\"; done\n");

    let app = fixture.app(|_| {});
    app.boot().unwrap();
    let supervisor = app.container().resolve::<TaskSupervisor>("tasks").unwrap();
    let mut rx = supervisor.subscribe();
    app.listen().await.unwrap();

    supervisor
        .send("echo", &serde_json::json!({ "job": 7 }))
        .await
        .unwrap();
    let message = tokio::time::timeout(Duration::from_secs(5), next_message(&mut rx))
        .await
        .unwrap();
    assert_eq!(message, serde_json::json!({ "job": 7 }));

    app.stop(None).await;
}
