//! Render jobs driving real `/bin/sh` subprocesses.

#![cfg(unix)]

use std::path::Path;
use std::time::Duration;

use cutroom_render_job::{
    ChannelReporter, FailureKind, ProgressEvent, RenderJob, RenderRequest, RenderSettings,
    RenderState, RenderStatus,
};

/// Write a shell "scene list" that the `/bin/sh` renderer will execute.
fn write_scene(dir: &Path, body: &str) -> std::path::PathBuf {
    let scene = dir.join("scene.sh");
    std::fs::write(&scene, body).unwrap();
    scene
}

fn fast_settings() -> RenderSettings {
    RenderSettings {
        grace_period: Duration::from_secs(2),
        description_interval: Duration::from_millis(10),
        error_tail_lines: 5,
    }
}

#[tokio::test]
async fn shell_renderer_success_writes_log_and_progress() {
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("out.mp4");
    let scene = write_scene(
        dir.path(),
        &format!(
            "echo 'opening composition' >&2\n\
             echo 'frame=25' >&2\n\
             echo 'frame=50' >&2\n\
             printf 'media' > '{}'\n",
            destination.display()
        ),
    );

    let request = RenderRequest::new("/bin/sh", &scene, &destination).total_frames(50);
    let log_path = request.effective_log_path();
    let (reporter, mut events) = ChannelReporter::new();
    let outcome = RenderJob::new(request)
        .with_settings(fast_settings())
        .with_reporter(Box::new(reporter))
        .run()
        .await;

    assert_eq!(outcome.status, RenderStatus::Success, "{}", outcome.message);

    let mut percents = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ProgressEvent::Percent { value } = event {
            percents.push(value);
        }
    }
    assert_eq!(percents, vec![50, 100]);

    let log = std::fs::read_to_string(&log_path).unwrap();
    assert!(log.contains("opening composition"));
    assert!(!log.contains("frame=25"));
    assert!(log.contains("# render finished"));
}

#[tokio::test]
async fn shell_renderer_failure_carries_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("out.mp4");
    let scene = write_scene(dir.path(), "echo 'Failed to load profile' >&2\nexit 4\n");

    let outcome = RenderJob::new(RenderRequest::new("/bin/sh", &scene, &destination))
        .with_settings(fast_settings())
        .run()
        .await;

    assert_eq!(outcome.status, RenderStatus::Failed(FailureKind::Subprocess));
    assert_eq!(outcome.message, "Failed to load profile");
}

#[tokio::test]
async fn missing_renderer_is_a_launch_failure() {
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("out.mp4");

    let outcome = RenderJob::new(RenderRequest::new(
        dir.path().join("no-such-renderer"),
        dir.path().join("scene.mlt"),
        &destination,
    ))
    .run()
    .await;

    assert_eq!(outcome.status, RenderStatus::Failed(FailureKind::Launch));
}

#[tokio::test]
async fn abort_terminates_running_renderer() {
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("out.mp4");
    let scene = write_scene(
        dir.path(),
        &format!(
            "printf 'partial' > '{}'\nexec sleep 30\n",
            destination.display()
        ),
    );

    let request = RenderRequest::new("/bin/sh", &scene, &destination)
        .erase_on_abort(true)
        .remove_log_on_success(true);
    let log_path = request.effective_log_path();
    let running = RenderJob::new(request).with_settings(fast_settings()).start();

    let mut states = running.subscribe();
    states
        .wait_for(|s| *s == RenderState::Rendering)
        .await
        .unwrap();
    // Give the shell time to create the partial output
    tokio::time::sleep(Duration::from_millis(200)).await;

    let abort = running.abort_handle();
    assert!(abort.abort_matching(&destination));
    let outcome = tokio::time::timeout(Duration::from_secs(10), running.wait())
        .await
        .expect("abort should finish the job promptly");

    assert_eq!(outcome.status, RenderStatus::Aborted);
    assert!(!destination.exists());
    // Log is only removed after success
    assert!(log_path.exists());
}

#[tokio::test]
async fn log_is_removed_after_success_when_requested() {
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("out.mp4");
    let scene = write_scene(
        dir.path(),
        &format!("printf 'media' > '{}'\n", destination.display()),
    );

    let request = RenderRequest::new("/bin/sh", &scene, &destination).remove_log_on_success(true);
    let log_path = request.effective_log_path();
    let outcome = RenderJob::new(request).run().await;

    assert_eq!(outcome.status, RenderStatus::Success);
    assert!(!log_path.exists());
}
