//! End-to-end scenarios exercising the full spawn -> capture/signal -> wait
//! path. Styled after `turborepo-process::child`'s own `tokio::test`-based
//! integration tests, adapted to spawn plain shell commands instead of
//! fixture scripts so the tests carry no external data dependency.

#![cfg(unix)]

use std::time::Duration;

use childproc::{deadline::MaybeDeadline, options::StartOptions, ExitStatus};
use tracing_test::traced_test;

fn sh(script: &str) -> StartOptions {
    let mut opts = StartOptions::new("/bin/sh");
    opts.arg("-c").arg(script);
    opts
}

#[tokio::test]
#[traced_test]
async fn captures_stdout_of_a_simple_echo() {
    let (captured, status) = childproc::spawn_capture(&sh("echo hello world")).await.unwrap();
    assert!(status.success());
    assert_eq!(captured.stdout, b"hello world\n");
    assert!(captured.stderr.is_empty());
}

#[tokio::test]
async fn nonzero_exit_is_reported_without_being_an_error() {
    let (_, status) = childproc::spawn_capture(&sh("exit 17")).await.unwrap();
    assert!(!status.success());
    assert_eq!(status.code(), Some(17));
}

#[tokio::test]
async fn capture_is_byte_exact_not_line_reconstructed() {
    let (captured, status) = childproc::spawn_capture(&sh("printf 'no newline'"))
        .await
        .unwrap();
    assert!(status.success());
    assert_eq!(captured.stdout, b"no newline");

    let (captured, status) = childproc::spawn_capture(&sh("printf 'a\\r\\nb\\r\\n'"))
        .await
        .unwrap();
    assert!(status.success());
    assert_eq!(captured.stdout, b"a\r\nb\r\n");
}

#[tokio::test]
async fn draining_stops_at_process_exit_not_grandchild_pipe_eof() {
    // The immediate child exits right away; the grandchild (backgrounded
    // with `&`) keeps the inherited stdout pipe open for a while longer.
    // A naive "read until EOF" drain would block on the grandchild; this
    // crate's drain must return once the child we actually spawned exits.
    let script = "( sleep 2 ) & echo parent-done";
    let started = std::time::Instant::now();
    let (captured, status) = childproc::spawn_capture(&sh(script)).await.unwrap();
    assert!(status.success());
    assert_eq!(captured.stdout, b"parent-done\n");
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "capture should not have waited for the backgrounded grandchild"
    );
}

#[tokio::test]
async fn wait_or_kill_terminates_a_runaway_process_on_timeout() {
    let mut child = childproc::spawn_inherit_handle(&sh("sleep 30")).unwrap();
    let result = child
        .wait_or_kill_async(MaybeDeadline::from_timeout(Some(Duration::from_millis(200))))
        .await
        .unwrap();
    assert!(!result.success());
    assert!(result.canceled());
}

#[tokio::test]
async fn inherit_composition_op_kills_on_deadline_and_reports_canceled() {
    let status = childproc::spawn_inherit(
        &sh("sleep 30"),
        MaybeDeadline::from_timeout(Some(Duration::from_millis(200))),
    )
    .await
    .unwrap();
    assert!(status.canceled());
}

#[tokio::test]
async fn piped_pair_streams_upstream_output_into_downstream_input() {
    let upstream = sh("printf 'one\\ntwo\\nthree\\n'");
    let downstream = sh("wc -l");
    let (mut up, mut down) = childproc::spawn_piped_pair(&upstream, &downstream).unwrap();

    let up_status = up.wait_async(MaybeDeadline::NONE).await.unwrap();
    assert!(up_status.success());
    let down_status = down.wait_async(MaybeDeadline::NONE).await.unwrap();
    assert!(down_status.success());
}

#[tokio::test]
async fn suspended_process_does_not_run_until_resumed() {
    let mut opts = sh("echo ran > /dev/null; echo done");
    opts.flags(childproc::Flags {
        create_suspended: true,
        ..Default::default()
    });

    let mut child = childproc::spawn_inherit_handle(&opts).unwrap();
    assert_eq!(child.state(), childproc::State::Suspended);

    // Give the (stopped) process a moment; it must not have exited yet.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(child.try_wait().unwrap(), None);

    child.resume().unwrap();
    let status = child.wait_async(MaybeDeadline::NONE).await.unwrap();
    assert!(status.success());
}

#[tokio::test]
async fn stream_lines_is_lazy_and_yields_every_line() {
    use futures::StreamExt;

    let mut lines = childproc::stream_lines(sh("printf 'one\\ntwo\\nthree\\n'"), MaybeDeadline::NONE);
    // Nothing has been spawned yet: no pid until the first poll.
    assert_eq!(lines.pid(), None);

    let mut collected = Vec::new();
    while let Some(line) = lines.next().await {
        collected.push(String::from_utf8(line.unwrap().data).unwrap());
    }
    assert_eq!(collected, vec!["one", "two", "three"]);
    assert!(lines.pid().is_some());
    assert!(lines.exit_status().unwrap().as_ref().unwrap().success());
}

#[tokio::test]
async fn stream_lines_backpressure_does_not_drop_output_from_a_fast_producer() {
    use futures::StreamExt;

    // More lines than the bounded queue's capacity, so the reader task must
    // block on enqueue at least once; every line must still arrive.
    let script = "for i in $(seq 1 200); do echo \"line $i\"; done";
    let mut lines = childproc::stream_lines(sh(script), MaybeDeadline::NONE);

    let mut count = 0;
    while let Some(line) = lines.next().await {
        line.unwrap();
        count += 1;
    }
    assert_eq!(count, 200);
    assert!(lines.exit_status().unwrap().as_ref().unwrap().success());
}

#[allow(dead_code)]
fn assert_exit_status_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<ExitStatus>();
}
