//! Tests for host shutdown through the process registry.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use cli_bridge::process::{SpawnError, KILL_SIGNAL};

use super::{script, supervisor};

#[tokio::test]
async fn shutdown_of_empty_registry_is_immediate() {
    let supervisor = supervisor();
    let start = Instant::now();
    assert!(supervisor.registry().shutdown(Duration::from_secs(5)).await);
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(supervisor.registry().is_closing());
}

#[tokio::test]
async fn spawn_after_shutdown_is_refused() {
    let supervisor = supervisor();
    supervisor.registry().shutdown(Duration::from_millis(10)).await;
    let err = supervisor
        .spawn(&script("exit 0"), None, CancellationToken::new())
        .unwrap_err();
    assert!(matches!(err, SpawnError::ShuttingDown));
}

#[tokio::test]
async fn shutdown_signals_every_child_in_parallel() {
    let supervisor = supervisor();
    let mut graceful = supervisor
        .spawn(&script("exec sleep 30"), None, CancellationToken::new())
        .unwrap();
    let mut stubborn = supervisor
        .spawn(&script(crate::IGNORE_TERM), None, CancellationToken::new())
        .unwrap();
    // Let the stubborn shell install its trap.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let waiter = supervisor.clone();
    let waits = tokio::spawn(async move {
        let (a, b) = tokio::join!(waiter.wait(&mut graceful), waiter.wait(&mut stubborn));
        (a.unwrap(), b.unwrap())
    });

    let start = Instant::now();
    assert!(supervisor.registry().shutdown(Duration::from_secs(5)).await);
    let (graceful, stubborn) = waits.await.unwrap();

    assert!(!graceful.cancelled);
    assert_eq!(graceful.signal, Some(15));
    assert!(stubborn.cancelled);
    assert_eq!(stubborn.signal, Some(KILL_SIGNAL));
    // One grace period for both, not one each.
    assert!(start.elapsed() < Duration::from_millis(1500));
    assert!(supervisor.registry().is_empty());
}
