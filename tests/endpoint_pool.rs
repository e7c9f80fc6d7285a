//! Pool configuration, dispatch failover, and shutdown behavior.

mod common;

use common::{mock_pool, MockTransport};
use nifty_stakes::error::ClientError;
use nifty_stakes::types::EndpointDescriptor;
use nifty_stakes::ClientConfig;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn config() -> Arc<ClientConfig> {
    Arc::new(ClientConfig::default())
}

#[tokio::test]
async fn configure_rejects_mismatched_genesis_and_keeps_prior_set() {
    let a = MockTransport::new("genesis-alpha");
    let b = MockTransport::new("genesis-beta");
    let pool = mock_pool(
        config(),
        HashMap::from([
            ("http://a".to_string(), a.clone()),
            ("http://b".to_string(), b.clone()),
        ]),
    );

    pool.configure(Some(vec![EndpointDescriptor::new("http://a")]))
        .await
        .unwrap();

    let err = pool
        .configure(Some(vec![
            EndpointDescriptor::new("http://a"),
            EndpointDescriptor::new("http://b"),
        ]))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Configuration(_)));

    // The prior single-endpoint set survived: dispatch only ever sees "a".
    let calls_before = a.total_calls.load(Ordering::SeqCst);
    for _ in 0..4 {
        pool.dispatch(|endpoint| async move { endpoint.get_epoch_info().await })
            .await
            .unwrap();
    }
    assert_eq!(a.total_calls.load(Ordering::SeqCst), calls_before + 4);

    // The fingerprint established by "a" also rejects "b" on its own.
    let err = pool
        .configure(Some(vec![EndpointDescriptor::new("http://b")]))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Configuration(_)));
}

#[tokio::test(start_paused = true)]
async fn dispatch_rotates_past_a_failing_endpoint() {
    let bad = MockTransport::new("genesis");
    let good = MockTransport::new("genesis");
    let pool = mock_pool(
        config(),
        HashMap::from([
            ("http://bad".to_string(), bad.clone()),
            ("http://good".to_string(), good.clone()),
        ]),
    );
    pool.configure(Some(vec![
        EndpointDescriptor::new("http://bad"),
        EndpointDescriptor::new("http://good"),
    ]))
    .await
    .unwrap();
    bad.fail_all.store(true, Ordering::SeqCst);

    for _ in 0..6 {
        pool.dispatch(|endpoint| async move { endpoint.get_epoch_info().await })
            .await
            .unwrap();
    }
    // The failing endpoint was tried and rotated past, never surfacing an
    // error to the caller.
    assert!(bad.total_calls.load(Ordering::SeqCst) > 1);
    assert!(good.total_calls.load(Ordering::SeqCst) >= 6);
}

#[tokio::test]
async fn dispatch_once_propagates_first_failure() {
    let bad = MockTransport::new("genesis");
    let pool = mock_pool(config(), HashMap::from([("http://bad".to_string(), bad.clone())]));
    pool.configure(Some(vec![EndpointDescriptor::new("http://bad")]))
        .await
        .unwrap();
    bad.fail_all.store(true, Ordering::SeqCst);

    let err = pool
        .dispatch_once(|endpoint| async move { endpoint.get_epoch_info().await })
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
}

#[tokio::test]
async fn shutdown_fails_everything_fast() {
    let a = MockTransport::new("genesis");
    let pool = mock_pool(config(), HashMap::from([("http://a".to_string(), a.clone())]));
    pool.configure(Some(vec![EndpointDescriptor::new("http://a")]))
        .await
        .unwrap();

    pool.shutdown();
    pool.shutdown(); // idempotent

    let err = pool
        .dispatch(|endpoint| async move { endpoint.get_epoch_info().await })
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Shutdown));

    let err = pool
        .dispatch_once(|endpoint| async move { endpoint.get_epoch_info().await })
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Shutdown));

    let err = pool
        .configure(Some(vec![EndpointDescriptor::new("http://a")]))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Shutdown));

    // A periodic loop on a shut-down pool exits without running anything.
    let runs = AtomicUsize::new(0);
    pool.run_periodically(Duration::from_secs(1), || {
        runs.fetch_add(1, Ordering::SeqCst);
        async { Ok::<(), ClientError>(()) }
    })
    .await;
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_dispatch_backoff() {
    let bad = MockTransport::new("genesis");
    let pool = mock_pool(config(), HashMap::from([("http://bad".to_string(), bad.clone())]));
    pool.configure(Some(vec![EndpointDescriptor::new("http://bad")]))
        .await
        .unwrap();
    bad.fail_all.store(true, Ordering::SeqCst);

    let dispatching = {
        let pool = pool.clone();
        tokio::spawn(async move {
            pool.dispatch(|endpoint| async move { endpoint.get_epoch_info().await })
                .await
        })
    };
    tokio::task::yield_now().await;
    pool.shutdown();

    let result = dispatching.await.unwrap();
    assert!(matches!(result.unwrap_err(), ClientError::Shutdown));
}

#[tokio::test(start_paused = true)]
async fn run_periodically_backs_off_on_failure_and_never_overlaps() {
    let a = MockTransport::new("genesis");
    let pool = mock_pool(config(), HashMap::from([("http://a".to_string(), a.clone())]));
    pool.configure(Some(vec![EndpointDescriptor::new("http://a")]))
        .await
        .unwrap();

    let runs = Arc::new(AtomicUsize::new(0));
    let loop_task = {
        let pool = pool.clone();
        let runs = runs.clone();
        tokio::spawn(async move {
            pool.run_periodically(Duration::from_secs(60), move || {
                let runs = runs.clone();
                async move {
                    let n = runs.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        // First pass fails and must be retried after the
                        // short backoff, not the full interval.
                        Err(ClientError::Transport("transient".into()))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;
        })
    };

    // First run happens immediately; the failure backoff is 1 second.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    // The success interval is a minute; nothing more for a while.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 3);

    pool.shutdown();
    loop_task.await.unwrap();
}
