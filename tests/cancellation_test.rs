//! Stop, deadline and wake-up behaviour of the dispatcher

mod fixtures;

use fixtures::{assert_one_task_per_agent, collect_until_settled, traces_by_task};
use fleet_dispatch::{AgentPool, AgentStatus, DispatchError, FleetEvent, Location};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_cancels_agents_mid_move() {
    let pool = AgentPool::new(2, &[]).unwrap();
    let mut events = pool.subscribe();
    pool.start(Duration::from_millis(20));

    pool.submit(Location::new(100, 100)).await.unwrap();
    pool.submit(Location::new(100, 100)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(70)).await;

    pool.stop().await;
    let snapshot = pool.wait_all_timeout(Duration::from_secs(2)).await.unwrap();
    assert_eq!(snapshot.pending, 0);
    assert_eq!(snapshot.cancelled, 2);
    assert_eq!(snapshot.completed, 0);

    let events = collect_until_settled(&mut events, 2).await;
    assert_one_task_per_agent(&events);
    let cancelled = events
        .iter()
        .filter(|e| matches!(e, FleetEvent::Cancelled { .. }))
        .count();
    assert_eq!(cancelled, 2);

    for trace in traces_by_task(&events).values() {
        assert!(trace.cancelled);
        let position = trace.final_position.unwrap();
        assert_ne!(position, Location::new(100, 100));
        assert_eq!(trace.reported_steps, Some(trace.steps_seen));
    }

    assert!(pool
        .agents()
        .iter()
        .all(|a| a.status() == AgentStatus::Stopped));
    assert!(!pool.is_running());
}

#[tokio::test]
async fn submit_after_stop_fails() {
    let pool = AgentPool::new(1, &[]).unwrap();
    pool.start(Duration::ZERO);
    pool.stop().await;

    assert_eq!(
        pool.submit(Location::new(1, 1)).await,
        Err(DispatchError::Stopped)
    );
    assert_eq!(pool.tracker().pending(), 0);
    assert_eq!(pool.metrics().submissions, 0);
}

#[tokio::test(start_paused = true)]
async fn deadline_expires_while_every_agent_is_busy() {
    let pool = AgentPool::new(1, &[]).unwrap();
    pool.start(Duration::from_secs(1));
    pool.submit(Location::new(50, 50)).await.unwrap();

    let deadline = Instant::now() + Duration::from_millis(100);
    let err = pool
        .submit_with_deadline(Location::new(1, 1), Some(deadline))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DispatchError::Timeout { destination, waited_ms } if destination == Location::new(1, 1) && waited_ms >= 100
    ));
    assert!(err.is_retryable());

    let snapshot = pool.tracker().snapshot();
    assert_eq!(snapshot.rejected, 1);
    assert_eq!(snapshot.pending, 1);
    assert_eq!(pool.metrics().timeouts, 1);

    pool.stop().await;
}

#[tokio::test(start_paused = true)]
async fn pool_submit_timeout_applies_to_plain_submit() {
    let pool = AgentPool::new(1, &[])
        .unwrap()
        .with_submit_timeout(Some(Duration::from_millis(250)));
    pool.start(Duration::from_secs(1));
    pool.submit(Location::new(0, 30)).await.unwrap();

    let err = pool.submit(Location::new(0, -30)).await.unwrap_err();
    assert!(matches!(err, DispatchError::Timeout { .. }));

    pool.stop().await;
    let snapshot = pool.wait_all().await;
    assert_eq!(snapshot.rejected, 1);
    assert_eq!(snapshot.cancelled, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn waiting_submitter_wakes_when_agent_is_released() {
    let pool = AgentPool::new(1, &[]).unwrap();
    let mut events = pool.subscribe();
    pool.start(Duration::from_millis(5));

    pool.submit(Location::new(3, 3)).await.unwrap();
    // Only agent is busy: this submission has to wait for the arrival
    pool.submit(Location::new(0, 0)).await.unwrap();

    let snapshot = pool.wait_all_timeout(Duration::from_secs(5)).await.unwrap();
    assert_eq!(snapshot.completed, 2);
    assert!(pool.metrics().contention_waits >= 1);

    let events = collect_until_settled(&mut events, 2).await;
    let departures: Vec<(Location, Location)> = events
        .iter()
        .filter_map(|e| match e {
            FleetEvent::Departed {
                position,
                destination,
                ..
            } => Some((*position, *destination)),
            _ => None,
        })
        .collect();
    assert_eq!(
        departures,
        vec![
            (Location::ORIGIN, Location::new(3, 3)),
            (Location::new(3, 3), Location::ORIGIN),
        ]
    );

    pool.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn waiting_submitter_is_released_by_stop() {
    let pool = Arc::new(AgentPool::new(1, &[]).unwrap());
    pool.start(Duration::from_millis(50));
    pool.submit(Location::new(-100, 0)).await.unwrap();

    let waiter = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.submit(Location::new(1, 1)).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!waiter.is_finished());

    pool.stop().await;
    let result = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("waiter must observe the stop")
        .unwrap();
    assert_eq!(result, Err(DispatchError::Stopped));

    let snapshot = pool.wait_all_timeout(Duration::from_secs(2)).await.unwrap();
    assert_eq!(snapshot.pending, 0);
    assert_eq!(snapshot.cancelled, 1);
    assert_eq!(snapshot.rejected, 1);
}

#[tokio::test(start_paused = true)]
async fn wait_all_timeout_reports_outstanding_tasks() {
    let pool = AgentPool::new(1, &[]).unwrap();
    pool.start(Duration::from_secs(1));
    pool.submit(Location::new(10, 0)).await.unwrap();

    let err = pool
        .wait_all_timeout(Duration::from_millis(100))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DispatchError::WaitTimeout {
            pending: 1,
            waited_ms: 100
        }
    );

    pool.stop().await;
    assert_eq!(pool.tracker().pending(), 0);
}
