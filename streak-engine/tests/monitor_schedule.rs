//! Deadline monitor scheduling under paused tokio time.

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use common::{dec, engine, CannedTransport};
use streak_engine::{DeadlineMonitor, EngineEvent, ManualCommitment};

fn overdue() -> ManualCommitment {
    ManualCommitment {
        lead_name: "Ada".into(),
        profile_url: "https://linkedin.com/in/ada".into(),
        stake_amount: dec("0.10"),
        deadline: Some(Utc::now() - ChronoDuration::minutes(1)),
        ..Default::default()
    }
}

async fn next_miss(events: &mut tokio::sync::broadcast::Receiver<EngineEvent>) -> String {
    loop {
        if let EngineEvent::DeadlineMissed { task_id, .. } = events.recv().await.unwrap() {
            return task_id;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_monitor_passes_follow_interval() {
    let engine = engine("1", CannedTransport::new());
    let mut events = engine.subscribe();

    let first = engine.create_commitment(overdue()).await.unwrap();
    let started = Instant::now();
    let handle = DeadlineMonitor::spawn(Arc::clone(&engine), Duration::from_secs(5));

    // First pass runs immediately
    assert_eq!(next_miss(&mut events).await, first.id);
    assert!(started.elapsed() < Duration::from_secs(5));

    // A commitment added later is picked up by the next tick, not before
    let second = engine.create_commitment(overdue()).await.unwrap();
    let missed = tokio::time::timeout(Duration::from_secs(30), next_miss(&mut events))
        .await
        .expect("second pass");
    assert_eq!(missed, second.id);
    assert!(started.elapsed() >= Duration::from_secs(5));

    handle.stop().await;
    assert_eq!(engine.missed_tasks().await.len(), 2);
}
