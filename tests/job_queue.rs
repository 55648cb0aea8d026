mod common;

use case_autofill::models::{DeadLetterReason, ErrorKind, Job, JobState};
use case_autofill::orchestrator::{Dequeued, JobQueue};
use common::record;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

async fn take(queue: &JobQueue) -> Job {
    match tokio::time::timeout(Duration::from_secs(1), queue.dequeue()).await {
        Ok(Dequeued::Job(job)) => job,
        Ok(Dequeued::Closed) => panic!("队列不应已关闭"),
        Err(_) => panic!("出队超时"),
    }
}

#[tokio::test]
async fn test_fifo_order() {
    let queue = JobQueue::new();
    for id in ["A", "B", "C"] {
        assert_ok!(queue.enqueue(Job::new(record(id))).await);
    }

    assert_eq!(take(&queue).await.id(), "A");
    assert_eq!(take(&queue).await.id(), "B");
    assert_eq!(take(&queue).await.id(), "C");
    assert_eq!(queue.outstanding().await, 3);
}

#[tokio::test]
async fn test_backoff_job_is_skipped_until_eligible() {
    let queue = JobQueue::new();
    assert_ok!(queue.enqueue(Job::new(record("A"))).await);
    let a = take(&queue).await;

    let requeued_at = Instant::now();
    queue.requeue_with_delay(a, Duration::from_millis(80)).await;
    assert_ok!(queue.enqueue(Job::new(record("B"))).await);

    // A 还在退避中，B 先出队
    assert_eq!(take(&queue).await.id(), "B");

    let a = take(&queue).await;
    assert_eq!(a.id(), "A");
    assert_eq!(a.state(), JobState::Retrying);
    assert!(requeued_at.elapsed() >= Duration::from_millis(80));
}

#[tokio::test]
async fn test_dequeue_waits_for_enqueue() {
    let queue = Arc::new(JobQueue::new());

    let waiter = {
        let queue = queue.clone();
        tokio::spawn(async move { take(&queue).await.id().to_string() })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    assert_ok!(queue.enqueue(Job::new(record("late"))).await);
    assert_eq!(waiter.await.unwrap(), "late");
}

#[tokio::test]
async fn test_closed_only_after_all_jobs_terminal() {
    let queue = Arc::new(JobQueue::new());
    assert_ok!(queue.enqueue(Job::new(record("A"))).await);
    queue.close().await;

    let job = take(&queue).await;

    // A 还在 worker 手里，另一个出队者必须继续等待
    let waiter = {
        let queue = queue.clone();
        tokio::spawn(async move { matches!(queue.dequeue().await, Dequeued::Closed) })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    let reason = DeadLetterReason {
        kind: ErrorKind::PermanentUi,
        detail: "form changed".to_string(),
    };
    let snapshot = queue.dead_letter(job, reason).await;
    assert_eq!(snapshot.state(), JobState::DeadLettered);

    assert!(waiter.await.unwrap());
    assert_eq!(queue.outstanding().await, 0);
    assert_eq!(queue.dead_letters().await.len(), 1);
}

#[tokio::test]
async fn test_enqueue_rejected_after_close_and_for_duplicates() {
    let queue = JobQueue::new();
    assert_ok!(queue.enqueue(Job::new(record("A"))).await);
    assert_err!(queue.enqueue(Job::new(record("A"))).await);

    queue.close().await;
    let err = queue.enqueue(Job::new(record("B"))).await.unwrap_err();
    assert!(err.is_system_fault());
    assert!(queue.is_closed().await);
    assert_eq!(queue.len().await, 1);
}

#[tokio::test]
async fn test_dead_letter_is_separate_from_ready() {
    let queue = JobQueue::new();
    assert_ok!(queue.enqueue(Job::new(record("A"))).await);
    assert_ok!(queue.enqueue(Job::new(record("B"))).await);

    let a = take(&queue).await;
    queue
        .dead_letter(
            a,
            DeadLetterReason {
                kind: ErrorKind::DataValidation,
                detail: "bad date".to_string(),
            },
        )
        .await;

    let queued: Vec<String> = queue
        .queued_jobs()
        .await
        .iter()
        .map(|j| j.id().to_string())
        .collect();
    assert_eq!(queued, vec!["B"]);
    assert_eq!(queue.dead_letters().await[0].id(), "A");
    assert_eq!(queue.outstanding().await, 1);
}
