//! Priority dispatch queue: tier precedence, replace-by-id and stop

use super::{gate, push, record, recorded, Latch};
use crate::queue::{DispatchId, Priority, PriorityDispatchQueue, QueueError};
use std::sync::mpsc;
use std::time::{Duration, Instant};

const JOIN: Option<Duration> = Some(Duration::from_secs(5));

/// Wait until the queue has nothing pending, then give the worker time to finish
fn settle(queue: &PriorityDispatchQueue) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while queue.pending() > 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_replace_collapses_to_latest() {
    let log = record();
    let queue = PriorityDispatchQueue::new("status");
    let slot = DispatchId::from("now-playing");

    let first = queue
        .add(push(&log, 1), Some(slot.clone()), Priority::High)
        .unwrap();
    let second = queue.add(push(&log, 2), Some(first), Priority::Low).unwrap();

    assert_eq!(second, slot);
    assert_eq!(queue.pending(), 1);
    assert!(queue.contains(&slot));
    assert_eq!(queue.priority_of(&slot), Some(Priority::Low));

    queue.start().unwrap();
    settle(&queue);
    queue.stop().unwrap();
    assert!(queue.join(JOIN));

    assert_eq!(recorded(&log), vec![2]);
}

#[test]
fn test_tiers_drain_highest_first_fifo_within_tier() {
    let log = record();
    let queue = PriorityDispatchQueue::new("tiers");

    let plan = [
        (31, Priority::Low),
        (11, Priority::High),
        (21, Priority::Normal),
        (32, Priority::Low),
        (12, Priority::High),
        (22, Priority::Normal),
        (13, Priority::High),
    ];
    for (n, priority) in plan {
        queue.add(push(&log, n), None, priority).unwrap();
    }

    queue.start().unwrap();
    settle(&queue);
    queue.stop().unwrap();
    assert!(queue.join(JOIN));

    assert_eq!(recorded(&log), vec![11, 12, 13, 21, 22, 31, 32]);
}

#[test]
fn test_high_priority_overtakes_waiting_work() {
    let log = record();
    let latch = Latch::default();
    let (running_tx, running_rx) = mpsc::channel();
    let queue = PriorityDispatchQueue::new("overtake");
    queue.start().unwrap();

    queue.add(gate(&latch, running_tx), None, Priority::Low).unwrap();
    running_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    queue.add(push(&log, 3), None, Priority::Low).unwrap();
    queue.add(push(&log, 2), None, Priority::Normal).unwrap();
    queue.add(push(&log, 1), None, Priority::High).unwrap();
    latch.release();

    settle(&queue);
    queue.stop().unwrap();
    assert!(queue.join(JOIN));
    assert_eq!(recorded(&log), vec![1, 2, 3]);
}

#[test]
fn test_replace_requeues_at_back_of_tier() {
    let log = record();
    let queue = PriorityDispatchQueue::new("requeue");

    let x = queue.add(push(&log, 1), None, Priority::Normal).unwrap();
    queue.add(push(&log, 2), None, Priority::Normal).unwrap();
    queue.add(push(&log, 3), Some(x), Priority::Normal).unwrap();
    assert_eq!(queue.pending(), 2);

    queue.start().unwrap();
    settle(&queue);
    queue.stop().unwrap();
    assert!(queue.join(JOIN));
    assert_eq!(recorded(&log), vec![2, 3]);
}

#[test]
fn test_generated_ids_are_unique() {
    let log = record();
    let queue = PriorityDispatchQueue::new("ids");
    let a = queue.add(push(&log, 1), None, Priority::default()).unwrap();
    let b = queue.add(push(&log, 2), None, Priority::default()).unwrap();

    assert_ne!(a, b);
    assert!(a.as_str().starts_with("auto-"));
    assert_eq!(queue.priority_of(&a), Some(Priority::Normal));
    assert_eq!(queue.pending(), 2);
}

#[test]
fn test_generated_id_skips_pending_caller_ids() {
    let log = record();
    let queue = PriorityDispatchQueue::new("ids");
    let named = queue
        .add(push(&log, 1), Some(DispatchId::new("auto-1")), Priority::default())
        .unwrap();
    let generated = queue.add(push(&log, 2), None, Priority::default()).unwrap();

    assert_ne!(generated, named);
    assert_eq!(queue.pending(), 2);
    assert!(queue.contains(&named));

    queue.start().unwrap();
    settle(&queue);
    queue.stop().unwrap();
    assert!(queue.join(JOIN));
    assert_eq!(recorded(&log), vec![1, 2]);
}

#[test]
fn test_stop_discards_pending_and_closes() {
    let log = record();
    let queue = PriorityDispatchQueue::new("closing");
    queue.add(push(&log, 1), None, Priority::High).unwrap();

    queue.stop().unwrap();
    assert!(queue.is_stopped());
    assert_eq!(queue.pending(), 0);

    // Idempotent: the second call only warns
    queue.stop().unwrap();

    assert_eq!(
        queue.add(push(&log, 2), None, Priority::High),
        Err(QueueError::Closed {
            queue: "closing".to_string()
        })
    );
    assert!(matches!(queue.start(), Err(QueueError::Closed { .. })));
    assert!(recorded(&log).is_empty());
}

#[test]
fn test_stop_wakes_idle_worker() {
    let queue = PriorityDispatchQueue::new("idle");
    queue.start().unwrap();
    std::thread::sleep(Duration::from_millis(20));

    let started = Instant::now();
    queue.stop().unwrap();
    assert!(queue.join(JOIN));
    assert!(started.elapsed() < Duration::from_secs(2));
}
