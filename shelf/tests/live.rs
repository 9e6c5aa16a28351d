//! Live query behavior: initial snapshots, redelivery on change, and
//! cancellation.

use std::sync::mpsc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shelf::memory::MemoryEngine;
use shelf::prelude::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Entity)]
struct Task {
    #[entity(primary_key)]
    id: String,
    title: String,
    done: bool,
}

fn task(id: &str, title: &str, done: bool) -> Task {
    Task { id: id.into(), title: title.into(), done }
}

fn db() -> Database<MemoryEngine> {
    Database::new(MemoryEngine::new()).unwrap()
}

/// Receives deliveries until one satisfies the predicate or the timeout
/// expires. Earlier deliveries may reflect intermediate states.
fn wait_for(
    rx: &mpsc::Receiver<Vec<Task>>,
    mut accept: impl FnMut(&[Task]) -> bool,
) -> Vec<Task> {
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        let remaining = deadline
            .checked_duration_since(std::time::Instant::now())
            .expect("timed out waiting for a live query delivery");
        let delivery = rx.recv_timeout(remaining).expect("live query delivery");
        if accept(&delivery) {
            return delivery;
        }
    }
}

#[test]
fn live_delivers_initial_snapshot_synchronously() {
    let db = db();
    db.insert(&task("t1", "write tests", false)).unwrap();

    let (tx, rx) = mpsc::channel();
    let _live = db.live(move |tasks: Vec<Task>| tx.send(tasks).unwrap()).unwrap();

    // The snapshot is sent before live() returns.
    let initial = rx.try_recv().expect("initial snapshot");
    assert_eq!(initial, vec![task("t1", "write tests", false)]);
}

#[test]
fn mutations_redeliver_the_full_result_set() {
    let db = db();
    let (tx, rx) = mpsc::channel();
    let _live = db.live(move |tasks: Vec<Task>| tx.send(tasks).unwrap()).unwrap();
    assert!(wait_for(&rx, |tasks| tasks.is_empty()).is_empty());

    db.insert(&task("t1", "one", false)).unwrap();
    wait_for(&rx, |tasks| tasks.len() == 1);

    db.insert(&task("t2", "two", false)).unwrap();
    let both = wait_for(&rx, |tasks| tasks.len() == 2);
    assert!(both.iter().any(|t| t.id == "t1"));
    assert!(both.iter().any(|t| t.id == "t2"));

    db.delete_all::<Task>().unwrap();
    wait_for(&rx, |tasks| tasks.is_empty());
}

#[test]
fn filtered_live_queries_track_their_subset() {
    let db = db();
    let (tx, rx) = mpsc::channel();
    let _live = db
        .live_where(field("done").eq(false), move |tasks: Vec<Task>| tx.send(tasks).unwrap())
        .unwrap();

    db.insert_many(&[task("t1", "open", false), task("t2", "closed", true)]).unwrap();
    let open = wait_for(&rx, |tasks| tasks.len() == 1);
    assert_eq!(open[0].id, "t1");

    db.upsert(&task("t1", "open", true)).unwrap();
    wait_for(&rx, |tasks| tasks.is_empty());
}

#[test]
fn option_and_builder_live_queries_window_results() {
    let db = db();
    let (tx, rx) = mpsc::channel();
    let _live = db
        .live_with(
            [
                QueryOption::Filter(field("done").eq(false)),
                QueryOption::Sort(vec![asc("id")]),
                QueryOption::Limit(1),
            ],
            move |tasks: Vec<Task>| tx.send(tasks).unwrap(),
        )
        .unwrap();
    wait_for(&rx, |tasks| tasks.is_empty());

    db.insert_many(&[task("t2", "b", false), task("t1", "a", false)]).unwrap();
    let top = wait_for(&rx, |tasks| tasks.len() == 1);
    assert_eq!(top[0].id, "t1");

    let (tx, rx) = mpsc::channel();
    let _live = db
        .live_using(
            |q| q.filter(field("done").eq(true)),
            move |tasks: Vec<Task>| tx.send(tasks).unwrap(),
        )
        .unwrap();
    wait_for(&rx, |tasks| tasks.is_empty());

    db.upsert(&task("t1", "a", true)).unwrap();
    let done = wait_for(&rx, |tasks| tasks.len() == 1);
    assert_eq!(done[0].id, "t1");
}

#[test]
fn replace_batches_deliver_only_the_final_state() {
    let db = db();
    db.insert_many(&[task("t1", "a", false), task("t2", "b", false)]).unwrap();

    let (tx, rx) = mpsc::channel();
    let _live = db.live(move |tasks: Vec<Task>| tx.send(tasks).unwrap()).unwrap();
    wait_for(&rx, |tasks| tasks.len() == 2);

    db.delete_all_and_insert(&[task("t3", "c", false)]).unwrap();
    // The batch is atomic, so no delivery ever shows the emptied state.
    let replaced = wait_for(&rx, |tasks| tasks.len() == 1);
    assert_eq!(replaced[0].id, "t3");
}

#[test]
fn cancel_stops_deliveries_and_is_idempotent() {
    let db = db();
    let (tx, rx) = mpsc::channel();
    let live = db.live(move |tasks: Vec<Task>| tx.send(tasks).unwrap()).unwrap();
    wait_for(&rx, |tasks| tasks.is_empty());

    live.cancel();
    live.cancel();

    db.insert(&task("t1", "after cancel", false)).unwrap();
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn dropping_the_handle_cancels() {
    let db = db();
    let (tx, rx) = mpsc::channel();
    let live = db.live(move |tasks: Vec<Task>| tx.send(tasks).unwrap()).unwrap();
    wait_for(&rx, |tasks| tasks.is_empty());

    drop(live);
    db.insert(&task("t1", "after drop", false)).unwrap();
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn independent_subscriptions_do_not_interfere() {
    let db = db();
    let (tx_a, rx_a) = mpsc::channel();
    let (tx_b, rx_b) = mpsc::channel();
    let live_a = db.live(move |tasks: Vec<Task>| tx_a.send(tasks).unwrap()).unwrap();
    let _live_b = db.live(move |tasks: Vec<Task>| tx_b.send(tasks).unwrap()).unwrap();
    wait_for(&rx_a, |tasks| tasks.is_empty());
    wait_for(&rx_b, |tasks| tasks.is_empty());

    live_a.cancel();
    db.insert(&task("t1", "only b sees this", false)).unwrap();
    wait_for(&rx_b, |tasks| tasks.len() == 1);
    assert!(rx_a.recv_timeout(Duration::from_millis(200)).is_err());
}
