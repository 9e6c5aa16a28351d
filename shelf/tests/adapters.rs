//! The concurrency adapters must expose the same semantics as the blocking
//! core, differing only in delivery mechanism.

use std::sync::mpsc;
use std::time::Duration;

use futures::StreamExt;
use futures::executor::block_on;
use serde::{Deserialize, Serialize};
use shelf::memory::MemoryEngine;
use shelf::prelude::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Entity)]
struct Book {
    #[entity(primary_key)]
    isbn: String,
    title: String,
    pages: u32,
}

fn book(isbn: &str, title: &str, pages: u32) -> Book {
    Book { isbn: isbn.into(), title: title.into(), pages }
}

fn db() -> Database<MemoryEngine> {
    Database::new(MemoryEngine::new()).unwrap()
}

#[test]
fn task_adapter_round_trip() {
    let db = db();
    let tasks = db.tasks();

    block_on(async {
        tasks.insert(book("1", "Dune", 412)).await.unwrap();
        tasks.insert_many(vec![book("2", "Solaris", 204), book("3", "Ubik", 224)]).await.unwrap();

        let all: Vec<Book> = tasks.get().await.unwrap();
        assert_eq!(all.len(), 3);

        let long: Vec<Book> = tasks.get_where(field("pages").gt(300)).await.unwrap();
        assert_eq!(long.len(), 1);
        assert_eq!(long[0].title, "Dune");

        tasks.delete_where::<Book>(field("pages").lt(210)).await.unwrap();
        assert_eq!(tasks.get::<Book>().await.unwrap().len(), 2);

        tasks.delete_all::<Book>().await.unwrap();
        assert!(tasks.get::<Book>().await.unwrap().is_empty());
    });
}

#[test]
fn task_adapter_sees_blocking_writes() {
    let db = db();
    db.insert(&book("1", "Dune", 412)).unwrap();

    let found: Vec<Book> = block_on(db.tasks().get()).unwrap();
    assert_eq!(found.len(), 1);
}

#[test]
fn task_adapter_blobs() {
    let db = db();
    block_on(async {
        let tasks = db.tasks();
        tasks.save_blob(vec![1, 2, 3], "cover".into()).await.unwrap();
        assert_eq!(tasks.get_blob("cover".into()).await.unwrap(), Some(vec![1, 2, 3]));
        tasks.delete_blob("cover".into()).await.unwrap();
        assert_eq!(tasks.get_blob("cover".into()).await.unwrap(), None);
    });
}

#[test]
fn stream_adapter_one_shot_operations_complete() {
    let db = db();
    let streams = db.streams();

    block_on(async {
        let mut insert = Box::pin(streams.insert(book("1", "Dune", 412)));
        insert.next().await.unwrap().unwrap();
        assert!(insert.next().await.is_none());

        let mut get = Box::pin(streams.get::<Book>());
        let found = get.next().await.unwrap().unwrap();
        assert_eq!(found, vec![book("1", "Dune", 412)]);
        assert!(get.next().await.is_none());
    });
}

#[test]
fn stream_adapter_live_yields_each_change() {
    let db = db();
    let mut live = db.streams().live::<Book>().unwrap();

    block_on(async {
        assert_eq!(live.next().await.unwrap().unwrap(), vec![]);

        db.insert(&book("1", "Dune", 412)).unwrap();
        loop {
            let delivery = live.next().await.unwrap().unwrap();
            if delivery.len() == 1 {
                break;
            }
        }

        live.cancel();
        // Draining after cancellation ends the stream.
        while live.next().await.is_some() {}
    });
}

#[test]
fn callback_adapter_reports_through_completions() {
    let db = db();
    let callbacks = db.callbacks();

    let (tx, rx) = mpsc::channel();
    callbacks.insert(book("1", "Dune", 412), move |outcome| tx.send(outcome).unwrap());
    rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();

    let (tx, rx) = mpsc::channel();
    callbacks.get(move |outcome: StoreResult<Vec<Book>>| tx.send(outcome).unwrap());
    let found = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
    assert_eq!(found, vec![book("1", "Dune", 412)]);

    let (tx, rx) = mpsc::channel();
    callbacks.delete_all::<Book>(move |outcome| tx.send(outcome).unwrap());
    rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
    assert!(db.get::<Book>().unwrap().is_empty());
}

#[test]
fn adapters_share_one_database() {
    let db = db();
    block_on(db.tasks().insert(book("1", "Dune", 412))).unwrap();

    let via_stream = block_on(async {
        let mut get = Box::pin(db.streams().get::<Book>());
        get.next().await.unwrap().unwrap()
    });
    assert_eq!(via_stream.len(), 1);
    assert_eq!(db.get::<Book>().unwrap().len(), 1);
}
