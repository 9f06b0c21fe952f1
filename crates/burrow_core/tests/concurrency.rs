//! Multi-threaded use of one database.

use burrow_core::{Config, CoreError, Database, MemoryBackend};
use std::sync::{Arc, Barrier};
use std::thread;

fn shared_db(capacity: usize) -> Arc<Database> {
    Arc::new(
        Database::open_with_backend(
            Config::default()
                .max_transactions(capacity)
                .sync_on_commit(false),
            Box::new(MemoryBackend::new()),
        )
        .unwrap(),
    )
}

#[test]
fn racing_begins_never_exceed_capacity() {
    const THREADS: usize = 16;
    const CAPACITY: usize = 4;

    for _ in 0..20 {
        let db = shared_db(CAPACITY);
        let start = Arc::new(Barrier::new(THREADS));
        let hold = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let db = Arc::clone(&db);
                let start = Arc::clone(&start);
                let hold = Arc::clone(&hold);
                thread::spawn(move || {
                    start.wait();
                    let result = db.begin();
                    // Keep every winner alive until all threads have tried.
                    hold.wait();
                    match result {
                        Ok(txn) => {
                            txn.abort().unwrap();
                            true
                        }
                        Err(CoreError::ResourceLimitReached { capacity }) => {
                            assert_eq!(capacity, CAPACITY);
                            false
                        }
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, CAPACITY);
        assert_eq!(db.active_transactions(), 0);
        assert_eq!(db.stats().begin_rejections as usize, THREADS - CAPACITY);
    }
}

#[test]
fn concurrent_commits_all_land() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 50;

    let db = shared_db(THREADS);
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    let txn = db.begin().unwrap();
                    let key = format!("t{t}-k{i}");
                    txn.insert(key.as_bytes(), b"x").unwrap();
                    if i % 5 == 0 {
                        txn.abort().unwrap();
                    } else {
                        txn.commit().unwrap();
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let committed = THREADS * PER_THREAD * 4 / 5;
    assert_eq!(db.key_count(None).unwrap() as usize, committed);
    assert_eq!(db.last_sequence().as_u64() as usize, committed);
    assert_eq!(db.active_transactions(), 0);
}

#[test]
fn auto_commit_insert_of_same_key_has_one_winner() {
    const THREADS: usize = 8;

    let db = shared_db(1);
    let start = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let db = Arc::clone(&db);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                db.insert(None, b"contended", format!("{t}").as_bytes())
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let ok = results.iter().filter(|r| r.is_ok()).count();
    let dup = results
        .iter()
        .filter(|r| matches!(r, Err(CoreError::DuplicateKey)))
        .count();
    assert_eq!(ok, 1);
    assert_eq!(dup, THREADS - 1);
}

#[test]
fn transactional_inserts_of_same_key_have_one_winner() {
    const THREADS: usize = 8;

    let db = shared_db(THREADS);
    let start = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let db = Arc::clone(&db);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                let txn = db.begin().unwrap();
                start.wait();
                match txn.insert(b"contended", format!("{t}").as_bytes()) {
                    Ok(()) => txn.commit().map(|()| true),
                    Err(CoreError::DuplicateKey | CoreError::TransactionConflict { .. }) => {
                        txn.abort().map(|()| false)
                    }
                    Err(e) => Err(e),
                }
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
    assert_eq!(db.key_count(None).unwrap(), 1);
    assert_eq!(db.active_transactions(), 0);
}

#[test]
fn readers_see_whole_batches() {
    let db = shared_db(1);
    let writer = {
        let db = Arc::clone(&db);
        thread::spawn(move || {
            for round in 0..200u32 {
                db.transaction(|txn| {
                    let v = round.to_le_bytes();
                    txn.insert(b"a", &v)?;
                    txn.insert(b"b", &v)
                })
                .unwrap();
                db.transaction(|txn| {
                    txn.erase(b"a")?;
                    txn.erase(b"b")
                })
                .unwrap();
            }
        })
    };

    // Committed state is either empty or holds both keys.
    for _ in 0..2000 {
        let count = db.key_count(None).unwrap();
        assert!(count == 0 || count == 2, "saw partial batch: {count}");
    }
    writer.join().unwrap();
    assert_eq!(db.key_count(None).unwrap(), 0);
}

#[test]
fn shared_transaction_across_threads() {
    let db = shared_db(1);
    let txn = Arc::new(db.begin().unwrap());

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let txn = Arc::clone(&txn);
            thread::spawn(move || {
                for i in 0..25 {
                    txn.insert(format!("{t}:{i}").as_bytes(), b"v").unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(txn.key_count().unwrap(), 100);
    txn.commit().unwrap();
    assert_eq!(db.key_count(None).unwrap(), 100);
}
