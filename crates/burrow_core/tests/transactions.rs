//! Transaction lifecycle, isolation and counting.

use burrow_core::{
    ClosePolicy, Config, CoreError, Database, InsertMode, MemoryBackend, TransactionState,
};

fn db_with_capacity(capacity: usize) -> Database {
    Database::open_with_backend(
        Config::default().max_transactions(capacity),
        Box::new(MemoryBackend::new()),
    )
    .unwrap()
}

#[test]
fn capacity_one_refuses_second_begin_until_commit() {
    let db = db_with_capacity(1);

    let t1 = db.begin().unwrap();
    let refused = db.begin();
    assert!(matches!(
        refused,
        Err(CoreError::ResourceLimitReached { capacity: 1 })
    ));
    assert_eq!(db.active_transactions(), 1);

    db.commit(&t1).unwrap();
    let t2 = db.begin().unwrap();
    assert!(t2.is_active());
}

#[test]
fn abort_also_frees_the_slot() {
    let db = db_with_capacity(1);
    let t1 = db.begin().unwrap();
    db.abort(&t1).unwrap();
    assert!(db.begin().is_ok());
}

#[test]
fn insert_find_commit() {
    let db = db_with_capacity(1);
    let txn = db.begin().unwrap();

    db.insert(Some(&txn), b"k", b"v").unwrap();
    assert_eq!(db.find(Some(&txn), b"k").unwrap(), b"v");
    assert!(matches!(db.find(None, b"k"), Err(CoreError::NotFound)));

    db.commit(&txn).unwrap();
    assert_eq!(db.find(None, b"k").unwrap(), b"v");
}

#[test]
fn insert_abort_then_stale_handle() {
    let db = db_with_capacity(1);
    let txn = db.begin().unwrap();

    db.insert(Some(&txn), b"k", b"v").unwrap();
    db.abort(&txn).unwrap();

    assert!(matches!(
        db.find(Some(&txn), b"k"),
        Err(CoreError::InvalidState {
            state: TransactionState::Aborted,
            ..
        })
    ));
    assert!(matches!(db.find(None, b"k"), Err(CoreError::NotFound)));
}

#[test]
fn key_count_follows_visibility() {
    let db = db_with_capacity(1);
    let txn = db.begin().unwrap();

    assert_eq!(db.key_count(Some(&txn)).unwrap(), 0);
    db.insert(Some(&txn), b"key1", b"value1").unwrap();
    assert_eq!(db.key_count(Some(&txn)).unwrap(), 1);
    assert_eq!(db.key_count(None).unwrap(), 0);

    db.insert(None, b"key2", b"value2").unwrap();
    assert_eq!(db.key_count(Some(&txn)).unwrap(), 2);
    assert_eq!(db.key_count(None).unwrap(), 1);

    db.commit(&txn).unwrap();
    assert_eq!(db.key_count(None).unwrap(), 2);
}

#[test]
fn key_count_nets_pending_erases() {
    let db = db_with_capacity(1);
    db.insert(None, b"a", b"1").unwrap();
    db.insert(None, b"b", b"2").unwrap();

    let txn = db.begin().unwrap();
    db.erase(Some(&txn), b"a").unwrap();
    db.insert_with(Some(&txn), b"b", b"3", InsertMode::Overwrite)
        .unwrap();
    db.insert(Some(&txn), b"c", b"4").unwrap();
    db.erase(Some(&txn), b"c").unwrap();

    assert_eq!(db.key_count(Some(&txn)).unwrap(), 1);
    assert_eq!(db.key_count(None).unwrap(), 2);

    db.commit(&txn).unwrap();
    assert_eq!(db.key_count(None).unwrap(), 1);
    assert_eq!(db.find(None, b"b").unwrap(), b"3");
}

#[test]
fn uncommitted_writes_are_invisible_to_other_transactions() {
    let db = db_with_capacity(2);
    let writer = db.begin().unwrap();
    let reader = db.begin().unwrap();

    db.insert(Some(&writer), b"k", b"v").unwrap();
    assert!(matches!(db.find(Some(&reader), b"k"), Err(CoreError::NotFound)));
    assert_eq!(db.key_count(Some(&reader)).unwrap(), 0);

    db.commit(&writer).unwrap();
    assert_eq!(db.find(Some(&reader), b"k").unwrap(), b"v");
}

#[test]
fn pending_log_applies_in_issue_order() {
    let db = db_with_capacity(1);
    let txn = db.begin().unwrap();
    txn.insert(b"k", b"first").unwrap();
    txn.erase(b"k").unwrap();
    txn.insert(b"k", b"second").unwrap();
    txn.insert_with(b"k", b"third", InsertMode::Overwrite).unwrap();
    txn.commit().unwrap();

    assert_eq!(db.find(None, b"k").unwrap(), b"third");
}

#[test]
fn auto_commit_cannot_overwrite_a_pending_insert() {
    let db = db_with_capacity(1);
    let txn = db.begin().unwrap();
    db.insert(Some(&txn), b"k", b"txn").unwrap();

    assert!(matches!(
        db.insert(None, b"k", b"auto"),
        Err(CoreError::TransactionConflict { owner }) if owner == txn.id()
    ));
    assert!(matches!(db.find(None, b"k"), Err(CoreError::NotFound)));

    db.commit(&txn).unwrap();
    assert_eq!(db.find(None, b"k").unwrap(), b"txn");
    assert!(matches!(db.insert(None, b"k", b"auto"), Err(CoreError::DuplicateKey)));
}

#[test]
fn concurrent_writers_on_one_key_conflict() {
    let db = db_with_capacity(2);
    db.insert(None, b"k", b"0").unwrap();
    let t1 = db.begin().unwrap();
    let t2 = db.begin().unwrap();

    t1.insert_with(b"k", b"one", InsertMode::Overwrite).unwrap();
    assert!(matches!(
        t2.insert_with(b"k", b"two", InsertMode::Overwrite),
        Err(CoreError::TransactionConflict { .. })
    ));
    assert!(matches!(db.erase(None, b"k"), Err(CoreError::TransactionConflict { .. })));
    assert!(db.insert(None, b"other", b"x").is_ok());

    t1.commit().unwrap();
    t2.insert_with(b"k", b"two", InsertMode::Overwrite).unwrap();
    t2.commit().unwrap();
    assert_eq!(db.find(None, b"k").unwrap(), b"two");
}

#[test]
fn double_resolution_is_an_error() {
    let db = db_with_capacity(1);
    let txn = db.begin().unwrap();
    txn.commit().unwrap();

    for result in [db.commit(&txn), db.abort(&txn)] {
        assert!(matches!(
            result,
            Err(CoreError::InvalidState {
                state: TransactionState::Committed,
                ..
            })
        ));
    }
    assert!(matches!(
        db.insert(Some(&txn), b"k", b"v"),
        Err(CoreError::InvalidState { .. })
    ));
}

#[test]
fn disabled_transactions_still_allow_auto_commit() {
    let db = Database::open_with_backend(
        Config::default().enable_transactions(false),
        Box::new(MemoryBackend::new()),
    )
    .unwrap();
    assert!(matches!(db.begin(), Err(CoreError::TransactionsDisabled)));
    db.insert(None, b"k", b"v").unwrap();
    assert_eq!(db.key_count(None).unwrap(), 1);
}

#[test]
fn close_refuse_then_auto_abort() {
    let db = Database::open_with_backend(
        Config::default().close_policy(ClosePolicy::Refuse),
        Box::new(MemoryBackend::new()),
    )
    .unwrap();
    let txn = db.begin().unwrap();
    txn.insert(b"k", b"v").unwrap();

    assert!(matches!(
        db.close(),
        Err(CoreError::TransactionsStillOpen { count: 1 })
    ));
    assert!(db.is_open());
    assert_eq!(txn.find(b"k").unwrap(), b"v");

    db.close_with(ClosePolicy::AutoAbort).unwrap();
    assert_eq!(txn.state(), TransactionState::Aborted);
    assert!(matches!(txn.commit(), Err(CoreError::InvalidState { .. })));
}

#[test]
fn close_auto_commit_keeps_pending_work() {
    let backend = MemoryBackend::new();
    {
        let db = Database::open_with_backend(
            Config::default().close_policy(ClosePolicy::AutoCommit),
            Box::new(backend.clone()),
        )
        .unwrap();
        let txn = db.begin().unwrap();
        txn.insert(b"k", b"v").unwrap();
        drop(db);
        assert_eq!(txn.state(), TransactionState::Committed);
    }

    let db = Database::open_with_backend(Config::default(), Box::new(backend)).unwrap();
    assert_eq!(db.find(None, b"k").unwrap(), b"v");
}

#[test]
fn stats_follow_operations() {
    let db = db_with_capacity(1);
    let txn = db.begin().unwrap();
    txn.insert(b"a", b"1").unwrap();
    let _ = db.begin();
    txn.commit().unwrap();
    db.insert(None, b"b", b"2").unwrap();
    db.find(None, b"b").unwrap();
    let _ = db.find(None, b"missing");

    let stats = db.stats();
    assert_eq!(stats.transactions_started, 1);
    assert_eq!(stats.transactions_committed, 1);
    assert_eq!(stats.begin_rejections, 1);
    assert_eq!(stats.writes, 2);
    assert_eq!(stats.reads, 1);
    assert_eq!(stats.auto_commits, 1);
    assert_eq!(stats.errors, 0);
    assert!(stats.bytes_journaled > 0);
}
