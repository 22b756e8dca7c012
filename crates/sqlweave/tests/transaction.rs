mod common;

use common::{Event, MockRow, RecordingDriver, User};
use futures_util::FutureExt;
use sqlweave::prelude::*;
use sqlweave::{SqlError, TxStatus};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;

fn open() -> Db<RecordingDriver> {
    Db::open(RecordingDriver::new("postgres")).unwrap()
}

#[tokio::test]
async fn ok_commits() {
    let db = open();
    let id = db
        .transaction(TxOptions::new(), |tx| async move {
            tx.builder()
                .insert("users")
                .set("name", "alice")
                .execute(&tx)
                .await?;
            Ok(7)
        })
        .await
        .unwrap();

    assert_eq!(id, 7);
    assert_eq!(
        db.driver().events(),
        vec![
            Event::Begin(TxOptions::new()),
            Event::ExecuteIn(
                1,
                r#"INSERT INTO "users" ("name") VALUES ($1)"#.to_string(),
                vec![Value::from("alice")]
            ),
            Event::Commit(1),
        ]
    );
}

#[tokio::test]
async fn err_rolls_back_and_returns_same_error() {
    let db = open();
    let err = db
        .transaction(TxOptions::new(), |tx| async move {
            tx.builder().delete("users").eq("id", 1).execute(&tx).await?;
            Err::<(), _>(SqlError::not_found("user 1"))
        })
        .await
        .unwrap_err();

    assert!(matches!(err, SqlError::NotFound(ref m) if m == "user 1"));
    assert_eq!(db.driver().count(|e| matches!(e, Event::Rollback(_))), 1);
    assert_eq!(db.driver().count(|e| matches!(e, Event::Commit(_))), 0);
}

#[tokio::test]
async fn failed_rollback_never_replaces_the_error() {
    let db = open();
    db.driver().fail_rollback.store(true, Ordering::SeqCst);
    let err = db
        .transaction(TxOptions::new(), |_tx| async move {
            Err::<(), _>(SqlError::malformed("bad input"))
        })
        .await
        .unwrap_err();

    assert!(matches!(err, SqlError::Malformed(ref m) if m == "bad input"));
    assert_eq!(db.driver().count(|e| matches!(e, Event::Rollback(_))), 1);
}

#[tokio::test]
async fn panic_rolls_back_then_resumes() {
    let db = open();
    let result = AssertUnwindSafe(db.transaction(TxOptions::new(), |_tx| async move {
        if true {
            panic!("boom");
        }
        Ok(())
    }))
    .catch_unwind()
    .await;

    let payload = result.unwrap_err();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"boom"));
    assert_eq!(db.driver().count(|e| matches!(e, Event::Rollback(_))), 1);
    assert_eq!(db.driver().count(|e| matches!(e, Event::Commit(_))), 0);
}

#[tokio::test]
async fn panic_while_building_the_future_rolls_back() {
    let db = open();
    let result = AssertUnwindSafe(db.transaction(
        TxOptions::new(),
        |_tx| -> std::future::Ready<SqlResult<()>> { panic!("before await") },
    ))
    .catch_unwind()
    .await;

    assert!(result.is_err());
    assert_eq!(db.driver().count(|e| matches!(e, Event::Rollback(_))), 1);
}

#[tokio::test]
async fn commit_error_surfaces() {
    let db = open();
    db.driver().fail_commit.store(true, Ordering::SeqCst);
    let err = db
        .transaction(TxOptions::new(), |_tx| async move { Ok(()) })
        .await
        .unwrap_err();
    assert!(matches!(err, SqlError::Driver(_)));
}

#[tokio::test]
async fn closure_may_commit_itself() {
    let db = open();
    let value = db
        .transaction(TxOptions::new(), |tx| async move {
            tx.commit().await?;
            Ok("done")
        })
        .await
        .unwrap();

    assert_eq!(value, "done");
    assert_eq!(db.driver().count(|e| matches!(e, Event::Commit(_))), 1);
}

#[tokio::test]
async fn closure_rollback_then_ok_is_closed() {
    let db = open();
    let err = db
        .transaction(TxOptions::new(), |tx| async move {
            tx.rollback().await?;
            Ok(())
        })
        .await
        .unwrap_err();
    assert!(err.is_transaction_closed());
    assert_eq!(db.driver().count(|e| matches!(e, Event::Rollback(_))), 1);
}

#[tokio::test]
async fn double_commit_and_repeated_rollback() {
    let db = open();
    let tx = db.begin(TxOptions::new()).await.unwrap();
    tx.commit().await.unwrap();
    assert_eq!(tx.status().await, TxStatus::Committed);

    let err = tx.commit().await.unwrap_err();
    assert!(err.is_transaction_closed());

    tx.rollback().await.unwrap();
    tx.rollback().await.unwrap();
    assert_eq!(tx.status().await, TxStatus::Committed);
    assert_eq!(db.driver().count(|e| matches!(e, Event::Rollback(_))), 0);
    assert_eq!(db.driver().count(|e| matches!(e, Event::Commit(_))), 1);
}

#[tokio::test]
async fn failed_commit_leaves_rolled_back() {
    let db = open();
    db.driver().fail_commit.store(true, Ordering::SeqCst);
    let tx = db.begin(TxOptions::new()).await.unwrap();

    assert!(tx.commit().await.is_err());
    assert_eq!(tx.status().await, TxStatus::RolledBack);
    tx.rollback().await.unwrap();
    assert_eq!(db.driver().count(|e| matches!(e, Event::Rollback(_))), 0);
}

#[tokio::test]
async fn statements_after_finish_are_rejected() {
    let db = open();
    let tx = db.begin(TxOptions::new()).await.unwrap();
    tx.rollback().await.unwrap();

    let err = tx
        .builder()
        .select_from("users")
        .fetch_all(&tx)
        .await
        .unwrap_err();
    assert!(matches!(err, SqlError::TransactionClosed("rolled back")));
    assert_eq!(db.driver().count(|e| matches!(e, Event::QueryIn(..))), 0);
}

#[tokio::test]
async fn begin_passes_options_through() {
    let db = open();
    let options = TxOptions::new()
        .isolation(IsolationLevel::Serializable)
        .read_only(true);
    db.transaction(options, |_tx| async move { Ok(()) })
        .await
        .unwrap();
    assert_eq!(db.driver().events()[0], Event::Begin(options));
}

#[tokio::test]
async fn rows_map_inside_transaction() {
    let db = open();
    db.driver().push_rows(vec![MockRow::new([
        ("id", Value::Int(1)),
        ("name", Value::from("alice")),
    ])]);

    let user: User = db
        .transaction(TxOptions::new(), |tx| async move {
            tx.builder()
                .select(["id", "name"])
                .from("users")
                .eq("id", 1)
                .fetch_one_as(&tx)
                .await
        })
        .await
        .unwrap();

    assert_eq!(
        user,
        User {
            id: 1,
            name: "alice".into()
        }
    );
    // Transaction statements bypass the statement cache.
    assert_eq!(db.driver().count(|e| matches!(e, Event::Prepare(_))), 0);
}
