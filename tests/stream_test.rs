//! Integration tests for row streams.

mod common;

use std::time::Duration;

use exam_db::db::StreamState;
use exam_db::{Database, QueryParam};
use futures_util::StreamExt;
use tokio_test::assert_ok;

const ROWS: i64 = 500;

async fn setup(configure: impl FnOnce(exam_db::PoolConfig) -> exam_db::PoolConfig) -> Database {
    let db = common::sqlite_db(configure);
    db.query("CREATE TABLE answers (id INTEGER PRIMARY KEY, choice TEXT)", &[])
        .await
        .unwrap();
    db.query(
        "WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < ?)
         INSERT INTO answers (id, choice) SELECT n, 'choice-' || n FROM seq",
        &[QueryParam::from(ROWS)],
    )
    .await
    .unwrap();
    db
}

/// Wait until every lease has come back, or give up after two seconds.
async fn wait_until_released(db: &Database) -> bool {
    for _ in 0..200 {
        if db.status().leased == 0 {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_stream_yields_every_row_in_order() {
    let db = setup(|c| c.with_stream_buffer(16)).await;

    let mut stream = assert_ok!(
        db.stream(
            "SELECT id, choice FROM answers WHERE id > ? ORDER BY id",
            &[QueryParam::from(0)],
        )
        .await
    );
    assert_eq!(stream.state(), StreamState::Open);

    let mut expected = 1;
    while let Some(row) = stream.next().await {
        let row = row.unwrap();
        assert_eq!(row["id"].as_i64(), Some(expected));
        assert_eq!(row["choice"].as_str(), Some(format!("choice-{expected}").as_str()));
        expected += 1;
    }

    assert_eq!(expected - 1, ROWS);
    assert_eq!(stream.state(), StreamState::Ended);
    assert_eq!(stream.rows_received(), ROWS as u64);
    assert!(wait_until_released(&db).await);
}

#[tokio::test]
async fn test_abandoned_stream_releases_connection() {
    let db = setup(|c| c.with_max_pool_size(1).with_stream_buffer(4)).await;

    let mut stream = assert_ok!(db.stream("SELECT id FROM answers ORDER BY id", &[]).await);
    for _ in 0..3 {
        assert_ok!(stream.next().await.unwrap());
    }
    assert_eq!(db.status().leased, 1);
    drop(stream);

    assert!(wait_until_released(&db).await);
    // The only connection is usable again
    let result = assert_ok!(db.query("SELECT COUNT(*) AS n FROM answers", &[]).await);
    assert_eq!(result.rows[0]["n"].as_i64(), Some(ROWS));
}

#[tokio::test]
async fn test_failed_stream_reports_error_once_and_releases() {
    let db = setup(|c| c).await;

    let mut stream = assert_ok!(db.stream("SELECT * FROM no_such_table", &[]).await);
    let first = stream.next().await;
    assert!(matches!(first, Some(Err(_))), "{first:?}");
    assert_eq!(stream.state(), StreamState::Errored);
    assert!(stream.next().await.is_none());
    assert!(wait_until_released(&db).await);
}

#[tokio::test]
async fn test_concurrent_streams_use_separate_connections() {
    let db = setup(|c| c.with_max_pool_size(2)).await;

    let a = db.stream("SELECT id FROM answers ORDER BY id", &[]).await.unwrap();
    let b = db
        .stream("SELECT id FROM answers ORDER BY id DESC", &[])
        .await
        .unwrap();
    assert_ne!(a.id(), b.id());

    let (a, b): (Vec<_>, Vec<_>) = tokio::join!(a.collect(), b.collect());
    assert_eq!(a.len(), ROWS as usize);
    assert_eq!(b.len(), ROWS as usize);
    assert_eq!(b[0].as_ref().unwrap()["id"].as_i64(), Some(ROWS));
    assert!(wait_until_released(&db).await);
}
