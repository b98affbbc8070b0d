//! Integration tests for the shutdown controller and the fault channel.

mod common;

use std::time::Duration;

use exam_db::db::PoolFault;
use exam_db::{DbError, ShutdownController, ShutdownReason};
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn test_pool_fault_stops_work_and_closes_pool() {
    let db = common::sqlite_db(|c| c);
    let mut listener = db.faults();
    let reporter = db.fault_reporter().clone();

    let worker = db.clone();
    let work = async move {
        loop {
            worker.query("SELECT 1", &[]).await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        reporter.report(PoolFault::new(
            "terminating connection due to administrator command",
            Duration::from_secs(12),
        ));
    });

    let controller = ShutdownController::new(db.clone()).without_signals();
    let reason: ShutdownReason = assert_err!(controller.run(work).await);

    let fault = match reason {
        ShutdownReason::Fault(fault) => fault,
        other => panic!("unexpected reason: {other:?}"),
    };
    assert_eq!(fault.idle_for, Duration::from_secs(12));
    assert!(matches!(fault.clone().into_error(), DbError::PoolFatal { .. }));

    // Every listener sees the same fault
    assert_eq!(listener.recv().await, Some(fault));

    assert!(db.is_closed());
    assert!(matches!(
        assert_err!(db.acquire().await),
        DbError::PoolClosed
    ));
}

#[tokio::test]
async fn test_finished_work_returns_value_and_closes_pool() {
    let db = common::sqlite_db(|c| c);
    let worker = db.clone();

    let controller = ShutdownController::new(db.clone()).without_signals();
    let rows = assert_ok!(
        controller
            .run(async move { worker.query("SELECT 1 AS one", &[]).await })
            .await
    );

    assert_eq!(assert_ok!(rows).row_count, 1);
    assert!(db.is_closed());
}

#[tokio::test]
async fn test_late_listener_still_sees_earlier_fault() {
    let db = common::sqlite_db(|c| c);
    db.fault_reporter()
        .report(PoolFault::new("connection reset", Duration::from_secs(1)));

    let mut listener = db.faults();
    let fault = tokio::time::timeout(Duration::from_secs(1), listener.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fault.message, "connection reset");
    assert_eq!(db.fault_reporter().last(), Some(fault));

    db.close().await;
}
