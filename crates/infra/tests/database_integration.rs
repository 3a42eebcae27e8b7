//! Integration tests for the SQLite adapters: the partial-index
//! concurrency guards, accumulate-and-close, finalization, and the full
//! service wired over real repositories.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use punchclock_core::{
    ReportOutbox, RolloverSweeper, SessionRepository, TaskCatalog, TimeclockService, UserDirectory,
};
use punchclock_domain::{Task, TimeSession, TimeclockError, UserProfile};
use punchclock_infra::{
    DbManager, SqliteActivityLogRepository, SqliteReportOutboxRepository, SqliteSessionRepository,
    SqliteTaskRepository, SqliteUserProfileRepository,
};
use tempfile::TempDir;

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).expect("valid date")
}

fn at(day: NaiveDate, h: u32, m: u32) -> NaiveDateTime {
    day.and_hms_opt(h, m, 0).expect("valid time")
}

fn setup_db() -> (Arc<DbManager>, TempDir) {
    let temp_dir = TempDir::new().expect("temp dir");
    let db_path = temp_dir.path().join("punchclock.db");
    let manager = Arc::new(DbManager::new(&db_path, 4).expect("db manager created"));
    manager.run_migrations().expect("schema created");
    (manager, temp_dir)
}

fn setup_sessions() -> (SqliteSessionRepository, Arc<DbManager>, TempDir) {
    let (manager, temp_dir) = setup_db();
    let repo = SqliteSessionRepository::new(Arc::clone(&manager));
    (repo, manager, temp_dir)
}

struct ServiceHarness {
    service: TimeclockService,
    sweeper: RolloverSweeper,
    sessions: Arc<SqliteSessionRepository>,
    tasks: Arc<SqliteTaskRepository>,
    users: Arc<SqliteUserProfileRepository>,
    outbox: Arc<SqliteReportOutboxRepository>,
    _temp_dir: TempDir,
}

fn setup_service() -> ServiceHarness {
    let (manager, temp_dir) = setup_db();
    let sessions = Arc::new(SqliteSessionRepository::new(Arc::clone(&manager)));
    let tasks = Arc::new(SqliteTaskRepository::new(Arc::clone(&manager)));
    let users = Arc::new(SqliteUserProfileRepository::new(Arc::clone(&manager)));
    let outbox = Arc::new(SqliteReportOutboxRepository::new(Arc::clone(&manager), 3));
    let activity = Arc::new(SqliteActivityLogRepository::new(Arc::clone(&manager)));

    let service = TimeclockService::new(
        sessions.clone(),
        tasks.clone(),
        users.clone(),
        outbox.clone(),
        activity,
    );
    let sweeper = RolloverSweeper::new(sessions.clone());

    ServiceHarness { service, sweeper, sessions, tasks, users, outbox, _temp_dir: temp_dir }
}

#[tokio::test(flavor = "multi_thread")]
async fn open_work_uniqueness_is_enforced_by_the_index() {
    let (repo, _manager, _guard) = setup_sessions();
    let day = date(15);

    let first = TimeSession::new_work("u-1", day, at(day, 9, 0), 0.0);
    repo.insert_session(&first).await.expect("first insert");

    // a second open row for the same (user, day) loses at the storage layer
    let second = TimeSession::new_work("u-1", day, at(day, 9, 1), 0.0);
    let err = repo.insert_session(&second).await.expect_err("must conflict");
    assert_eq!(err, TimeclockError::AlreadyOpen);

    // other users and other days are unaffected
    let other_user = TimeSession::new_work("u-2", day, at(day, 9, 0), 0.0);
    repo.insert_session(&other_user).await.expect("other user inserts");
    let other_day = TimeSession::new_work("u-1", date(16), at(date(16), 9, 0), 0.0);
    repo.insert_session(&other_day).await.expect("other day inserts");
}

#[tokio::test(flavor = "multi_thread")]
async fn open_break_uniqueness_is_enforced_by_the_index() {
    let (repo, _manager, _guard) = setup_sessions();
    let day = date(15);

    repo.insert_session(&TimeSession::new_break("u-1", day, at(day, 10, 0)))
        .await
        .expect("first break");
    let err = repo
        .insert_session(&TimeSession::new_break("u-1", day, at(day, 10, 1)))
        .await
        .expect_err("must conflict");
    assert_eq!(err, TimeclockError::AlreadyOnBreak);
}

#[tokio::test(flavor = "multi_thread")]
async fn open_task_uniqueness_spans_dates() {
    let (repo, _manager, _guard) = setup_sessions();

    repo.insert_session(&TimeSession::new_task("u-1", "t-a", date(15), at(date(15), 22, 0)))
        .await
        .expect("first task");
    let err = repo
        .insert_session(&TimeSession::new_task("u-1", "t-b", date(16), at(date(16), 9, 0)))
        .await
        .expect_err("must conflict across dates");
    assert!(matches!(err, TimeclockError::Database(_)));

    // pre-emption clears the way
    let closed = repo.close_open_tasks("u-1", at(date(16), 9, 0)).await.expect("close");
    assert_eq!(closed, 1);
    repo.insert_session(&TimeSession::new_task("u-1", "t-b", date(16), at(date(16), 9, 0)))
        .await
        .expect("insert after pre-emption");
}

#[tokio::test(flavor = "multi_thread")]
async fn closing_a_closed_work_row_reports_not_clocked_in() {
    let (repo, _manager, _guard) = setup_sessions();
    let day = date(15);
    let session = TimeSession::new_work("u-1", day, at(day, 9, 0), 0.0);
    repo.insert_session(&session).await.expect("insert");

    let closed = repo.close_work(&session.id, at(day, 17, 0), None, 8.0).await.expect("close");
    assert!((closed.total_hours - 8.00).abs() < f64::EPSILON);

    let err = repo
        .close_work(&session.id, at(day, 18, 0), None, 1.0)
        .await
        .expect_err("second close must fail");
    assert_eq!(err, TimeclockError::NotClockedIn);
}

#[tokio::test(flavor = "multi_thread")]
async fn close_work_accumulates_onto_the_carried_total() {
    let (repo, _manager, _guard) = setup_sessions();
    let day = date(15);
    let session = TimeSession::new_work("u-1", day, at(day, 13, 0), 2.0);
    repo.insert_session(&session).await.expect("insert");

    let closed = repo.close_work(&session.id, at(day, 15, 0), None, 2.0).await.expect("close");
    assert!((closed.total_hours - 4.00).abs() < f64::EPSILON);

    let carried = repo.last_closed_work_total("u-1", day).await.expect("carry query");
    assert!((carried - 4.00).abs() < f64::EPSILON);
}

#[tokio::test(flavor = "multi_thread")]
async fn carry_forward_is_zero_for_a_fresh_day() {
    let (repo, _manager, _guard) = setup_sessions();
    let carried = repo.last_closed_work_total("u-1", date(15)).await.expect("query");
    assert_eq!(carried, 0.0);
}

#[tokio::test(flavor = "multi_thread")]
async fn lunch_updates_are_guarded() {
    let (repo, _manager, _guard) = setup_sessions();
    let day = date(15);
    let session = TimeSession::new_work("u-1", day, at(day, 9, 0), 0.0);
    repo.insert_session(&session).await.expect("insert");

    let err = repo.set_lunch_end(&session.id, at(day, 12, 30)).await.expect_err("no lunch yet");
    assert_eq!(err, TimeclockError::NoLunchOpen);

    let updated = repo.set_lunch_start(&session.id, at(day, 12, 0)).await.expect("lunch start");
    assert_eq!(updated.lunch_start, Some(at(day, 12, 0)));

    let err = repo.set_lunch_start(&session.id, at(day, 12, 5)).await.expect_err("lunch open");
    assert_eq!(err, TimeclockError::OnLunch);

    repo.set_lunch_end(&session.id, at(day, 12, 30)).await.expect("lunch end");
    let err = repo.set_lunch_start(&session.id, at(day, 14, 0)).await.expect_err("already taken");
    assert_eq!(err, TimeclockError::LunchAlreadyEnded);
    let err = repo.set_lunch_end(&session.id, at(day, 14, 0)).await.expect_err("already ended");
    assert_eq!(err, TimeclockError::LunchAlreadyEnded);
}

#[tokio::test(flavor = "multi_thread")]
async fn finalize_work_clears_every_transient_marker() {
    let (repo, _manager, _guard) = setup_sessions();
    let day = date(15);
    let mut session = TimeSession::new_work("u-1", day, at(day, 22, 0), 0.0);
    session.lunch_start = Some(at(day, 23, 0));
    repo.insert_session(&session).await.expect("insert");

    repo.finalize_work(&session.id, 2.0).await.expect("finalize");

    let stale = repo.find_stale_open_work("u-1", date(16)).await.expect("stale query");
    assert!(stale.is_empty(), "finalized rows are no longer open");

    let rows = repo.sessions_for_day("u-1", day).await.expect("day query");
    assert_eq!(rows.len(), 1);
    assert!(rows[0].clock_in.is_none());
    assert!(rows[0].lunch_start.is_none());
    assert!((rows[0].total_hours - 2.00).abs() < f64::EPSILON);
    assert_eq!(rows[0].date, day, "owning day never changes");
}

#[tokio::test(flavor = "multi_thread")]
async fn stale_queries_only_see_days_before_the_cutoff() {
    let (repo, _manager, _guard) = setup_sessions();

    repo.insert_session(&TimeSession::new_work("u-1", date(14), at(date(14), 9, 0), 0.0))
        .await
        .expect("stale insert");
    repo.insert_session(&TimeSession::new_work("u-1", date(16), at(date(16), 9, 0), 0.0))
        .await
        .expect("today insert");

    let stale = repo.find_stale_open_work("u-1", date(16)).await.expect("stale query");
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].date, date(14));

    let users = repo.users_with_stale_sessions(date(16)).await.expect("users query");
    assert_eq!(users, vec!["u-1".to_string()]);
}

#[tokio::test(flavor = "multi_thread")]
async fn task_catalog_and_user_directory_round_trip() {
    let (manager, _guard) = setup_db();
    let tasks = SqliteTaskRepository::new(Arc::clone(&manager));
    let users = SqliteUserProfileRepository::new(Arc::clone(&manager));

    tasks
        .upsert_task(&Task {
            id: "t-1".into(),
            name: "Quarterly report".into(),
            external_ref: Some("EXT-9".into()),
            active: true,
            created_at: at(date(15), 8, 0),
        })
        .await
        .expect("task upsert");
    users
        .upsert_profile(&UserProfile {
            id: "u-1".into(),
            display_name: "Dana Field".into(),
            email: "dana@example.test".into(),
        })
        .await
        .expect("profile upsert");

    let task = tasks.find_task("t-1").await.expect("query").expect("found");
    assert_eq!(task.external_ref.as_deref(), Some("EXT-9"));
    assert!(tasks.find_task("t-missing").await.expect("query").is_none());

    let profile = users.find_profile("u-1").await.expect("query").expect("found");
    assert_eq!(profile.display_name, "Dana Field");
}

#[tokio::test(flavor = "multi_thread")]
async fn full_day_flow_through_real_repositories() {
    let h = setup_service();
    let day = date(15);

    h.users
        .upsert_profile(&UserProfile {
            id: "u-1".into(),
            display_name: "Dana Field".into(),
            email: "dana@example.test".into(),
        })
        .await
        .expect("profile");

    h.service.clock_in("u-1", at(day, 9, 0), None).await.expect("clock in");
    h.service.start_break("u-1", at(day, 12, 0)).await.expect("start break");
    h.service.end_break("u-1", at(day, 12, 30)).await.expect("end break");
    let closed = h.service.clock_out("u-1", at(day, 17, 0)).await.expect("clock out");

    assert!((closed.total_hours - 7.50).abs() < f64::EPSILON);

    // both report rows landed in the persistent outbox
    let pending = h.outbox.dequeue_batch(10, at(day, 17, 1)).await.expect("dequeue");
    assert_eq!(pending.len(), 2);

    // the day view mirrors the break onto the closed work row
    let view = h.service.work_day("u-1", day).await.expect("view");
    assert_eq!(view.work.len(), 1);
    assert_eq!(view.work[0].break_start, Some(at(day, 12, 0)));
}

#[tokio::test(flavor = "multi_thread")]
async fn rollover_flow_through_real_repositories() {
    let h = setup_service();
    let jan15 = date(15);
    let jan16 = date(16);

    h.service.clock_in("u-1", at(jan15, 22, 0), None).await.expect("clock in");

    let outcome = h.sweeper.sweep_user("u-1", jan16).await.expect("sweep");
    assert_eq!(outcome.work_finalized, 1);
    let again = h.sweeper.sweep_user("u-1", jan16).await.expect("second sweep");
    assert!(again.is_empty());

    let rows = h.sessions.sessions_for_day("u-1", jan15).await.expect("day query");
    assert_eq!(rows.len(), 1);
    assert!((rows[0].total_hours - 2.00).abs() < f64::EPSILON);
    assert!(!rows[0].is_open());

    // a fresh day starts from zero
    let fresh = h.service.clock_in("u-1", at(jan16, 8, 0), None).await.expect("clock in");
    assert_eq!(fresh.total_hours, 0.0);
}

#[tokio::test(flavor = "multi_thread")]
async fn task_timer_flow_through_real_repositories() {
    let h = setup_service();
    let day = date(15);

    h.tasks
        .upsert_task(&Task {
            id: "t-1".into(),
            name: "Quarterly report".into(),
            external_ref: Some("EXT-9".into()),
            active: true,
            created_at: at(day, 8, 0),
        })
        .await
        .expect("task");

    h.service.start_task("u-1", "t-1", at(day, 9, 0)).await.expect("start");
    let closed = h.service.stop_task("u-1", at(day, 10, 30)).await.expect("stop");
    assert!((closed.total_hours - 1.50).abs() < f64::EPSILON);

    // report row + task hours + comment
    let pending = h.outbox.dequeue_batch(10, at(day, 11, 0)).await.expect("dequeue");
    assert_eq!(pending.len(), 3);

    let err = h.service.start_task("u-1", "t-missing", at(day, 11, 0)).await.expect_err("reject");
    assert_eq!(err, TimeclockError::InvalidTask("t-missing".into()));
}
