#![allow(missing_docs)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use taskmill::{Admin, NewSchedule, Queue, Scheduler};

/// Test utilities and common setup
mod test_utils {
    use sqlx::SqlitePool;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use taskmill::setup_database;

    /// Set up an in-memory database with the schema applied.
    pub(super) async fn setup_test_db() -> SqlitePool {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .expect("failed to open the in-memory database");

        setup_database(&pool)
            .await
            .expect("failed to run migrations");

        pool
    }
}

fn every_minute(name: &str) -> NewSchedule {
    NewSchedule {
        name: name.into(),
        cron_expr: "* * * * *".into(),
        task_type: "noop".into(),
        payload: b"{}".to_vec(),
        priority: None,
        max_attempts: None,
        enabled: true,
    }
}

#[tokio::test]
async fn due_schedules_fire_once_per_tick() {
    let pool = test_utils::setup_test_db().await;
    let queue = Queue::new(pool);
    let admin = Admin::new(queue.clone());
    let scheduler = Scheduler::new(queue.clone(), Duration::from_secs(10));

    let id = admin.create_schedule(every_minute("tick")).await.unwrap();

    // Two minutes later the schedule is overdue; one tick fires it once.
    let tick: DateTime<Utc> = Utc::now() + ChronoDuration::seconds(120);
    scheduler.process_due(tick).await;

    let tasks = queue.list_recent(10).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].task_type, "noop");

    let schedule = admin.get_schedule(&id).await.unwrap();
    assert_eq!(schedule.last_run, Some(tick));
    assert!(schedule.next_run > tick);

    // The same tick again produces nothing: the schedule is no longer due.
    scheduler.process_due(tick).await;
    assert_eq!(queue.list_recent(10).await.unwrap().len(), 1);

    // The next window fires exactly once more and keeps advancing.
    let second_tick = tick + ChronoDuration::seconds(61);
    scheduler.process_due(second_tick).await;
    assert_eq!(queue.list_recent(10).await.unwrap().len(), 2);

    let advanced = admin.get_schedule(&id).await.unwrap();
    assert!(advanced.next_run > schedule.next_run);
    assert_eq!(advanced.last_run, Some(second_tick));
}

#[tokio::test]
async fn disabled_schedules_never_fire() {
    let pool = test_utils::setup_test_db().await;
    let queue = Queue::new(pool);
    let admin = Admin::new(queue.clone());
    let scheduler = Scheduler::new(queue.clone(), Duration::from_secs(10));

    let draft = NewSchedule {
        enabled: false,
        ..every_minute("paused")
    };
    admin.create_schedule(draft).await.unwrap();

    scheduler.process_due(Utc::now() + ChronoDuration::days(1)).await;
    assert!(queue.list_recent(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn a_broken_schedule_does_not_block_its_siblings() {
    let pool = test_utils::setup_test_db().await;
    let queue = Queue::new(pool.clone());
    let admin = Admin::new(queue.clone());
    let scheduler = Scheduler::new(queue.clone(), Duration::from_secs(10));

    // An unparsable expression that slipped into the store; it sorts first
    // because its next_run is further in the past.
    let past = Utc::now() - ChronoDuration::minutes(5);
    sqlx::query(
        r"
        INSERT INTO schedules (id, name, cron_expr, task_type, payload, priority, max_attempts,
                               enabled, next_run, created_at, updated_at)
        VALUES ('sch_bad', 'bad', 'not a cron', 'noop', x'', 5, 5, 1, ?1, ?1, ?1)
        ",
    )
    .bind(past)
    .execute(&pool)
    .await
    .unwrap();

    let good = admin.create_schedule(every_minute("good")).await.unwrap();

    let tick = Utc::now() + ChronoDuration::seconds(120);
    scheduler.process_due(tick).await;

    // The valid sibling fired; the broken one is retained untouched.
    let tasks = queue.list_recent(10).await.unwrap();
    assert_eq!(tasks.len(), 1);

    let bad = admin.get_schedule("sch_bad").await.unwrap();
    assert_eq!(bad.next_run, past);
    assert_eq!(bad.last_run, None);

    let good = admin.get_schedule(&good).await.unwrap();
    assert_eq!(good.last_run, Some(tick));
}

#[tokio::test]
async fn fired_tasks_inherit_the_schedule_template() {
    let pool = test_utils::setup_test_db().await;
    let queue = Queue::new(pool);
    let admin = Admin::new(queue.clone());
    let scheduler = Scheduler::new(queue.clone(), Duration::from_secs(10));

    let draft = NewSchedule {
        payload: br#"{"region": "eu"}"#.to_vec(),
        priority: Some(9),
        max_attempts: Some(2),
        ..every_minute("template")
    };
    admin.create_schedule(draft).await.unwrap();

    scheduler
        .process_due(Utc::now() + ChronoDuration::seconds(120))
        .await;

    let tasks = queue.list_recent(10).await.unwrap();
    assert_eq!(tasks.len(), 1);

    let task = &tasks[0];
    assert_eq!(task.task_type, "noop");
    assert_eq!(task.payload, br#"{"region": "eu"}"#.to_vec());
    assert_eq!(task.priority, 9);
    assert_eq!(task.max_attempts, 2);
    assert_eq!(task.visibility_timeout, 60);
    assert_eq!(task.idempotency_key, None);
}
