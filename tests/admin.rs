#![allow(missing_docs)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]

use chrono::Utc;
use taskmill::schema::TaskState;
use taskmill::{Admin, Error, NewSchedule, NewTask, Queue};

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

fn nightly_report() -> NewSchedule {
    NewSchedule {
        name: "nightly-report".into(),
        cron_expr: "0 2 * * *".into(),
        task_type: "shell".into(),
        payload: br#"{"command": "generate-report"}"#.to_vec(),
        priority: Some(7),
        max_attempts: None,
        enabled: true,
    }
}

#[tokio::test]
async fn submitted_tasks_can_be_inspected_and_canceled() {
    let pool = test_utils::setup_test_db().await;
    let admin = Admin::new(Queue::new(pool));

    let first = admin
        .submit_task(NewTask {
            task_type: "noop".into(),
            payload: b"{}".to_vec(),
            ..Default::default()
        })
        .await
        .unwrap();
    let second = admin
        .submit_task(NewTask {
            task_type: "noop".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    let task = admin.get_task(&first).await.unwrap();
    assert_eq!(task.state, TaskState::Queued);
    assert_eq!(task.attempts, 0);

    let recent = admin.list_recent_tasks(10).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].id, second);
    assert_eq!(recent[1].id, first);

    admin.cancel_task(&first).await.unwrap();
    assert_eq!(
        admin.get_task(&first).await.unwrap().state,
        TaskState::Canceled
    );

    let error = admin.get_task("tsk_missing").await.unwrap_err();
    assert!(matches!(error, Error::NotFound(_)));
}

#[tokio::test]
async fn schedule_crud_round_trips() {
    let pool = test_utils::setup_test_db().await;
    let admin = Admin::new(Queue::new(pool));

    let before = Utc::now();
    let id = admin.create_schedule(nightly_report()).await.unwrap();

    let schedule = admin.get_schedule(&id).await.unwrap();
    assert_eq!(schedule.name, "nightly-report");
    assert_eq!(schedule.cron_expr, "0 2 * * *");
    assert_eq!(schedule.task_type, "shell");
    assert_eq!(schedule.priority, 7);
    assert_eq!(schedule.max_attempts, 5);
    assert!(schedule.enabled);
    assert_eq!(schedule.last_run, None);
    assert!(schedule.next_run > before);

    let listed = admin.list_schedules().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, id);

    // Updating swaps the expression and recomputes the firing time.
    let update = NewSchedule {
        name: "hourly-report".into(),
        cron_expr: "0 * * * *".into(),
        ..nightly_report()
    };
    admin.update_schedule(&id, update).await.unwrap();

    let updated = admin.get_schedule(&id).await.unwrap();
    assert_eq!(updated.name, "hourly-report");
    assert_eq!(updated.cron_expr, "0 * * * *");
    assert!(updated.next_run > Utc::now() - chrono::Duration::seconds(1));
    assert!(updated.next_run <= Utc::now() + chrono::Duration::hours(1));

    admin.delete_schedule(&id).await.unwrap();
    let error = admin.get_schedule(&id).await.unwrap_err();
    assert!(matches!(error, Error::NotFound(_)));
    let error = admin.delete_schedule(&id).await.unwrap_err();
    assert!(matches!(error, Error::NotFound(_)));
}

#[tokio::test]
async fn malformed_cron_expressions_are_rejected() {
    let pool = test_utils::setup_test_db().await;
    let admin = Admin::new(Queue::new(pool));

    let draft = NewSchedule {
        cron_expr: "every now and then".into(),
        ..nightly_report()
    };
    let error = admin.create_schedule(draft).await.unwrap_err();
    assert!(matches!(error, Error::InvalidCron { .. }));

    // A bad update leaves the stored schedule untouched.
    let id = admin.create_schedule(nightly_report()).await.unwrap();
    let before = admin.get_schedule(&id).await.unwrap();

    let update = NewSchedule {
        cron_expr: "* * *".into(),
        ..nightly_report()
    };
    let error = admin.update_schedule(&id, update).await.unwrap_err();
    assert!(matches!(error, Error::InvalidCron { .. }));

    let after = admin.get_schedule(&id).await.unwrap();
    assert_eq!(after.cron_expr, before.cron_expr);
    assert_eq!(after.next_run, before.next_run);
}

#[tokio::test]
async fn schedules_require_a_task_type() {
    let pool = test_utils::setup_test_db().await;
    let admin = Admin::new(Queue::new(pool));

    let draft = NewSchedule {
        task_type: String::new(),
        ..nightly_report()
    };
    let error = admin.create_schedule(draft).await.unwrap_err();
    assert!(matches!(error, Error::Validation(_)));
}
