use thiserror::Error;

/// Errors surfaced by the queue engine and the admin facade.
///
/// Handler failures are not represented here: they travel as plain text into
/// the attempt log and drive the retry/fail decision instead.
#[derive(Debug, Error)]
pub enum Error {
    /// The input was rejected before any state change was attempted.
    #[error("validation error: {0}")]
    Validation(String),

    /// The referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A cron expression did not parse as standard 5-field syntax.
    #[error("invalid cron expression {expr:?}: {reason}")]
    InvalidCron {
        /// The expression as submitted.
        expr: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The underlying store failed.
    #[error("storage error: {0}")]
    Store(#[from] sqlx::Error),

    /// Applying database migrations failed.
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}
