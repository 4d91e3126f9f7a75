use async_trait::async_trait;

/// A capability that executes tasks of one type.
///
/// Implementations receive the opaque payload bytes and report success or a
/// failure reason; the worker enforces the lease deadline around the call.
/// Handlers must be safe to invoke concurrently.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Execute one task. An `Err` is recorded as a failed attempt and drives
    /// the retry/fail decision; the error's display text lands in the
    /// attempt log.
    async fn execute(&self, payload: &[u8]) -> anyhow::Result<()>;
}
