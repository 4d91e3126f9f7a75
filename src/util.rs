use std::any::Any;
use std::future::Future;

use anyhow::anyhow;

/// Turns a caught panic payload into a readable error for the attempt log.
pub(crate) fn try_to_extract_panic_info(info: &(dyn Any + Send + 'static)) -> anyhow::Error {
    if let Some(x) = info.downcast_ref::<&'static str>() {
        anyhow!("task panicked: {x}")
    } else if let Some(x) = info.downcast_ref::<String>() {
        anyhow!("task panicked: {x}")
    } else {
        anyhow!("task panicked")
    }
}

/// Wraps a task execution in a sentry performance transaction.
pub(crate) async fn with_sentry_transaction<F, R, E, Fut>(
    transaction_name: &str,
    callback: F,
) -> Result<R, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let tx_ctx = sentry_core::TransactionContext::new(transaction_name, "queue.task");
    let tx = sentry_core::start_transaction(tx_ctx);

    let result = callback().await;

    tx.set_status(match &result {
        Ok(_) => sentry_core::protocol::SpanStatus::Ok,
        Err(_) => sentry_core::protocol::SpanStatus::UnknownError,
    });
    tx.finish();

    result
}
