use std::future::Future;

use dlq_api::error::BrokerError;
use tokio_util::sync::CancellationToken;

use crate::error::DlqError;

/// Await a broker call unless `cancel` fires first.
///
/// Cancellation wins ties. `completed` is reported in the resulting
/// [`DlqError::Cancelled`].
pub(crate) async fn or_cancelled<T, F>(
    cancel: &CancellationToken,
    completed: usize,
    fut: F,
) -> Result<T, DlqError>
where
    F: Future<Output = Result<T, BrokerError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DlqError::Cancelled { completed }),
        res = fut => res.map_err(DlqError::from),
    }
}
