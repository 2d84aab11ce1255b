//! Bounded retry for transient failures.

use backoff::ExponentialBackoffBuilder;
use tracing::warn;

use crate::config::RetryConfig;
use crate::errors::EngineError;

/// Run `op` with exponential backoff. Only errors `EngineError` classifies
/// as transient are retried; everything else fails immediately.
pub async fn with_retries<T, F, Fut>(
    config: &RetryConfig,
    op_name: &str,
    mut op: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, EngineError>>,
{
    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(config.initial_interval)
        .with_max_elapsed_time(Some(config.max_elapsed))
        .build();

    backoff::future::retry(policy, || {
        let fut = op();
        async {
            fut.await.map_err(|err| {
                if err.is_transient() {
                    warn!(op = op_name, error = %err, "transient failure, will retry");
                    backoff::Error::transient(err)
                } else {
                    backoff::Error::permanent(err)
                }
            })
        }
    })
    .await
}
