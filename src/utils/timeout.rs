//! Timeout helpers
//!
//! Loader calls may block for as long as artifact loading takes, so every
//! call is bounded by the configured loader timeout.

use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

use crate::module::loader::LoaderError;

/// Execute operation with a custom timeout
pub async fn with_custom_timeout<F, T>(
    operation: F,
    duration: Duration,
) -> Result<T, tokio::time::error::Elapsed>
where
    F: Future<Output = T>,
{
    timeout(duration, operation).await
}

/// Bound a loader call, mapping expiry to `LoaderError::Timeout`
pub async fn with_loader_timeout<F, T>(
    operation: &'static str,
    duration: Duration,
    future: F,
) -> Result<T, LoaderError>
where
    F: Future<Output = Result<T, LoaderError>>,
{
    match with_custom_timeout(future, duration).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Loader {} exceeded {:?}", operation, duration);
            Err(LoaderError::Timeout {
                operation,
                after: duration,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_loader_timeout_expires() {
        let result: Result<(), LoaderError> = with_loader_timeout(
            "materialize",
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
        )
        .await;
        assert!(matches!(
            result,
            Err(LoaderError::Timeout {
                operation: "materialize",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_loader_error_passes_through() {
        let result: Result<(), LoaderError> = with_loader_timeout(
            "release",
            Duration::from_secs(1),
            async { Err(LoaderError::Release("gone".to_string())) },
        )
        .await;
        assert_eq!(result, Err(LoaderError::Release("gone".to_string())));
    }
}
