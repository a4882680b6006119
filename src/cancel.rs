//! cancel
//!
//! Cancellation and deadlines for provider operations.
//!
//! Every operation is a future; dropping it cancels whatever round trip is
//! in flight. These helpers attach the two common signals and report them as
//! [`ProviderError::Cancelled`]. Nothing is rolled back: the next ensure call
//! converges from whatever partial state was left.
//!
//! # Example
//!
//! ```ignore
//! use pac_forge::cancel::with_cancellation;
//! use tokio_util::sync::CancellationToken;
//!
//! let token = CancellationToken::new();
//! let outcome = with_cancellation(&token, provider.ensure_config_merge_request(url, &data)).await?;
//! ```

use std::future::Future;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::forge::ProviderError;

/// Run `operation` until it completes or `token` is cancelled.
pub async fn with_cancellation<T, F>(token: &CancellationToken, operation: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ProviderError::Cancelled("cancellation requested".into())),
        result = operation => result,
    }
}

/// Run `operation` until it completes or `deadline` passes.
pub async fn with_deadline<T, F>(deadline: Instant, operation: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout_at(deadline, operation).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Cancelled("deadline exceeded".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forge::ErrorKind;
    use std::time::Duration;

    #[tokio::test]
    async fn completes_when_not_cancelled() {
        let token = CancellationToken::new();
        let result = with_cancellation(&token, async { Ok::<_, ProviderError>(5) }).await;
        assert_eq!(result.unwrap(), 5);
    }

    #[tokio::test]
    async fn cancelled_token_wins() {
        let token = CancellationToken::new();
        token.cancel();
        let result = with_cancellation(&token, async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, ProviderError>(())
        })
        .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_exceeded() {
        let deadline = Instant::now() + Duration::from_millis(50);
        let result = with_deadline(deadline, async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, ProviderError>(())
        })
        .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn errors_pass_through() {
        let deadline = Instant::now() + Duration::from_secs(5);
        let result: Result<(), _> =
            with_deadline(deadline, async { Err(ProviderError::NotFound("x".into())) }).await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
    }
}
