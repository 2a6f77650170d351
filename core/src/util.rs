//! Cancellation-aware future utilities.

use async_trait::async_trait;
use std::future::Future;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;

/// Extension trait for racing a future against a `CancellationToken`.
///
/// Cancellation is cooperative: every suspension point in the fetch path
/// goes through `or_cancel`, so a superseded operation unwinds at its next
/// await instead of running to completion.
#[async_trait]
pub trait OrCancelExt: Sized {
    type Output;

    /// Returns `Ok(output)` if the future completes first, or
    /// `Err(FetchError::Cancelled)` if the token fires first.
    async fn or_cancel(self, token: &CancellationToken) -> Result<Self::Output, FetchError>;
}

#[async_trait]
impl<F> OrCancelExt for F
where
    F: Future + Send,
    F::Output: Send,
{
    type Output = F::Output;

    async fn or_cancel(self, token: &CancellationToken) -> Result<Self::Output, FetchError> {
        tokio::select! {
            _ = token.cancelled() => Err(FetchError::Cancelled),
            res = self => Ok(res),
        }
    }
}
