use std::future::Future;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::{LogQuery, LogSource, RateBudget, RateLimiter};
use crate::{
    error::{Error, SourceError},
    types::{BlockNumber, LogEntry},
};

/// [`LogSource`] wrapper enforcing a request budget.
///
/// Every call takes the exclusive call slot, waits for a rate limit token
/// and only then reaches the source, so at most one call is in flight per
/// instance. The slot is a fair mutex: callers are admitted in the order
/// they arrived. Waiting for the slot, for a token and for the response are
/// all aborted by the cancellation token.
#[derive(Debug)]
pub struct RateLimitedSource<S> {
    inner: S,
    limiter: Option<RateLimiter>,
    slot: Mutex<()>,
}

impl<S: LogSource> RateLimitedSource<S> {
    pub fn new(inner: S, budget: RateBudget) -> Self {
        Self {
            inner,
            limiter: Some(RateLimiter::new(budget)),
            slot: Mutex::new(()),
        }
    }

    /// Limits the source to `requests` calls per second, 0 disables the limit.
    pub fn per_second(inner: S, requests: u32) -> Self {
        if requests == 0 {
            return Self::unlimited(inner);
        }
        Self::new(inner, RateBudget::per_second(requests))
    }

    /// Serializes calls without a request budget.
    pub fn unlimited(inner: S) -> Self {
        Self {
            inner,
            limiter: None,
            slot: Mutex::new(()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn limiter(&self) -> Option<&RateLimiter> {
        self.limiter.as_ref()
    }

    /// Rate-limited [`LogSource::filter_logs`].
    ///
    /// Source errors are passed through unmodified as [`Error::Source`].
    pub async fn query(
        &self,
        token: &CancellationToken,
        query: &LogQuery,
    ) -> Result<Vec<LogEntry>, Error> {
        self.call(token, |source| source.filter_logs(query)).await
    }

    pub async fn block_number(&self, token: &CancellationToken) -> Result<BlockNumber, Error> {
        self.call(token, |source| source.block_number()).await
    }

    pub async fn chain_id(&self, token: &CancellationToken) -> Result<u64, Error> {
        self.call(token, |source| source.chain_id()).await
    }

    async fn call<'a, T, F>(
        &'a self,
        token: &CancellationToken,
        f: impl FnOnce(&'a S) -> F,
    ) -> Result<T, Error>
    where
        F: Future<Output = Result<T, SourceError>>,
    {
        let _slot = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(Error::Cancelled),
            slot = self.slot.lock() => slot,
        };
        if let Some(limiter) = &self.limiter {
            limiter.acquire(token).await?;
        }
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(Error::Cancelled),
            result = f(&self.inner) => result.map_err(Error::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use alloy::primitives::address;
    use tokio::time::Instant;

    use super::*;
    use crate::testing::{FakeSource, log_at};

    fn query(from_block: BlockNumber, to_block: BlockNumber) -> LogQuery {
        LogQuery {
            address: address!("0x0000000000000000000000000000000000000abc"),
            topics: vec![],
            from_block,
            to_block,
        }
    }

    #[tokio::test]
    async fn test_query_delegates() {
        let fake = FakeSource::new(10);
        fake.respond(1, 2, vec![log_at(1, 0), log_at(2, 0)]);
        let source = RateLimitedSource::per_second(fake, 100);
        let token = CancellationToken::new();

        let logs = source.query(&token, &query(1, 2)).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(source.block_number(&token).await.unwrap(), 10);
        assert_eq!(source.inner().queries(), vec![(1, 2)]);
    }

    #[tokio::test]
    async fn test_source_error_passed_through() {
        let fake = FakeSource::new(10);
        fake.fail(1, 2, SourceError::NullResp);
        let source = RateLimitedSource::unlimited(fake);

        let result = source.query(&CancellationToken::new(), &query(1, 2)).await;
        assert!(matches!(result, Err(Error::Source(SourceError::NullResp))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_share_budget() {
        let source = Arc::new(RateLimitedSource::per_second(FakeSource::new(10), 2));
        let token = CancellationToken::new();
        let start = Instant::now();

        let calls = (0..4).map(|i| {
            let source = source.clone();
            let token = token.clone();
            tokio::spawn(async move { source.query(&token, &query(i, i)).await })
        });
        for call in calls.collect::<Vec<_>>() {
            call.await.unwrap().unwrap();
        }

        // 4 calls at 2 per second: admitted at 0, 0.5, 1.0 and 1.5s
        assert!(Instant::now() - start >= Duration::from_millis(1500));
        assert_eq!(source.inner().queries().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_call_cancelled() {
        let fake = FakeSource::new(10);
        fake.hang(1, 2);
        let source = RateLimitedSource::unlimited(fake);
        let token = CancellationToken::new();

        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        });

        let result = source.query(&token, &query(1, 2)).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancelled_before_call() {
        let source = RateLimitedSource::per_second(FakeSource::new(10), 1);
        let token = CancellationToken::new();
        token.cancel();

        assert!(matches!(
            source.chain_id(&token).await,
            Err(Error::Cancelled)
        ));
        assert!(source.inner().queries().is_empty());
    }
}
