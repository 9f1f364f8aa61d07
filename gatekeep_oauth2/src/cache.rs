use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};
#[cfg(feature = "rt")]
use std::time::Duration;

use arc_swap::ArcSwapOption;
use gatekeep::{jwk, Jwk, Jwks};

use crate::{AuthError, AuthErrorKind, FetchError, JwksSource};

/// A refresh that a concurrent lookup waited on did not succeed
#[derive(Debug, thiserror::Error)]
#[error("JWKS refresh shared with a concurrent lookup failed")]
struct SharedRefreshFailed(#[source] Arc<FetchError>);

#[derive(Debug)]
struct Snapshot {
    jwks: Jwks,
    generation: u64,
}

#[derive(Debug)]
struct Inner {
    source: Box<dyn JwksSource>,
    current: ArcSwapOption<Snapshot>,
    refresh_lock: tokio::sync::Mutex<()>,
    next_generation: AtomicU64,
    fetches: AtomicUsize,
    completed_attempts: AtomicU64,
    last_failure: ArcSwapOption<FetchError>,
}

/// A process-wide cache of the identity provider's signing keys
///
/// The key set is fetched lazily on first use and replaced wholesale
/// whenever a token names a key identifier that the cached set does not
/// contain. Readers always observe either the previous complete set or the
/// new complete set.
///
/// Refreshes are single-flight: concurrent lookups that miss wait on the
/// same refresh, and a lookup that was queued behind a completed refresh
/// reuses its outcome instead of fetching again. That holds for failures as
/// well: every lookup waiting on a failed refresh reports the key set as
/// unavailable.
///
/// Cloning the cache is cheap and every clone shares the same key set.
#[derive(Debug, Clone)]
pub struct KeySetCache {
    inner: Arc<Inner>,
}

impl KeySetCache {
    /// Constructs an empty cache that fetches from `source` on first use
    pub fn new(source: impl JwksSource + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                source: Box::new(source),
                current: ArcSwapOption::empty(),
                refresh_lock: tokio::sync::Mutex::new(()),
                next_generation: AtomicU64::new(1),
                fetches: AtomicUsize::new(0),
                completed_attempts: AtomicU64::new(0),
                last_failure: ArcSwapOption::empty(),
            }),
        }
    }

    /// Constructs a cache already holding `jwks`
    pub fn with_jwks(source: impl JwksSource + 'static, jwks: Jwks) -> Self {
        let this = Self::new(source);
        this.set_jwks(jwks);
        this
    }

    /// Resolves the signing key with exactly the given identifier
    ///
    /// A key already in the cached set is returned without touching the
    /// source. Otherwise the set is refreshed once and looked up again.
    ///
    /// # Errors
    ///
    /// * [`KeySetUnavailable`][AuthErrorKind::KeySetUnavailable] if the set
    ///   needed to be refreshed and the fetch failed
    /// * [`UnknownKey`][AuthErrorKind::UnknownKey] if the key is still
    ///   missing from a freshly fetched set
    pub async fn resolve(&self, kid: &jwk::KeyIdRef) -> Result<Jwk, AuthError> {
        // Taken before the lookup so that a refresh finishing in between is
        // still seen as one this lookup can reuse
        let attempt = self.inner.completed_attempts.load(Ordering::Acquire);

        let observed = {
            let current = self.inner.current.load();
            match current.as_deref() {
                Some(snapshot) => {
                    if let Some(key) = snapshot.jwks.get_key_by_id(kid) {
                        return Ok(key.clone());
                    }
                    Some(snapshot.generation)
                }
                None => None,
            }
        };

        tracing::debug!(%kid, "key not in cached JWKS");

        {
            let _refreshing = self.inner.refresh_lock.lock().await;

            if self.inner.completed_attempts.load(Ordering::Acquire) != attempt {
                if let Some(failure) = self.inner.last_failure.load_full() {
                    tracing::debug!(%kid, "JWKS refresh by a concurrent lookup failed");
                    return Err(AuthError::with_source(
                        AuthErrorKind::KeySetUnavailable,
                        SharedRefreshFailed(failure),
                    ));
                }
                tracing::trace!(%kid, "JWKS already refreshed by a concurrent lookup");
            } else if self.generation() == observed {
                self.refresh_locked()
                    .await
                    .map_err(|err| AuthError::with_source(AuthErrorKind::KeySetUnavailable, err))?;
            } else {
                tracing::trace!(%kid, "JWKS replaced while waiting to refresh");
            }
        }

        let current = self.inner.current.load();
        let key = current
            .as_deref()
            .and_then(|snapshot| snapshot.jwks.get_key_by_id(kid))
            .cloned();

        key.ok_or_else(|| {
            tracing::debug!(%kid, "unable to find matching key");
            AuthErrorKind::UnknownKey.into()
        })
    }

    /// Fetches the key set and replaces the cached set with it
    ///
    /// No retries are attempted. If the fetch fails, the cached set is left
    /// unchanged, and lookups that were waiting on this refresh fail with the
    /// same error.
    ///
    /// # Errors
    ///
    /// The key set could not be retrieved.
    pub async fn refresh(&self) -> Result<(), Arc<FetchError>> {
        let _refreshing = self.inner.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    #[tracing::instrument(skip(self))]
    async fn refresh_locked(&self) -> Result<(), Arc<FetchError>> {
        tracing::debug!("refreshing JWKS");
        self.inner.fetches.fetch_add(1, Ordering::Relaxed);

        let result = match self.inner.source.fetch().await {
            Ok(jwks) => {
                let keys = jwks.len();
                self.set_jwks(jwks);
                self.inner.last_failure.store(None);
                tracing::info!(jwks.len = keys, "JWKS refreshed");
                Ok(())
            }
            Err(err) => {
                let err = Arc::new(err);
                self.inner.last_failure.store(Some(Arc::clone(&err)));
                let error: &dyn std::error::Error = &*err;
                tracing::warn!(error, "JWKS refresh failed");
                Err(err)
            }
        };

        self.inner.completed_attempts.fetch_add(1, Ordering::Release);
        result
    }

    /// Replaces the cached key set
    pub fn set_jwks(&self, jwks: Jwks) {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        self.inner
            .current
            .store(Some(Arc::new(Snapshot { jwks, generation })));
    }

    /// A copy of the currently cached key set, if one has been loaded
    #[must_use]
    pub fn jwks(&self) -> Option<Jwks> {
        self.inner
            .current
            .load()
            .as_deref()
            .map(|snapshot| snapshot.jwks.clone())
    }

    /// The number of fetches attempted against the source so far
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.inner.fetches.load(Ordering::Relaxed)
    }

    fn generation(&self) -> Option<u64> {
        self.inner
            .current
            .load()
            .as_deref()
            .map(|snapshot| snapshot.generation)
    }

    /// Spawns a task that refreshes the key set every `interval`
    ///
    /// The first refresh happens one `interval` from now. Failures are
    /// logged and retried at the next tick. Abort the returned handle to stop
    /// refreshing.
    #[cfg(feature = "rt")]
    #[cfg_attr(docsrs, doc(cfg(feature = "rt")))]
    pub fn spawn_refresh(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let this = self.clone();

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.tick().await;

            loop {
                timer.tick().await;
                // Failures are logged by `refresh`; try again next tick
                let _ = this.refresh().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use color_eyre::Result;
    use tracing_test::traced_test;

    use super::*;
    use crate::test::{self, CountingSource};

    #[tokio::test]
    #[traced_test]
    async fn first_lookup_fetches_once() -> Result<()> {
        let source = CountingSource::serving(test::jwks());
        let cache = KeySetCache::new(source.clone());

        let key = cache.resolve(test::kid()).await?;
        assert_eq!(key.key_id(), Some(test::kid()));
        assert_eq!(source.fetches(), 1);
        assert_eq!(cache.fetch_count(), 1);
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn known_key_does_not_fetch() -> Result<()> {
        let source = CountingSource::serving(test::jwks());
        let cache = KeySetCache::with_jwks(source.clone(), test::jwks());

        let first = cache.resolve(test::kid()).await?;
        let second = cache.resolve(test::kid()).await?;
        assert_eq!(first.key_id(), second.key_id());
        assert_eq!(source.fetches(), 0);
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn repeated_lookups_fetch_at_most_once() -> Result<()> {
        let source = CountingSource::serving(test::jwks());
        let cache = KeySetCache::new(source.clone());

        let _first = cache.resolve(test::kid()).await?;
        let _second = cache.resolve(test::kid()).await?;
        assert_eq!(source.fetches(), 1);
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn unknown_key_refreshes_exactly_once() {
        let source = CountingSource::serving(test::jwks());
        let cache = KeySetCache::with_jwks(source.clone(), test::jwks());

        let err = cache.resolve(test::rotated_kid()).await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::UnknownKey);
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn rotated_key_is_picked_up_on_miss() -> Result<()> {
        let source = CountingSource::serving(test::jwks());
        let cache = KeySetCache::new(source.clone());
        let _primary = cache.resolve(test::kid()).await?;

        source.publish(test::rotated_jwks());
        let key = cache.resolve(test::rotated_kid()).await?;
        assert_eq!(key.key_id(), Some(test::rotated_kid()));
        assert_eq!(source.fetches(), 2);

        // Refreshing replaces the set rather than merging into it
        let jwks = cache.jwks().unwrap();
        assert!(!jwks.contains(test::kid()));
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn fetch_failure_is_key_set_unavailable() {
        let source = CountingSource::failing();
        let cache = KeySetCache::new(source.clone());

        let err = cache.resolve(test::kid()).await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::KeySetUnavailable);
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_refresh_keeps_previous_set() -> Result<()> {
        let source = CountingSource::serving(test::jwks());
        let cache = KeySetCache::new(source.clone());
        let _primary = cache.resolve(test::kid()).await?;

        source.fail();
        assert!(cache.refresh().await.is_err());
        let key = cache.resolve(test::kid()).await?;
        assert_eq!(key.key_id(), Some(test::kid()));
        assert_eq!(source.fetches(), 2);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_share_one_fetch() -> Result<()> {
        let source = CountingSource::slow(test::jwks(), Duration::from_millis(50));
        let cache = KeySetCache::new(source.clone());

        let lookups: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.resolve(test::kid()).await.map(|_| ()) })
            })
            .collect();

        for lookup in lookups {
            lookup.await??;
        }

        assert_eq!(source.fetches(), 1);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_unknown_keys_share_one_fetch() -> Result<()> {
        let source = CountingSource::slow(test::jwks(), Duration::from_millis(50));
        let cache = KeySetCache::with_jwks(source.clone(), test::jwks());

        let lookups: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.resolve(test::rotated_kid()).await })
            })
            .collect();

        for lookup in lookups {
            let err = lookup.await?.unwrap_err();
            assert_eq!(err.kind(), AuthErrorKind::UnknownKey);
        }

        assert_eq!(source.fetches(), 1);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_share_one_failed_fetch() -> Result<()> {
        let source = CountingSource::slow_failing(Duration::from_millis(200));
        let cache = KeySetCache::new(source.clone());

        let lookups: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.resolve(test::kid()).await })
            })
            .collect();

        for lookup in lookups {
            let err = lookup.await?.unwrap_err();
            assert_eq!(err.kind(), AuthErrorKind::KeySetUnavailable);
        }

        assert_eq!(source.fetches(), 1);
        assert_eq!(cache.fetch_count(), 1);
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn lookup_after_failed_refresh_fetches_again() -> Result<()> {
        let source = CountingSource::failing();
        let cache = KeySetCache::new(source.clone());

        let err = cache.resolve(test::kid()).await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::KeySetUnavailable);

        source.publish(test::jwks());
        let key = cache.resolve(test::kid()).await?;
        assert_eq!(key.key_id(), Some(test::kid()));
        assert_eq!(source.fetches(), 2);
        Ok(())
    }

    #[cfg(feature = "rt")]
    #[tokio::test(start_paused = true)]
    async fn background_refresh_runs_each_interval() -> Result<()> {
        let source = CountingSource::serving(test::jwks());
        let cache = KeySetCache::new(source.clone());

        let task = cache.spawn_refresh(Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.fetches(), 0);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(source.fetches(), 1);
        assert!(cache.jwks().is_some());

        source.fail();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.fetches(), 2);
        assert!(cache.jwks().is_some());

        task.abort();
        Ok(())
    }
}
