//! Single-flight in-flight request coalescing (C8).
//!
//! Grounded in `crawl_engine/retry_queue.rs`'s `DashMap`-backed shared-state
//! idiom, adapted to hold in-progress futures rather than queued URLs.

use std::future::Future;

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex as AsyncMutex;

/// Process-wide registry of in-flight fetches keyed by cache key. Two callers
/// with the same key share one underlying future; the map entry is removed
/// once the owning fetch completes, success or failure.
pub struct InFlightRegistry<T, E> {
    inflight: DashMap<String, AsyncMutex<Option<Shared<BoxFuture<'static, Result<T, E>>>>>>,
}

impl<T, E> Default for InFlightRegistry<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> InFlightRegistry<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            inflight: DashMap::new(),
        }
    }

    /// Run `fetch` under single-flight dedupe for `key`. If another caller is
    /// already fetching this key, awaits its shared future instead of
    /// starting a second fetch.
    pub async fn run_with_inflight_dedupe<F>(&self, key: &str, fetch: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        let slot = self
            .inflight
            .entry(key.to_string())
            .or_insert_with(|| AsyncMutex::new(None));
        let mut guard = slot.lock().await;

        if let Some(shared) = guard.as_ref() {
            let shared = shared.clone();
            drop(guard);
            return shared.await;
        }

        let shared: Shared<BoxFuture<'static, Result<T, E>>> = fetch.boxed().shared();
        *guard = Some(shared.clone());
        drop(guard);

        let result = shared.await;
        self.inflight.remove(key);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_share_one_fetch() {
        let registry: Arc<InFlightRegistry<u32, String>> = Arc::new(InFlightRegistry::new());
        let call_count = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let registry = registry.clone();
            let call_count = call_count.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .run_with_inflight_dedupe("key", async move {
                        call_count.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<u32, String>(42)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(42));
        }
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn entry_is_removed_after_completion() {
        let registry: InFlightRegistry<u32, String> = InFlightRegistry::new();
        registry
            .run_with_inflight_dedupe("key", async { Ok::<u32, String>(1) })
            .await
            .unwrap();
        assert!(registry.inflight.is_empty());
    }

    #[tokio::test]
    async fn failed_fetch_does_not_poison_subsequent_calls() {
        let registry: InFlightRegistry<u32, String> = InFlightRegistry::new();
        let first = registry
            .run_with_inflight_dedupe("key", async { Err::<u32, String>("boom".to_string()) })
            .await;
        assert_eq!(first, Err("boom".to_string()));

        let second = registry
            .run_with_inflight_dedupe("key", async { Ok::<u32, String>(7) })
            .await;
        assert_eq!(second, Ok(7));
    }
}
