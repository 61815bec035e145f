use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};

use crate::models::{ApplicationPage, CoreResult, QueryKey};

pub type SearchOutcome = CoreResult<Arc<ApplicationPage>>;

/// A cloneable handle on one outstanding call; every clone observes the same
/// outcome.
pub type SharedSearch = Shared<BoxFuture<'static, SearchOutcome>>;

/// One caller's claim on an outstanding call, handed back to
/// [`InFlightRegistry::release`] when that caller stops waiting.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Interest {
    key: QueryKey,
    id: u64,
}

impl Interest {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

struct PendingEntry {
    id: u64,
    search: SharedSearch,
    claims: usize,
}

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    pending: HashMap<QueryKey, PendingEntry>,
}

/// Queries currently awaiting the network, so identical concurrent searches
/// share one call.
#[derive(Clone, Default)]
pub struct InFlightRegistry {
    inner: Arc<Mutex<RegistryState>>,
    registered: Arc<AtomicU64>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `future` as outstanding for `key` and return a shared handle.
    ///
    /// The call is driven on a spawned task, so it settles and its entry is
    /// removed even if no caller ever awaits the handle. Must be called from
    /// within a Tokio runtime. The registering caller holds the first claim.
    pub fn register<F>(&self, key: QueryKey, future: F) -> (SharedSearch, Interest)
    where
        F: Future<Output = SearchOutcome> + Send + 'static,
    {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id = state.next_id.wrapping_add(1);

        let registry = self.clone();
        let cleanup_key = key.clone();
        let search = async move {
            let outcome = future.await;
            registry.remove_if_current(&cleanup_key, id);
            outcome
        }
        .boxed()
        .shared();

        state.pending.insert(
            key.clone(),
            PendingEntry {
                id,
                search: search.clone(),
                claims: 1,
            },
        );
        drop(state);

        self.registered.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(search.clone());
        (search, Interest { key, id })
    }

    /// Attach to the outstanding call for `key`, adding a claim on it.
    pub fn join(&self, key: &QueryKey) -> Option<(SharedSearch, Interest)> {
        let mut state = self.lock();
        let entry = state.pending.get_mut(key)?;
        entry.claims += 1;
        Some((
            entry.search.clone(),
            Interest {
                key: key.clone(),
                id: entry.id,
            },
        ))
    }

    pub fn lookup(&self, key: &QueryKey) -> Option<SharedSearch> {
        self.lock()
            .pending
            .get(key)
            .map(|entry| entry.search.clone())
    }

    /// Detach `key` so later lookups no longer join it. The call itself keeps
    /// running until it settles or is cancelled.
    pub fn forget(&self, key: &QueryKey) -> bool {
        self.lock().pending.remove(key).is_some()
    }

    /// Drop one claim. Returns true when that was the last claim on a call
    /// that is still outstanding; stale or settled claims return false.
    pub fn release(&self, interest: &Interest) -> bool {
        let mut state = self.lock();
        let Some(entry) = state.pending.get_mut(&interest.key) else {
            return false;
        };
        if entry.id != interest.id {
            return false;
        }
        entry.claims = entry.claims.saturating_sub(1);
        entry.claims == 0
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of calls ever registered.
    pub fn registered_total(&self) -> u64 {
        self.registered.load(Ordering::SeqCst)
    }

    fn remove_if_current(&self, key: &QueryKey, id: u64) {
        let mut state = self.lock();
        if state.pending.get(key).is_some_and(|entry| entry.id == id) {
            state.pending.remove(key);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::*;
    use crate::models::{CoreError, CoreErrorKind, SearchQuery};

    fn key(term: &str) -> QueryKey {
        SearchQuery::new(10).with_term(term).key()
    }

    async fn wait_until_empty(registry: &InFlightRegistry) {
        for _ in 0..50 {
            if registry.is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("registry still holds {} entries", registry.len());
    }

    #[tokio::test]
    async fn lookup_returns_the_registered_call_until_it_settles() {
        let registry = InFlightRegistry::new();
        let (release, gate) = oneshot::channel::<()>();

        let (search, _) = registry.register(key("acme"), async move {
            let _ = gate.await;
            Ok(Arc::new(ApplicationPage::default()))
        });

        let joined = registry.lookup(&key("acme")).expect("call should be pending");
        release.send(()).unwrap();

        assert_eq!(joined.await, search.await);
        wait_until_empty(&registry).await;
        assert!(registry.lookup(&key("acme")).is_none());
    }

    #[tokio::test]
    async fn failed_calls_are_removed_without_being_awaited() {
        let registry = InFlightRegistry::new();

        let _ignored = registry.register(key("boom"), async {
            Err(CoreError::new(CoreErrorKind::Network, "connection refused"))
        });

        wait_until_empty(&registry).await;
    }

    #[tokio::test]
    async fn late_settlement_does_not_remove_a_newer_registration() {
        let registry = InFlightRegistry::new();
        let (release_old, gate_old) = oneshot::channel::<()>();

        let (old, stale) = registry.register(key("acme"), async move {
            let _ = gate_old.await;
            Ok(Arc::new(ApplicationPage::default()))
        });
        assert!(registry.forget(&key("acme")));

        let newer = registry.register(key("acme"), std::future::pending());
        release_old.send(()).unwrap();
        old.await.unwrap();

        tokio::task::yield_now().await;
        assert_eq!(registry.len(), 1);
        assert!(!registry.release(&stale));
        drop(newer);
        assert_eq!(registry.registered_total(), 2);
    }

    #[tokio::test]
    async fn only_the_last_claim_released_reports_the_call_abandoned() {
        let registry = InFlightRegistry::new();
        let (_search, first) = registry.register(key("acme"), std::future::pending());
        let (_joined, second) = registry.join(&key("acme")).expect("call should be pending");

        assert_eq!(first.key(), second.key());
        assert!(!registry.release(&first));
        assert!(registry.release(&second));
        assert!(registry.join(&key("missing")).is_none());
    }
}
