use std::sync::{Arc, Mutex, PoisonError};

use crate::config::SearchConfig;
use crate::models::{ApplicationPage, CoreError, CoreResult, DataSet, QueryKey, SearchQuery};
use crate::search::{
    CancellationCoordinator, InFlightRegistry, Interest, IssuedCall, SearchCacheStore,
    SearchOutcome, SharedSearch,
};
use crate::source::SearchSource;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SearchOptions {
    pub use_cache: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { use_cache: true }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResolutionOrigin {
    Cache,
    Shared,
    Network,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Resolution {
    pub page: Arc<ApplicationPage>,
    pub origin: ResolutionOrigin,
}

/// A dispatched call and whether it was started by this dispatch or joined.
///
/// `interest` is this caller's claim on the call. Callers that stop waiting
/// before it settles hand it to [`SearchClient::release`]; callers that await
/// the outcome can simply drop it.
#[derive(Clone)]
pub struct Dispatch {
    pub search: SharedSearch,
    pub origin: ResolutionOrigin,
    pub interest: Interest,
}

/// Front door to a [`SearchSource`]: answers from the cache when fresh,
/// joins identical in-flight calls, and cancels related older calls before
/// starting a new one.
#[derive(Clone)]
pub struct SearchClient {
    source: Arc<dyn SearchSource>,
    cache: Arc<Mutex<SearchCacheStore>>,
    in_flight: InFlightRegistry,
    cancellation: Arc<CancellationCoordinator>,
}

impl SearchClient {
    pub fn new(source: Arc<dyn SearchSource>, config: &SearchConfig) -> Self {
        Self {
            source,
            cache: Arc::new(Mutex::new(SearchCacheStore::new(
                config.cache_ttl,
                config.cache_capacity,
            ))),
            in_flight: InFlightRegistry::new(),
            cancellation: Arc::new(CancellationCoordinator::new(config.relatedness)),
        }
    }

    pub async fn search(
        &self,
        query: &SearchQuery,
        options: SearchOptions,
    ) -> CoreResult<Resolution> {
        if options.use_cache
            && let Some(page) = self.cached(query)
        {
            return Ok(Resolution {
                page,
                origin: ResolutionOrigin::Cache,
            });
        }

        let dispatch = self.dispatch(query);
        let page = dispatch.search.await?;
        Ok(Resolution {
            page,
            origin: dispatch.origin,
        })
    }

    pub fn cached(&self, query: &SearchQuery) -> Option<Arc<ApplicationPage>> {
        let key = query.key();
        let page = self.lock_cache().get(&key);
        if page.is_some() {
            tracing::debug!(query = %key, "search served from cache");
        }
        page
    }

    /// Join the in-flight call for `query`, or cancel related calls and
    /// start a new one. Never consults the cache.
    pub fn dispatch(&self, query: &SearchQuery) -> Dispatch {
        let key = query.key();
        if let Some((search, interest)) = self.in_flight.join(&key) {
            tracing::debug!(query = %key, "joined in-flight search");
            return Dispatch {
                search,
                origin: ResolutionOrigin::Shared,
                interest,
            };
        }

        for cancelled in self.cancellation.cancel_related(query) {
            self.in_flight.forget(&cancelled);
        }

        let IssuedCall { id, token } = self.cancellation.issue(query);
        let request = self.source.search(query.clone(), token.clone());
        let cache = self.cache.clone();
        let cancellation = self.cancellation.clone();
        let store_key = key.clone();

        let call = async move {
            let outcome: SearchOutcome = tokio::select! {
                biased;
                _ = token.cancelled() => Err(CoreError::cancelled(&store_key)),
                outcome = request => outcome.map(Arc::new),
            };
            cancellation.settle(&store_key, id);

            match &outcome {
                Ok(page) if !token.is_cancelled() => {
                    cache
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .put(store_key.clone(), page.clone());
                }
                Ok(_) => {
                    tracing::debug!(query = %store_key, "dropping result of cancelled search");
                    return Err(CoreError::cancelled(&store_key));
                }
                Err(error) => {
                    tracing::debug!(
                        query = %store_key,
                        kind = ?error.kind,
                        message = %error.message,
                        "search call failed"
                    );
                }
            }
            outcome
        };

        tracing::debug!(query = %key, "dispatching search");
        let (search, interest) = self.in_flight.register(key, call);
        Dispatch {
            search,
            origin: ResolutionOrigin::Network,
            interest,
        }
    }

    /// Drop cached pages, either all of them or only those of one data set.
    pub fn invalidate(&self, data_set: Option<DataSet>) {
        let mut cache = self.lock_cache();
        match data_set {
            None => cache.clear_all(),
            Some(data_set) => {
                let marker = SearchQuery::new(1).with_data_set(data_set).key();
                let prefix = data_set_prefix(&marker);
                cache.clear_matching(|key| key.as_str().starts_with(prefix));
            }
        }
    }

    pub fn clear(&self, keys: &[QueryKey]) {
        self.lock_cache().clear(keys);
    }

    /// Abort the live call for `query`, if any, regardless of who is
    /// waiting on it.
    pub fn cancel(&self, query: &SearchQuery) -> bool {
        let key = query.key();
        self.in_flight.forget(&key);
        self.cancellation.cancel(&key)
    }

    /// Give up one caller's claim on a dispatched call. The call is aborted
    /// only when no other caller still holds a claim on it.
    pub fn release(&self, interest: &Interest) -> bool {
        if !self.in_flight.release(interest) {
            return false;
        }
        let key = interest.key();
        self.in_flight.forget(key);
        tracing::debug!(query = %key, "last waiter left; cancelling search");
        self.cancellation.cancel(key)
    }

    pub fn cancel_all(&self) {
        for key in self.cancellation.cancel_all() {
            self.in_flight.forget(&key);
        }
    }

    pub fn in_flight(&self) -> &InFlightRegistry {
        &self.in_flight
    }

    pub fn cached_len(&self) -> usize {
        self.lock_cache().len()
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, SearchCacheStore> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// Keys start with the `data_set:<value>` pair, which is sorted first.
fn data_set_prefix(key: &QueryKey) -> &str {
    let raw = key.as_str();
    raw.split_once('|').map_or(raw, |(head, _)| head)
}
