use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;

use crate::models::{QueryKey, SearchQuery};

/// Abort signal owned by one dispatched search call.
///
/// Cancelling is idempotent and never fails. Transports race
/// [`SearchCancellationToken::cancelled`] against their request so an
/// aborted call stops doing I/O.
#[derive(Clone, Debug, Default)]
pub struct SearchCancellationToken {
    state: Arc<TokenState>,
}

#[derive(Debug, Default)]
struct TokenState {
    flag: AtomicBool,
    notify: Notify,
}

impl SearchCancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if !self.state.flag.swap(true, Ordering::SeqCst) {
            self.state.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.flag.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let notified = self.state.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

/// Decides which in-flight searches a newly dispatched search makes obsolete.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RelatednessPolicy {
    /// Cancel any live text search whose term starts with the first `len`
    /// characters of the new term, regardless of filters.
    SharedPrefix { len: usize },
    /// Cancel live text searches with identical filters whose term is a
    /// strict prefix or strict extension of the new term.
    Supersedes,
}

impl Default for RelatednessPolicy {
    fn default() -> Self {
        RelatednessPolicy::SharedPrefix { len: 2 }
    }
}

impl RelatednessPolicy {
    pub fn is_related(self, live: &SearchQuery, incoming: &SearchQuery) -> bool {
        if !live.is_text_search() || !incoming.is_text_search() || live == incoming {
            return false;
        }

        match self {
            RelatednessPolicy::SharedPrefix { len } => {
                let prefix: String = incoming.term().chars().take(len).collect();
                live.term().starts_with(&prefix)
            }
            RelatednessPolicy::Supersedes => {
                live.same_filters(incoming)
                    && (live.term().starts_with(incoming.term())
                        || incoming.term().starts_with(live.term()))
            }
        }
    }
}

impl FromStr for RelatednessPolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "supersedes" => Ok(RelatednessPolicy::Supersedes),
            "prefix" => Ok(RelatednessPolicy::default()),
            other => match other.strip_prefix("prefix:") {
                Some(len) => len
                    .parse()
                    .map(|len| RelatednessPolicy::SharedPrefix { len })
                    .map_err(|error| format!("bad prefix length: {error}")),
                None => Err(format!(
                    "expected 'prefix', 'prefix:<n>' or 'supersedes', got '{other}'"
                )),
            },
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct CallId(u64);

/// Handle for one dispatched call, returned by
/// [`CancellationCoordinator::issue`].
#[derive(Clone, Debug)]
pub struct IssuedCall {
    pub id: CallId,
    pub token: SearchCancellationToken,
}

struct LiveCall {
    id: CallId,
    query: SearchQuery,
    token: SearchCancellationToken,
}

/// Tracks the cancellation token of every live call so a newer search can
/// abort the ones it supersedes.
pub struct CancellationCoordinator {
    policy: RelatednessPolicy,
    next_id: AtomicU64,
    live: Mutex<HashMap<QueryKey, LiveCall>>,
}

impl CancellationCoordinator {
    pub fn new(policy: RelatednessPolicy) -> Self {
        Self {
            policy,
            next_id: AtomicU64::new(0),
            live: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> RelatednessPolicy {
        self.policy
    }

    pub fn issue(&self, query: &SearchQuery) -> IssuedCall {
        let id = CallId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let token = SearchCancellationToken::new();
        let previous = self.lock().insert(
            query.key(),
            LiveCall {
                id,
                query: query.clone(),
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.token.cancel();
        }
        IssuedCall { id, token }
    }

    /// Forget a call once it has settled. A no-op if the slot already
    /// belongs to a newer call for the same key.
    pub fn settle(&self, key: &QueryKey, id: CallId) {
        let mut live = self.lock();
        if live.get(key).is_some_and(|call| call.id == id) {
            live.remove(key);
        }
    }

    /// Abort every live text search related to `incoming` and return the
    /// keys that were cancelled.
    pub fn cancel_related(&self, incoming: &SearchQuery) -> Vec<QueryKey> {
        if !incoming.is_text_search() {
            return Vec::new();
        }

        let mut live = self.lock();
        let related: Vec<QueryKey> = live
            .iter()
            .filter(|(_, call)| self.policy.is_related(&call.query, incoming))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &related {
            if let Some(call) = live.remove(key) {
                call.token.cancel();
                tracing::debug!(query = %key, superseded_by = incoming.term(), "cancelled related search");
            }
        }
        related
    }

    /// Abort one live call by key. Returns false if nothing was live.
    pub fn cancel(&self, key: &QueryKey) -> bool {
        match self.lock().remove(key) {
            Some(call) => {
                call.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Abort every live call and return the keys that were cancelled.
    pub fn cancel_all(&self) -> Vec<QueryKey> {
        self.lock()
            .drain()
            .map(|(key, call)| {
                call.token.cancel();
                key
            })
            .collect()
    }

    pub fn live_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<QueryKey, LiveCall>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
