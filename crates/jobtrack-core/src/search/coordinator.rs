use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::watch;

use crate::config::SearchConfig;
use crate::input::InputEvent;
use crate::models::{
    ApplicationPage, CoreError, DataSet, FollowUpFilter, SearchQuery,
};
use crate::search::{
    Debouncer, FocusSnapshot, FocusTarget, Interest, SearchClient, SearchOptions, SearchOutcome,
    Settled,
};
use crate::source::SearchSource;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SettledOutcome {
    Success,
    Error,
    /// The current call was aborted. Still published as a state change
    /// (phase and `is_searching`), so subscribers re-render even though
    /// results and error are unchanged.
    Canceled,
}

/// Lifecycle of a search session. `Settled` is a resting state like `Idle`:
/// the next input moves the session back to `Debouncing`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SearchPhase {
    Idle,
    Debouncing,
    Resolving,
    Settled(SettledOutcome),
}

impl SearchPhase {
    pub fn is_idle(self) -> bool {
        matches!(self, SearchPhase::Idle | SearchPhase::Settled(_))
    }
}

/// What the presentation layer renders.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchState {
    /// The term as typed, ahead of any debounced search.
    pub search_term: String,
    /// The query most recently sent for resolution.
    pub query: SearchQuery,
    pub phase: SearchPhase,
    pub is_searching: bool,
    pub results: Arc<ApplicationPage>,
    pub error: Option<String>,
    /// Sequence number of the request whose outcome is on display.
    pub applied_sequence: u64,
    /// Cursor state to reapply after rendering this state, if the input had
    /// focus when the update was made.
    pub focus: Option<FocusSnapshot>,
}

impl SearchState {
    fn initial(query: SearchQuery) -> Self {
        Self {
            search_term: query.term().to_string(),
            query,
            phase: SearchPhase::Idle,
            is_searching: false,
            results: Arc::new(ApplicationPage::default()),
            error: None,
            applied_sequence: 0,
            focus: None,
        }
    }
}

struct Session {
    criteria: SearchQuery,
    issued_sequence: u64,
    pending: Option<SearchQuery>,
    /// Claim on the pending call, released when the session stops waiting.
    held: Option<Interest>,
    last_applied: Option<SearchQuery>,
}

#[derive(Default)]
struct FocusSlot {
    target: Option<Arc<dyn FocusTarget>>,
    last_event: Option<FocusSnapshot>,
}

struct CoordinatorInner {
    client: SearchClient,
    session: Mutex<Session>,
    state: watch::Sender<SearchState>,
    focus: Mutex<FocusSlot>,
    debouncer: Debouncer<String>,
}

/// One logical search session: debounces typed terms, resolves queries
/// through a [`SearchClient`] and publishes the outcome, applying only the
/// response of the most recently issued request.
///
/// Cloning yields another handle on the same session. Creating one spawns a
/// background task, so it must happen inside a Tokio runtime.
#[derive(Clone)]
pub struct QueryCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl QueryCoordinator {
    pub fn new(source: Arc<dyn SearchSource>, config: &SearchConfig) -> Self {
        Self::with_client(SearchClient::new(source, config), config)
    }

    /// Build a session on top of an existing client, sharing its cache and
    /// in-flight calls with every other session that uses it.
    pub fn with_client(client: SearchClient, config: &SearchConfig) -> Self {
        let criteria = SearchQuery::new(config.default_page_size);
        let (debouncer, settled) = Debouncer::new(config.debounce);
        let (state, _) = watch::channel(SearchState::initial(criteria.clone()));

        let inner = Arc::new(CoordinatorInner {
            client,
            session: Mutex::new(Session {
                criteria,
                issued_sequence: 0,
                pending: None,
                held: None,
                last_applied: None,
            }),
            state,
            focus: Mutex::new(FocusSlot::default()),
            debouncer,
        });

        spawn_settled_driver(Arc::downgrade(&inner), settled);
        Self { inner }
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.inner.state.subscribe()
    }

    pub fn state(&self) -> SearchState {
        self.inner.state.borrow().clone()
    }

    pub fn client(&self) -> &SearchClient {
        &self.inner.client
    }

    pub fn attach_focus_target(&self, target: Arc<dyn FocusTarget>) {
        self.lock_focus().target = Some(target);
    }

    /// Record the cursor state reported alongside an input change, used when
    /// no [`FocusTarget`] is attached.
    pub fn record_focus(&self, snapshot: FocusSnapshot) {
        self.lock_focus().last_event = Some(snapshot);
    }

    /// Accept a newly typed term: show it immediately, search it once the
    /// quiet period has passed.
    pub fn handle_search_change(&self, term: impl Into<String>) {
        let term = term.into();
        let restore = self.publish(|state| {
            state.search_term = term.clone();
            state.phase = SearchPhase::Debouncing;
        });
        self.restore_focus(restore);
        self.inner.debouncer.push(term);
    }

    /// UI-boundary entry point: remember the event's cursor state, then
    /// treat its value as a typed term.
    pub fn handle_input_event(&self, event: InputEvent) {
        self.record_focus(event.focus_snapshot());
        self.handle_search_change(event.value);
    }

    /// Search `term` right away, skipping the quiet period.
    pub fn search_now(&self, term: impl Into<String>) {
        let term = term.into();
        self.inner.debouncer.discard();
        self.inner.state.send_modify(|state| state.search_term = term.clone());
        self.resolve_term(term);
    }

    /// Update the visible term without scheduling a search.
    pub fn set_search_term(&self, term: impl Into<String>) {
        let term = term.into();
        let restore = self.publish(|state| state.search_term = term);
        self.restore_focus(restore);
    }

    pub fn set_status_filter(&self, status: Option<String>) {
        self.refilter(|criteria| criteria.with_status(status).with_page(1));
    }

    pub fn set_follow_up(&self, follow_up: FollowUpFilter) {
        self.refilter(|criteria| criteria.with_follow_up(follow_up).with_page(1));
    }

    pub fn set_page(&self, page: u32) {
        self.refilter(|criteria| criteria.with_page(page));
    }

    pub fn set_page_size(&self, page_size: u32) {
        self.refilter(|criteria| criteria.with_page_size(page_size).with_page(1));
    }

    pub fn set_data_set(&self, data_set: DataSet) {
        self.refilter(|criteria| criteria.with_data_set(data_set).with_page(1));
    }

    /// Re-run the current query against the source, bypassing the cache.
    pub fn refresh(&self) {
        let query = self.lock_session().criteria.clone();
        self.resolve(query, SearchOptions { use_cache: false });
    }

    /// Abandon any pending input or call and search for the empty term.
    pub fn reset_search(&self) {
        self.inner.debouncer.discard();
        {
            let mut session = self.lock_session();
            session.pending = None;
            if let Some(held) = session.held.take() {
                self.inner.client.release(&held);
            }
            session.last_applied = None;
        }
        self.lock_focus().last_event = None;
        self.inner.state.send_modify(|state| {
            state.search_term.clear();
            state.focus = None;
        });

        let query = self.lock_session().criteria.clone().with_term("").with_page(1);
        self.resolve(query, SearchOptions::default());
    }

    /// Drop cached pages after the underlying records changed.
    pub fn invalidate(&self, data_set: Option<DataSet>) {
        self.inner.client.invalidate(data_set);
    }

    /// Stop the debounce timer and stop waiting on the session's live call.
    /// The call is aborted unless another session sharing the client still
    /// waits on it. Later input is ignored.
    pub fn shutdown(&self) {
        self.inner.debouncer.shutdown();
        let held = {
            let mut session = self.lock_session();
            session.pending = None;
            session.held.take()
        };
        if let Some(held) = held {
            self.inner.client.release(&held);
        }
    }

    fn resolve_term(&self, term: String) {
        let query = {
            let session = self.lock_session();
            let query = session.criteria.clone().with_term(term).with_page(1);
            let repeat = query.is_text_search()
                && session.pending.is_none()
                && session.last_applied.as_ref() == Some(&query);
            if repeat {
                drop(session);
                tracing::debug!(query = %query.key(), "skipping repeat of applied search");
                let restore = self.publish(|state| {
                    state.phase = SearchPhase::Settled(SettledOutcome::Success);
                });
                self.restore_focus(restore);
                return;
            }
            query
        };
        self.resolve(query, SearchOptions::default());
    }

    fn refilter(&self, update: impl FnOnce(SearchQuery) -> SearchQuery) {
        let term = self.inner.state.borrow().search_term.clone();
        let query = {
            let session = self.lock_session();
            update(session.criteria.clone()).with_term(term)
        };
        self.inner.debouncer.discard();
        self.resolve(query, SearchOptions::default());
    }

    fn resolve(&self, query: SearchQuery, options: SearchOptions) {
        let (sequence, restore) = {
            let mut session = self.lock_session();
            session.issued_sequence += 1;
            session.criteria = query.clone();
            session.pending = Some(query.clone());
            session.held = None;
            let restore = self.publish(|state| {
                state.query = query.clone();
                state.phase = SearchPhase::Resolving;
                state.is_searching = true;
                state.error = None;
            });
            (session.issued_sequence, restore)
        };
        self.restore_focus(restore);

        if options.use_cache
            && let Some(page) = self.inner.client.cached(&query)
        {
            self.apply(sequence, &query, Ok(page));
            return;
        }

        let dispatch = self.inner.client.dispatch(&query);
        {
            let mut session = self.lock_session();
            if session.issued_sequence == sequence {
                session.held = Some(dispatch.interest.clone());
            }
        }
        let session = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let outcome = dispatch.search.await;
            if let Some(inner) = session.upgrade() {
                QueryCoordinator { inner }.apply(sequence, &query, outcome);
            }
        });
    }

    fn apply(&self, sequence: u64, query: &SearchQuery, outcome: SearchOutcome) {
        let restore = {
            let mut session = self.lock_session();
            if sequence != session.issued_sequence {
                tracing::debug!(
                    query = %query.key(),
                    sequence,
                    current = session.issued_sequence,
                    "dropping stale search response"
                );
                return;
            }
            session.pending = None;
            session.held = None;

            match outcome {
                Ok(page) => {
                    session.last_applied = Some(query.clone());
                    self.publish(|state| {
                        state.results = page;
                        state.error = None;
                        state.phase = SearchPhase::Settled(SettledOutcome::Success);
                        state.is_searching = false;
                        state.applied_sequence = sequence;
                    })
                }
                Err(error) if error.is_cancelled() => {
                    tracing::debug!(query = %query.key(), sequence, "current search was cancelled");
                    self.publish(|state| {
                        state.phase = SearchPhase::Settled(SettledOutcome::Canceled);
                        state.is_searching = false;
                    })
                }
                Err(error) => {
                    log_failure(query, sequence, &error);
                    self.publish(|state| {
                        state.error = Some(error.message.clone());
                        state.phase = SearchPhase::Settled(SettledOutcome::Error);
                        state.is_searching = false;
                        state.applied_sequence = sequence;
                    })
                }
            }
        };
        self.restore_focus(restore);
    }

    /// Capture focus, apply `update` to the published state, and return the
    /// snapshot to restore once the caller has released its locks.
    fn publish(&self, update: impl FnOnce(&mut SearchState)) -> Option<FocusSnapshot> {
        let snapshot = self.capture_focus().filter(|snapshot| snapshot.had_focus);
        self.inner.state.send_modify(|state| {
            update(state);
            state.focus = snapshot;
        });
        snapshot
    }

    fn capture_focus(&self) -> Option<FocusSnapshot> {
        let focus = self.lock_focus();
        match &focus.target {
            Some(target) => Some(target.capture()),
            None => focus.last_event,
        }
    }

    fn restore_focus(&self, snapshot: Option<FocusSnapshot>) {
        let Some(snapshot) = snapshot else {
            return;
        };
        let target = self.lock_focus().target.clone();
        if let Some(target) = target {
            target.restore(&snapshot);
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.inner.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_focus(&self) -> MutexGuard<'_, FocusSlot> {
        self.inner.focus.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for CoordinatorInner {
    fn drop(&mut self) {
        let held = self
            .session
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .held
            .take();
        if let Some(held) = held {
            self.client.release(&held);
        }
    }
}

fn spawn_settled_driver(session: Weak<CoordinatorInner>, mut settled: Settled<String>) {
    tokio::spawn(async move {
        while let Some(term) = settled.next().await {
            let Some(inner) = session.upgrade() else {
                return;
            };
            QueryCoordinator { inner }.resolve_term(term);
        }
    });
}

fn log_failure(query: &SearchQuery, sequence: u64, error: &CoreError) {
    tracing::error!(
        query = %query.key(),
        sequence,
        kind = ?error.kind,
        message = %error.message,
        "search failed"
    );
}
