use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use jobtrack_core::models::{
    Application, ApplicationPage, ApplicationStatus, CoreError, CoreErrorKind, SearchQuery,
};
use jobtrack_core::search::SearchCancellationToken;
use jobtrack_core::source::{SearchFuture, SearchSource};

/// Answers every query with a single record named after the term, after a
/// per-term delay.
pub struct ScriptedSource {
    delays: HashMap<String, Duration>,
    default_delay: Duration,
    pub failing: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(default_delay: Duration) -> Self {
        Self {
            delays: HashMap::new(),
            default_delay,
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, term: &str, delay: Duration) -> Self {
        self.delays.insert(term.to_string(), delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SearchSource for ScriptedSource {
    fn search(&self, query: SearchQuery, _token: SearchCancellationToken) -> SearchFuture {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self
            .delays
            .get(query.term())
            .copied()
            .unwrap_or(self.default_delay);
        let failing = self.failing.load(Ordering::SeqCst);

        Box::pin(async move {
            tokio::time::sleep(delay).await;
            if failing {
                return Err(CoreError::new(CoreErrorKind::Network, "backend unavailable"));
            }
            let record = Application::new(1, query.term(), "Engineer", ApplicationStatus::Applied);
            Ok(ApplicationPage::new(vec![record], 1))
        })
    }
}
