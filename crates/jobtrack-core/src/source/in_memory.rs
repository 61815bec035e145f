use std::sync::{Arc, RwLock, PoisonError};

use crate::models::{
    Application, ApplicationPage, CoreError, DataSet, FollowUpFilter, SearchQuery,
};
use crate::search::SearchCancellationToken;
use crate::source::{SearchFuture, SearchSource};

/// Client-side search over applications already held in memory.
///
/// Matches the backend's filtering: the term is a case-insensitive substring
/// test across the text fields, the status filter is exact, and pages are
/// 1-based. `total` counts every match before pagination.
#[derive(Clone, Default)]
pub struct InMemorySearchSource {
    live: Arc<RwLock<Vec<Application>>>,
    demo: Arc<RwLock<Vec<Application>>>,
}

impl InMemorySearchSource {
    pub fn new(applications: Vec<Application>) -> Self {
        Self {
            live: Arc::new(RwLock::new(applications)),
            demo: Arc::default(),
        }
    }

    pub fn with_demo(mut self, applications: Vec<Application>) -> Self {
        self.demo = Arc::new(RwLock::new(applications));
        self
    }

    pub fn replace(&self, data_set: DataSet, applications: Vec<Application>) {
        *self
            .records(data_set)
            .write()
            .unwrap_or_else(PoisonError::into_inner) = applications;
    }

    pub fn filter(&self, query: &SearchQuery) -> ApplicationPage {
        let records = self
            .records(query.data_set())
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        filter_applications(&records, query)
    }

    fn records(&self, data_set: DataSet) -> &RwLock<Vec<Application>> {
        match data_set {
            DataSet::Live => &self.live,
            DataSet::Demo => &self.demo,
        }
    }
}

impl SearchSource for InMemorySearchSource {
    fn search(&self, query: SearchQuery, token: SearchCancellationToken) -> SearchFuture {
        let page = self.filter(&query);
        Box::pin(async move {
            if token.is_cancelled() {
                return Err(CoreError::cancelled(&query.key()));
            }
            Ok(page)
        })
    }
}

pub fn filter_applications(applications: &[Application], query: &SearchQuery) -> ApplicationPage {
    let needle = query.term().to_lowercase();
    let matches: Vec<&Application> = applications
        .iter()
        .filter(|application| application.matches_term(&needle))
        .filter(|application| {
            query
                .status()
                .is_none_or(|status| application.status.as_str() == status)
        })
        .filter(|application| {
            query.follow_up() == FollowUpFilter::Any || application.follow_up_required
        })
        .collect();

    let total = matches.len() as u64;
    let page_size = query.page_size() as usize;
    let offset = (query.page() as usize)
        .saturating_sub(1)
        .saturating_mul(page_size);
    let records = matches
        .into_iter()
        .skip(offset)
        .take(page_size)
        .cloned()
        .collect();

    ApplicationPage::new(records, total)
}
