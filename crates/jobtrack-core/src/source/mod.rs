pub mod http;
pub mod in_memory;

use std::future::Future;
use std::pin::Pin;

use crate::models::{ApplicationPage, CoreResult, SearchQuery};
use crate::search::SearchCancellationToken;

pub use http::HttpSearchSource;
pub use in_memory::InMemorySearchSource;

pub type SearchFuture = Pin<Box<dyn Future<Output = CoreResult<ApplicationPage>> + Send>>;

/// The backend capability the search core consumes: given a query, produce
/// one page of matching applications.
///
/// Implementations should stop work once `token` is cancelled; the core also
/// stops polling a cancelled call, so a source that ignores the token only
/// wastes bandwidth, never overwrites newer results.
pub trait SearchSource: Send + Sync {
    fn search(&self, query: SearchQuery, token: SearchCancellationToken) -> SearchFuture;
}
