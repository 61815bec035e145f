pub mod config;
pub mod input;
pub mod models;
pub mod search;
pub mod source;

pub use config::SearchConfig;
pub use search::{QueryCoordinator, SearchClient, SearchState};
