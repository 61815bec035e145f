pub mod application;
pub mod error;
pub mod query;

pub use application::{Application, ApplicationPage, ApplicationStatus};
pub use error::{CoreError, CoreErrorKind, CoreResult};
pub use query::{DataSet, FollowUpFilter, QueryKey, SearchQuery};
