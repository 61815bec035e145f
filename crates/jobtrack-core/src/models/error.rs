use crate::models::QueryKey;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CoreErrorKind {
    InvalidInput,
    Network,
    ParseFailure,
    Cancelled,
    Internal,
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub kind: CoreErrorKind,
    pub query: Option<QueryKey>,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            query: None,
            message: message.into(),
        }
    }

    pub fn cancelled(query: &QueryKey) -> Self {
        Self {
            kind: CoreErrorKind::Cancelled,
            query: Some(query.clone()),
            message: format!("search '{query}' was superseded"),
        }
    }

    pub fn for_query(mut self, query: &QueryKey) -> Self {
        self.query.get_or_insert_with(|| query.clone());
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == CoreErrorKind::Cancelled
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
