use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSet {
    #[default]
    Live,
    Demo,
}

impl DataSet {
    pub fn endpoint(self) -> &'static str {
        match self {
            DataSet::Live => "/applications/",
            DataSet::Demo => "/demo/applications/",
        }
    }

    fn key_value(self) -> &'static str {
        match self {
            DataSet::Live => "applications",
            DataSet::Demo => "demo",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpFilter {
    #[default]
    Any,
    Required,
}

impl FollowUpFilter {
    pub fn as_param(self) -> &'static str {
        match self {
            FollowUpFilter::Any => "",
            FollowUpFilter::Required => "yes",
        }
    }
}

impl From<bool> for FollowUpFilter {
    fn from(required: bool) -> Self {
        if required {
            FollowUpFilter::Required
        } else {
            FollowUpFilter::Any
        }
    }
}

/// An immutable description of one search request.
///
/// Construct through [`SearchQuery::new`] and the `with_*` setters; every
/// setter normalizes its input so that two queries compare equal exactly when
/// they would hit the backend with the same parameters. Pages are 1-based.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(from = "QueryFields")]
pub struct SearchQuery {
    term: String,
    status: String,
    follow_up: FollowUpFilter,
    page: u32,
    page_size: u32,
    data_set: DataSet,
}

impl SearchQuery {
    pub fn new(page_size: u32) -> Self {
        Self {
            term: String::new(),
            status: String::new(),
            follow_up: FollowUpFilter::Any,
            page: 1,
            page_size: page_size.max(1),
            data_set: DataSet::Live,
        }
    }

    pub fn with_term(mut self, term: impl Into<String>) -> Self {
        self.term = term.into();
        self
    }

    pub fn with_status(mut self, status: Option<impl Into<String>>) -> Self {
        self.status = status.map(Into::into).unwrap_or_default();
        self
    }

    pub fn with_follow_up(mut self, follow_up: FollowUpFilter) -> Self {
        self.follow_up = follow_up;
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_data_set(mut self, data_set: DataSet) -> Self {
        self.data_set = data_set;
        self
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn status(&self) -> Option<&str> {
        (!self.status.is_empty()).then_some(self.status.as_str())
    }

    pub fn follow_up(&self) -> FollowUpFilter {
        self.follow_up
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn data_set(&self) -> DataSet {
        self.data_set
    }

    /// A text-search query is one whose term is non-empty; only those take
    /// part in cancellation of related in-flight calls.
    pub fn is_text_search(&self) -> bool {
        !self.term.is_empty()
    }

    /// True when both queries differ at most in their search term.
    pub fn same_filters(&self, other: &SearchQuery) -> bool {
        self.status == other.status
            && self.follow_up == other.follow_up
            && self.page == other.page
            && self.page_size == other.page_size
            && self.data_set == other.data_set
    }

    /// Query parameters in the order the backend documents them.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("search", self.term.clone())];
        if !self.status.is_empty() {
            params.push(("status", self.status.clone()));
        }
        params.push(("follow_up", self.follow_up.as_param().to_string()));
        params.push(("page", self.page.to_string()));
        params.push(("page_size", self.page_size.to_string()));
        params
    }

    pub fn key(&self) -> QueryKey {
        QueryKey::from(self)
    }
}

/// Wire shape of a [`SearchQuery`]; decoding routes through the `with_*`
/// setters so deserialized queries are normalized like built ones.
#[derive(Deserialize)]
#[serde(default)]
struct QueryFields {
    term: String,
    status: String,
    follow_up: FollowUpFilter,
    page: u32,
    page_size: u32,
    data_set: DataSet,
}

impl Default for QueryFields {
    fn default() -> Self {
        Self {
            term: String::new(),
            status: String::new(),
            follow_up: FollowUpFilter::Any,
            page: 1,
            page_size: crate::config::DEFAULT_PAGE_SIZE,
            data_set: DataSet::Live,
        }
    }
}

impl From<QueryFields> for SearchQuery {
    fn from(fields: QueryFields) -> Self {
        SearchQuery::new(fields.page_size)
            .with_term(fields.term)
            .with_status(Some(fields.status))
            .with_follow_up(fields.follow_up)
            .with_page(fields.page)
            .with_data_set(fields.data_set)
    }
}

/// Canonical identity of a [`SearchQuery`], used by the cache and the
/// in-flight registry.
///
/// Rendered as `field:value` pairs sorted by field name and joined with `|`.
/// Values escape `\`, `|` and `:` so distinct queries can never collide.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct QueryKey(String);

impl QueryKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&SearchQuery> for QueryKey {
    fn from(query: &SearchQuery) -> Self {
        let page = query.page.to_string();
        let page_size = query.page_size.to_string();
        let fields: [(&str, &str); 6] = [
            ("data_set", query.data_set.key_value()),
            ("follow_up", query.follow_up.as_param()),
            ("page", &page),
            ("page_size", &page_size),
            ("search", &query.term),
            ("status", &query.status),
        ];
        debug_assert!(fields.windows(2).all(|pair| pair[0].0 < pair[1].0));

        let mut rendered = String::new();
        for (index, (name, value)) in fields.iter().enumerate() {
            if index > 0 {
                rendered.push('|');
            }
            rendered.push_str(name);
            rendered.push(':');
            push_escaped(&mut rendered, value);
        }
        QueryKey(rendered)
    }
}

impl Display for QueryKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn push_escaped(out: &mut String, value: &str) {
    for ch in value.chars() {
        if matches!(ch, '\\' | '|' | ':') {
            out.push('\\');
        }
        out.push(ch);
    }
}
