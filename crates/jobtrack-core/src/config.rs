use std::str::FromStr;
use std::time::Duration;

use crate::models::{CoreError, CoreErrorKind, CoreResult};
use crate::search::RelatednessPolicy;

pub const DEFAULT_API_BASE: &str = "http://localhost:8005";
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(400);
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_CACHE_CAPACITY: usize = 20;
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunables for the search pipeline.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SearchConfig {
    /// Base URL of the job-tracker backend, without a trailing slash.
    pub api_base: String,
    /// Quiet period a typed term must survive before it is searched.
    pub debounce: Duration,
    /// How long a cached page stays fresh.
    pub cache_ttl: Duration,
    /// Maximum number of cached pages; the oldest insertion is evicted first.
    pub cache_capacity: usize,
    pub default_page_size: u32,
    pub relatedness: RelatednessPolicy,
    /// Transport-level timeout applied by the HTTP source.
    pub request_timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            debounce: DEFAULT_DEBOUNCE,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            default_page_size: DEFAULT_PAGE_SIZE,
            relatedness: RelatednessPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl SearchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration from `JOBTRACK_*` environment variables,
    /// falling back to the defaults for anything unset.
    pub fn from_env() -> CoreResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CoreResult<Self> {
        let mut config = Self::default();

        if let Some(base) = lookup("JOBTRACK_API_BASE") {
            config = config.api_base(base);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "JOBTRACK_DEBOUNCE_MS")? {
            config.debounce = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "JOBTRACK_CACHE_TTL_SECS")? {
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(capacity) = parse_var::<usize>(&lookup, "JOBTRACK_CACHE_CAPACITY")? {
            config.cache_capacity = capacity;
        }
        if let Some(page_size) = parse_var::<u32>(&lookup, "JOBTRACK_PAGE_SIZE")? {
            config.default_page_size = page_size;
        }
        if let Some(policy) = parse_var::<RelatednessPolicy>(&lookup, "JOBTRACK_RELATEDNESS")? {
            config.relatedness = policy;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "JOBTRACK_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn default_page_size(mut self, page_size: u32) -> Self {
        self.default_page_size = page_size;
        self
    }

    pub fn relatedness(mut self, policy: RelatednessPolicy) -> Self {
        self.relatedness = policy;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.api_base.trim().is_empty() {
            return Err(invalid_config("api_base must not be empty"));
        }
        if self.cache_capacity == 0 {
            return Err(invalid_config("cache_capacity must be greater than zero"));
        }
        if self.default_page_size == 0 {
            return Err(invalid_config("default_page_size must be greater than zero"));
        }
        if self.cache_ttl.is_zero() {
            return Err(invalid_config("cache_ttl must be greater than zero"));
        }
        if self.request_timeout.is_zero() {
            return Err(invalid_config("request_timeout must be greater than zero"));
        }
        if let RelatednessPolicy::SharedPrefix { len: 0 } = self.relatedness {
            return Err(invalid_config("shared prefix length must be greater than zero"));
        }
        Ok(())
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> CoreResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|error| invalid_config(&format!("{name}='{raw}': {error}")))
}

fn invalid_config(message: &str) -> CoreError {
    CoreError::new(
        CoreErrorKind::InvalidInput,
        format!("invalid search configuration: {message}"),
    )
}
