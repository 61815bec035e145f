use reqwest::StatusCode;

use crate::config::SearchConfig;
use crate::models::{ApplicationPage, CoreError, CoreErrorKind, CoreResult, SearchQuery};
use crate::search::SearchCancellationToken;
use crate::source::{SearchFuture, SearchSource};

/// [`SearchSource`] backed by the job-tracker REST API.
///
/// Issues `GET {api_base}/applications/` (or `/demo/applications/`) with the
/// query's parameters and decodes the `{ data, total }` envelope.
#[derive(Clone, Debug)]
pub struct HttpSearchSource {
    client: reqwest::Client,
    api_base: String,
}

impl HttpSearchSource {
    pub fn new(config: &SearchConfig) -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|error| {
                CoreError::new(
                    CoreErrorKind::Internal,
                    format!("failed to build http client: {error}"),
                )
            })?;
        Ok(Self::with_client(client, &config.api_base))
    }

    pub fn with_client(client: reqwest::Client, api_base: &str) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint_url(&self, query: &SearchQuery) -> String {
        format!("{}{}", self.api_base, query.data_set().endpoint())
    }
}

impl SearchSource for HttpSearchSource {
    fn search(&self, query: SearchQuery, token: SearchCancellationToken) -> SearchFuture {
        let request = self
            .client
            .get(self.endpoint_url(&query))
            .query(&query.params());
        let key = query.key();

        Box::pin(async move {
            let fetch = async move {
                let response = request.send().await.map_err(|error| {
                    CoreError::new(CoreErrorKind::Network, format!("search request failed: {error}"))
                })?;
                let status = response.status();
                let body = response.bytes().await.map_err(|error| {
                    CoreError::new(
                        CoreErrorKind::Network,
                        format!("failed to read search response: {error}"),
                    )
                })?;
                decode_page(status, &body)
            };

            tokio::select! {
                _ = token.cancelled() => Err(CoreError::cancelled(&key)),
                outcome = fetch => outcome.map_err(|error| error.for_query(&key)),
            }
        })
    }
}

pub(crate) fn decode_page(status: StatusCode, body: &[u8]) -> CoreResult<ApplicationPage> {
    if !status.is_success() {
        let detail = String::from_utf8_lossy(body);
        let detail = detail.trim();
        let message = if detail.is_empty() {
            format!("backend responded with {status}")
        } else {
            format!("backend responded with {status}: {detail}")
        };
        return Err(CoreError::new(CoreErrorKind::Network, message));
    }

    serde_json::from_slice(body).map_err(|error| {
        CoreError::new(
            CoreErrorKind::ParseFailure,
            format!("unexpected search response body: {error}"),
        )
    })
}
