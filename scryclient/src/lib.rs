mod backoff;
mod card;


use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use backoff::RandomizedExponentialBackoff;
use bytes::Bytes;
use reqwest::{
    header::{ACCEPT, RETRY_AFTER, USER_AGENT},
    RequestBuilder, Url,
};
use thiserror::Error;

pub use card::{ApiError, Card, CardFace, CardList, ImageUris};
pub use reqwest::StatusCode;

pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://api.scryfall.com/cards/search";

#[derive(Error, Debug)]
#[error("status {status}: {}", .details.as_deref().unwrap_or("no details"))]
pub struct StatusCodeError {
    pub status: StatusCode,
    pub details: Option<String>,
}

impl StatusCodeError {
    pub fn is_not_found(&self) -> bool {
        self.status == StatusCode::NOT_FOUND
    }
}

#[derive(Error, Debug)]
#[error("search request gave up after {attempts} attempts")]
pub struct RetriesExhausted {
    pub attempts: usize,
}

pub struct CardSearchClient {
    client: reqwest::Client,
    config: CardSearchClientConfig,
}

#[derive(Clone, Debug)]
pub struct CardSearchClientConfig {
    /// Search endpoint URL.
    pub search_endpoint: Url,

    pub user_agent: String,

    /// Attempts per page, including the first one.
    pub max_attempts: usize,
}

impl CardSearchClient {
    pub fn new(config: CardSearchClientConfig, client: reqwest::Client) -> Result<Arc<Self>> {
        if config.max_attempts == 0 {
            anyhow::bail!("max_attempts must be at least 1");
        }
        Ok(Arc::new(Self { client, config }))
    }

    /// URL of one result page. `encoded_query` is used verbatim; the page
    /// parameter is omitted for page 1.
    pub fn page_url(&self, encoded_query: &str, source_page: u32) -> Url {
        let mut url = self.config.search_endpoint.clone();
        url.set_query(Some(&format!("q={}", encoded_query)));
        if source_page > 1 {
            url.query_pairs_mut()
                .append_pair("page", &source_page.to_string());
        }
        url
    }

    pub async fn search(&self, encoded_query: &str, source_page: u32) -> Result<CardList> {
        let url = self.page_url(encoded_query, source_page);
        let mut boff = RandomizedExponentialBackoff::with_max_attempts(self.config.max_attempts);
        loop {
            match request_and_check(self.client.get(url.clone()).decorate(self)).await? {
                Attempt::Done(body) => {
                    let list: CardList = serde_json::from_slice(&body)
                        .with_context(|| format!("failed to decode search page {}", url))?;
                    tracing::debug!(
                        url = %url,
                        total = list.total(),
                        items = list.data.len(),
                        has_more = list.has_more,
                        "fetched search page"
                    );
                    return Ok(list);
                }
                Attempt::Retry(retry_after) => {
                    if !boff.wait(retry_after).await {
                        return Err(RetriesExhausted {
                            attempts: boff.attempts(),
                        }
                        .into());
                    }
                    tracing::info!(url = %url, attempt = boff.attempts(), "retrying search request");
                }
            }
        }
    }
}

enum Attempt {
    Done(Bytes),
    Retry(Option<Duration>),
}

async fn request_and_check(r: RequestBuilder) -> Result<Attempt, StatusCodeError> {
    let res = match r.send().await {
        Ok(x) => x,
        Err(e) => {
            tracing::error!(error = %e, "network error");
            return Ok(Attempt::Retry(None));
        }
    };
    let status = res.status();
    if status.is_success() {
        return match res.bytes().await {
            Ok(body) => Ok(Attempt::Done(body)),
            Err(e) => {
                tracing::error!(error = %e, "failed to read response body");
                Ok(Attempt::Retry(None))
            }
        };
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = res
            .headers()
            .get(RETRY_AFTER)
            .and_then(|x| x.to_str().ok())
            .and_then(|x| x.parse::<u64>().ok())
            .map(Duration::from_secs);
        tracing::warn!(status = %status, ?retry_after, "rate limited");
        return Ok(Attempt::Retry(retry_after));
    }

    let text = res.text().await.unwrap_or_default();
    if status.is_server_error() {
        tracing::error!(status = %status, text = text, "server error");
        Ok(Attempt::Retry(None))
    } else {
        tracing::warn!(status = %status, text = %text, "client error");
        Err(StatusCodeError {
            status,
            details: parse_error_details(&text),
        })
    }
}

fn parse_error_details(body: &str) -> Option<String> {
    serde_json::from_str::<ApiError>(body)
        .ok()
        .and_then(|x| x.details)
}

trait DecorateRequest {
    fn decorate(self, c: &CardSearchClient) -> RequestBuilder;
}

impl DecorateRequest for RequestBuilder {
    fn decorate(self, c: &CardSearchClient) -> RequestBuilder {
        self.header(USER_AGENT, c.config.user_agent.as_str())
            .header(ACCEPT, "application/json")
    }
}
