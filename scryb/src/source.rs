use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use scrycache::{PageSource, QueryKey, SourcePage};
use scryclient::{Card, CardSearchClient};

/// Card search endpoint as a page source.
pub struct ScryfallSource {
    client: Arc<CardSearchClient>,
}

impl ScryfallSource {
    pub fn new(client: Arc<CardSearchClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageSource for ScryfallSource {
    type Item = Card;

    async fn fetch_page(&self, query: &QueryKey, source_page: u32) -> Result<SourcePage<Card>> {
        let list = self.client.search(query.as_str(), source_page).await?;
        if !list.warnings.is_empty() {
            tracing::warn!(query = %query, warnings = ?list.warnings, "search returned warnings");
        }
        let total_items = list.total();
        Ok(SourcePage {
            items: list.data,
            total_items,
            has_more: list.has_more,
            next_page: list.next_page,
        })
    }
}
