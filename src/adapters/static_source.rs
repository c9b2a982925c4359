//! In-memory keyword-matched adapter.

use async_trait::async_trait;

use crate::adapters::{Adapter, AdapterError, ContextItem, RetrievalOptions, Teardown};
use crate::config::schema::StaticSourceConfig;

/// Serves a fixed document set, scored by query term overlap.
pub struct StaticAdapter {
    name: String,
    items: Vec<ContextItem>,
    max_results: usize,
}

impl StaticAdapter {
    pub fn new(name: impl Into<String>, config: &StaticSourceConfig) -> Self {
        Self {
            name: name.into(),
            items: config.items.clone(),
            max_results: config.max_results,
        }
    }

    fn score(content: &str, terms: &[String]) -> f64 {
        let content = content.to_lowercase();
        let hits = terms.iter().filter(|t| content.contains(t.as_str())).count();
        hits as f64 / terms.len() as f64
    }
}

impl Teardown for StaticAdapter {}

#[async_trait]
impl Adapter for StaticAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "static"
    }

    async fn retrieve(
        &self,
        query: &str,
        _options: &RetrievalOptions,
    ) -> Result<Vec<ContextItem>, AdapterError> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f64, &ContextItem)> = self
            .items
            .iter()
            .map(|item| (Self::score(&item.content, &terms), item))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        // Stable sort keeps document order among equal scores.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(self.max_results)
            .map(|(score, item)| {
                let mut item = item.clone();
                item.score = Some(score);
                item
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> StaticAdapter {
        StaticAdapter::new(
            "faq",
            &StaticSourceConfig {
                items: vec![
                    ContextItem::new("Opening hours are 9 to 5"),
                    ContextItem::new("Returns accepted within 30 days"),
                    ContextItem::new("Opening a return requires a receipt"),
                ],
                max_results: 2,
            },
        )
    }

    #[tokio::test]
    async fn test_ranks_by_term_overlap() {
        let items = adapter()
            .retrieve("opening hours", &RetrievalOptions::default())
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].content, "Opening hours are 9 to 5");
        assert_eq!(items[0].score, Some(1.0));
        assert_eq!(items[1].score, Some(0.5));
    }

    #[tokio::test]
    async fn test_no_match_is_empty() {
        let items = adapter()
            .retrieve("shipping", &RetrievalOptions::default())
            .await
            .unwrap();
        assert!(items.is_empty());
    }
}
