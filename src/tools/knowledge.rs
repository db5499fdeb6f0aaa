//! Knowledge tools: semantic search delegated to an external store.
//!
//! The vector store itself lives outside this process; [`KnowledgeStore`] is
//! the seam it plugs into.  [`NullKnowledge`] keeps the rest of the system
//! working when no store is wired up.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::ToolError;

use super::traits::Tool;

// ─── KnowledgeStore ──────────────────────────────────────────────────────────

/// One retrieval result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeHit {
    pub content: String,
    pub source: String,
    pub relevance: f32,
}

/// Semantic retrieval over manuals, entity metadata, and past decisions.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Vec<KnowledgeHit>;
}

/// A store that knows nothing.
pub struct NullKnowledge;

#[async_trait]
impl KnowledgeStore for NullKnowledge {
    async fn search(&self, _query: &str, _limit: usize) -> Vec<KnowledgeHit> {
        Vec::new()
    }
}

// ─── search_knowledge_base ───────────────────────────────────────────────────

pub struct SearchKnowledgeBase {
    store: Arc<dyn KnowledgeStore>,
}

impl SearchKnowledgeBase {
    pub fn new(store: Arc<dyn KnowledgeStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SearchKnowledgeBase {
    fn name(&self) -> &str {
        "search_knowledge_base"
    }

    fn description(&self) -> &str {
        "Search for manuals, entity info, and past decisions"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query"},
                "limit": {"type": "integer", "minimum": 1, "maximum": 10}
            },
            "required": ["query"]
        })
    }

    fn mutating(&self) -> bool {
        false
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let query = args["query"].as_str().unwrap_or_default();
        let limit = args["limit"].as_u64().unwrap_or(3) as usize;

        let hits = self.store.search(query, limit).await;
        let results: Vec<Value> = hits
            .iter()
            .map(|hit| {
                json!({
                    "content": hit.content,
                    "source": hit.source,
                    "relevance": format!("{:.2}", hit.relevance),
                })
            })
            .collect();

        Ok(json!({
            "action": "search_knowledge_base",
            "query": query,
            "results": results,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedStore;

    #[async_trait]
    impl KnowledgeStore for CannedStore {
        async fn search(&self, query: &str, limit: usize) -> Vec<KnowledgeHit> {
            assert_eq!(query, "boiler manual");
            (0..limit.min(2))
                .map(|i| KnowledgeHit {
                    content: format!("hit {i}"),
                    source: "manuals".to_string(),
                    relevance: 0.9,
                })
                .collect()
        }
    }

    #[tokio::test]
    async fn search_formats_results() {
        let tool = SearchKnowledgeBase::new(Arc::new(CannedStore));
        let result = tool
            .execute(json!({"query": "boiler manual", "limit": 2}))
            .await
            .unwrap();
        assert_eq!(result["results"].as_array().unwrap().len(), 2);
        assert_eq!(result["results"][0]["source"], "manuals");
        assert_eq!(result["results"][0]["relevance"], "0.90");
    }

    #[tokio::test]
    async fn null_store_returns_empty() {
        let tool = SearchKnowledgeBase::new(Arc::new(NullKnowledge));
        let result = tool
            .execute(json!({"query": "boiler manual"}))
            .await
            .unwrap();
        assert!(result["results"].as_array().unwrap().is_empty());
    }

    #[test]
    fn search_is_read_only() {
        let tool = SearchKnowledgeBase::new(Arc::new(NullKnowledge));
        assert!(!tool.mutating());
    }
}
