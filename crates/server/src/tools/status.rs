//! cache_status tool implementation.
//!
//! Reports the active worker version and the generations in the store.

use fxcache_client::Registration;
use fxcache_core::{CacheDb, Error, GenerationSummary};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the cache_status tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CacheStatusParams {}

/// Output from the cache_status tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheStatusOutput {
    /// Version of the serving worker, if one is active.
    pub active_version: Option<String>,
    /// Lifecycle state of that worker.
    pub state: Option<String>,
    /// Number of open clients.
    pub clients: usize,
    pub generations: Vec<GenerationSummary>,
    pub total_entries: u64,
}

/// Implementation of the cache_status tool.
pub async fn status_impl(
    registration: &Registration, cache: &CacheDb, _params: CacheStatusParams,
) -> Result<CallToolResult, McpError> {
    let (active_version, state, clients) = match registration.active().await {
        Some(worker) => (
            Some(worker.version().to_string()),
            Some(worker.lifecycle().state().await.to_string()),
            worker.clients().count(),
        ),
        None => (None, None, 0),
    };

    let generations = cache.generation_summaries().await?;
    let total_entries = generations.iter().map(|g| g.entries).sum();

    let output = CacheStatusOutput { active_version, state, clients, generations, total_entries };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize status: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{active_registration, output_json};
    use fxcache_core::{Generation, GenerationKind};

    #[tokio::test]
    async fn test_status_reports_active_worker() {
        let (registration, cache) = active_registration().await;
        cache
            .open_generation(&Generation::new("fxcache-runtime-test", GenerationKind::Runtime))
            .await
            .unwrap();

        let output = output_json(&status_impl(&registration, &cache, CacheStatusParams::default()).await.unwrap());
        assert_eq!(output["active_version"], "fxcache-static-test");
        assert_eq!(output["state"], "active");
        assert_eq!(output["generations"][0]["name"], "fxcache-runtime-test");
        assert_eq!(output["generations"][0]["kind"], "runtime");
        assert_eq!(output["total_entries"], 0);
    }

    #[tokio::test]
    async fn test_status_without_worker() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let registration = Registration::new(std::sync::Arc::new(crate::tools::testing::OfflineNetwork));

        let output = output_json(&status_impl(&registration, &cache, CacheStatusParams::default()).await.unwrap());
        assert!(output["active_version"].is_null());
        assert_eq!(output["clients"], 0);
    }
}
