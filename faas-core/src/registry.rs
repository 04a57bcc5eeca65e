//! Function metadata registry. The pipeline takes the registry as a
//! capability so tests can substitute their own implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::Error;
use crate::types::FunctionMetadata;

#[async_trait]
pub trait Registry: Send + Sync {
    async fn insert(&self, metadata: FunctionMetadata) -> Result<(), Error>;
    async fn get(&self, function_id: &str) -> Result<FunctionMetadata, Error>;
    async fn mark_executed(&self, function_id: &str, executed_at: i64) -> Result<(), Error>;
    async fn list(&self) -> Vec<FunctionMetadata>;
    async fn remove(&self, function_id: &str) -> Result<(), Error>;
}

/// In-memory registry behind a single reader/writer lock; readers
/// proceed concurrently, writers exclusively.
#[derive(Default)]
pub struct InMemoryRegistry {
    functions: RwLock<HashMap<String, FunctionMetadata>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn insert(&self, metadata: FunctionMetadata) -> Result<(), Error> {
        let mut functions = self.functions.write().await;
        info!(
            function_id = %metadata.function_id,
            image_id = %metadata.image_id,
            language = %metadata.language,
            "function stored"
        );
        functions.insert(metadata.function_id.clone(), metadata);
        Ok(())
    }

    async fn get(&self, function_id: &str) -> Result<FunctionMetadata, Error> {
        let functions = self.functions.read().await;
        functions
            .get(function_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(function_id.to_string()))
    }

    async fn mark_executed(&self, function_id: &str, executed_at: i64) -> Result<(), Error> {
        let mut functions = self.functions.write().await;
        let metadata = functions
            .get_mut(function_id)
            .ok_or_else(|| Error::NotFound(function_id.to_string()))?;
        metadata.last_executed = Some(executed_at);
        debug!(function_id, executed_at, "execution timestamp recorded");
        Ok(())
    }

    async fn list(&self) -> Vec<FunctionMetadata> {
        self.functions.read().await.values().cloned().collect()
    }

    async fn remove(&self, function_id: &str) -> Result<(), Error> {
        let mut functions = self.functions.write().await;
        functions
            .remove(function_id)
            .map(|_| info!(function_id, "function deleted"))
            .ok_or_else(|| Error::NotFound(function_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Language;

    fn metadata(id: &str) -> FunctionMetadata {
        FunctionMetadata {
            function_id: id.to_string(),
            image_id: format!("sha256:{}", id),
            language: Language::Python,
            created_at: 1700000000,
            last_executed: None,
            name: "demo".to_string(),
        }
    }

    #[tokio::test]
    async fn insert_get_list_remove() {
        let registry = InMemoryRegistry::new();
        registry.insert(metadata("a")).await.unwrap();
        registry.insert(metadata("b")).await.unwrap();

        assert_eq!(registry.get("a").await.unwrap().function_id, "a");
        assert_eq!(registry.list().await.len(), 2);

        registry.remove("a").await.unwrap();
        assert!(matches!(
            registry.get("a").await,
            Err(Error::NotFound(_))
        ));
        assert_eq!(registry.list().await.len(), 1);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let registry = InMemoryRegistry::new();
        assert!(matches!(registry.get("nope").await, Err(Error::NotFound(_))));
        assert!(matches!(
            registry.remove("nope").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            registry.mark_executed("nope", 1700000000).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn mark_executed_updates_timestamp() {
        let registry = InMemoryRegistry::new();
        registry.insert(metadata("a")).await.unwrap();

        registry.mark_executed("a", 1700000123).await.unwrap();
        assert_eq!(
            registry.get("a").await.unwrap().last_executed,
            Some(1700000123)
        );
    }
}
