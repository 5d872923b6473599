//! Persistence seam for patched entities.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Stores the state of an entity after a patch changed it.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn save(&self, entity: &'static str, id: i64, snapshot: Value) -> Result<()>;
}

#[async_trait]
impl<S: EntityStore + ?Sized> EntityStore for Arc<S> {
    async fn save(&self, entity: &'static str, id: i64, snapshot: Value) -> Result<()> {
        (**self).save(entity, id, snapshot).await
    }
}

/// For hosts that persist patched objects themselves.
pub struct NoopEntityStore;

#[async_trait]
impl EntityStore for NoopEntityStore {
    async fn save(&self, _entity: &'static str, _id: i64, _snapshot: Value) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SavedEntity {
    pub entity: &'static str,
    pub id: i64,
    pub snapshot: Value,
}

/// In-memory store for tests. Records every save in order.
#[derive(Default)]
pub struct MemoryEntityStore {
    saves: Mutex<Vec<SavedEntity>>,
}

impl MemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saves(&self) -> Vec<SavedEntity> {
        self.saves
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self, entity: &str) -> Option<SavedEntity> {
        self.saves()
            .into_iter()
            .rev()
            .find(|s| s.entity == entity)
    }
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    async fn save(&self, entity: &'static str, id: i64, snapshot: Value) -> Result<()> {
        self.saves
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SavedEntity {
                entity,
                id,
                snapshot,
            });
        Ok(())
    }
}
