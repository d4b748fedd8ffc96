//! In-memory cache of loaded resources, keyed by request path.

use crate::resource::Resource;
use dashmap::DashMap;
use std::sync::Arc;

/// Shared resource cache. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct ResourceCache {
    entries: Arc<DashMap<String, Resource>>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, request_path: &str) -> Option<Resource> {
        self.entries
            .get(request_path)
            .map(|entry| entry.value().clone())
    }

    pub fn insert(&self, request_path: impl Into<String>, resource: Resource) {
        self.entries.insert(request_path.into(), resource);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
