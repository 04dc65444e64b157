//! Tag cache — process-wide tag name → identifier mapping.
//!
//! The mapping lives behind an `Arc` snapshot that is swapped whole on
//! refresh, so readers never see a half-replaced map. Unknown names are
//! created on demand, one creation in flight per name.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, error, info};

use crate::error::TagCacheError;
use crate::mail::TagNames;
use crate::paperless::{DocumentStore, TagId, TagMap};

/// Resolved identifier set for one message.
pub type TagIds = BTreeSet<TagId>;

pub struct TagCache {
    store: Arc<dyn DocumentStore>,
    /// `None` until the first successful refresh.
    mapping: RwLock<Option<Arc<TagMap>>>,
    /// Per-name creation locks.
    creating: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TagCache {
    /// Create an empty cache. Nothing is fetched until first use.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            mapping: RwLock::new(None),
            creating: Mutex::new(HashMap::new()),
        }
    }

    /// Current mapping. Empty if the cache was never populated.
    pub async fn snapshot(&self) -> Arc<TagMap> {
        self.mapping.read().await.clone().unwrap_or_default()
    }

    /// Whether a successful refresh has happened yet.
    pub async fn is_populated(&self) -> bool {
        self.mapping.read().await.is_some()
    }

    #[cfg(test)]
    async fn get(&self, name: &str) -> Option<TagId> {
        self.mapping
            .read()
            .await
            .as_ref()
            .and_then(|m| m.get(&tag_key(name)).copied())
    }

    /// Replace the whole mapping with the backend's current tag list.
    pub async fn refresh(&self) -> Result<(), TagCacheError> {
        info!("Refreshing tag mappings from Paperless-ngx");
        let fresh = self.store.list_tags().await.map_err(|e| {
            error!(
                status = ?e.status(),
                "Something went wrong while trying to fetch tags from Paperless-ngx: {e}"
            );
            TagCacheError::Refresh(e)
        })?;

        let count = fresh.len();
        *self.mapping.write().await = Some(Arc::new(fresh));
        info!(count, "Tag mappings updated");
        Ok(())
    }

    /// Ask the backend to create `name`. Failures are logged, not returned.
    ///
    /// Does not touch the mapping; refresh afterwards to pick up the id.
    pub async fn create(&self, name: &str) -> bool {
        info!(tag = %name, "Creating tag");
        match self.store.create_tag(name).await {
            Ok(tag) => {
                debug!(tag = %name, id = %tag.id, "Tag created");
                true
            }
            Err(e) => {
                error!(tag = %name, status = ?e.status(), "Error creating tag: {e}");
                false
            }
        }
    }

    /// Resolve requested names to identifiers, creating unknown tags.
    ///
    /// Names that still have no identifier after creation and refresh are
    /// left out of the result. Only a refresh failure is an error.
    /// Names are matched and created by their [`tag_key`].
    pub async fn resolve(&self, names: &TagNames) -> Result<TagIds, TagCacheError> {
        if !self.is_populated().await {
            self.refresh().await?;
        }

        let keys: BTreeSet<String> = names.iter().map(|n| tag_key(n)).collect();
        let unknown = missing_keys(&*self.snapshot().await, &keys);
        if !unknown.is_empty() {
            self.create_missing(unknown).await?;
        }

        let mapping = self.snapshot().await;
        Ok(keys.iter().filter_map(|k| mapping.get(k).copied()).collect())
    }

    /// Requested names that have no identifier in the current mapping.
    pub async fn unresolved<'a>(&self, names: &'a TagNames) -> Vec<&'a str> {
        let mapping = self.snapshot().await;
        names
            .iter()
            .map(String::as_str)
            .filter(|n| !mapping.contains_key(&tag_key(n)))
            .collect()
    }

    /// Create every name in `unknown` that is still absent once its
    /// creation lock is held, then refresh once.
    async fn create_missing(&self, unknown: Vec<&str>) -> Result<(), TagCacheError> {
        // Sorted acquisition order; `unknown` comes from a BTreeSet.
        let mut guards: Vec<OwnedMutexGuard<()>> = Vec::with_capacity(unknown.len());
        for name in &unknown {
            let lock = {
                let mut creating = self.creating.lock().await;
                Arc::clone(creating.entry((*name).to_string()).or_default())
            };
            guards.push(lock.lock_owned().await);
        }

        let current = self.snapshot().await;
        let to_create: Vec<&str> = unknown
            .into_iter()
            .filter(|n| !current.contains_key(*n))
            .collect();

        if to_create.is_empty() {
            debug!("Tags created concurrently by another message");
            return Ok(());
        }

        join_all(to_create.iter().map(|name| self.create(name))).await;
        let result = self.refresh().await;
        drop(guards);
        result
    }
}

/// Lookup and creation key for a requested name. The backend compares
/// tag names case-insensitively and lower-cases slugs.
pub fn tag_key(name: &str) -> String {
    name.to_lowercase()
}

fn missing_keys<'a>(mapping: &TagMap, keys: &'a BTreeSet<String>) -> Vec<&'a str> {
    keys.iter()
        .map(String::as_str)
        .filter(|k| !mapping.contains_key(*k))
        .collect()
}
