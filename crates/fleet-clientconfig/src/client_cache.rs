//! Registry of remote cluster handles keyed by cluster identity
//!
//! The cache is filled once through [`ClientCacheBuilder`] during bootstrap and
//! then frozen. A frozen [`ClientCache`] has no mutating methods, so it can be
//! shared behind an `Arc` and read from any number of workers without locks.

use std::collections::BTreeMap;

use tracing::debug;

use fleet_common::Error;

struct Entry<C> {
    cluster: C,
    source: String,
}

/// Collects cluster handles during bootstrap
pub struct ClientCacheBuilder<C> {
    entries: BTreeMap<String, Entry<C>>,
}

impl<C> Default for ClientCacheBuilder<C> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<C> ClientCacheBuilder<C> {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle inserted for `identity`
    pub fn get(&self, identity: &str) -> Option<&C> {
        self.entries.get(identity).map(|e| &e.cluster)
    }

    /// Register `cluster` under `identity`
    ///
    /// `source` is the `namespace/name` of the ClientConfig that produced the
    /// handle. A second insert for the same identity is rejected and the
    /// existing entry is kept.
    pub fn insert(
        &mut self,
        identity: impl Into<String>,
        source: impl Into<String>,
        cluster: C,
    ) -> Result<(), Error> {
        let identity = identity.into();
        let source = source.into();
        if let Some(existing) = self.entries.get(&identity) {
            debug!(
                cluster = %identity,
                registered_by = %existing.source,
                rejected = %source,
                "Cluster identity already registered"
            );
            return Err(Error::duplicate_cluster(identity, source));
        }
        self.entries.insert(identity, Entry { cluster, source });
        Ok(())
    }

    /// Freeze the registry
    pub fn build(self) -> ClientCache<C> {
        ClientCache {
            entries: self.entries,
        }
    }
}

/// Frozen registry of remote cluster handles
pub struct ClientCache<C> {
    entries: BTreeMap<String, Entry<C>>,
}

impl<C> ClientCache<C> {
    /// Handle registered for `identity`
    pub fn get(&self, identity: &str) -> Option<&C> {
        self.entries.get(identity).map(|e| &e.cluster)
    }

    /// Handle registered for `identity`, or [`Error::UnknownCluster`]
    pub fn remote(&self, identity: &str) -> Result<&C, Error> {
        self.get(identity)
            .ok_or_else(|| Error::unknown_cluster(identity))
    }

    /// `namespace/name` of the ClientConfig that registered `identity`
    pub fn source(&self, identity: &str) -> Option<&str> {
        self.entries.get(identity).map(|e| e.source.as_str())
    }

    /// Registered identities in sorted order
    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// `(identity, handle)` pairs in identity order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &C)> {
        self.entries.iter().map(|(k, e)| (k.as_str(), &e.cluster))
    }

    /// Number of registered clusters
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no cluster is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<C> std::fmt::Debug for ClientCache<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, e)| (k, &e.source)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup() {
        let mut builder = ClientCacheBuilder::new();
        builder.insert("east", "fleet/east", 1u32).unwrap();
        builder.insert("west", "fleet/west", 2u32).unwrap();
        let cache = builder.build();

        assert_eq!(cache.get("east"), Some(&1));
        assert_eq!(cache.get("west"), Some(&2));
        assert_eq!(cache.get("north"), None);
        assert_eq!(cache.source("east"), Some("fleet/east"));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.identities().collect::<Vec<_>>(), vec!["east", "west"]);
    }

    /// Story: two ClientConfigs claiming the same context
    ///
    /// The second registration is an authoring error. It must surface with the
    /// offending ClientConfig and must not replace the first handle.
    #[test]
    fn story_duplicate_identity_is_rejected() {
        let mut builder = ClientCacheBuilder::new();
        builder.insert("prod", "fleet/prod", "first").unwrap();

        let err = builder
            .insert("prod", "fleet/prod-copy", "second")
            .unwrap_err();
        match &err {
            Error::DuplicateCluster { identity, object } => {
                assert_eq!(identity, "prod");
                assert_eq!(object, "fleet/prod-copy");
            }
            other => panic!("Expected DuplicateCluster, got {other:?}"),
        }

        let cache = builder.build();
        assert_eq!(cache.get("prod"), Some(&"first"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn remote_surfaces_unknown_identity() {
        let cache: ClientCache<u8> = ClientCacheBuilder::new().build();
        assert!(cache.is_empty());
        let err = cache.remote("ghost").unwrap_err();
        assert!(matches!(err, Error::UnknownCluster { ref identity } if identity == "ghost"));
    }

    #[test]
    fn frozen_cache_is_shared_across_threads() {
        let mut builder = ClientCacheBuilder::new();
        builder.insert("east", "fleet/east", String::from("handle")).unwrap();
        let cache = std::sync::Arc::new(builder.build());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || cache.get("east").cloned())
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap().as_deref(), Some("handle"));
        }
    }
}
