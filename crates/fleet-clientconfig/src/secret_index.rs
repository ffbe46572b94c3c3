//! Reverse index from kubeconfig Secrets to the ClientConfigs that use them
//!
//! Secret watch events carry no back-reference to the ClientConfig that
//! depends on them. The index answers that question. It is built once at the
//! end of a successful bootstrap and published as an immutable value.

use std::collections::{BTreeSet, HashMap};

use k8s_openapi::api::core::v1::Secret;
use kube::runtime::reflector::ObjectRef;
use tracing::warn;

use fleet_common::crd::ClientConfig;
use fleet_common::kube_utils::namespaced_name;

/// Collects Secret → ClientConfig edges during bootstrap
#[derive(Default)]
pub struct SecretIndexBuilder {
    entries: HashMap<ObjectRef<Secret>, ObjectRef<ClientConfig>>,
}

impl SecretIndexBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `config` depends on `secret`
    ///
    /// One Secret maps to one ClientConfig. When a Secret is shared the last
    /// insert wins, and the replaced dependent no longer reacts to changes of
    /// that Secret.
    pub fn insert(&mut self, secret: ObjectRef<Secret>, config: ObjectRef<ClientConfig>) {
        if let Some(previous) = self.entries.get(&secret) {
            if previous != &config {
                warn!(
                    secret = %namespaced_name(&secret),
                    previous = %namespaced_name(previous),
                    client_config = %namespaced_name(&config),
                    "Secret is shared by several ClientConfigs; only the last one is tracked"
                );
            }
        }
        self.entries.insert(secret, config);
    }

    /// Freeze the index
    pub fn build(self) -> SecretIndex {
        SecretIndex {
            entries: self.entries,
        }
    }
}

/// Immutable Secret → ClientConfig index
#[derive(Debug, Default)]
pub struct SecretIndex {
    entries: HashMap<ObjectRef<Secret>, ObjectRef<ClientConfig>>,
}

impl SecretIndex {
    /// ClientConfig depending on `secret`, if any
    pub fn lookup(&self, secret: &ObjectRef<Secret>) -> Option<&ObjectRef<ClientConfig>> {
        self.entries.get(secret)
    }

    /// Namespaces holding at least one indexed Secret
    pub fn namespaces(&self) -> BTreeSet<String> {
        self.entries
            .keys()
            .filter_map(|s| s.namespace.clone())
            .collect()
    }

    /// Number of indexed Secrets
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is indexed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
