//! Kubernetes helpers shared across fleet crates

use std::time::Duration;

use kube::runtime::reflector::ObjectRef;
use kube::Resource;

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
///
/// Forces the API server to close idle watches before the client times out,
/// preventing "body read timed out" errors.
pub const WATCH_TIMEOUT_SECS: u32 = 25;

/// Render an object reference as `namespace/name` (or `name` when cluster-scoped)
pub fn namespaced_name<K>(obj: &ObjectRef<K>) -> String
where
    K: Resource,
    K::DynamicType: Eq + std::hash::Hash + Clone,
{
    match obj.namespace.as_deref() {
        Some(ns) => format!("{}/{}", ns, obj.name),
        None => obj.name.clone(),
    }
}
