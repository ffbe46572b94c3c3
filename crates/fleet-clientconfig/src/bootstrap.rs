//! One-shot construction of the multi-cluster topology
//!
//! Runs once at process start, before any watch is opened. For every
//! ClientConfig in scope it commits fingerprint markers, builds the remote
//! cluster handle and registers it. Any failure aborts the whole bootstrap:
//! a process that cannot build its full topology must not start serving.

use std::sync::Arc;

use kube::runtime::reflector::ObjectRef;
use tracing::{debug, info, instrument};

use fleet_common::crd::{ClientConfig, FingerprintMarkers};
use fleet_common::fingerprint::{config_fingerprint, secret_fingerprint};
use fleet_common::kube_utils::namespaced_name;
use fleet_common::{metrics, Error, WatchScope};

use crate::client_cache::{ClientCache, ClientCacheBuilder};
use crate::connection::{connection_params, ClusterFactory, ClusterRegistrar};
use crate::secret_index::{SecretIndex, SecretIndexBuilder};
use crate::store::ConfigStore;

/// Result of a successful bootstrap
pub struct Topology<C> {
    /// Every constructed cluster handle, keyed by identity
    pub cache: Arc<ClientCache<C>>,
    /// Secret → ClientConfig index for the drift dispatcher
    pub secret_index: Arc<SecretIndex>,
}

impl<C> Topology<C> {
    /// Constructed cluster handles in identity order
    pub fn clusters(&self) -> impl Iterator<Item = &C> {
        self.cache.iter().map(|(_, cluster)| cluster)
    }
}

/// Build the topology from every ClientConfig in `scope`
#[instrument(skip_all, fields(scope = %scope))]
pub async fn bootstrap<F, R>(
    store: &dyn ConfigStore,
    factory: &F,
    registrar: &R,
    scope: &WatchScope,
) -> Result<Topology<F::Cluster>, Error>
where
    F: ClusterFactory,
    R: ClusterRegistrar<F::Cluster> + ?Sized,
{
    let configs = store.list_client_configs(scope).await?;
    info!(count = configs.len(), "Bootstrapping remote clusters");

    let mut cache = ClientCacheBuilder::new();
    let mut index = SecretIndexBuilder::new();

    for config in configs {
        let (secret, owner) = initialize(store, factory, registrar, scope, config, &mut cache).await?;
        index.insert(secret, owner);
    }

    let cache = cache.build();
    metrics::set_remote_clusters(cache.len());
    info!(
        clusters = cache.len(),
        identities = ?cache.identities().collect::<Vec<_>>(),
        "Bootstrap complete"
    );

    Ok(Topology {
        cache: Arc::new(cache),
        secret_index: Arc::new(index.build()),
    })
}

type SecretEdge = (
    ObjectRef<k8s_openapi::api::core::v1::Secret>,
    ObjectRef<ClientConfig>,
);

async fn initialize<F, R>(
    store: &dyn ConfigStore,
    factory: &F,
    registrar: &R,
    scope: &WatchScope,
    mut config: ClientConfig,
    cache: &mut ClientCacheBuilder<F::Cluster>,
) -> Result<SecretEdge, Error>
where
    F: ClusterFactory,
    R: ClusterRegistrar<F::Cluster> + ?Sized,
{
    let key = config.key();
    let identity = config.context_name();

    let secret_ref = config.secret_ref()?;
    let secret = store
        .get_secret(&secret_ref)
        .await?
        .ok_or_else(|| Error::missing_secret(&key, namespaced_name(&secret_ref)))?;

    let markers = FingerprintMarkers {
        config: config_fingerprint(&config.spec)?,
        secret: secret_fingerprint(&secret),
    };

    // Markers must be durable before the cluster is handed out
    if config.fingerprint_markers().as_ref() == Some(&markers) {
        debug!(client_config = %key, "Fingerprint markers already current");
    } else {
        config.set_fingerprint_markers(&markers);
        config = store.update_client_config(&config).await?;
        info!(client_config = %key, cluster = %identity, "Committed fingerprint markers");
    }

    let params = connection_params(&config, &secret).await?;
    let cluster = factory.build(&identity, params, scope).await?;
    cache.insert(identity.as_str(), key.as_str(), cluster)?;

    let edge = (secret_ref, ObjectRef::from_obj(&config));

    let cluster = cache
        .get(&identity)
        .ok_or_else(|| Error::internal_with_context("bootstrap", "cluster vanished from cache"))?;
    registrar.register(&identity, cluster).await?;
    debug!(client_config = %key, cluster = %identity, "Remote cluster initialized");

    Ok(edge)
}
