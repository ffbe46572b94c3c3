//! Registration of bootstrapped remote clusters

use async_trait::async_trait;
use tracing::info;

use fleet_clientconfig::{ClusterRegistrar, RemoteCluster};
use fleet_common::Error;

/// Confirms each remote API server answers before the cluster is considered live
#[derive(Clone, Copy, Debug, Default)]
pub struct ConnectivityRegistrar;

#[async_trait]
impl ClusterRegistrar<RemoteCluster> for ConnectivityRegistrar {
    async fn register(&self, identity: &str, cluster: &RemoteCluster) -> Result<(), Error> {
        let version = cluster.client.apiserver_version().await.map_err(|e| {
            Error::connection(
                identity,
                format!("API server {} unreachable: {e}", cluster.params.cluster_url),
            )
        })?;
        info!(
            cluster = %identity,
            url = %cluster.params.cluster_url,
            version = %version.git_version,
            scope = %cluster.scope,
            "Registered remote cluster"
        );
        Ok(())
    }
}
