//! Turning kubeconfig Secrets into remote cluster handles
//!
//! [`connection_params`] derives a `kube::Config` from the `kubeconfig` key of
//! a Secret. [`ClusterFactory`] builds a handle from that config, and
//! [`ClusterRegistrar`] hands the finished handle to whatever schedules work on
//! remote clusters. Both are traits so bootstrap can run against fakes.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Resource};
use tracing::debug;

use fleet_common::crd::{ClientConfig, KUBECONFIG_SECRET_KEY};
use fleet_common::kube_utils::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT};
use fleet_common::{Error, WatchScope};

/// Derive connection parameters for `config` from its kubeconfig Secret
///
/// When the kubeconfig has a context named like the ClientConfig's identity,
/// that context is used. Otherwise the kubeconfig's current-context applies.
pub async fn connection_params(
    config: &ClientConfig,
    secret: &Secret,
) -> Result<kube::Config, Error> {
    let object = config.key();
    let raw = secret
        .data
        .as_ref()
        .and_then(|data| data.get(KUBECONFIG_SECRET_KEY))
        .ok_or_else(|| {
            Error::credentials(
                &object,
                format!("secret has no '{KUBECONFIG_SECRET_KEY}' key"),
            )
        })?;
    let text = std::str::from_utf8(&raw.0)
        .map_err(|e| Error::credentials(&object, format!("kubeconfig is not UTF-8: {e}")))?;
    let kubeconfig = Kubeconfig::from_yaml(text)
        .map_err(|e| Error::credentials(&object, format!("invalid kubeconfig: {e}")))?;

    let identity = config.context_name();
    let options = if kubeconfig.contexts.iter().any(|c| c.name == identity) {
        KubeConfigOptions {
            context: Some(identity.clone()),
            ..Default::default()
        }
    } else {
        KubeConfigOptions::default()
    };
    debug!(
        client_config = %object,
        cluster = %identity,
        context = ?options.context,
        "Resolved kubeconfig context"
    );

    let mut params = kube::Config::from_custom_kubeconfig(kubeconfig, &options)
        .await
        .map_err(|e| Error::credentials(&object, format!("unusable kubeconfig: {e}")))?;
    params.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    params.read_timeout = Some(DEFAULT_READ_TIMEOUT);
    Ok(params)
}

/// Builds a cluster handle from connection parameters
#[async_trait]
pub trait ClusterFactory: Send + Sync {
    /// Handle type produced for each remote cluster
    type Cluster: Send + Sync + 'static;

    /// Construct the handle for `identity`
    async fn build(
        &self,
        identity: &str,
        params: kube::Config,
        scope: &WatchScope,
    ) -> Result<Self::Cluster, Error>;
}

/// Hands a constructed cluster to the component that manages remote work
#[async_trait]
pub trait ClusterRegistrar<C>: Send + Sync {
    /// Register `cluster` under `identity`
    async fn register(&self, identity: &str, cluster: &C) -> Result<(), Error>;
}

/// Live connection to a remote cluster
#[derive(Clone)]
pub struct RemoteCluster {
    /// Cluster identity (context name)
    pub identity: String,
    /// Parameters the client was built from
    pub params: kube::Config,
    /// Client for the remote API server
    pub client: Client,
    /// Namespaces the cluster may be accessed in
    pub scope: WatchScope,
}

impl RemoteCluster {
    /// Namespaced API on the remote cluster, restricted to the watch scope
    pub fn namespaced_api<K>(&self, namespace: &str) -> Result<Api<K>, Error>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        if !self.scope.contains(namespace) {
            return Err(Error::validation_for(
                &self.identity,
                format!("namespace {namespace} is outside the watch scope ({})", self.scope),
            ));
        }
        Ok(Api::namespaced(self.client.clone(), namespace))
    }
}

impl std::fmt::Debug for RemoteCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCluster")
            .field("identity", &self.identity)
            .field("cluster_url", &self.params.cluster_url)
            .field("scope", &self.scope)
            .finish()
    }
}

/// [`ClusterFactory`] producing kube clients
#[derive(Clone, Copy, Debug, Default)]
pub struct KubeClusterFactory;

#[async_trait]
impl ClusterFactory for KubeClusterFactory {
    type Cluster = RemoteCluster;

    async fn build(
        &self,
        identity: &str,
        params: kube::Config,
        scope: &WatchScope,
    ) -> Result<RemoteCluster, Error> {
        let client = Client::try_from(params.clone())
            .map_err(|e| Error::connection(identity, format!("failed to build client: {e}")))?;
        debug!(cluster = %identity, url = %params.cluster_url, "Built remote cluster client");
        Ok(RemoteCluster {
            identity: identity.to_string(),
            params,
            client,
            scope: scope.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{client_config, kubeconfig_secret, multi_context_kubeconfig};
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn params_use_current_context_by_default() {
        let cfg = client_config("fleet", "east", None, "east-kc");
        let secret = kubeconfig_secret("fleet", "east-kc", "https://east.example:6443");

        let params = connection_params(&cfg, &secret).await.unwrap();
        assert_eq!(params.cluster_url.host(), Some("east.example"));
        assert_eq!(params.connect_timeout, Some(DEFAULT_CONNECT_TIMEOUT));
        assert_eq!(params.read_timeout, Some(DEFAULT_READ_TIMEOUT));
    }

    #[tokio::test]
    async fn params_select_context_matching_identity() {
        let cfg = client_config("fleet", "pair", Some("west"), "pair-kc");
        let mut secret = Secret::default();
        secret.data = Some(BTreeMap::from([(
            KUBECONFIG_SECRET_KEY.to_string(),
            ByteString(multi_context_kubeconfig().into_bytes()),
        )]));

        let params = connection_params(&cfg, &secret).await.unwrap();
        assert_eq!(params.cluster_url.host(), Some("west.example"));
    }

    #[tokio::test]
    async fn unknown_context_name_falls_back_to_current_context() {
        let cfg = client_config("fleet", "pair", Some("south"), "pair-kc");
        let mut secret = Secret::default();
        secret.data = Some(BTreeMap::from([(
            KUBECONFIG_SECRET_KEY.to_string(),
            ByteString(multi_context_kubeconfig().into_bytes()),
        )]));

        let params = connection_params(&cfg, &secret).await.unwrap();
        assert_eq!(params.cluster_url.host(), Some("east.example"));
    }

    #[tokio::test]
    async fn missing_kubeconfig_key_is_a_credentials_error() {
        let cfg = client_config("fleet", "east", None, "east-kc");
        let mut secret = Secret::default();
        secret.data = Some(BTreeMap::from([(
            "token".to_string(),
            ByteString(b"abc".to_vec()),
        )]));

        let err = connection_params(&cfg, &secret).await.unwrap_err();
        assert!(matches!(err, Error::Credentials { .. }));
        assert_eq!(err.object(), Some("fleet/east"));
        assert!(!err.is_retryable());

        let empty = Secret::default();
        assert!(connection_params(&cfg, &empty).await.is_err());
    }

    #[tokio::test]
    async fn garbage_kubeconfig_is_a_credentials_error() {
        let cfg = client_config("fleet", "east", None, "east-kc");
        let mut secret = Secret::default();
        secret.data = Some(BTreeMap::from([(
            KUBECONFIG_SECRET_KEY.to_string(),
            ByteString(b"clusters: [[[".to_vec()),
        )]));

        let err = connection_params(&cfg, &secret).await.unwrap_err();
        assert!(err.to_string().contains("fleet/east"));
    }

    #[tokio::test]
    async fn remote_apis_are_limited_to_the_watch_scope() {
        let scope = WatchScope::Namespaces(vec!["fleet".to_string()]);
        let params = kube::Config::new("https://east.example:6443".parse().unwrap());
        let cluster = KubeClusterFactory
            .build("east", params, &scope)
            .await
            .unwrap();

        assert!(cluster.namespaced_api::<Secret>("fleet").is_ok());
        let err = cluster
            .namespaced_api::<Secret>("kube-system")
            .err()
            .expect("namespace outside scope");
        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(err.object(), Some("east"));
    }
}
