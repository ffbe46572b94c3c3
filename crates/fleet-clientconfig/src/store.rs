//! Object access for ClientConfigs and their Secrets
//!
//! [`ConfigStore`] is the only way bootstrap and the drift controller talk to
//! the API server, which keeps both testable without a cluster.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, ListParams, PostParams};
use kube::runtime::reflector::ObjectRef;
use kube::{Client, Resource};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use fleet_common::crd::ClientConfig;
use fleet_common::kube_utils::namespaced_name;
use fleet_common::{Error, WatchScope};

/// Trait abstracting Kubernetes object access for ClientConfigs
///
/// Not-found is reported as `Ok(None)` so callers can tell it apart from
/// transport or authorization failures.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// List every ClientConfig in scope
    async fn list_client_configs(&self, scope: &WatchScope) -> Result<Vec<ClientConfig>, Error>;

    /// Fetch one ClientConfig
    async fn get_client_config(
        &self,
        key: &ObjectRef<ClientConfig>,
    ) -> Result<Option<ClientConfig>, Error>;

    /// Fetch one Secret
    async fn get_secret(&self, key: &ObjectRef<Secret>) -> Result<Option<Secret>, Error>;

    /// Persist a modified ClientConfig
    ///
    /// Uses the object's resourceVersion, so a concurrent writer makes this
    /// fail with a conflict instead of being overwritten.
    async fn update_client_config(&self, config: &ClientConfig) -> Result<ClientConfig, Error>;
}

/// [`ConfigStore`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeConfigStore {
    client: Client,
}

impl KubeConfigStore {
    /// Create a store using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaced<K>(&self, key: &ObjectRef<K>) -> Result<Api<K>, Error>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>,
    {
        let namespace = key.namespace.as_deref().ok_or_else(|| {
            Error::internal_with_context(
                "store",
                format!("{} reference {} has no namespace", K::kind(&()), key.name),
            )
        })?;
        Ok(Api::namespaced(self.client.clone(), namespace))
    }
}

#[async_trait]
impl ConfigStore for KubeConfigStore {
    async fn list_client_configs(&self, scope: &WatchScope) -> Result<Vec<ClientConfig>, Error> {
        let params = ListParams::default();
        match scope {
            WatchScope::All => {
                let api: Api<ClientConfig> = Api::all(self.client.clone());
                Ok(api.list(&params).await?.items)
            }
            WatchScope::Namespaces(namespaces) => {
                let mut configs = Vec::new();
                for ns in namespaces {
                    let api: Api<ClientConfig> = Api::namespaced(self.client.clone(), ns);
                    let list = api.list(&params).await?;
                    debug!(namespace = %ns, count = list.items.len(), "Listed ClientConfigs");
                    configs.extend(list.items);
                }
                Ok(configs)
            }
        }
    }

    async fn get_client_config(
        &self,
        key: &ObjectRef<ClientConfig>,
    ) -> Result<Option<ClientConfig>, Error> {
        Ok(self.namespaced(key)?.get_opt(&key.name).await?)
    }

    async fn get_secret(&self, key: &ObjectRef<Secret>) -> Result<Option<Secret>, Error> {
        Ok(self.namespaced(key)?.get_opt(&key.name).await?)
    }

    async fn update_client_config(&self, config: &ClientConfig) -> Result<ClientConfig, Error> {
        let key = ObjectRef::from_obj(config);
        let api = self.namespaced(&key)?;
        let updated = api
            .replace(&key.name, &PostParams::default(), config)
            .await?;
        debug!(
            client_config = %namespaced_name(&key),
            resource_version = ?updated.metadata.resource_version,
            "Updated ClientConfig"
        );
        Ok(updated)
    }
}
