//! Fixtures and in-memory fakes shared by the unit tests

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;

use fleet_common::crd::{
    ClientConfig, ClientConfigSpec, SecretReference, KUBECONFIG_SECRET_KEY,
};
use fleet_common::{Error, WatchScope};

use crate::connection::{ClusterFactory, ClusterRegistrar};
use crate::store::ConfigStore;

pub fn client_config(ns: &str, name: &str, context: Option<&str>, secret: &str) -> ClientConfig {
    let mut cc = ClientConfig::new(
        name,
        ClientConfigSpec {
            context_name: context.map(String::from),
            kube_config_secret: SecretReference {
                name: secret.to_string(),
            },
        },
    );
    cc.metadata.namespace = Some(ns.to_string());
    cc.metadata.generation = Some(1);
    cc
}

pub fn kubeconfig(server: &str) -> String {
    format!(
        r#"apiVersion: v1
kind: Config
current-context: default
clusters:
- name: default
  cluster:
    server: {server}
    insecure-skip-tls-verify: true
contexts:
- name: default
  context:
    cluster: default
    user: default
users:
- name: default
  user:
    token: test-token
"#
    )
}

pub fn multi_context_kubeconfig() -> String {
    r#"apiVersion: v1
kind: Config
current-context: east
clusters:
- name: east
  cluster:
    server: https://east.example:6443
    insecure-skip-tls-verify: true
- name: west
  cluster:
    server: https://west.example:6443
    insecure-skip-tls-verify: true
contexts:
- name: east
  context:
    cluster: east
    user: admin
- name: west
  context:
    cluster: west
    user: admin
users:
- name: admin
  user:
    token: test-token
"#
    .to_string()
}

pub fn kubeconfig_secret(ns: &str, name: &str, server: &str) -> Secret {
    let mut secret = Secret::default();
    secret.metadata.name = Some(name.to_string());
    secret.metadata.namespace = Some(ns.to_string());
    secret.data = Some(BTreeMap::from([(
        KUBECONFIG_SECRET_KEY.to_string(),
        ByteString(kubeconfig(server).into_bytes()),
    )]));
    secret
}

/// In-memory object store with failure injection
#[derive(Default)]
pub struct FakeStore {
    configs: Mutex<BTreeMap<(String, String), ClientConfig>>,
    secrets: Mutex<BTreeMap<(String, String), Secret>>,
    fail_updates: Mutex<HashSet<String>>,
    updates: AtomicUsize,
    version: AtomicUsize,
}

fn slot<K: kube::Resource>(obj: &K) -> (String, String) {
    (obj.namespace().unwrap_or_default(), obj.name_any())
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_config(&self, cc: ClientConfig) {
        self.configs.lock().unwrap().insert(slot(&cc), cc);
    }

    pub fn put_secret(&self, secret: Secret) {
        self.secrets.lock().unwrap().insert(slot(&secret), secret);
    }

    pub fn config(&self, ns: &str, name: &str) -> Option<ClientConfig> {
        self.configs
            .lock()
            .unwrap()
            .get(&(ns.to_string(), name.to_string()))
            .cloned()
    }

    pub fn delete_config(&self, ns: &str, name: &str) {
        self.configs
            .lock()
            .unwrap()
            .remove(&(ns.to_string(), name.to_string()));
    }

    pub fn delete_secret(&self, ns: &str, name: &str) {
        self.secrets
            .lock()
            .unwrap()
            .remove(&(ns.to_string(), name.to_string()));
    }

    /// Make updates of `ns/name` fail with a server error
    pub fn fail_update_of(&self, key: &str) {
        self.fail_updates.lock().unwrap().insert(key.to_string());
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Change a ClientConfig spec the way the API server would (generation bump)
    pub fn edit_spec(&self, ns: &str, name: &str, f: impl FnOnce(&mut ClientConfigSpec)) {
        let mut configs = self.configs.lock().unwrap();
        let cc = configs
            .get_mut(&(ns.to_string(), name.to_string()))
            .expect("config exists");
        f(&mut cc.spec);
        cc.metadata.generation = Some(cc.metadata.generation.unwrap_or(0) + 1);
    }

    pub fn rotate_secret(&self, ns: &str, name: &str, server: &str) {
        self.put_secret(kubeconfig_secret(ns, name, server));
    }
}

fn api_error(code: u16, message: &str) -> Error {
    Error::from(kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: "Injected".to_string(),
        code,
    }))
}

#[async_trait]
impl ConfigStore for FakeStore {
    async fn list_client_configs(&self, scope: &WatchScope) -> Result<Vec<ClientConfig>, Error> {
        Ok(self
            .configs
            .lock()
            .unwrap()
            .values()
            .filter(|cc| scope.contains(cc.namespace().as_deref().unwrap_or_default()))
            .cloned()
            .collect())
    }

    async fn get_client_config(
        &self,
        key: &ObjectRef<ClientConfig>,
    ) -> Result<Option<ClientConfig>, Error> {
        let slot = (key.namespace.clone().unwrap_or_default(), key.name.clone());
        Ok(self.configs.lock().unwrap().get(&slot).cloned())
    }

    async fn get_secret(&self, key: &ObjectRef<Secret>) -> Result<Option<Secret>, Error> {
        let slot = (key.namespace.clone().unwrap_or_default(), key.name.clone());
        Ok(self.secrets.lock().unwrap().get(&slot).cloned())
    }

    async fn update_client_config(&self, config: &ClientConfig) -> Result<ClientConfig, Error> {
        if self.fail_updates.lock().unwrap().contains(&config.key()) {
            return Err(api_error(500, "injected update failure"));
        }
        let mut configs = self.configs.lock().unwrap();
        let slot = slot(config);
        let current = configs
            .get(&slot)
            .ok_or_else(|| api_error(404, "not found"))?;
        if current.metadata.resource_version != config.metadata.resource_version {
            return Err(api_error(409, "conflict"));
        }
        let mut stored = config.clone();
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        stored.metadata.resource_version = Some(version.to_string());
        configs.insert(slot, stored.clone());
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }
}

/// Handle produced by [`FakeFactory`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FakeCluster {
    pub identity: String,
    pub host: String,
}

/// Factory recording what it built, optionally failing for one identity
#[derive(Default)]
pub struct FakeFactory {
    pub built: Mutex<Vec<String>>,
    pub fail_for: Option<String>,
}

impl FakeFactory {
    pub fn failing_for(identity: &str) -> Self {
        Self {
            fail_for: Some(identity.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ClusterFactory for FakeFactory {
    type Cluster = FakeCluster;

    async fn build(
        &self,
        identity: &str,
        params: kube::Config,
        _scope: &WatchScope,
    ) -> Result<FakeCluster, Error> {
        if self.fail_for.as_deref() == Some(identity) {
            return Err(Error::connection(identity, "injected factory failure"));
        }
        self.built.lock().unwrap().push(identity.to_string());
        Ok(FakeCluster {
            identity: identity.to_string(),
            host: params.cluster_url.host().unwrap_or_default().to_string(),
        })
    }
}

/// Registrar recording registrations, optionally failing for one identity
#[derive(Default)]
pub struct FakeRegistrar {
    pub registered: Mutex<Vec<String>>,
    pub fail_for: Option<String>,
}

impl FakeRegistrar {
    pub fn failing_for(identity: &str) -> Self {
        Self {
            fail_for: Some(identity.to_string()),
            ..Default::default()
        }
    }

    pub fn registered(&self) -> Vec<String> {
        self.registered.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClusterRegistrar<FakeCluster> for FakeRegistrar {
    async fn register(&self, identity: &str, _cluster: &FakeCluster) -> Result<(), Error> {
        if self.fail_for.as_deref() == Some(identity) {
            return Err(Error::connection(identity, "injected registration failure"));
        }
        self.registered.lock().unwrap().push(identity.to_string());
        Ok(())
    }
}
