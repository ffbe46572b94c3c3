//! Multi-cluster client bootstrap and drift detection
//!
//! At startup [`bootstrap`] reads every ClientConfig in scope, commits
//! fingerprint markers, and builds one remote cluster handle per config. The
//! resulting topology is immutable. Afterwards the [`Dispatcher`] watches
//! ClientConfigs and their kubeconfig Secrets, and [`reconcile`] compares the
//! live objects against the committed markers. On any drift the shared
//! [`ShutdownSignal`] fires and the process restarts to rebuild its topology.

#![deny(missing_docs)]

pub mod bootstrap;
pub mod client_cache;
pub mod connection;
pub mod controller;
pub mod dispatcher;
pub mod secret_index;
pub mod shutdown;
pub mod store;

#[cfg(test)]
mod testing;

pub use bootstrap::{bootstrap, Topology};
pub use client_cache::{ClientCache, ClientCacheBuilder};
pub use connection::{
    connection_params, ClusterFactory, ClusterRegistrar, KubeClusterFactory, RemoteCluster,
};
pub use controller::{reconcile, DriftReason, ReconcileContext, Verdict};
pub use dispatcher::{
    Dispatcher, GenerationFilter, SecretTriggers, SourceId, WatchStream, DEFAULT_CONCURRENCY,
};
pub use secret_index::{SecretIndex, SecretIndexBuilder};
pub use shutdown::ShutdownSignal;
pub use store::{ConfigStore, KubeConfigStore};
