//! Watch plumbing that feeds the drift controller
//!
//! ClientConfig events pass a generation filter so status and metadata churn
//! never triggers a reconcile. Secret events are reduced to the ClientConfig
//! that depends on them through the [`SecretIndex`]; unrelated Secrets are
//! dropped. Triggers are reconciled by a bounded worker pool, and the whole
//! pipeline stops as soon as a restart has been requested.
//!
//! Each watcher (one per namespace, or one cluster-wide) is a separate source.
//! A source remembers the objects it reported, so when it relists after a
//! desync the objects it no longer returns are handled as deleted.
//!
//! The dispatcher can only be built from the `Arc<SecretIndex>` a successful
//! bootstrap returns, so no trigger is ever delivered before bootstrap is done.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Client, Resource};
use tracing::{debug, error, info, warn};

use fleet_common::crd::ClientConfig;
use fleet_common::kube_utils::{namespaced_name, WATCH_TIMEOUT_SECS};
use fleet_common::metrics::{self, ReconcileResult, ReconcileTimer};
use fleet_common::retry::{retry_with_backoff_when, RetryConfig};
use fleet_common::{Error, WatchScope};

use crate::controller::{reconcile, ReconcileContext, Verdict};
use crate::secret_index::SecretIndex;
use crate::shutdown::ShutdownSignal;
use crate::store::ConfigStore;

/// Default number of reconciles running at once
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Position of a watcher in the list handed to the dispatcher
pub type SourceId = usize;

type WatchItem<K> = Result<Event<K>, watcher::Error>;

/// Boxed watch event stream
pub type WatchStream<K> = BoxStream<'static, WatchItem<K>>;

enum Touch<K: Resource> {
    Applied { key: ObjectRef<K>, changed: bool },
    Gone(ObjectRef<K>),
}

/// Objects one watcher has reported and their last seen generation
struct WatchState<K: Resource> {
    live: HashMap<ObjectRef<K>, Option<i64>>,
    relisted: Option<HashSet<ObjectRef<K>>>,
}

impl<K: Resource> Default for WatchState<K> {
    fn default() -> Self {
        Self {
            live: HashMap::new(),
            relisted: None,
        }
    }
}

impl<K: Resource<DynamicType = ()>> WatchState<K> {
    fn observe(&mut self, event: Event<K>) -> Vec<Touch<K>> {
        match event {
            Event::Init => {
                self.relisted = Some(HashSet::new());
                Vec::new()
            }
            Event::Apply(obj) | Event::InitApply(obj) => {
                let key = ObjectRef::from_obj(&obj);
                if let Some(relisted) = self.relisted.as_mut() {
                    relisted.insert(key.clone());
                }
                let generation = obj.meta().generation;
                let changed = self.live.insert(key.clone(), generation) != Some(generation);
                vec![Touch::Applied { key, changed }]
            }
            Event::Delete(obj) => {
                let key = ObjectRef::from_obj(&obj);
                self.live.remove(&key);
                vec![Touch::Gone(key)]
            }
            Event::InitDone => {
                let Some(relisted) = self.relisted.take() else {
                    return Vec::new();
                };
                let vanished: Vec<_> = self
                    .live
                    .keys()
                    .filter(|key| !relisted.contains(*key))
                    .cloned()
                    .collect();
                for key in &vanished {
                    self.live.remove(key);
                }
                vanished.into_iter().map(Touch::Gone).collect()
            }
        }
    }
}

/// Admits ClientConfig events whose generation changed, plus deletions
#[derive(Default)]
pub struct GenerationFilter {
    sources: HashMap<SourceId, WatchState<ClientConfig>>,
}

impl GenerationFilter {
    /// ClientConfigs to reconcile for one event from watcher `source`
    pub fn handle(
        &mut self,
        source: SourceId,
        event: Event<ClientConfig>,
    ) -> Vec<ObjectRef<ClientConfig>> {
        self.sources
            .entry(source)
            .or_default()
            .observe(event)
            .into_iter()
            .filter_map(|touch| match touch {
                Touch::Applied { key, changed: true } | Touch::Gone(key) => Some(key),
                Touch::Applied { key, changed: false } => {
                    debug!(client_config = %namespaced_name(&key), "Generation unchanged, skipping");
                    None
                }
            })
            .collect()
    }
}

/// Maps Secret events to the ClientConfigs that depend on them
pub struct SecretTriggers {
    index: Arc<SecretIndex>,
    sources: HashMap<SourceId, WatchState<Secret>>,
}

impl SecretTriggers {
    /// Create a mapper over `index`
    pub fn new(index: Arc<SecretIndex>) -> Self {
        Self {
            index,
            sources: HashMap::new(),
        }
    }

    fn tracked(&self, event: &Event<Secret>) -> bool {
        match event {
            Event::Apply(s) | Event::InitApply(s) | Event::Delete(s) => {
                self.index.lookup(&ObjectRef::from_obj(s)).is_some()
            }
            Event::Init | Event::InitDone => true,
        }
    }

    /// ClientConfigs to reconcile for one event from watcher `source`
    pub fn handle(&mut self, source: SourceId, event: Event<Secret>) -> Vec<ObjectRef<ClientConfig>> {
        // Unrelated Secrets never enter the watch state
        if !self.tracked(&event) {
            return Vec::new();
        }
        let index = &self.index;
        self.sources
            .entry(source)
            .or_default()
            .observe(event)
            .into_iter()
            .filter_map(|touch| {
                let key = match touch {
                    Touch::Applied { key, .. } | Touch::Gone(key) => key,
                };
                index.lookup(&key).cloned()
            })
            .collect()
    }
}

enum Observed {
    Config(SourceId, WatchItem<ClientConfig>),
    Secret(SourceId, WatchItem<Secret>),
}

fn tagged<K: Send + 'static>(
    streams: Vec<WatchStream<K>>,
) -> impl Stream<Item = (SourceId, WatchItem<K>)> + Send {
    stream::select_all(
        streams
            .into_iter()
            .enumerate()
            .map(|(source, events)| events.map(move |item| (source, item))),
    )
}

/// Feeds watch events to the drift controller
pub struct Dispatcher {
    ctx: Arc<ReconcileContext>,
    index: Arc<SecretIndex>,
    concurrency: usize,
    retry: RetryConfig,
}

impl Dispatcher {
    /// Create a dispatcher over a bootstrapped secret index
    pub fn new(
        store: Arc<dyn ConfigStore>,
        secret_index: Arc<SecretIndex>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            ctx: Arc::new(ReconcileContext::new(store, shutdown)),
            index: secret_index,
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryConfig::infinite(),
        }
    }

    /// Set the number of reconciles running at once (at least one)
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the backoff used for retryable reconcile errors
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Watch ClientConfigs in `scope` and the Secrets they depend on
    ///
    /// Returns `Ok(())` once a restart has been requested.
    pub async fn run(self, client: Client, scope: &WatchScope) -> Result<(), Error> {
        let config = watcher::Config::default().timeout(WATCH_TIMEOUT_SECS);

        let config_apis: Vec<Api<ClientConfig>> = match scope {
            WatchScope::All => vec![Api::all(client.clone())],
            WatchScope::Namespaces(namespaces) => namespaces
                .iter()
                .map(|ns| Api::namespaced(client.clone(), ns))
                .collect(),
        };
        // Only namespaces holding a tracked Secret are watched
        let secret_namespaces = self.index.namespaces();
        let secret_apis: Vec<Api<Secret>> = secret_namespaces
            .iter()
            .map(|ns| Api::namespaced(client.clone(), ns))
            .collect();

        info!(
            scope = %scope,
            secret_namespaces = ?secret_namespaces,
            concurrency = self.concurrency,
            "Starting ClientConfig drift watch"
        );

        let configs = config_apis
            .into_iter()
            .map(|api| watch(api, config.clone()))
            .collect();
        let secrets = secret_apis
            .into_iter()
            .map(|api| watch(api, config.clone()))
            .collect();
        self.run_streams(configs, secrets).await
    }

    /// Dispatch from already opened event streams, one per watcher
    pub async fn run_streams(
        self,
        configs: Vec<WatchStream<ClientConfig>>,
        secrets: Vec<WatchStream<Secret>>,
    ) -> Result<(), Error> {
        let mut generations = GenerationFilter::default();
        let mut secret_triggers = SecretTriggers::new(self.index.clone());
        let shutdown = self.ctx.shutdown.clone();

        let triggers = stream::select(
            tagged(configs).map(|(source, item)| Observed::Config(source, item)),
            tagged(secrets).map(|(source, item)| Observed::Secret(source, item)),
        )
        .map(move |observed| match observed {
            Observed::Config(source, Ok(event)) => generations.handle(source, event),
            Observed::Secret(source, Ok(event)) => secret_triggers.handle(source, event),
            Observed::Config(_, Err(e)) => {
                warn!(error = %e, kind = "ClientConfig", "Watcher error, will retry");
                Vec::new()
            }
            Observed::Secret(_, Err(e)) => {
                warn!(error = %e, kind = "Secret", "Watcher error, will retry");
                Vec::new()
            }
        })
        .flat_map(stream::iter)
        .take_until(shutdown.token().cancelled_owned());

        let ctx = self.ctx.clone();
        let retry = self.retry.clone();
        triggers
            .for_each_concurrent(self.concurrency, |key| {
                let ctx = ctx.clone();
                let retry = retry.clone();
                async move { process(key, ctx, &retry).await }
            })
            .await;

        if shutdown.is_requested() {
            info!(
                reason = %shutdown.reason().unwrap_or_default(),
                "Drift watch stopped"
            );
            Ok(())
        } else {
            Err(Error::internal_with_context(
                "dispatcher",
                "watch streams ended unexpectedly",
            ))
        }
    }
}

fn watch<K>(api: Api<K>, config: watcher::Config) -> WatchStream<K>
where
    K: Resource<DynamicType = ()>
        + Clone
        + serde::de::DeserializeOwned
        + std::fmt::Debug
        + Send
        + 'static,
{
    watcher::watcher(api, config).default_backoff().boxed()
}

async fn process(key: ObjectRef<ClientConfig>, ctx: Arc<ReconcileContext>, retry: &RetryConfig) {
    let shutdown = ctx.shutdown.clone();
    if shutdown.is_requested() {
        return;
    }

    let timer = ReconcileTimer::start();
    let attempt = retry_with_backoff_when(
        retry,
        "reconcile_client_config",
        |e: &Error| e.is_retryable() && !shutdown.is_requested(),
        || reconcile(key.clone(), ctx.clone()),
    );

    let result = tokio::select! {
        biased;
        result = attempt => result,
        _ = shutdown.requested() => {
            debug!(client_config = %namespaced_name(&key), "Shutdown requested, abandoning reconcile");
            return;
        }
    };
    log_reconcile_result(&key, result, timer);
}

fn log_reconcile_result(
    key: &ObjectRef<ClientConfig>,
    result: Result<Verdict, Error>,
    timer: ReconcileTimer,
) {
    match result {
        Ok(Verdict::Stable) => timer.finish(ReconcileResult::Stable),
        Ok(Verdict::Drift(_)) => timer.finish(ReconcileResult::Drift),
        Err(e) => {
            let retryable = e.is_retryable();
            metrics::record_reconcile_error(retryable);
            error!(
                client_config = %namespaced_name(key),
                error = %e,
                retryable,
                "ClientConfig reconcile failed"
            );
            timer.finish(ReconcileResult::Error);
        }
    }
}
