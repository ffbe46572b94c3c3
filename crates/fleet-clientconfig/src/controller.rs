//! Drift detection for bootstrapped ClientConfigs
//!
//! The controller never repairs anything. It recomputes the fingerprints of a
//! ClientConfig and its Secret and compares them with the markers committed at
//! bootstrap. Any difference, any missing marker and any deleted object means
//! the running topology is stale, and the only remedy is a restart.

use std::fmt;
use std::sync::Arc;

use kube::runtime::reflector::ObjectRef;
use tracing::{debug, info, instrument, warn};

use fleet_common::crd::ClientConfig;
use fleet_common::fingerprint::{config_fingerprint, secret_fingerprint};
use fleet_common::kube_utils::namespaced_name;
use fleet_common::{metrics, Error};

use crate::shutdown::ShutdownSignal;
use crate::store::ConfigStore;

/// Why the running topology no longer matches the cluster state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriftReason {
    /// The ClientConfig was deleted
    ConfigDeleted,
    /// The ClientConfig lacks one or both fingerprint markers, so it was never bootstrapped
    MarkersMissing,
    /// The referenced Secret is gone (or the reference no longer resolves)
    SecretMissing,
    /// A recomputed fingerprint differs from its committed marker
    FingerprintMismatch {
        /// The ClientConfig spec changed
        config_changed: bool,
        /// The Secret data changed
        secret_changed: bool,
    },
}

impl DriftReason {
    /// Metric label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigDeleted => "config_deleted",
            Self::MarkersMissing => "markers_missing",
            Self::SecretMissing => "secret_missing",
            Self::FingerprintMismatch { .. } => "fingerprint_mismatch",
        }
    }
}

impl fmt::Display for DriftReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigDeleted => write!(f, "client config deleted"),
            Self::MarkersMissing => write!(f, "client config was never bootstrapped"),
            Self::SecretMissing => write!(f, "kubeconfig secret missing"),
            Self::FingerprintMismatch {
                config_changed,
                secret_changed,
            } => match (config_changed, secret_changed) {
                (true, true) => write!(f, "client config and kubeconfig secret changed"),
                (true, false) => write!(f, "client config changed"),
                _ => write!(f, "kubeconfig secret changed"),
            },
        }
    }
}

/// Outcome of one reconcile
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Committed markers match the current state
    Stable,
    /// The topology is stale and a restart was requested
    Drift(DriftReason),
}

/// Shared state for reconciles
pub struct ReconcileContext {
    /// Object access
    pub store: Arc<dyn ConfigStore>,
    /// Restart request shared with the run loop
    pub shutdown: ShutdownSignal,
}

impl ReconcileContext {
    /// Create a context
    pub fn new(store: Arc<dyn ConfigStore>, shutdown: ShutdownSignal) -> Self {
        Self { store, shutdown }
    }
}

/// Reconcile one ClientConfig
///
/// On drift the shutdown signal is requested and `Verdict::Drift` is
/// returned. Errors are fetch failures and are left to the caller to retry.
#[instrument(skip_all, fields(client_config = %namespaced_name(&key)))]
pub async fn reconcile(
    key: ObjectRef<ClientConfig>,
    ctx: Arc<ReconcileContext>,
) -> Result<Verdict, Error> {
    let verdict = evaluate(&key, ctx.store.as_ref()).await?;
    match verdict {
        Verdict::Stable => debug!("ClientConfig unchanged since bootstrap"),
        Verdict::Drift(reason) => {
            request_restart(&ctx.shutdown, &key, reason);
        }
    }
    Ok(verdict)
}

/// Request a restart for `reason`, counting the drift only if this request won
fn request_restart(
    shutdown: &ShutdownSignal,
    key: &ObjectRef<ClientConfig>,
    reason: DriftReason,
) -> bool {
    let first = shutdown.request(format!("{}: {}", namespaced_name(key), reason));
    if first {
        info!(reason = %reason, "Drift detected, restart required");
        metrics::record_drift(reason.as_str());
    } else {
        debug!(reason = %reason, "Drift detected, restart already requested");
    }
    first
}

async fn evaluate(key: &ObjectRef<ClientConfig>, store: &dyn ConfigStore) -> Result<Verdict, Error> {
    let Some(config) = store.get_client_config(key).await? else {
        return Ok(Verdict::Drift(DriftReason::ConfigDeleted));
    };

    let Some(markers) = config.fingerprint_markers() else {
        return Ok(Verdict::Drift(DriftReason::MarkersMissing));
    };

    let secret_ref = match config.secret_ref() {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "Secret reference no longer resolves");
            return Ok(Verdict::Drift(DriftReason::SecretMissing));
        }
    };
    let Some(secret) = store.get_secret(&secret_ref).await? else {
        return Ok(Verdict::Drift(DriftReason::SecretMissing));
    };

    let config_changed = config_fingerprint(&config.spec)? != markers.config;
    let secret_changed = secret_fingerprint(&secret) != markers.secret;
    if config_changed || secret_changed {
        return Ok(Verdict::Drift(DriftReason::FingerprintMismatch {
            config_changed,
            secret_changed,
        }));
    }

    Ok(Verdict::Stable)
}
