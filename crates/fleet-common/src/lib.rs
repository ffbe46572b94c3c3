//! Common types for the fleet operator: the ClientConfig CRD, errors,
//! fingerprints and telemetry

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod fingerprint;
pub mod kube_utils;
pub mod metrics;
pub mod retry;
pub mod scope;
pub mod telemetry;

pub use error::Error;
pub use scope::WatchScope;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Environment variable holding the comma-separated namespaces to watch
pub const WATCH_NAMESPACE_ENV: &str = "WATCH_NAMESPACE";
