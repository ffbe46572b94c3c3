//! Custom Resource Definitions for the fleet operator

mod client_config;
mod types;

pub use client_config::{
    ClientConfig, ClientConfigSpec, FingerprintMarkers, CLIENT_CONFIG_HASH_ANNOTATION,
    KUBECONFIG_SECRET_KEY, SECRET_HASH_ANNOTATION,
};
pub use types::SecretReference;
