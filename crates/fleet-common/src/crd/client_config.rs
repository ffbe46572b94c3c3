//! ClientConfig CRD describing how to reach one remote cluster
//!
//! A ClientConfig points at a Secret in its own namespace holding a kubeconfig.
//! After bootstrap it also carries two annotations with the fingerprints of its
//! spec and of that Secret, which the drift controller compares against.

use k8s_openapi::api::core::v1::Secret;
use kube::runtime::reflector::ObjectRef;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::SecretReference;
use crate::kube_utils::namespaced_name;
use crate::Error;

/// Annotation holding the fingerprint of the ClientConfig spec
pub const CLIENT_CONFIG_HASH_ANNOTATION: &str = "fleet.dev/resource-hash";

/// Annotation holding the fingerprint of the referenced kubeconfig Secret
pub const SECRET_HASH_ANNOTATION: &str = "fleet.dev/secret-hash";

/// Key inside the Secret's data map that holds the kubeconfig
pub const KUBECONFIG_SECRET_KEY: &str = "kubeconfig";

/// ClientConfig declares a remote cluster the operator connects to.
///
/// Example:
/// ```yaml
/// apiVersion: config.fleet.dev/v1beta1
/// kind: ClientConfig
/// metadata:
///   name: us-east
///   namespace: fleet-system
/// spec:
///   contextName: us-east-1
///   kubeConfigSecret:
///     name: us-east-kubeconfig
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "config.fleet.dev",
    version = "v1beta1",
    kind = "ClientConfig",
    namespaced,
    printcolumn = r#"{"name":"Context","type":"string","jsonPath":".spec.contextName"}"#,
    printcolumn = r#"{"name":"Secret","type":"string","jsonPath":".spec.kubeConfigSecret.name"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfigSpec {
    /// Overrides the cluster identity. Defaults to the ClientConfig name.
    /// When the kubeconfig contains a context with this name, that context is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_name: Option<String>,

    /// Secret in the same namespace whose `kubeconfig` key holds the connection material
    pub kube_config_secret: SecretReference,
}

/// The pair of fingerprints committed onto a ClientConfig at bootstrap
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FingerprintMarkers {
    /// Fingerprint of the ClientConfig spec
    pub config: String,
    /// Fingerprint of the kubeconfig Secret data
    pub secret: String,
}

impl ClientConfig {
    /// Cluster identity used as the client cache key
    ///
    /// `spec.contextName` when set and non-empty, otherwise `metadata.name`.
    pub fn context_name(&self) -> String {
        match self.spec.context_name.as_deref() {
            Some(ctx) if !ctx.is_empty() => ctx.to_string(),
            _ => self.name_any(),
        }
    }

    /// `namespace/name` of this ClientConfig for logs and errors
    pub fn key(&self) -> String {
        namespaced_name(&ObjectRef::from_obj(self))
    }

    /// Resolve the Secret this ClientConfig depends on
    pub fn secret_ref(&self) -> Result<ObjectRef<Secret>, Error> {
        let namespace = self
            .namespace()
            .ok_or_else(|| Error::validation_for(self.key(), "ClientConfig has no namespace"))?;
        let name = self.spec.kube_config_secret.name.trim();
        if name.is_empty() {
            return Err(Error::validation_for_field(
                self.key(),
                "spec.kubeConfigSecret.name",
                "secret name must not be empty",
            ));
        }
        Ok(ObjectRef::new(name).within(&namespace))
    }

    /// Committed fingerprints, if both annotations are present
    pub fn fingerprint_markers(&self) -> Option<FingerprintMarkers> {
        let annotations = self.metadata.annotations.as_ref()?;
        let config = annotations.get(CLIENT_CONFIG_HASH_ANNOTATION)?;
        let secret = annotations.get(SECRET_HASH_ANNOTATION)?;
        Some(FingerprintMarkers {
            config: config.clone(),
            secret: secret.clone(),
        })
    }

    /// Overwrite both fingerprint annotations, keeping all other annotations
    pub fn set_fingerprint_markers(&mut self, markers: &FingerprintMarkers) {
        let annotations = self.annotations_mut();
        annotations.insert(
            CLIENT_CONFIG_HASH_ANNOTATION.to_string(),
            markers.config.clone(),
        );
        annotations.insert(SECRET_HASH_ANNOTATION.to_string(), markers.secret.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ObjectMeta;
    use std::collections::BTreeMap;

    fn sample(name: &str, context: Option<&str>, secret: &str) -> ClientConfig {
        let mut cc = ClientConfig::new(
            name,
            ClientConfigSpec {
                context_name: context.map(String::from),
                kube_config_secret: SecretReference {
                    name: secret.to_string(),
                },
            },
        );
        cc.metadata.namespace = Some("fleet-system".to_string());
        cc
    }

    #[test]
    fn parses_from_yaml() {
        let yaml = r#"
apiVersion: config.fleet.dev/v1beta1
kind: ClientConfig
metadata:
  name: us-east
  namespace: fleet-system
spec:
  contextName: us-east-1
  kubeConfigSecret:
    name: us-east-kubeconfig
"#;
        let cc: ClientConfig = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(cc.spec.context_name.as_deref(), Some("us-east-1"));
        assert_eq!(cc.spec.kube_config_secret.name, "us-east-kubeconfig");
    }

    #[test]
    fn context_name_defaults_to_object_name() {
        assert_eq!(sample("east", None, "s").context_name(), "east");
        assert_eq!(sample("east", Some(""), "s").context_name(), "east");
        assert_eq!(sample("east", Some("ctx-1"), "s").context_name(), "ctx-1");
    }

    #[test]
    fn secret_ref_uses_config_namespace() {
        let secret = sample("east", None, "east-kc").secret_ref().expect("ref");
        assert_eq!(secret.name, "east-kc");
        assert_eq!(secret.namespace.as_deref(), Some("fleet-system"));
    }

    #[test]
    fn secret_ref_rejects_empty_name() {
        let err = sample("east", None, "  ").secret_ref().unwrap_err();
        assert!(err.to_string().contains("fleet-system/east"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn secret_ref_requires_namespace() {
        let mut cc = sample("east", None, "east-kc");
        cc.metadata.namespace = None;
        assert!(cc.secret_ref().is_err());
    }

    #[test]
    fn markers_require_both_annotations() {
        let mut cc = sample("east", None, "east-kc");
        assert!(cc.fingerprint_markers().is_none());

        cc.metadata = ObjectMeta {
            annotations: Some(BTreeMap::from([(
                CLIENT_CONFIG_HASH_ANNOTATION.to_string(),
                "abc".to_string(),
            )])),
            ..cc.metadata
        };
        assert!(cc.fingerprint_markers().is_none());

        let markers = FingerprintMarkers {
            config: "abc".to_string(),
            secret: "def".to_string(),
        };
        cc.set_fingerprint_markers(&markers);
        assert_eq!(cc.fingerprint_markers(), Some(markers));
    }

    #[test]
    fn setting_markers_preserves_other_annotations() {
        let mut cc = sample("east", None, "east-kc");
        cc.annotations_mut()
            .insert("team".to_string(), "platform".to_string());
        cc.set_fingerprint_markers(&FingerprintMarkers {
            config: "a".to_string(),
            secret: "b".to_string(),
        });
        assert_eq!(cc.annotations().get("team").map(String::as_str), Some("platform"));
        assert_eq!(cc.annotations().len(), 3);
    }
}
