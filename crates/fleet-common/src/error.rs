//! Error types for the fleet operator
//!
//! Errors are structured with fields to aid debugging in production.
//! Configuration mistakes carry the identity of the offending object so an
//! operator can fix the source resource before the next restart.

use thiserror::Error;

/// Main error type for fleet operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A ClientConfig is authored incorrectly
    #[error("validation error for {object}: {message}")]
    Validation {
        /// Identity of the invalid object (namespace/name)
        object: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.kubeConfigSecret.name")
        field: Option<String>,
    },

    /// A ClientConfig references a Secret that does not exist
    #[error("client config {config} references missing secret {secret}")]
    MissingSecret {
        /// The referencing ClientConfig (namespace/name)
        config: String,
        /// The unresolved Secret (namespace/name)
        secret: String,
    },

    /// Two ClientConfigs resolve to the same cluster identity
    #[error("duplicate cluster identity {identity}: already registered, rejected from {object}")]
    DuplicateCluster {
        /// The colliding cluster identity (context name)
        identity: String,
        /// The ClientConfig that attempted the second registration
        object: String,
    },

    /// Kubeconfig material in a Secret is unusable
    #[error("invalid credentials for {object}: {message}")]
    Credentials {
        /// The ClientConfig whose Secret holds the bad kubeconfig
        object: String,
        /// Description of what failed
        message: String,
    },

    /// Building or registering a remote cluster connection failed
    #[error("connection error for cluster {cluster}: {message}")]
    Connection {
        /// Cluster identity
        cluster: String,
        /// Description of what failed
        message: String,
    },

    /// Lookup of a cluster identity that was never bootstrapped
    #[error("no client registered for cluster {identity}")]
    UnknownCluster {
        /// The requested cluster identity
        identity: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "bootstrap", "dispatcher")
        context: String,
    },
}

impl Error {
    /// Create a validation error for an object
    pub fn validation_for(object: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            object: object.into(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with an object and field path
    pub fn validation_for_field(
        object: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            object: object.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a missing-secret error
    pub fn missing_secret(config: impl Into<String>, secret: impl Into<String>) -> Self {
        Self::MissingSecret {
            config: config.into(),
            secret: secret.into(),
        }
    }

    /// Create a duplicate-identity error
    pub fn duplicate_cluster(identity: impl Into<String>, object: impl Into<String>) -> Self {
        Self::DuplicateCluster {
            identity: identity.into(),
            object: object.into(),
        }
    }

    /// Create a credentials error
    pub fn credentials(object: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Credentials {
            object: object.into(),
            message: msg.into(),
        }
    }

    /// Create a connection error
    pub fn connection(cluster: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Connection {
            cluster: cluster.into(),
            message: msg.into(),
        }
    }

    /// Create an unknown-cluster error
    pub fn unknown_cluster(identity: impl Into<String>) -> Self {
        Self::UnknownCluster {
            identity: identity.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Authoring and credential errors need a fix to the source objects and are
    /// never retried. Kubernetes errors are retried unless the API server
    /// rejected the request with a 4xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::Validation { .. } => false,
            Error::MissingSecret { .. } => false,
            Error::DuplicateCluster { .. } => false,
            Error::Credentials { .. } => false,
            Error::Connection { .. } => true,
            Error::UnknownCluster { .. } => false,
            Error::Serialization { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// Get the identity of the object this error is about, when known
    pub fn object(&self) -> Option<&str> {
        match self {
            Error::Validation { object, .. } => Some(object),
            Error::MissingSecret { config, .. } => Some(config),
            Error::DuplicateCluster { object, .. } => Some(object),
            Error::Credentials { object, .. } => Some(object),
            _ => None,
        }
    }

    /// Get the context if this error has one
    pub fn context(&self) -> Option<&str> {
        match self {
            Error::Internal { context, .. } => Some(context),
            _ => None,
        }
    }
}
