//! Shared types used across CRD definitions

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to a Secret in the same namespace as the referencing object
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    /// Name of the Secret
    pub name: String,
}
