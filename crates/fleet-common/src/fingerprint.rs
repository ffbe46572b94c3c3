//! Deterministic fingerprints for change detection
//!
//! A fingerprint is the base64-encoded SHA-256 of a canonical JSON rendering of
//! a payload. Object keys are sorted during canonicalisation so map ordering
//! never changes the result. The values end up in annotations, which is why
//! they are plain strings.

use std::fmt::Write as _;

use aws_lc_rs::digest;
use base64::{engine::general_purpose::STANDARD, Engine};
use k8s_openapi::api::core::v1::Secret;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::crd::ClientConfigSpec;
use crate::Error;

/// Fingerprint an arbitrary JSON value
///
/// Total: every value has a fingerprint. `null` has a fixed fingerprint
/// distinct from any non-null payload.
pub fn fingerprint_value(value: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(value, &mut canonical);
    let hash = digest::digest(&digest::SHA256, canonical.as_bytes());
    STANDARD.encode(hash.as_ref())
}

/// Fingerprint any serializable payload
///
/// Fails only when the payload has no JSON representation (for example a map
/// with non-string keys).
pub fn fingerprint<T: Serialize + ?Sized>(payload: &T) -> Result<String, Error> {
    let value = serde_json::to_value(payload)
        .map_err(|e| Error::serialization(format!("cannot fingerprint payload: {e}")))?;
    Ok(fingerprint_value(&value))
}

/// Fingerprint the credential payload of a Secret
///
/// Only `data` is hashed. A Secret without data hashes as `null`, which
/// differs from an empty map.
pub fn secret_fingerprint(secret: &Secret) -> String {
    let value = match &secret.data {
        None => Value::Null,
        Some(data) => Value::Object(
            data.iter()
                .map(|(k, v)| (k.clone(), Value::String(STANDARD.encode(&v.0))))
                .collect::<Map<String, Value>>(),
        ),
    };
    fingerprint_value(&value)
}

/// Fingerprint a ClientConfig spec
///
/// Metadata and annotations are never part of the payload, so committing the
/// fingerprint markers does not change the fingerprint.
pub fn config_fingerprint(spec: &ClientConfigSpec) -> Result<String, Error> {
    let value = serde_json::to_value(spec)
        .map_err(|e| Error::serialization_for_kind("ClientConfig", e.to_string()))?;
    Ok(fingerprint_value(&value))
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_json_string(key, out);
                out.push(':');
                write_canonical(val, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::String(s) => write_json_string(s, out),
        // null, bools and numbers already have a single textual form
        other => {
            let _ = write!(out, "{}", other);
        }
    }
}

fn write_json_string(s: &str, out: &mut String) {
    // Display on a Value::String escapes exactly like serde_json does
    let _ = write!(out, "{}", Value::String(s.to_string()));
}
