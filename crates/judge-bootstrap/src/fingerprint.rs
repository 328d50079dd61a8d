//! SHA-256 fingerprint over the canonical JSON form of a tool's ordered
//! setup steps, mirroring `hash_dict()`'s `json.dumps(..., sort_keys=True)`.

use std::fmt::Write as _;

use sha2::{Digest, Sha256};

use crate::spec::Step;

/// Fingerprint a tool's setup list. Canonicalizes to JSON with
/// lexicographically sorted object keys before hashing, so field order in
/// the struct (or future additions) never changes an unrelated tool's
/// fingerprint.
pub fn fingerprint_setup(steps: &[Step]) -> String {
    let value = serde_json::json!({ "setup": steps });
    let canonical = canonicalize(&value);
    let payload = serde_json::to_string(&canonical).expect("canonical value always serializes");
    let digest = Sha256::digest(payload.as_bytes());

    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

fn canonicalize(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let sorted: std::collections::BTreeMap<&String, serde_json::Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            serde_json::Value::Object(
                sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect(),
            )
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(canonicalize).collect())
        }
        other => other.clone(),
    }
}
