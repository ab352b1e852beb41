use serde::Serialize;
use sha2::{Digest, Sha256};

/// Computes the SHA-256 hex digest of the canonical JSON form of `value`.
///
/// Canonical form sorts map keys, matching the source system's
/// `json.dumps(value, sort_keys=True)` convention, so the digest is
/// independent of field insertion order and of cosmetic whitespace.
pub fn compute_hash<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let canonical = canonical_json(value)?;
    Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
}

/// Serializes `value` to JSON with map keys sorted, matching the
/// `sort_keys=True` convention used for every signature and checksum
/// computed over a payload in this system.
pub fn canonical_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let raw = serde_json::to_value(value)?;
    let sorted = sort_keys(raw);
    serde_json::to_string(&sorted)
}

fn sort_keys(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            for key in keys {
                if let Some(v) = map.get(&key) {
                    sorted.insert(key, sort_keys(v.clone()));
                }
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(sort_keys).collect())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_is_independent_of_key_order() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(compute_hash(&a).unwrap(), compute_hash(&b).unwrap());
    }

    #[test]
    fn hash_is_deterministic() {
        let value = json!({"task_id": "t-1", "status": "success"});
        let first = compute_hash(&value).unwrap();
        let second = compute_hash(&value).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn hash_changes_with_content() {
        let a = json!({"task_id": "t-1"});
        let b = json!({"task_id": "t-2"});
        assert_ne!(compute_hash(&a).unwrap(), compute_hash(&b).unwrap());
    }
}
