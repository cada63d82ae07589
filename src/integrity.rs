//! Integrity primitives: canonical hashing, keyed signing, verification.
//!
//! Hashes are computed over a canonical JSON form (recursively sorted object
//! keys, no insignificant whitespace) so that semantically identical data
//! always hashes identically. Verification compares in constant time and
//! reports mismatch as `false`; tamper is an expected outcome, not an error.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::audit::AuditEntry;
use crate::error::Result;

type HmacSha256 = Hmac<Sha256>;

/// Digest of a data blob bound to its creation time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HashResult {
    pub hash: String,
    pub timestamp: u64,
}

/// Renders a JSON value with object keys sorted recursively and no
/// whitespace.
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
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
        other => out.push_str(&other.to_string()),
    }
}

/// Hashes `data` bound to `timestamp`: SHA-256 over `canonical(data) || timestamp`.
pub fn hash_at(data: &Value, timestamp: u64) -> HashResult {
    let mut hasher = Sha256::new();
    hasher.update(canonicalize(data).as_bytes());
    hasher.update(timestamp.to_string().as_bytes());
    HashResult {
        hash: hex::encode(hasher.finalize()),
        timestamp,
    }
}

/// Keyed MAC (HMAC-SHA256) over `payload`, hex-encoded.
pub fn sign(payload: &[u8], secret: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex HMAC signature.
pub fn verify_signature(payload: &[u8], secret: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac key length");
    mac.update(payload);
    mac.verify_slice(&signature).is_ok()
}

/// Computes the integrity hash of an audit entry over every field except
/// `integrity_hash` and `signature`.
pub fn entry_hash(entry: &AuditEntry) -> Result<String> {
    let mut value = serde_json::to_value(entry)?;
    if let Value::Object(map) = &mut value {
        map.remove("integrity_hash");
        map.remove("signature");
    }
    let mut hasher = Sha256::new();
    hasher.update(canonicalize(&value).as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Recomputes an entry's hash and compares constant-time against the stored
/// one. Returns `false` on any mismatch; never errors on tamper.
pub fn verify_entry(entry: &AuditEntry) -> bool {
    let Ok(expected) = entry_hash(entry) else {
        return false;
    };
    let (Ok(a), Ok(b)) = (hex::decode(&expected), hex::decode(&entry.integrity_hash)) else {
        return false;
    };
    a.len() == b.len() && bool::from(a.ct_eq(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_form_is_key_order_independent() {
        let a = json!({"b": 1, "a": {"d": [1, 2], "c": "x"}});
        let b = json!({"a": {"c": "x", "d": [1, 2]}, "b": 1});
        assert_eq!(canonicalize(&a), canonicalize(&b));
        assert_eq!(canonicalize(&a), r#"{"a":{"c":"x","d":[1,2]},"b":1}"#);
    }

    #[test]
    fn hash_is_deterministic_for_input_and_timestamp() {
        let data = json!({"kyc_id": "kyc-1", "fields": 4});
        assert_eq!(hash_at(&data, 1000).hash, hash_at(&data, 1000).hash);
        assert_ne!(hash_at(&data, 1000).hash, hash_at(&data, 1001).hash);
    }

    #[test]
    fn signatures_verify_and_reject() {
        let sig = sign(b"submission", b"session-secret");
        assert!(verify_signature(b"submission", b"session-secret", &sig));
        assert!(!verify_signature(b"submission", b"other-secret", &sig));
        assert!(!verify_signature(b"altered", b"session-secret", &sig));
        assert!(!verify_signature(b"submission", b"session-secret", "zz"));
    }
}
