use anyhow::{Context, Result};
use serde::Serialize;

/// Emit a value as JCS-canonical JSON (RFC 8785).
///
/// Used for every machine-readable CLI output so field order never depends on
/// struct layout or map insertion order.
pub fn emit_jcs<T: Serialize>(value: &T) -> Result<String> {
    let json_value =
        serde_json::to_value(value).with_context(|| "Failed to serialize value to JSON")?;
    let json_bytes = serde_json_canonicalizer::to_vec(&json_value)
        .with_context(|| "Failed to canonicalize JSON using JCS")?;
    String::from_utf8(json_bytes).with_context(|| "JCS output contained invalid UTF-8")
}

/// First 16 hex characters of the BLAKE3 digest of `content`.
#[must_use]
pub fn short_hash(content: &str) -> String {
    let hash = blake3::hash(content.as_bytes()).to_hex();
    hash.as_str()[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_emit_jcs_sorts_keys() {
        let value = json!({"b": 1, "a": {"d": true, "c": null}});
        assert_eq!(emit_jcs(&value).unwrap(), r#"{"a":{"c":null,"d":true},"b":1}"#);
    }

    #[test]
    fn test_short_hash_is_stable() {
        let a = short_hash("requirements");
        assert_eq!(a.len(), 16);
        assert_eq!(a, short_hash("requirements"));
        assert_ne!(a, short_hash("requirements!"));
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
