//! Request fingerprints - the cache and dedup key
//!
//! A fingerprint is a SHA-256 over (schema kind, canonical context payload,
//! model id, temperature bucket). Two logically equivalent requests must
//! collide here, so the canonical form sorts map keys, collapses
//! whitespace, rounds floats, and never includes the turn index.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn compute(schema_label: &str, canonical: &str, model_id: &str, temperature: f32) -> Self {
        // bucket temperature at 0.1 granularity so float jitter cannot
        // split otherwise identical requests
        let bucket = (temperature * 10.0).round() as i32;
        let mut hasher = Sha256::new();
        hasher.update(schema_label.as_bytes());
        hasher.update([0]);
        hasher.update(canonical.as_bytes());
        hasher.update([0]);
        hasher.update(model_id.as_bytes());
        hasher.update([0]);
        hasher.update(bucket.to_le_bytes());
        Self(hasher.finalize().into())
    }

    /// Stable 64-bit seed for the procedural fallback generator.
    pub fn seed(&self) -> u64 {
        u64::from_le_bytes(self.0[..8].try_into().expect("fingerprint is 32 bytes"))
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({}..)", &self.to_hex()[..12])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Render a JSON value into its canonical textual form: object keys
/// sorted, strings whitespace-collapsed, floats rounded to a stable grid.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    out.push_str(&format!("{}", f as i64));
                } else {
                    // three decimals is the stable grid for stats
                    out.push_str(&format!("{f:.3}"));
                }
            } else {
                out.push_str(&n.to_string());
            }
        }
        Value::String(s) => {
            out.push('"');
            out.push_str(&collapse_whitespace(s));
            out.push('"');
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
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push('"');
                out.push_str(key);
                out.push_str("\":");
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_does_not_matter() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }

    #[test]
    fn test_whitespace_collapses() {
        let a = json!({"s": "hello   there\n friend"});
        let b = json!({"s": "hello there friend"});
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }

    #[test]
    fn test_float_grid() {
        let a = json!({"x": 0.30000000000000004});
        let b = json!({"x": 0.3});
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }

    #[test]
    fn test_temperature_bucketing() {
        let a = Fingerprint::compute("npc_dialogue", "{}", "gpt-4o", 0.70);
        let b = Fingerprint::compute("npc_dialogue", "{}", "gpt-4o", 0.7004);
        let c = Fingerprint::compute("npc_dialogue", "{}", "gpt-4o", 0.8);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_model_id_splits_fingerprint() {
        let a = Fingerprint::compute("npc_dialogue", "{}", "gpt-4o", 0.7);
        let b = Fingerprint::compute("npc_dialogue", "{}", "gpt-4o-mini", 0.7);
        assert_ne!(a, b);
    }
}
