//! Canonical form of a snapshot, minus fields that change on every tick.
use od_base::Snapshot;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Canonical JSON plus its SHA-256 digest. Two snapshots with the same digest
/// are the same as far as the dashboard is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedSnapshot {
    pub canonical: String,
    pub digest: String,
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    volatile: Vec<String>,
}

impl Normalizer {
    pub fn new(volatile: Vec<String>) -> Self {
        Self { volatile }
    }

    pub fn normalize(&self, snapshot: &Snapshot) -> NormalizedSnapshot {
        let mut value = serde_json::to_value(snapshot).unwrap_or(Value::Null);
        self.strip(&mut value);
        // serde_json's default map is ordered, so this is already canonical.
        let canonical = value.to_string();
        let digest = sha256_hex(&canonical);
        NormalizedSnapshot { canonical, digest }
    }

    fn strip(&self, value: &mut Value) {
        match value {
            Value::Object(map) => {
                map.retain(|key, _| !self.volatile.iter().any(|v| v == key));
                map.values_mut().for_each(|v| self.strip(v));
            }
            Value::Array(items) => items.iter_mut().for_each(|v| self.strip(v)),
            _ => {}
        }
    }
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:064x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> Normalizer {
        Normalizer::new(vec!["now".into(), "server_time".into()])
    }

    fn snap(json: &str) -> Snapshot {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn volatile_fields_do_not_affect_digest() {
        let a = snap(r#"{"tasks":[{"id":"t1","state":"running"}],"now":1,"meta":{"server_time":"x","build":7}}"#);
        let b = snap(r#"{"tasks":[{"id":"t1","state":"running"}],"now":2,"meta":{"server_time":"y","build":7}}"#);
        assert_eq!(normalizer().normalize(&a), normalizer().normalize(&b));
    }

    #[test]
    fn key_order_does_not_matter() {
        let a = snap(r#"{"meta":{"a":1,"b":2},"zone":"eu"}"#);
        let b = snap(r#"{"zone":"eu","meta":{"b":2,"a":1}}"#);
        assert_eq!(normalizer().normalize(&a).digest, normalizer().normalize(&b).digest);
    }

    #[test]
    fn semantic_change_changes_digest() {
        let a = snap(r#"{"tasks":[{"id":"t1","state":"running"}]}"#);
        let b = snap(r#"{"tasks":[{"id":"t1","state":"done"}]}"#);
        let (na, nb) = (normalizer().normalize(&a), normalizer().normalize(&b));
        assert_ne!(na.digest, nb.digest);
        assert_eq!(na.digest.len(), 64);
        assert!(!na.canonical.contains("\"now\""));
    }
}
