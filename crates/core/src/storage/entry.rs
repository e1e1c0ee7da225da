//! Stored entries and the last-write-wins merges applied to whole collections.
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;

/// One key/value record of the local store.
///
/// Values are kept as bracketed lists, `"[v]"` after a put and `"[v,w]"` after an append.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    /// The key.
    pub key: String,
    /// Bracketed value list.
    pub value: String,
    /// Time of the last write.
    pub timestamp: DateTime<Utc>,
    /// Time of the last read or write.
    pub last_accessed: DateTime<Utc>,
    /// Set on both sides of a key clash during a single merge pass.
    #[serde(skip)]
    pub conflict: bool,
}

impl StoredEntry {
    /// A fresh entry written now.
    pub fn new(key: &str, value: &str) -> Self {
        let now = Utc::now();
        Self {
            key: key.to_string(),
            value: bracket(value),
            timestamp: now,
            last_accessed: now,
            conflict: false,
        }
    }

    /// Render for a client: `Key   | k` then `Value | v`, brackets removed.
    pub fn format_client(&self) -> String {
        format!("Key   | {}\nValue | {}", self.key, unbracket(&self.value))
    }
}

/// Wrap a value in brackets unless it already is a bracketed list.
pub fn bracket(value: &str) -> String {
    if value.contains('[') && value.contains(']') {
        value.to_string()
    } else {
        format!("[{}]", value)
    }
}

/// Strip the outer brackets of a value list.
pub fn unbracket(value: &str) -> &str {
    value
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .unwrap_or(value)
}

/// Extend the bracketed list `value` with `extra`.
pub fn append_value(value: &str, extra: &str) -> String {
    let inner = match (value.find('['), value.rfind(']')) {
        (Some(start), Some(end)) if start < end => &value[start + 1..end],
        _ => value,
    };
    bracket(&format!("{},{}", inner, extra))
}

/// Pair up the keys present on both sides, flagging them, and keep the later write of
/// each pair. On equal timestamps the incoming entry wins.
fn resolve_conflicts(local: &mut [StoredEntry], update: &mut [StoredEntry]) -> Vec<StoredEntry> {
    let mut resolved = vec![];
    for l in local.iter_mut() {
        for u in update.iter_mut() {
            if l.key != u.key {
                continue;
            }
            l.conflict = true;
            u.conflict = true;
            let latest = if l.timestamp > u.timestamp {
                l.clone()
            } else {
                u.clone()
            };
            resolved.push(StoredEntry {
                conflict: false,
                ..latest
            });
        }
    }
    resolved
}

/// Merge used by replication and migration: clashing keys resolve to the later write,
/// every other entry of either side is kept.
pub fn merge_entries(mut local: Vec<StoredEntry>, mut update: Vec<StoredEntry>) -> Vec<StoredEntry> {
    let mut merged = resolve_conflicts(&mut local, &mut update);
    merged.extend(local.into_iter().filter(|e| !e.conflict));
    merged.extend(update.into_iter().filter(|e| !e.conflict));
    merged
}

/// Merge used by reconciliation: clashing keys resolve to the later write and local-only
/// entries are kept, while keys only the incoming side knows are dropped.
pub fn reconcile_entries(mut local: Vec<StoredEntry>, mut update: Vec<StoredEntry>) -> Vec<StoredEntry> {
    let mut reconciled = resolve_conflicts(&mut local, &mut update);
    reconciled.extend(local.into_iter().filter(|e| !e.conflict));
    reconciled
}

/// Serialize an exported collection for the bulk channel.
pub fn to_payload(entries: &[StoredEntry]) -> Result<Vec<u8>> {
    serde_json::to_vec(entries).map_err(Error::Serialize)
}

/// Parse a collection received on the bulk channel.
pub fn from_payload(payload: &[u8]) -> Result<Vec<StoredEntry>> {
    serde_json::from_slice(payload).map_err(Error::Deserialize)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn entry(key: &str, value: &str, age_secs: i64) -> StoredEntry {
        let at = Utc::now() - Duration::seconds(age_secs);
        StoredEntry {
            key: key.into(),
            value: bracket(value),
            timestamp: at,
            last_accessed: at,
            conflict: false,
        }
    }

    fn sorted(mut entries: Vec<StoredEntry>) -> Vec<StoredEntry> {
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    #[test]
    fn test_value_lists() {
        assert_eq!(bracket("v"), "[v]");
        assert_eq!(bracket("[v,w]"), "[v,w]");
        assert_eq!(append_value("[v]", "w"), "[v,w]");
        assert_eq!(append_value("[v,w]", "x"), "[v,w,x]");
        assert_eq!(unbracket("[v,w]"), "v,w");
        assert_eq!(unbracket("plain"), "plain");
        assert_eq!(
            entry("k", "v", 0).format_client(),
            "Key   | k\nValue | v"
        );
    }

    #[test]
    fn test_merge_keeps_both_sides() {
        let local = vec![entry("a", "old", 10), entry("only-local", "x", 5)];
        let update = vec![entry("a", "new", 1), entry("only-remote", "y", 5)];
        let merged = sorted(merge_entries(local, update));
        let keys: Vec<&str> = merged.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "only-local", "only-remote"]);
        assert_eq!(merged[0].value, "[new]");
        assert!(merged.iter().all(|e| !e.conflict));
    }

    #[test]
    fn test_merge_local_wins_only_when_later() {
        let at = Utc::now();
        let mut local = entry("a", "local", 0);
        let mut update = entry("a", "remote", 0);
        local.timestamp = at;
        update.timestamp = at;
        let merged = merge_entries(vec![local], vec![update]);
        assert_eq!(merged[0].value, "[remote]");

        let newer = entry("a", "later", 0);
        let older = entry("a", "earlier", 60);
        let merged = merge_entries(vec![newer], vec![older]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].value, "[later]");
    }

    #[test]
    fn test_merge_is_commutative_and_idempotent() {
        let a = vec![entry("k1", "a1", 30), entry("k2", "a2", 2), entry("k3", "a3", 7)];
        let b = vec![entry("k1", "b1", 3), entry("k2", "b2", 20), entry("k4", "b4", 1)];

        let ab = sorted(merge_entries(a.clone(), b.clone()));
        let ba = sorted(merge_entries(b, a.clone()));
        assert_eq!(ab, ba);
        assert_eq!(ab[0].value, "[b1]");
        assert_eq!(ab[1].value, "[a2]");

        let aa = sorted(merge_entries(a.clone(), a.clone()));
        assert_eq!(aa, sorted(a));
    }

    #[test]
    fn test_reconcile_drops_incoming_only_keys() {
        let local = vec![entry("shared", "stale", 50), entry("mine", "m", 5)];
        let update = vec![entry("shared", "fresh", 1), entry("theirs", "t", 1)];
        let reconciled = sorted(reconcile_entries(local, update));
        let keys: Vec<&str> = reconciled.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["mine", "shared"]);
        assert_eq!(reconciled[1].value, "[fresh]");
    }

    #[test]
    fn test_payload_skips_conflict_flag() {
        let mut e = entry("k", "v", 0);
        e.conflict = true;
        let back = from_payload(&to_payload(&[e.clone()]).unwrap()).unwrap();
        assert!(!back[0].conflict);
        assert_eq!(back[0].key, e.key);
        assert_eq!(back[0].timestamp, e.timestamp);
    }
}
