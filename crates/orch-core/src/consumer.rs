use std::collections::BTreeMap;

use orch_schema::{FieldValues, KeyOpFieldValues, Op};

// ---------------------------------------------------------------------------
// DrainAction
// ---------------------------------------------------------------------------

/// Verdict returned by a drain visitor for one staged entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainAction {
    /// Entry was processed; remove it from the buffer.
    Consumed,
    /// Entry could not be processed yet (missing dependency); keep it for a
    /// later drain.
    Retain,
}

// ---------------------------------------------------------------------------
// Consumer
// ---------------------------------------------------------------------------

/// Per-source staging buffer for inbound change records.
///
/// Holds at most one pending change per key: staging a key that is already
/// pending overwrites the previous change (last write wins). Drain order
/// across keys is unspecified; callers must not depend on it.
#[derive(Debug)]
pub struct Consumer {
    table: String,
    pending: BTreeMap<String, (Op, FieldValues)>,
}

impl Consumer {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            pending: BTreeMap::new(),
        }
    }

    /// Name of the inbound table this buffer is attached to.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Record the latest change for a key, overwriting any prior one.
    pub fn stage(&mut self, record: KeyOpFieldValues) {
        self.pending.insert(record.key, (record.op, record.values));
    }

    /// Visit every pending entry. Entries the visitor consumes are removed;
    /// retained entries survive to a later drain.
    pub fn drain(&mut self, mut visit: impl FnMut(&str, Op, &FieldValues) -> DrainAction) {
        self.pending
            .retain(|key, (op, values)| visit(key, *op, values) == DrainAction::Retain);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn set(key: &str, field: &str, value: &str) -> KeyOpFieldValues {
        KeyOpFieldValues::set(key, vec![(field.to_string(), value.to_string())])
    }

    #[test]
    fn last_write_wins_per_key() {
        let mut consumer = Consumer::new("PORT");
        consumer.stage(set("Ethernet0", "speed", "100000"));
        consumer.stage(set("Ethernet0", "speed", "25000"));
        consumer.stage(KeyOpFieldValues::del("Ethernet4"));
        assert_eq!(consumer.len(), 2);

        let mut seen = Vec::new();
        consumer.drain(|key, op, values| {
            seen.push((key.to_string(), op, values.clone()));
            DrainAction::Consumed
        });
        assert!(consumer.is_empty());

        let eth0 = seen.iter().find(|(k, _, _)| k == "Ethernet0").unwrap();
        assert_eq!(eth0.1, Op::Set);
        assert_eq!(eth0.2[0].1, "25000");
        let eth4 = seen.iter().find(|(k, _, _)| k == "Ethernet4").unwrap();
        assert_eq!(eth4.1, Op::Del);
    }

    #[test]
    fn retained_entries_survive() {
        let mut consumer = Consumer::new("SFLOW_SESSION");
        consumer.stage(set("Ethernet0", "sample_rate", "4000"));
        consumer.stage(set("Ethernet4", "sample_rate", "5000"));

        consumer.drain(|key, _, _| {
            if key == "Ethernet0" {
                DrainAction::Retain
            } else {
                DrainAction::Consumed
            }
        });
        assert_eq!(consumer.len(), 1);

        let mut keys = Vec::new();
        consumer.drain(|key, _, _| {
            keys.push(key.to_string());
            DrainAction::Consumed
        });
        assert_eq!(keys, ["Ethernet0"]);
        assert!(consumer.is_empty());
    }

    #[test]
    fn del_overwrites_staged_set() {
        let mut consumer = Consumer::new("PORT");
        consumer.stage(set("Ethernet0", "speed", "100000"));
        consumer.stage(KeyOpFieldValues::del("Ethernet0"));
        assert_eq!(consumer.len(), 1);

        consumer.drain(|_, op, values| {
            assert_eq!(op, Op::Del);
            assert!(values.is_empty());
            DrainAction::Consumed
        });
    }
}
