use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use orch_schema::FieldValues;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Write side of a downstream producer table.
///
/// Producer tables are write-behind: the effect of a write is applied by the
/// downstream consumer and is not observable here. `set` merges the given
/// fields into the row; `del` removes the whole row.
pub trait ProducerTable: Send + Sync {
    fn name(&self) -> &str;
    fn set(&self, key: &str, values: FieldValues);
    fn del(&self, key: &str);
}

/// Read side of a configuration table, used by lazy-init population.
pub trait TableReader: Send + Sync {
    fn name(&self) -> &str;
    fn keys(&self) -> Vec<String>;
    fn get(&self, key: &str) -> Option<FieldValues>;
    fn hget(&self, key: &str, field: &str) -> Option<String>;
}

// ---------------------------------------------------------------------------
// MemoryTable
// ---------------------------------------------------------------------------

/// One logged table operation, kept for inspection in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOp {
    Set(String),
    Del(String),
}

/// In-process table backed by a map. Serves as both a producer sink and a
/// config-table reader; the op journal lets tests assert on write traffic.
pub struct MemoryTable {
    name: String,
    inner: Mutex<MemoryTableInner>,
}

#[derive(Default)]
struct MemoryTableInner {
    rows: BTreeMap<String, BTreeMap<String, String>>,
    journal: Vec<TableOp>,
}

impl MemoryTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(MemoryTableInner::default()),
        }
    }

    pub fn row(&self, key: &str) -> Option<BTreeMap<String, String>> {
        self.inner.lock().expect("table lock").rows.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().expect("table lock").rows.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("table lock").rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().expect("table lock").rows.is_empty()
    }

    /// Drain and return the op journal.
    pub fn take_journal(&self) -> Vec<TableOp> {
        std::mem::take(&mut self.inner.lock().expect("table lock").journal)
    }
}

impl ProducerTable for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn set(&self, key: &str, values: FieldValues) {
        let mut inner = self.inner.lock().expect("table lock");
        let row = inner.rows.entry(key.to_string()).or_default();
        for (field, value) in values {
            row.insert(field, value);
        }
        inner.journal.push(TableOp::Set(key.to_string()));
    }

    fn del(&self, key: &str) {
        let mut inner = self.inner.lock().expect("table lock");
        inner.rows.remove(key);
        inner.journal.push(TableOp::Del(key.to_string()));
    }
}

impl TableReader for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn keys(&self) -> Vec<String> {
        self.inner.lock().expect("table lock").rows.keys().cloned().collect()
    }

    fn get(&self, key: &str) -> Option<FieldValues> {
        self.inner
            .lock()
            .expect("table lock")
            .rows
            .get(key)
            .map(|row| row.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
    }

    fn hget(&self, key: &str, field: &str) -> Option<String> {
        self.inner
            .lock()
            .expect("table lock")
            .rows
            .get(key)
            .and_then(|row| row.get(field).cloned())
    }
}

// ---------------------------------------------------------------------------
// FileProducerTable
// ---------------------------------------------------------------------------

/// Appends table operations as JSON lines to a shared file, one object per
/// write: `{"table":...,"op":...,"key":...,"fields":{...}}`.
///
/// This is the stand-in sink for the downstream apply layer; every daemon's
/// producer tables can share one writer.
pub struct FileProducerTable {
    name: String,
    writer: std::sync::Arc<Mutex<BufWriter<File>>>,
}

impl FileProducerTable {
    pub fn open(name: impl Into<String>, path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self {
            name: name.into(),
            writer: std::sync::Arc::new(Mutex::new(BufWriter::new(file))),
        })
    }

    /// A second table appending to the same file.
    pub fn sibling(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            writer: std::sync::Arc::clone(&self.writer),
        }
    }

    fn append(&self, op: &str, key: &str, values: &FieldValues) {
        let fields: BTreeMap<&str, &str> = values
            .iter()
            .map(|(f, v)| (f.as_str(), v.as_str()))
            .collect();
        let line = serde_json::json!({
            "table": self.name,
            "op": op,
            "key": key,
            "fields": fields,
        });
        let mut writer = self.writer.lock().expect("producer lock");
        if let Err(e) = writeln!(writer, "{line}").and_then(|_| writer.flush()) {
            log::warn!("producer table {} write failed: {e}", self.name);
        }
    }
}

impl ProducerTable for FileProducerTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn set(&self, key: &str, values: FieldValues) {
        self.append("SET", key, &values);
    }

    fn del(&self, key: &str) {
        self.append("DEL", key, &Vec::new());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_table_set_merges_fields() {
        let table = MemoryTable::new("SFLOW_SESSION_TABLE");
        table.set(
            "Ethernet0",
            vec![
                ("admin_state".to_string(), "up".to_string()),
                ("sample_rate".to_string(), "100000".to_string()),
            ],
        );
        table.set(
            "Ethernet0",
            vec![("sample_rate".to_string(), "25000".to_string())],
        );

        let row = table.row("Ethernet0").unwrap();
        assert_eq!(row["admin_state"], "up");
        assert_eq!(row["sample_rate"], "25000");
    }

    #[test]
    fn memory_table_del_removes_row() {
        let table = MemoryTable::new("T");
        table.set("k", vec![("f".to_string(), "v".to_string())]);
        table.del("k");
        assert!(!table.contains("k"));
        assert_eq!(
            table.take_journal(),
            vec![TableOp::Set("k".to_string()), TableOp::Del("k".to_string())]
        );
    }

    #[test]
    fn memory_table_reader_side() {
        let table = MemoryTable::new("DPU");
        table.set(
            "local_dpu",
            vec![
                ("pa_ipv4".to_string(), "10.0.0.1".to_string()),
                ("state".to_string(), "up".to_string()),
            ],
        );
        assert_eq!(table.keys(), ["local_dpu"]);
        assert_eq!(table.hget("local_dpu", "state").unwrap(), "up");
        assert_eq!(table.get("local_dpu").unwrap().len(), 2);
        assert!(table.hget("local_dpu", "npu_ipv4").is_none());
        assert!(table.get("missing").is_none());
    }

    #[test]
    fn file_producer_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tables.jsonl");

        let rules = FileProducerTable::open("ACL_RULE_TABLE", &path).unwrap();
        let tables = rules.sibling("ACL_TABLE_TABLE");
        rules.set("ENI:Vnet_1000_AABBCCDDEEFF", vec![
            ("priority".to_string(), "9996".to_string()),
        ]);
        tables.del("ENI");

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.trim().lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["table"], "ACL_RULE_TABLE");
        assert_eq!(first["op"], "SET");
        assert_eq!(first["fields"]["priority"], "9996");

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["table"], "ACL_TABLE_TABLE");
        assert_eq!(second["op"], "DEL");
    }
}
