use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Op
// ---------------------------------------------------------------------------

/// Operation carried by a change record. The bus only knows two verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Op {
    Set,
    Del,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Set => write!(f, "SET"),
            Op::Del => write!(f, "DEL"),
        }
    }
}

// ---------------------------------------------------------------------------
// KeyOpFieldValues
// ---------------------------------------------------------------------------

/// Field list as delivered on the bus: ordered, possibly with duplicates.
pub type FieldValues = Vec<(String, String)>;

/// One change record from an inbound table stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyOpFieldValues {
    pub key: String,
    pub op: Op,
    pub values: FieldValues,
}

impl KeyOpFieldValues {
    pub fn set(key: impl Into<String>, values: FieldValues) -> Self {
        Self {
            key: key.into(),
            op: Op::Set,
            values,
        }
    }

    pub fn del(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            op: Op::Del,
            values: Vec::new(),
        }
    }
}

/// Look up the first occurrence of `field` in a field list.
pub fn fv_get<'a>(values: &'a [(String, String)], field: &str) -> Option<&'a str> {
    values
        .iter()
        .find(|(name, _)| name == field)
        .map(|(_, value)| value.as_str())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fv_get_first_occurrence() {
        let values = vec![
            ("speed".to_string(), "100000".to_string()),
            ("speed".to_string(), "25000".to_string()),
        ];
        assert_eq!(fv_get(&values, "speed"), Some("100000"));
        assert_eq!(fv_get(&values, "mtu"), None);
    }

    #[test]
    fn op_display() {
        assert_eq!(Op::Set.to_string(), "SET");
        assert_eq!(Op::Del.to_string(), "DEL");
    }
}
