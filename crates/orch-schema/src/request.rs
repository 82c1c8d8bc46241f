use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use ipnet::IpNet;

use crate::kv::{KeyOpFieldValues, Op};
use crate::types::{MacAddr, PacketAction, parse_vlan};

// ---------------------------------------------------------------------------
// Schema description
// ---------------------------------------------------------------------------

/// Type of one positional key item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Str,
    MacAddress,
    Ip,
    IpPrefix,
    Uint,
}

/// Type of one named attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrType {
    Str,
    Bool,
    MacAddress,
    Ip,
    IpPrefix,
    Uint,
    Vlan,
    PacketAction,
    StringSet,
    StrList,
    BoolList,
    MacList,
    IpList,
    UintList,
}

/// Declarative description of one inbound table: positional key item types,
/// the attribute vocabulary, and which attributes a `SET` must carry.
pub struct RequestSchema {
    pub key_types: &'static [KeyType],
    pub attr_types: &'static [(&'static str, AttrType)],
    pub mandatory: &'static [&'static str],
}

impl RequestSchema {
    fn attr_type(&self, name: &str) -> Option<AttrType> {
        self.attr_types
            .iter()
            .find(|(attr, _)| *attr == name)
            .map(|(_, ty)| *ty)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Parse failure classification.
///
/// `Invalid` is a malformed inbound record (user error); `Logic` is a schema
/// bug or a typed getter used against the wrong slot (programming error).
/// Neither leaves partial state behind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("request logic error: {0}")]
    Logic(String),
}

pub type RequestResult<T> = Result<T, RequestError>;

fn invalid(msg: impl Into<String>) -> RequestError {
    RequestError::Invalid(msg.into())
}

fn logic(msg: impl Into<String>) -> RequestError {
    RequestError::Logic(msg.into())
}

// ---------------------------------------------------------------------------
// Parsed values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum KeyValue {
    Str(String),
    Mac(MacAddr),
    Ip(IpAddr),
    Prefix(IpNet),
    Uint(u64),
}

#[derive(Debug, Clone, PartialEq)]
enum AttrValue {
    Str(String),
    Bool(bool),
    Mac(MacAddr),
    Ip(IpAddr),
    Prefix(IpNet),
    Uint(u64),
    Vlan(u16),
    Action(PacketAction),
    StrSet(BTreeSet<String>),
    StrList(Vec<String>),
    BoolList(Vec<bool>),
    MacList(Vec<MacAddr>),
    IpList(Vec<IpAddr>),
    UintList(Vec<u64>),
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A validated, read-only view of one change record.
#[derive(Debug)]
pub struct Request {
    op: Op,
    full_key: String,
    key_items: Vec<KeyValue>,
    attrs: BTreeMap<String, AttrValue>,
}

impl Request {
    /// Validate `record` against `schema` and produce a typed request.
    ///
    /// Key repair: when the separator is `:`, the split produced more items
    /// than the schema expects, and the last schema slot is an IP, IP prefix,
    /// or MAC, the trailing excess is rejoined with `:` before type checking.
    /// This is what lets an IPv6 address or a MAC live in the last key slot
    /// of a `:`-separated key.
    pub fn parse(
        schema: &RequestSchema,
        separator: char,
        record: &KeyOpFieldValues,
    ) -> RequestResult<Self> {
        let key_items = parse_key(schema, separator, &record.key)?;
        let attrs = parse_attrs(schema, record)?;
        Ok(Self {
            op: record.op,
            full_key: record.key.clone(),
            key_items,
            attrs,
        })
    }

    pub fn op(&self) -> Op {
        self.op
    }

    pub fn full_key(&self) -> &str {
        &self.full_key
    }

    /// Names of the attributes present on this request.
    pub fn attr_names(&self) -> BTreeSet<&str> {
        self.attrs.keys().map(String::as_str).collect()
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    pub fn key_string(&self, index: usize) -> RequestResult<&str> {
        match self.key_item(index)? {
            KeyValue::Str(s) => Ok(s),
            other => Err(logic(format!("key item {index} is not a string: {other:?}"))),
        }
    }

    pub fn key_mac(&self, index: usize) -> RequestResult<MacAddr> {
        match self.key_item(index)? {
            KeyValue::Mac(mac) => Ok(*mac),
            other => Err(logic(format!("key item {index} is not a mac: {other:?}"))),
        }
    }

    pub fn key_ip(&self, index: usize) -> RequestResult<IpAddr> {
        match self.key_item(index)? {
            KeyValue::Ip(ip) => Ok(*ip),
            other => Err(logic(format!("key item {index} is not an ip: {other:?}"))),
        }
    }

    pub fn key_prefix(&self, index: usize) -> RequestResult<IpNet> {
        match self.key_item(index)? {
            KeyValue::Prefix(p) => Ok(*p),
            other => Err(logic(format!("key item {index} is not a prefix: {other:?}"))),
        }
    }

    pub fn key_uint(&self, index: usize) -> RequestResult<u64> {
        match self.key_item(index)? {
            KeyValue::Uint(v) => Ok(*v),
            other => Err(logic(format!("key item {index} is not a uint: {other:?}"))),
        }
    }

    pub fn attr_string(&self, name: &str) -> RequestResult<&str> {
        match self.attr(name)? {
            AttrValue::Str(s) => Ok(s),
            other => Err(logic(format!("attribute {name:?} is not a string: {other:?}"))),
        }
    }

    pub fn attr_bool(&self, name: &str) -> RequestResult<bool> {
        match self.attr(name)? {
            AttrValue::Bool(b) => Ok(*b),
            other => Err(logic(format!("attribute {name:?} is not a bool: {other:?}"))),
        }
    }

    pub fn attr_mac(&self, name: &str) -> RequestResult<MacAddr> {
        match self.attr(name)? {
            AttrValue::Mac(mac) => Ok(*mac),
            other => Err(logic(format!("attribute {name:?} is not a mac: {other:?}"))),
        }
    }

    pub fn attr_ip(&self, name: &str) -> RequestResult<IpAddr> {
        match self.attr(name)? {
            AttrValue::Ip(ip) => Ok(*ip),
            other => Err(logic(format!("attribute {name:?} is not an ip: {other:?}"))),
        }
    }

    pub fn attr_prefix(&self, name: &str) -> RequestResult<IpNet> {
        match self.attr(name)? {
            AttrValue::Prefix(p) => Ok(*p),
            other => Err(logic(format!("attribute {name:?} is not a prefix: {other:?}"))),
        }
    }

    pub fn attr_uint(&self, name: &str) -> RequestResult<u64> {
        match self.attr(name)? {
            AttrValue::Uint(v) => Ok(*v),
            other => Err(logic(format!("attribute {name:?} is not a uint: {other:?}"))),
        }
    }

    pub fn attr_vlan(&self, name: &str) -> RequestResult<u16> {
        match self.attr(name)? {
            AttrValue::Vlan(v) => Ok(*v),
            other => Err(logic(format!("attribute {name:?} is not a vlan: {other:?}"))),
        }
    }

    pub fn attr_packet_action(&self, name: &str) -> RequestResult<PacketAction> {
        match self.attr(name)? {
            AttrValue::Action(a) => Ok(*a),
            other => Err(logic(format!(
                "attribute {name:?} is not a packet action: {other:?}"
            ))),
        }
    }

    pub fn attr_string_set(&self, name: &str) -> RequestResult<&BTreeSet<String>> {
        match self.attr(name)? {
            AttrValue::StrSet(s) => Ok(s),
            other => Err(logic(format!(
                "attribute {name:?} is not a string set: {other:?}"
            ))),
        }
    }

    pub fn attr_string_list(&self, name: &str) -> RequestResult<&[String]> {
        match self.attr(name)? {
            AttrValue::StrList(v) => Ok(v),
            other => Err(logic(format!(
                "attribute {name:?} is not a string list: {other:?}"
            ))),
        }
    }

    pub fn attr_ip_list(&self, name: &str) -> RequestResult<&[IpAddr]> {
        match self.attr(name)? {
            AttrValue::IpList(v) => Ok(v),
            other => Err(logic(format!(
                "attribute {name:?} is not an ip list: {other:?}"
            ))),
        }
    }

    pub fn attr_mac_list(&self, name: &str) -> RequestResult<&[MacAddr]> {
        match self.attr(name)? {
            AttrValue::MacList(v) => Ok(v),
            other => Err(logic(format!(
                "attribute {name:?} is not a mac list: {other:?}"
            ))),
        }
    }

    pub fn attr_uint_list(&self, name: &str) -> RequestResult<&[u64]> {
        match self.attr(name)? {
            AttrValue::UintList(v) => Ok(v),
            other => Err(logic(format!(
                "attribute {name:?} is not a uint list: {other:?}"
            ))),
        }
    }

    pub fn attr_bool_list(&self, name: &str) -> RequestResult<&[bool]> {
        match self.attr(name)? {
            AttrValue::BoolList(v) => Ok(v),
            other => Err(logic(format!(
                "attribute {name:?} is not a bool list: {other:?}"
            ))),
        }
    }

    fn key_item(&self, index: usize) -> RequestResult<&KeyValue> {
        self.key_items
            .get(index)
            .ok_or_else(|| logic(format!("key item index {index} out of range")))
    }

    fn attr(&self, name: &str) -> RequestResult<&AttrValue> {
        self.attrs
            .get(name)
            .ok_or_else(|| logic(format!("attribute {name:?} not present")))
    }
}

// ---------------------------------------------------------------------------
// Key parsing
// ---------------------------------------------------------------------------

fn parse_key(
    schema: &RequestSchema,
    separator: char,
    full_key: &str,
) -> RequestResult<Vec<KeyValue>> {
    let expected = schema.key_types.len();
    if expected == 0 {
        return Err(logic("schema declares no key items".to_string()));
    }

    let mut items: Vec<String> = full_key.split(separator).map(str::to_string).collect();

    // IPv6/MAC disambiguation: the value in the last slot may itself contain
    // the `:` separator, in which case the split above over-fragments it.
    let last_repairable = matches!(
        schema.key_types.last(),
        Some(KeyType::Ip | KeyType::IpPrefix | KeyType::MacAddress)
    );
    if separator == ':' && items.len() > expected && last_repairable {
        let tail = items.split_off(expected - 1);
        items.push(tail.join(":"));
    }

    if items.len() != expected {
        return Err(invalid(format!(
            "wrong number of key items, expected {expected}, key: {full_key:?}"
        )));
    }

    schema
        .key_types
        .iter()
        .zip(items)
        .map(|(ty, item)| parse_key_item(*ty, &item))
        .collect()
}

fn parse_key_item(ty: KeyType, item: &str) -> RequestResult<KeyValue> {
    match ty {
        KeyType::Str => Ok(KeyValue::Str(item.to_string())),
        KeyType::MacAddress => Ok(KeyValue::Mac(parse_mac(item)?)),
        KeyType::Ip => Ok(KeyValue::Ip(parse_ip(item)?)),
        KeyType::IpPrefix => Ok(KeyValue::Prefix(parse_prefix(item)?)),
        KeyType::Uint => Ok(KeyValue::Uint(parse_uint(item)?)),
    }
}

// ---------------------------------------------------------------------------
// Attribute parsing
// ---------------------------------------------------------------------------

fn parse_attrs(
    schema: &RequestSchema,
    record: &KeyOpFieldValues,
) -> RequestResult<BTreeMap<String, AttrValue>> {
    let mut attrs = BTreeMap::new();

    for (name, value) in &record.values {
        // The transport requires at least one field on SET; a placeholder
        // field named "empty" or "NULL" carries no payload.
        if name == "empty" || name == "NULL" {
            continue;
        }
        let Some(ty) = schema.attr_type(name) else {
            return Err(invalid(format!("unknown attribute name: {name}")));
        };
        attrs.insert(name.clone(), parse_attr_value(ty, value)?);
    }

    if record.op == Op::Del && !attrs.is_empty() {
        return Err(invalid("delete operation request contains attributes"));
    }

    if record.op == Op::Set {
        for name in schema.mandatory {
            if !attrs.contains_key(*name) {
                return Err(invalid(format!("mandatory attribute {name:?} not found")));
            }
        }
    }

    Ok(attrs)
}

fn parse_attr_value(ty: AttrType, value: &str) -> RequestResult<AttrValue> {
    match ty {
        AttrType::Str => Ok(AttrValue::Str(value.to_string())),
        AttrType::Bool => Ok(AttrValue::Bool(parse_bool(value)?)),
        AttrType::MacAddress => Ok(AttrValue::Mac(parse_mac(value)?)),
        AttrType::Ip => Ok(AttrValue::Ip(parse_ip(value)?)),
        AttrType::IpPrefix => Ok(AttrValue::Prefix(parse_prefix(value)?)),
        AttrType::Uint => Ok(AttrValue::Uint(parse_uint(value)?)),
        AttrType::Vlan => Ok(AttrValue::Vlan(
            parse_vlan(value).map_err(|e| invalid(e.to_string()))?,
        )),
        AttrType::PacketAction => Ok(AttrValue::Action(
            value.parse().map_err(|e: anyhow::Error| invalid(e.to_string()))?,
        )),
        AttrType::StringSet => Ok(AttrValue::StrSet(
            value.split(',').map(str::to_string).collect(),
        )),
        AttrType::StrList => Ok(AttrValue::StrList(
            value.split(',').map(str::to_string).collect(),
        )),
        AttrType::BoolList => Ok(AttrValue::BoolList(parse_list(value, parse_bool)?)),
        AttrType::MacList => Ok(AttrValue::MacList(parse_list(value, parse_mac)?)),
        AttrType::IpList => Ok(AttrValue::IpList(parse_list(value, parse_ip)?)),
        AttrType::UintList => Ok(AttrValue::UintList(parse_list(value, parse_uint)?)),
    }
}

// ---------------------------------------------------------------------------
// Scalar helpers
// ---------------------------------------------------------------------------

fn parse_bool(s: &str) -> RequestResult<bool> {
    match s {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(invalid(format!("can't parse boolean value {s:?}"))),
    }
}

fn parse_mac(s: &str) -> RequestResult<MacAddr> {
    s.parse().map_err(|_| invalid(format!("invalid mac address: {s}")))
}

fn parse_ip(s: &str) -> RequestResult<IpAddr> {
    s.parse().map_err(|_| invalid(format!("invalid ip address: {s}")))
}

fn parse_prefix(s: &str) -> RequestResult<IpNet> {
    s.parse().map_err(|_| invalid(format!("invalid ip prefix: {s}")))
}

fn parse_uint(s: &str) -> RequestResult<u64> {
    s.parse()
        .map_err(|_| invalid(format!("invalid unsigned integer: {s}")))
}

fn parse_list<T>(
    s: &str,
    item: impl Fn(&str) -> RequestResult<T>,
) -> RequestResult<Vec<T>> {
    s.split(',').map(|part| item(part)).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
