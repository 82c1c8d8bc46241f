use std::collections::BTreeMap;
use std::sync::Arc;

use orch_core::TableReader;

use crate::ctx::{PortEntry, PortKind, PortsApi, VnetApi};

// ---------------------------------------------------------------------------
// TablePortsApi
// ---------------------------------------------------------------------------

/// Port registry fed from the port configuration table. Each row carries a
/// `type` field (`PHY`/`LAG`/`VLAN`, default `PHY`) and an optional
/// comma-separated `members` list for LAGs.
pub struct TablePortsApi {
    ports: Arc<dyn TableReader>,
}

impl TablePortsApi {
    pub fn new(ports: Arc<dyn TableReader>) -> Self {
        Self { ports }
    }
}

impl PortsApi for TablePortsApi {
    fn all_ports(&self) -> BTreeMap<String, PortEntry> {
        let mut out = BTreeMap::new();
        for key in self.ports.keys() {
            let kind = match self.ports.hget(&key, "type").as_deref() {
                Some("LAG") => PortKind::Lag,
                Some("VLAN") => PortKind::Vlan,
                _ => PortKind::Phy,
            };
            let members = self
                .ports
                .hget(&key, "members")
                .map(|m| m.split(',').map(str::to_string).collect())
                .unwrap_or_default();
            out.insert(key, PortEntry { kind, members });
        }
        out
    }
}

// ---------------------------------------------------------------------------
// TableVnetApi
// ---------------------------------------------------------------------------

/// VNET registry fed from the VNET configuration table. Each row carries a
/// `vni` and the name of its `tunnel`.
pub struct TableVnetApi {
    vnets: Arc<dyn TableReader>,
}

impl TableVnetApi {
    pub fn new(vnets: Arc<dyn TableReader>) -> Self {
        Self { vnets }
    }
}

impl VnetApi for TableVnetApi {
    fn vni(&self, vnet: &str) -> Option<u64> {
        self.vnets.hget(vnet, "vni").and_then(|v| v.parse().ok())
    }

    fn tunnel(&self, vnet: &str) -> Option<String> {
        self.vnets.hget(vnet, "tunnel")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
