use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use ipnet::IpNet;

use orch_core::{Consumer, DrainAction, NeighborEntry, NeighborUpdate, TableReader};
use orch_schema::{FieldValues, MacAddr, Op, fv_get};

use crate::ctx::{NeighborApi, NextHopKey};

// ---------------------------------------------------------------------------
// NeighborTracker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct ResolvedNeighbor {
    alias: String,
    mac: MacAddr,
}

#[derive(Default)]
struct TrackerState {
    resolved: BTreeMap<IpAddr, ResolvedNeighbor>,
    requested: BTreeSet<IpAddr>,
}

/// Mirror of the operational neighbor table, doubling as the neighbor
/// resolver collaborator.
///
/// Records arrive keyed `<alias>:<ip>` with the MAC in the `neigh` field.
/// Each applied change is reported back so the caller can publish a
/// neighbor-change notification. Resolution requests are absorbed here;
/// duplicates are ignored.
pub struct NeighborTracker {
    interfaces: Arc<dyn TableReader>,
    state: Mutex<TrackerState>,
}

impl NeighborTracker {
    /// `interfaces` is the interface-address config table, keyed
    /// `<alias>|<prefix>`; it backs [`NeighborApi::alias_of`].
    pub fn new(interfaces: Arc<dyn TableReader>) -> Self {
        Self {
            interfaces,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Apply all pending neighbor-table changes, returning the resulting
    /// updates in application order.
    pub fn drain(&self, consumer: &mut Consumer) -> Vec<NeighborUpdate> {
        let mut updates = Vec::new();
        consumer.drain(|key, op, values| {
            if let Some(update) = self.apply(key, op, values) {
                updates.push(update);
            }
            DrainAction::Consumed
        });
        updates
    }

    fn apply(&self, key: &str, op: Op, values: &FieldValues) -> Option<NeighborUpdate> {
        let Some((alias, ip_str)) = key.split_once(':') else {
            log::warn!("malformed neighbor key {key}");
            return None;
        };
        let Ok(ip) = ip_str.parse::<IpAddr>() else {
            log::warn!("malformed neighbor address in key {key}");
            return None;
        };

        let mut state = self.state.lock().expect("neighbor tracker lock");
        match op {
            Op::Set => {
                let mac: MacAddr = match fv_get(values, "neigh").map(str::parse) {
                    Some(Ok(mac)) => mac,
                    _ => {
                        log::warn!("neighbor {key} carries no usable mac");
                        return None;
                    }
                };
                state.resolved.insert(
                    ip,
                    ResolvedNeighbor {
                        alias: alias.to_string(),
                        mac,
                    },
                );
                state.requested.remove(&ip);
                Some(NeighborUpdate {
                    entry: NeighborEntry {
                        ip,
                        alias: alias.to_string(),
                    },
                    mac,
                    add: true,
                })
            }
            Op::Del => state.resolved.remove(&ip).map(|old| NeighborUpdate {
                entry: NeighborEntry {
                    ip,
                    alias: old.alias,
                },
                mac: old.mac,
                add: false,
            }),
        }
    }
}

impl NeighborApi for NeighborTracker {
    fn is_resolved(&self, nh: &NextHopKey) -> bool {
        self.state
            .lock()
            .expect("neighbor tracker lock")
            .resolved
            .get(&nh.ip)
            .is_some_and(|n| nh.alias.is_empty() || n.alias == nh.alias)
    }

    fn resolve(&self, nh: &NextHopKey) {
        let mut state = self.state.lock().expect("neighbor tracker lock");
        if state.resolved.contains_key(&nh.ip) {
            return;
        }
        if state.requested.insert(nh.ip) {
            log::debug!("neighbor resolution requested for {}", nh.ip);
        }
    }

    fn alias_of(&self, ip: &IpAddr) -> Option<String> {
        for key in self.interfaces.keys() {
            let Some((alias, prefix)) = key.split_once('|') else {
                continue;
            };
            if prefix.parse::<IpNet>().is_ok_and(|net| net.contains(ip)) {
                return Some(alias.to_string());
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use orch_core::{MemoryTable, ProducerTable};
    use orch_schema::KeyOpFieldValues;

    fn tracker() -> NeighborTracker {
        let interfaces = MemoryTable::new("INTERFACE");
        interfaces.set(
            "Vlan1000|10.0.0.0/24",
            vec![("NULL".to_string(), "NULL".to_string())],
        );
        NeighborTracker::new(Arc::new(interfaces))
    }

    fn nh(ip: &str, alias: &str) -> NextHopKey {
        NextHopKey {
            ip: ip.parse().unwrap(),
            alias: alias.to_string(),
        }
    }

    #[test]
    fn set_marks_resolved_and_reports_update() {
        let tracker = tracker();
        let mut consumer = Consumer::new("NEIGH_TABLE");
        consumer.stage(KeyOpFieldValues::set(
            "Vlan1000:10.0.0.1",
            vec![("neigh".to_string(), "aa:bb:cc:dd:ee:ff".to_string())],
        ));

        let updates = tracker.drain(&mut consumer);
        assert_eq!(updates.len(), 1);
        assert!(updates[0].add);
        assert_eq!(updates[0].entry.ip.to_string(), "10.0.0.1");
        assert!(tracker.is_resolved(&nh("10.0.0.1", "Vlan1000")));
        assert!(!tracker.is_resolved(&nh("10.0.0.1", "Vlan2000")));
        assert!(!tracker.is_resolved(&nh("10.0.0.2", "Vlan1000")));
    }

    #[test]
    fn del_reports_removal() {
        let tracker = tracker();
        let mut consumer = Consumer::new("NEIGH_TABLE");
        consumer.stage(KeyOpFieldValues::set(
            "Vlan1000:10.0.0.1",
            vec![("neigh".to_string(), "aa:bb:cc:dd:ee:ff".to_string())],
        ));
        tracker.drain(&mut consumer);

        consumer.stage(KeyOpFieldValues::del("Vlan1000:10.0.0.1"));
        let updates = tracker.drain(&mut consumer);
        assert_eq!(updates.len(), 1);
        assert!(!updates[0].add);
        assert!(!tracker.is_resolved(&nh("10.0.0.1", "Vlan1000")));

        // Deleting an unknown neighbor reports nothing.
        consumer.stage(KeyOpFieldValues::del("Vlan1000:10.0.0.7"));
        assert!(tracker.drain(&mut consumer).is_empty());
    }

    #[test]
    fn ipv6_neighbor_keys_parse() {
        let tracker = tracker();
        let mut consumer = Consumer::new("NEIGH_TABLE");
        consumer.stage(KeyOpFieldValues::set(
            "Vlan1000:fc00::1",
            vec![("neigh".to_string(), "aa:bb:cc:dd:ee:ff".to_string())],
        ));
        let updates = tracker.drain(&mut consumer);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].entry.ip.to_string(), "fc00::1");
    }

    #[test]
    fn alias_lookup_by_containment() {
        let tracker = tracker();
        assert_eq!(
            tracker.alias_of(&"10.0.0.1".parse().unwrap()).unwrap(),
            "Vlan1000"
        );
        assert!(tracker.alias_of(&"192.168.0.1".parse().unwrap()).is_none());
    }

    #[test]
    fn resolve_request_absorbed_once_resolved() {
        let tracker = tracker();
        tracker.resolve(&nh("10.0.0.1", "Vlan1000"));
        tracker.resolve(&nh("10.0.0.1", "Vlan1000"));
        assert_eq!(tracker.state.lock().unwrap().requested.len(), 1);

        let mut consumer = Consumer::new("NEIGH_TABLE");
        consumer.stage(KeyOpFieldValues::set(
            "Vlan1000:10.0.0.1",
            vec![("neigh".to_string(), "aa:bb:cc:dd:ee:ff".to_string())],
        ));
        tracker.drain(&mut consumer);

        tracker.resolve(&nh("10.0.0.1", "Vlan1000"));
        assert!(tracker.state.lock().unwrap().requested.is_empty());
    }
}
