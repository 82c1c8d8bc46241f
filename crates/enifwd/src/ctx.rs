use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::Arc;

use ipnet::IpNet;
use orion_error::prelude::*;

use orch_core::{CoreReason, CoreResult, ProducerTable, TableReader};
use orch_schema::FieldValues;

use crate::registry::DpuRegistry;
use crate::tables::{
    ACL_TABLE, ACL_TABLE_TYPE, ACTION_REDIRECT, BIND_POINT_TYPE_PORT,
    BIND_POINT_TYPE_PORTCHANNEL, MATCH_DST_IP, MATCH_INNER_DST_MAC, MATCH_TUNNEL_TERM,
    PORT_ROLE, PORT_ROLE_DPC, STAGE_INGRESS, TABLE_DESCRIPTION, TABLE_PORTS, TABLE_STAGE,
    TABLE_TYPE_ACTIONS, TABLE_TYPE_BPOINT_TYPES, TABLE_TYPE_FIELD, TABLE_TYPE_MATCHES,
};

// ---------------------------------------------------------------------------
// Collaborator contracts
// ---------------------------------------------------------------------------

/// Identity handed to the neighbor service: the IP plus the interface alias
/// that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextHopKey {
    pub ip: IpAddr,
    pub alias: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Phy,
    Lag,
    Vlan,
}

#[derive(Debug, Clone)]
pub struct PortEntry {
    pub kind: PortKind,
    pub members: BTreeSet<String>,
}

/// Port registry collaborator.
pub trait PortsApi: Send + Sync {
    fn all_ports(&self) -> BTreeMap<String, PortEntry>;
}

/// Neighbor resolver collaborator. `resolve` absorbs duplicate requests.
pub trait NeighborApi: Send + Sync {
    fn is_resolved(&self, nh: &NextHopKey) -> bool;
    fn resolve(&self, nh: &NextHopKey);
    fn alias_of(&self, ip: &IpAddr) -> Option<String>;
}

/// VNET registry collaborator.
pub trait VnetApi: Send + Sync {
    fn vni(&self, vnet: &str) -> Option<u64>;
    fn tunnel(&self, vnet: &str) -> Option<String>;
}

pub struct EniFwdServices {
    pub ports: Arc<dyn PortsApi>,
    pub neighbors: Arc<dyn NeighborApi>,
    pub vnets: Arc<dyn VnetApi>,
}

pub struct EniFwdTables {
    pub port_cfg: Arc<dyn TableReader>,
    pub vip_cfg: Arc<dyn TableReader>,
    pub dpu_cfg: Arc<dyn TableReader>,
    pub remote_dpu_cfg: Arc<dyn TableReader>,
    pub vdpu_cfg: Arc<dyn TableReader>,
    pub acl_rules: Arc<dyn ProducerTable>,
    pub acl_tables: Arc<dyn ProducerTable>,
    pub acl_table_types: Arc<dyn ProducerTable>,
}

// ---------------------------------------------------------------------------
// EniFwdCtx
// ---------------------------------------------------------------------------

/// Shared context for the ENI-forwarding orchestrator: the DPU registry,
/// collaborator handles, the ACL producer tables, and the reference-counted
/// ACL-table lifecycle. ENIs borrow this read-mostly context; it never holds
/// references back to them.
pub struct EniFwdCtx {
    pub dpu: DpuRegistry,
    services: EniFwdServices,
    tables: EniFwdTables,
    /// Count of installed ACL rules. The ACL table and its table type exist
    /// iff this is non-zero.
    rule_count: u32,
    /// Endpoint-IP to interface-alias cache.
    nh_alias: BTreeMap<IpAddr, String>,
    /// One VIP per cluster, inferred from config on first use.
    vip: Option<IpNet>,
}

impl EniFwdCtx {
    pub fn new(services: EniFwdServices, tables: EniFwdTables) -> Self {
        Self {
            dpu: DpuRegistry::default(),
            services,
            tables,
            rule_count: 0,
            nh_alias: BTreeMap::new(),
            vip: None,
        }
    }

    pub fn populate_dpu_registry(&mut self) {
        let Self { dpu, tables, .. } = self;
        dpu.populate(
            tables.dpu_cfg.as_ref(),
            tables.remote_dpu_cfg.as_ref(),
            tables.vdpu_cfg.as_ref(),
        );
    }

    /// The system VIP every rule matches on. Cached after the first read; an
    /// unpopulated or malformed VIP table is a configuration invariant
    /// violation.
    pub fn vip(&mut self) -> CoreResult<IpNet> {
        if let Some(vip) = self.vip {
            return Ok(vip);
        }
        let keys = self.tables.vip_cfg.keys();
        let Some(first) = keys.first() else {
            return Err(
                StructError::from(CoreReason::Invariant).with_detail("VIP info not populated")
            );
        };
        let vip: IpNet = first.parse().map_err(|_| {
            StructError::from(CoreReason::Invariant)
                .with_detail(format!("VIP is not formatted correctly: {first}"))
        })?;
        log::info!("VIP found: {vip}");
        self.vip = Some(vip);
        Ok(vip)
    }

    pub fn nbr_alias(&mut self, ip: &IpAddr) -> String {
        if let Some(alias) = self.nh_alias.get(ip) {
            return alias.clone();
        }
        let alias = self.services.neighbors.alias_of(ip).unwrap_or_default();
        if !alias.is_empty() {
            self.nh_alias.insert(*ip, alias.clone());
        }
        alias
    }

    pub fn is_neighbor_resolved(&self, nh: &NextHopKey) -> bool {
        self.services.neighbors.is_resolved(nh)
    }

    pub fn resolve_neighbor(&self, nh: &NextHopKey) {
        self.services.neighbors.resolve(nh);
    }

    pub fn find_vnet_vni(&self, vnet: &str) -> Option<u64> {
        self.services.vnets.vni(vnet)
    }

    pub fn find_vnet_tunnel(&self, vnet: &str) -> Option<String> {
        self.services.vnets.tunnel(vnet)
    }

    // -- ACL table lifecycle -------------------------------------------------

    pub fn rule_count(&self) -> u32 {
        self.rule_count
    }

    pub fn create_acl_rule(&mut self, rule: &str, values: FieldValues) {
        if self.rule_count == 0 {
            self.add_acl_table();
        }
        self.rule_count += 1;
        log::info!("creating ACL rule {rule}, forwarding rule count: {}", self.rule_count);
        self.tables.acl_rules.set(rule, values);
    }

    pub fn delete_acl_rule(&mut self, rule: &str) {
        self.tables.acl_rules.del(rule);
        if self.rule_count > 0 {
            self.rule_count -= 1;
            log::info!("deleted ACL rule {rule}, forwarding rule count: {}", self.rule_count);
            if self.rule_count == 0 {
                self.delete_acl_table();
            }
        } else {
            log::error!("attempted to delete ACL rule {rule} but rule count is already 0");
        }
    }

    fn add_acl_table(&self) {
        let matches = [MATCH_DST_IP, MATCH_INNER_DST_MAC, MATCH_TUNNEL_TERM].join(",");
        let bpoint_types = [BIND_POINT_TYPE_PORT, BIND_POINT_TYPE_PORTCHANNEL].join(",");
        self.tables.acl_table_types.set(
            ACL_TABLE_TYPE,
            vec![
                (TABLE_TYPE_MATCHES.to_string(), matches),
                (TABLE_TYPE_ACTIONS.to_string(), ACTION_REDIRECT.to_string()),
                (TABLE_TYPE_BPOINT_TYPES.to_string(), bpoint_types),
            ],
        );

        self.tables.acl_tables.set(
            ACL_TABLE,
            vec![
                (
                    TABLE_DESCRIPTION.to_string(),
                    "Rules for ENI-based forwarding".to_string(),
                ),
                (TABLE_TYPE_FIELD.to_string(), ACL_TABLE_TYPE.to_string()),
                (TABLE_STAGE.to_string(), STAGE_INGRESS.to_string()),
                (TABLE_PORTS.to_string(), self.bind_points().join(",")),
            ],
        );
    }

    fn delete_acl_table(&self) {
        self.tables.acl_tables.del(ACL_TABLE);
        self.tables.acl_table_types.del(ACL_TABLE_TYPE);
    }

    // -- bind points ---------------------------------------------------------

    /// External-facing attachment points: every PHY and LAG port, minus LAG
    /// members, minus internal DPU-facing ports.
    pub fn bind_points(&self) -> Vec<String> {
        let internal = self.internal_ports();
        let all_ports = self.services.ports.all_ports();

        let mut legit: BTreeSet<String> = all_ports
            .iter()
            .filter(|(_, entry)| matches!(entry.kind, PortKind::Phy | PortKind::Lag))
            .map(|(name, _)| name.clone())
            .collect();

        for entry in all_ports.values() {
            if entry.kind == PortKind::Lag {
                for member in &entry.members {
                    legit.remove(member);
                }
            }
        }

        legit
            .into_iter()
            .filter(|port| !internal.contains(port))
            .collect()
    }

    fn internal_ports(&self) -> BTreeSet<String> {
        self.tables
            .port_cfg
            .keys()
            .into_iter()
            .filter(|port| {
                self.tables
                    .port_cfg
                    .hget(port, PORT_ROLE)
                    .is_some_and(|role| role == PORT_ROLE_DPC)
            })
            .collect()
    }
}
