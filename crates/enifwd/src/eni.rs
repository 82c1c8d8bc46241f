use std::collections::BTreeMap;

use orion_error::prelude::*;

use orch_core::{core_error_from_request_error, CoreReason, CoreResult, NeighborUpdate};
use orch_schema::{MacAddr, Request};

use crate::ctx::EniFwdCtx;
use crate::registry::{DpuRegistry, DpuType};
use crate::rule::{EniAclRule, RuleKind};
use crate::tables::{PRIMARY, VDPU_IDS};

// ---------------------------------------------------------------------------
// EniRecord
// ---------------------------------------------------------------------------

/// The declarative part of an ENI: identity plus its endpoint list.
#[derive(Debug, Clone)]
pub struct EniRecord {
    pub mac: MacAddr,
    /// Uppercase hex without separators, used in derived table keys.
    pub mac_key: String,
    pub vnet: String,
    pub ep_list: Vec<String>,
    pub primary_id: String,
}

impl EniRecord {
    pub fn new(mac: MacAddr, vnet: impl Into<String>) -> Self {
        Self {
            mac,
            mac_key: mac.compact(),
            vnet: vnet.into(),
            ep_list: Vec::new(),
            primary_id: String::new(),
        }
    }

    /// Derived key fragment `<vnet>_<MACKEY>`.
    pub fn to_key(&self) -> String {
        format!("{}_{}", self.vnet, self.mac_key)
    }

    /// First local endpoint in the list, if any. Multiple local endpoints
    /// are tolerated with a warning; the first one wins.
    pub fn find_local_ep(&self, dpu: &DpuRegistry) -> Option<String> {
        let mut found: Option<String> = None;
        for id in &self.ep_list {
            if dpu.dpu_type(id) == Some(DpuType::Local) {
                if let Some(ref first) = found {
                    log::warn!(
                        "multiple local endpoints for ENI {} found, proceeding with {first}",
                        self.mac
                    );
                } else {
                    found = Some(id.clone());
                }
            }
        }
        found
    }
}

// ---------------------------------------------------------------------------
// EniInfo
// ---------------------------------------------------------------------------

/// One ENI and its ACL rules. A NO_TUNNEL_TERM rule always exists; a
/// TUNNEL_TERM rule exists iff at least one endpoint is local.
pub struct EniInfo {
    record: EniRecord,
    rules: BTreeMap<RuleKind, EniAclRule>,
}

impl EniInfo {
    pub fn new(mac: MacAddr, vnet: impl Into<String>) -> Self {
        Self {
            record: EniRecord::new(mac, vnet),
            rules: BTreeMap::new(),
        }
    }

    pub fn record(&self) -> &EniRecord {
        &self.record
    }

    pub fn rule(&self, kind: RuleKind) -> Option<&EniAclRule> {
        self.rules.get(&kind)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// First materialization: take the endpoint list and primary id from the
    /// request, build the rule set, and fire every rule.
    pub fn create(&mut self, req: &Request, ctx: &mut EniFwdCtx) -> CoreResult<()> {
        if !req.has_attr(VDPU_IDS) || !req.has_attr(PRIMARY) {
            return Err(StructError::from(CoreReason::InvalidRequest)
                .with_detail("ENI forwarding request carries no endpoint list/primary"));
        }
        self.record.ep_list = req
            .attr_string_list(VDPU_IDS)
            .map_err(core_error_from_request_error)?
            .to_vec();
        self.record.primary_id = req
            .attr_string(PRIMARY)
            .map_err(core_error_from_request_error)?
            .to_string();

        self.rules.insert(
            RuleKind::NoTunnelTerm,
            EniAclRule::new(RuleKind::NoTunnelTerm, &self.record),
        );
        if self.record.find_local_ep(&ctx.dpu).is_some() {
            self.rules.insert(
                RuleKind::TunnelTerm,
                EniAclRule::new(RuleKind::TunnelTerm, &self.record),
            );
        }

        self.fire_all(ctx)
    }

    /// Only the primary id may change after creation. An unchanged primary
    /// is a no-op; a missing one is a contract violation.
    pub fn update(&mut self, req: &Request, ctx: &mut EniFwdCtx) -> CoreResult<()> {
        if !req.has_attr(PRIMARY) {
            return Err(StructError::from(CoreReason::SchemaLogic)
                .with_detail("ENI forwarding update carries no primary id"));
        }
        let primary = req.attr_string(PRIMARY).map_err(core_error_from_request_error)?;
        if primary == self.record.primary_id {
            return Ok(());
        }
        self.record.primary_id = primary.to_string();
        self.fire_all(ctx)
    }

    /// Reaction to a neighbor event. Only arrivals progress rules; explicit
    /// tear-down on neighbor loss is not supported, the rule would have to
    /// be retracted first.
    pub fn on_neighbor_update(
        &mut self,
        update: &NeighborUpdate,
        ctx: &mut EniFwdCtx,
    ) -> CoreResult<()> {
        if update.add {
            self.fire_all(ctx)?;
        }
        Ok(())
    }

    /// Tear down every rule and its ACL row.
    pub fn destroy(&mut self, ctx: &mut EniFwdCtx) {
        for rule in self.rules.values_mut() {
            rule.destroy(ctx);
        }
        self.rules.clear();
    }

    pub fn fire_all(&mut self, ctx: &mut EniFwdCtx) -> CoreResult<()> {
        let record = &self.record;
        for rule in self.rules.values_mut() {
            rule.fire(record, ctx)?;
        }
        Ok(())
    }
}
