use orch_core::CoreResult;

use crate::ctx::EniFwdCtx;
use crate::eni::EniRecord;
use crate::nexthop::{EniNextHop, NhStatus};
use crate::registry::DpuType;
use crate::tables::{
    ACL_TABLE, ACTION_REDIRECT, MATCH_DST_IP, MATCH_INNER_DST_MAC, MATCH_TUNNEL_TERM,
    RULE_PRIORITY,
};

/// Priority base; each rule kind gets `BASE_PRIORITY + ordinal`.
pub const BASE_PRIORITY: u32 = 9996;

/// Rule flavor. Tunnel-term rules additionally match packets that arrived
/// via tunnel termination and always target a local endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RuleKind {
    NoTunnelTerm,
    TunnelTerm,
}

impl RuleKind {
    fn ordinal(self) -> u32 {
        match self {
            RuleKind::NoTunnelTerm => 0,
            RuleKind::TunnelTerm => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleState {
    Failed,
    Pending,
    Installed,
    Uninstalled,
}

/// Classification of one reconciliation pass over a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateKind {
    Invalid,
    Idempotent,
    Create,
    PrimaryUpdate,
}

// ---------------------------------------------------------------------------
// EniAclRule
// ---------------------------------------------------------------------------

/// One ACL rule owned by an ENI, driven through a small state machine:
/// PENDING -> INSTALLED -> UNINSTALLED -> PENDING ..., with FAILED as the
/// terminal state until a later update reclassifies the rule as valid.
#[derive(Debug)]
pub struct EniAclRule {
    name: String,
    kind: RuleKind,
    state: RuleState,
    nh: Option<EniNextHop>,
}

impl EniAclRule {
    pub fn new(kind: RuleKind, eni: &EniRecord) -> Self {
        let mut name = format!("{}:{}", ACL_TABLE, eni.to_key());
        if kind == RuleKind::TunnelTerm {
            name.push_str("_TERM");
        }
        Self {
            name,
            kind,
            state: RuleState::Pending,
            nh: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> RuleState {
        self.state
    }

    /// Classify this pass and rebuild the next-hop binding when the primary
    /// endpoint changed or none exists yet.
    fn process_update(&mut self, eni: &EniRecord, ctx: &mut EniFwdCtx) -> UpdateKind {
        let primary_id = if self.kind == RuleKind::TunnelTerm {
            // Tunnel-term entries always use a local endpoint regardless of
            // the primary id.
            match eni.find_local_ep(&ctx.dpu) {
                Some(id) => id,
                None => {
                    log::error!("no local endpoint was found for rule {}", self.name);
                    return UpdateKind::Invalid;
                }
            }
        } else {
            eni.primary_id.clone()
        };

        let Some(primary_type) = ctx.dpu.dpu_type(&primary_id) else {
            log::error!("no primary id {primary_id} in DPU table");
            return UpdateKind::Invalid;
        };
        let primary_endp = match primary_type {
            DpuType::Local => ctx.dpu.pa_v4(&primary_id),
            DpuType::Cluster => ctx.dpu.npu_v4(&primary_id),
        };
        let Some(primary_endp) = primary_endp else {
            log::error!("primary id {primary_id} has no usable endpoint address");
            return UpdateKind::Invalid;
        };

        let mut update = UpdateKind::PrimaryUpdate;
        match &self.nh {
            None => update = UpdateKind::Create,
            Some(nh) if nh.dpu_type() != primary_type || nh.endpoint() != primary_endp => {
                log::info!(
                    "endpoint for rule {} updated from {} -> {}",
                    self.name,
                    nh.endpoint(),
                    primary_endp
                );
            }
            Some(nh) if nh.status() == NhStatus::Resolved => {
                // Same endpoint, already resolved: nothing to write. A
                // neighbor going down on an existing local endpoint is
                // handled elsewhere.
                return UpdateKind::Idempotent;
            }
            // Same endpoint but still unresolved: rebuild and try again.
            Some(_) => {}
        }

        let mut nh = EniNextHop::create(primary_type, primary_endp);
        nh.resolve(&eni.vnet, ctx);
        self.nh = Some(nh);
        update
    }

    /// Run one reconciliation pass: classify, tear down a stale row if the
    /// primary switched, and install the row once the next-hop resolves.
    pub fn fire(&mut self, eni: &EniRecord, ctx: &mut EniFwdCtx) -> CoreResult<()> {
        let update = self.process_update(eni, ctx);

        match update {
            UpdateKind::Invalid => {
                self.set_state(RuleState::Failed);
                return Ok(());
            }
            UpdateKind::Idempotent => return Ok(()),
            UpdateKind::Create | UpdateKind::PrimaryUpdate => {}
        }

        if self.state == RuleState::Installed && update == UpdateKind::PrimaryUpdate {
            // The downstream layer cannot update a rule in place; delete the
            // old row before writing the new one.
            ctx.delete_acl_rule(&self.name);
            self.set_state(RuleState::Uninstalled);
        }

        let Some(nh) = &self.nh else {
            self.set_state(RuleState::Pending);
            return Ok(());
        };
        if nh.status() != NhStatus::Resolved {
            // Wait for the endpoint to resolve.
            self.set_state(RuleState::Pending);
            return Ok(());
        }

        let vip = ctx.vip()?;
        let mut values = vec![
            (
                RULE_PRIORITY.to_string(),
                (BASE_PRIORITY + self.kind.ordinal()).to_string(),
            ),
            (MATCH_DST_IP.to_string(), vip.to_string()),
            (MATCH_INNER_DST_MAC.to_string(), eni.mac.to_string()),
            (ACTION_REDIRECT.to_string(), nh.redirect_value()),
        ];
        if self.kind == RuleKind::TunnelTerm {
            values.push((MATCH_TUNNEL_TERM.to_string(), "true".to_string()));
        }

        ctx.create_acl_rule(&self.name, values);
        self.set_state(RuleState::Installed);
        Ok(())
    }

    /// Delete the installed row (if any) and drop the next-hop binding.
    pub fn destroy(&mut self, ctx: &mut EniFwdCtx) {
        if self.state == RuleState::Installed {
            ctx.delete_acl_rule(&self.name);
            self.nh = None;
            self.set_state(RuleState::Uninstalled);
        }
    }

    fn set_state(&mut self, state: RuleState) {
        log::info!(
            "ENI forwarding rule {}: state change {:?} -> {:?}",
            self.name,
            self.state,
            state
        );
        self.state = state;
    }
}
