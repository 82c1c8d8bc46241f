use std::collections::BTreeMap;
use std::net::IpAddr;

use orch_core::{
    core_error_from_request_error, Consumer, CoreResult, DrainAction, NeighborUpdate, Observer,
    SubjectEvent,
};
use orch_schema::{
    AttrType, KeyOpFieldValues, KeyType, MacAddr, Op, Request, RequestSchema,
};

use crate::ctx::{EniFwdCtx, NextHopKey};
use crate::eni::EniInfo;
use crate::registry::DpuType;
use crate::tables::{PRIMARY, VDPU_IDS};

/// Schema of the ENI-forwarding application table: `<vnet>:<mac>` keys with
/// an endpoint list and a mandatory primary id.
const ENI_FWD_SCHEMA: RequestSchema = RequestSchema {
    key_types: &[KeyType::Str, KeyType::MacAddress],
    attr_types: &[
        (VDPU_IDS, AttrType::StrList),
        (PRIMARY, AttrType::Str),
    ],
    mandatory: &[PRIMARY],
};

// ---------------------------------------------------------------------------
// EniFwdOrch
// ---------------------------------------------------------------------------

/// Owner of the ENI container and the ACL-table lifecycle.
///
/// On the first add operation it lazily populates the DPU registry and
/// speculatively requests neighbor resolution for every local endpoint, so
/// rules referencing them are likely resolvable by the time they fire.
pub struct EniFwdOrch {
    ctx: EniFwdCtx,
    enis: BTreeMap<MacAddr, EniInfo>,
    /// Local DPU id -> ENIs hosted on it; consulted on neighbor events.
    dpu_eni_map: BTreeMap<String, Vec<MacAddr>>,
    /// Local endpoint IP -> DPU id.
    neigh_dpu_map: BTreeMap<IpAddr, String>,
    initialized: bool,
}

impl EniFwdOrch {
    pub fn new(ctx: EniFwdCtx) -> Self {
        Self {
            ctx,
            enis: BTreeMap::new(),
            dpu_eni_map: BTreeMap::new(),
            neigh_dpu_map: BTreeMap::new(),
            initialized: false,
        }
    }

    pub fn ctx(&self) -> &EniFwdCtx {
        &self.ctx
    }

    pub fn eni(&self, mac: &MacAddr) -> Option<&EniInfo> {
        self.enis.get(mac)
    }

    pub fn drain(&mut self, consumer: &mut Consumer) {
        consumer.drain(|key, op, values| {
            let record = KeyOpFieldValues {
                key: key.to_string(),
                op,
                values: values.clone(),
            };
            match Request::parse(&ENI_FWD_SCHEMA, ':', &record) {
                Err(e) => log::error!("dropping malformed ENI forwarding request {key}: {e}"),
                Ok(req) => {
                    let result = match op {
                        Op::Set => self.add_operation(&req),
                        Op::Del => self.del_operation(&req),
                    };
                    if let Err(e) = result {
                        log::error!("ENI forwarding operation {key} failed: {e}");
                    }
                }
            }
            DrainAction::Consumed
        });
    }

    fn lazy_init(&mut self) -> CoreResult<()> {
        if self.initialized {
            return Ok(());
        }
        self.ctx.populate_dpu_registry();
        self.init_local_endpoints();
        self.initialized = true;
        Ok(())
    }

    /// Record local endpoints and kick off neighbor resolution for them.
    fn init_local_endpoints(&mut self) {
        for id in self.ctx.dpu.ids() {
            if self.ctx.dpu.dpu_type(&id) != Some(DpuType::Local) {
                continue;
            }
            let Some(endpoint) = self.ctx.dpu.pa_v4(&id) else {
                continue;
            };
            log::info!("local DPU endpoint detected {endpoint}");
            self.neigh_dpu_map.insert(endpoint, id.clone());

            let alias = self.ctx.nbr_alias(&endpoint);
            let nh = NextHopKey {
                ip: endpoint,
                alias,
            };
            if self.ctx.is_neighbor_resolved(&nh) {
                log::info!("neighbor already populated for local endpoint {endpoint}");
            }
            self.ctx.resolve_neighbor(&nh);
        }
    }

    fn add_operation(&mut self, req: &Request) -> CoreResult<()> {
        self.lazy_init()?;

        let vnet = req
            .key_string(0)
            .map_err(core_error_from_request_error)?
            .to_string();
        let mac = req.key_mac(1).map_err(core_error_from_request_error)?;

        if let Some(eni) = self.enis.get_mut(&mac) {
            return eni.update(req, &mut self.ctx);
        }

        let mut eni = EniInfo::new(mac, vnet);
        let result = eni.create(req, &mut self.ctx);
        if result.is_ok() {
            if let Some(local_ep) = eni.record().find_local_ep(&self.ctx.dpu) {
                self.map_eni_to_dpu(&local_ep, mac, true);
            }
        }
        self.enis.insert(mac, eni);
        result
    }

    fn del_operation(&mut self, req: &Request) -> CoreResult<()> {
        let vnet = req
            .key_string(0)
            .map_err(core_error_from_request_error)?
            .to_string();
        let mac = req.key_mac(1).map_err(core_error_from_request_error)?;

        let Some(mut eni) = self.enis.remove(&mac) else {
            log::error!("invalid del request {vnet}:{mac}");
            return Ok(());
        };
        eni.destroy(&mut self.ctx);
        if let Some(local_ep) = eni.record().find_local_ep(&self.ctx.dpu) {
            self.map_eni_to_dpu(&local_ep, mac, false);
        }
        Ok(())
    }

    fn map_eni_to_dpu(&mut self, dpu_id: &str, mac: MacAddr, add: bool) {
        if self.ctx.dpu.dpu_type(dpu_id) != Some(DpuType::Local) {
            return;
        }
        let macs = self.dpu_eni_map.entry(dpu_id.to_string()).or_default();
        if add {
            macs.push(mac);
        } else if let Some(pos) = macs.iter().position(|m| *m == mac) {
            macs.remove(pos);
        }
    }

    /// Re-fire every ENI hosted on the DPU whose endpoint just changed.
    pub fn handle_neigh_update(&mut self, update: &NeighborUpdate) {
        let Some(dpu_id) = self.neigh_dpu_map.get(&update.entry.ip).cloned() else {
            return;
        };
        log::info!("neighbor update: {}, add: {}", update.entry.ip, update.add);

        let macs = self.dpu_eni_map.get(&dpu_id).cloned().unwrap_or_default();
        for mac in macs {
            if let Some(eni) = self.enis.get_mut(&mac) {
                if let Err(e) = eni.on_neighbor_update(update, &mut self.ctx) {
                    log::error!("neighbor-driven refresh of ENI {mac} failed: {e}");
                }
            }
        }
    }
}

impl Observer for EniFwdOrch {
    fn observe(&mut self, event: &SubjectEvent) {
        match event {
            SubjectEvent::NeighborChange(update) => self.handle_neigh_update(update),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
