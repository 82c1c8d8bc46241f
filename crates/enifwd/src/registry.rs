use std::collections::BTreeMap;
use std::net::IpAddr;

use orch_core::TableReader;
use orch_schema::{AttrType, KeyOpFieldValues, KeyType, Request, RequestSchema};

use crate::tables::{DPU_IDS, NPU_V4, NPU_V6, PA_V4, PA_V6, STATE};

// ---------------------------------------------------------------------------
// Schemas
// ---------------------------------------------------------------------------

const DPU_SCHEMA: RequestSchema = RequestSchema {
    key_types: &[KeyType::Str],
    attr_types: &[
        (STATE, AttrType::Str),
        (PA_V4, AttrType::Ip),
        (PA_V6, AttrType::Ip),
    ],
    mandatory: &[STATE, PA_V4],
};

const REMOTE_DPU_SCHEMA: RequestSchema = RequestSchema {
    key_types: &[KeyType::Str],
    attr_types: &[
        (PA_V4, AttrType::Ip),
        (PA_V6, AttrType::Ip),
        (NPU_V4, AttrType::Ip),
        (NPU_V6, AttrType::Ip),
    ],
    mandatory: &[PA_V4, NPU_V4],
};

const VDPU_SCHEMA: RequestSchema = RequestSchema {
    key_types: &[KeyType::Str],
    attr_types: &[(DPU_IDS, AttrType::StrList)],
    mandatory: &[DPU_IDS],
};

// ---------------------------------------------------------------------------
// DpuRegistry
// ---------------------------------------------------------------------------

/// Whether a DPU sits behind this switch or elsewhere in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DpuType {
    Local,
    Cluster,
}

#[derive(Debug, Clone)]
pub struct DpuData {
    pub dpu_type: DpuType,
    pub pa_v4: IpAddr,
    pub npu_v4: Option<IpAddr>,
}

/// Read-only lookup table over the DPU, REMOTE_DPU and vDPU configuration.
///
/// Populated once at lazy init and immutable afterwards. A vDPU resolves to
/// its first DPU; references to DPUs absent from the DPU tables are dropped
/// with a warning.
#[derive(Debug, Default)]
pub struct DpuRegistry {
    dpus: BTreeMap<String, DpuData>,
    vdpus: BTreeMap<String, Vec<String>>,
}

impl DpuRegistry {
    pub fn populate(
        &mut self,
        dpu_tbl: &dyn TableReader,
        remote_tbl: &dyn TableReader,
        vdpu_tbl: &dyn TableReader,
    ) {
        self.process_dpu_table(dpu_tbl);
        self.process_remote_dpu_table(remote_tbl);
        self.process_vdpu_table(vdpu_tbl);
    }

    fn process_dpu_table(&mut self, tbl: &dyn TableReader) {
        for key in tbl.keys() {
            let Some(req) = parse_row(tbl, &key, &DPU_SCHEMA) else {
                continue;
            };
            // A DPU marked down never becomes a forwarding target.
            if req.has_attr(STATE) && req.attr_string(STATE).is_ok_and(|s| s == "down") {
                log::info!("skipping local DPU {key}: state is down");
                continue;
            }
            let Ok(pa_v4) = req.attr_ip(PA_V4) else {
                continue;
            };
            log::info!("local DPU {key} found, pa_v4: {pa_v4}");
            self.dpus.insert(
                key,
                DpuData {
                    dpu_type: DpuType::Local,
                    pa_v4,
                    npu_v4: None,
                },
            );
        }
    }

    fn process_remote_dpu_table(&mut self, tbl: &dyn TableReader) {
        for key in tbl.keys() {
            let Some(req) = parse_row(tbl, &key, &REMOTE_DPU_SCHEMA) else {
                continue;
            };
            let (Ok(pa_v4), Ok(npu_v4)) = (req.attr_ip(PA_V4), req.attr_ip(NPU_V4)) else {
                continue;
            };
            log::info!("remote DPU {key} found, pa_v4: {pa_v4}, npu_v4: {npu_v4}");
            self.dpus.insert(
                key,
                DpuData {
                    dpu_type: DpuType::Cluster,
                    pa_v4,
                    npu_v4: Some(npu_v4),
                },
            );
        }
    }

    fn process_vdpu_table(&mut self, tbl: &dyn TableReader) {
        for key in tbl.keys() {
            let Some(req) = parse_row(tbl, &key, &VDPU_SCHEMA) else {
                continue;
            };
            let Ok(dpu_ids) = req.attr_string_list(DPU_IDS) else {
                continue;
            };
            for dpu_id in dpu_ids {
                if self.dpus.contains_key(dpu_id) {
                    log::info!("DPU {dpu_id} belongs to vDPU {key}");
                    self.vdpus.entry(key.clone()).or_default().push(dpu_id.clone());
                } else {
                    log::warn!("invalid DPU id {dpu_id}, not found in DPU/REMOTE_DPU table");
                }
            }
        }
    }

    /// All known vDPU ids.
    pub fn ids(&self) -> Vec<String> {
        self.vdpus.keys().cloned().collect()
    }

    fn primary_dpu(&self, vdpu_id: &str) -> Option<&DpuData> {
        self.vdpus
            .get(vdpu_id)
            .and_then(|ids| ids.first())
            .and_then(|id| self.dpus.get(id))
    }

    pub fn dpu_type(&self, vdpu_id: &str) -> Option<DpuType> {
        self.primary_dpu(vdpu_id).map(|d| d.dpu_type)
    }

    pub fn pa_v4(&self, vdpu_id: &str) -> Option<IpAddr> {
        self.primary_dpu(vdpu_id).map(|d| d.pa_v4)
    }

    pub fn npu_v4(&self, vdpu_id: &str) -> Option<IpAddr> {
        self.primary_dpu(vdpu_id).and_then(|d| d.npu_v4)
    }
}

fn parse_row(tbl: &dyn TableReader, key: &str, schema: &RequestSchema) -> Option<Request> {
    let values = tbl.get(key)?;
    let record = KeyOpFieldValues::set(key, values);
    match Request::parse(schema, '|', &record) {
        Ok(req) => Some(req),
        Err(e) => {
            log::error!("failed to parse key {key} in the {}: {e}", tbl.name());
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use orch_core::{MemoryTable, ProducerTable};

    fn fixture() -> (MemoryTable, MemoryTable, MemoryTable) {
        let dpu = MemoryTable::new("DPU");
        dpu.set(
            "local_dpu",
            vec![
                (PA_V4.to_string(), "10.0.0.1".to_string()),
                (STATE.to_string(), "up".to_string()),
            ],
        );
        dpu.set(
            "local_down_dpu",
            vec![
                (PA_V4.to_string(), "10.0.0.9".to_string()),
                (STATE.to_string(), "down".to_string()),
            ],
        );
        let remote = MemoryTable::new("REMOTE_DPU");
        remote.set(
            "remote_dpu",
            vec![
                (PA_V4.to_string(), "10.0.0.2".to_string()),
                (NPU_V4.to_string(), "20.0.0.2".to_string()),
            ],
        );
        let vdpu = MemoryTable::new("VDPU");
        vdpu.set("vdpu0", vec![(DPU_IDS.to_string(), "local_dpu".to_string())]);
        vdpu.set("vdpu1", vec![(DPU_IDS.to_string(), "remote_dpu".to_string())]);
        vdpu.set(
            "vdpu3",
            vec![(DPU_IDS.to_string(), "invalid_dpu".to_string())],
        );
        vdpu.set(
            "vdpu4",
            vec![(DPU_IDS.to_string(), "local_down_dpu".to_string())],
        );
        (dpu, remote, vdpu)
    }

    #[test]
    fn populates_and_resolves_vdpus() {
        let (dpu, remote, vdpu) = fixture();
        let mut registry = DpuRegistry::default();
        registry.populate(&dpu, &remote, &vdpu);

        assert_eq!(registry.dpu_type("vdpu0"), Some(DpuType::Local));
        assert_eq!(registry.pa_v4("vdpu0").unwrap().to_string(), "10.0.0.1");
        assert_eq!(registry.npu_v4("vdpu0"), None);

        assert_eq!(registry.dpu_type("vdpu1"), Some(DpuType::Cluster));
        assert_eq!(registry.npu_v4("vdpu1").unwrap().to_string(), "20.0.0.2");
    }

    #[test]
    fn down_and_unknown_dpus_resolve_to_not_found() {
        let (dpu, remote, vdpu) = fixture();
        let mut registry = DpuRegistry::default();
        registry.populate(&dpu, &remote, &vdpu);

        // vdpu3 references a DPU that was never configured; vdpu4's only DPU
        // is administratively down. Both are unresolvable.
        assert_eq!(registry.dpu_type("vdpu3"), None);
        assert_eq!(registry.dpu_type("vdpu4"), None);
        assert_eq!(registry.dpu_type("missing"), None);

        let ids = registry.ids();
        assert!(ids.contains(&"vdpu0".to_string()));
        assert!(!ids.contains(&"vdpu4".to_string()));
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let (dpu, remote, vdpu) = fixture();
        dpu.set(
            "broken_dpu",
            vec![
                (PA_V4.to_string(), "not-an-ip".to_string()),
                (STATE.to_string(), "up".to_string()),
            ],
        );
        let mut registry = DpuRegistry::default();
        registry.populate(&dpu, &remote, &vdpu);
        assert_eq!(registry.dpu_type("vdpu0"), Some(DpuType::Local));
        assert!(!registry.dpus.contains_key("broken_dpu"));
    }
}
