mod ctx;
mod daemon;
mod eni;
mod neigh;
mod nexthop;
mod orch;
mod providers;
mod registry;
mod rule;
pub mod tables;

pub use ctx::{
    EniFwdCtx, EniFwdServices, EniFwdTables, NeighborApi, NextHopKey, PortEntry, PortKind,
    PortsApi, VnetApi,
};
pub use daemon::EniFwdDaemon;
pub use eni::{EniInfo, EniRecord};
pub use neigh::NeighborTracker;
pub use nexthop::{EniNextHop, NhStatus};
pub use orch::EniFwdOrch;
pub use providers::{TablePortsApi, TableVnetApi};
pub use registry::{DpuData, DpuRegistry, DpuType};
pub use rule::{BASE_PRIORITY, EniAclRule, RuleKind, RuleState};
