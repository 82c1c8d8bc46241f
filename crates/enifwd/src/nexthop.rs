use std::net::IpAddr;

use crate::ctx::{EniFwdCtx, NextHopKey};
use crate::registry::DpuType;

/// Resolution state of a next-hop binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NhStatus {
    Resolved,
    Unresolved,
}

/// Where a rule redirects to: a directly attached endpoint that needs
/// neighbor discovery, or a cluster endpoint reached through a tunnel.
#[derive(Debug, Clone)]
pub enum EniNextHop {
    Local {
        endpoint: IpAddr,
        status: NhStatus,
    },
    Remote {
        endpoint: IpAddr,
        tunnel: String,
        vni: String,
        status: NhStatus,
    },
}

impl EniNextHop {
    pub fn create(dpu_type: DpuType, endpoint: IpAddr) -> Self {
        match dpu_type {
            DpuType::Local => EniNextHop::Local {
                endpoint,
                status: NhStatus::Unresolved,
            },
            DpuType::Cluster => EniNextHop::Remote {
                endpoint,
                tunnel: String::new(),
                vni: String::new(),
                status: NhStatus::Unresolved,
            },
        }
    }

    pub fn dpu_type(&self) -> DpuType {
        match self {
            EniNextHop::Local { .. } => DpuType::Local,
            EniNextHop::Remote { .. } => DpuType::Cluster,
        }
    }

    pub fn endpoint(&self) -> IpAddr {
        match self {
            EniNextHop::Local { endpoint, .. } | EniNextHop::Remote { endpoint, .. } => *endpoint,
        }
    }

    pub fn status(&self) -> NhStatus {
        match self {
            EniNextHop::Local { status, .. } | EniNextHop::Remote { status, .. } => *status,
        }
    }

    /// Attempt resolution against the collaborators.
    ///
    /// Local: resolved iff the neighbor is known; otherwise resolution is
    /// requested and the binding stays unresolved until a neighbor event.
    /// Remote: resolved once the VNET's tunnel and VNI are known; the tunnel
    /// next-hop itself is created downstream.
    pub fn resolve(&mut self, vnet: &str, ctx: &mut EniFwdCtx) {
        match self {
            EniNextHop::Local { endpoint, status } => {
                let alias = ctx.nbr_alias(endpoint);
                let nh = NextHopKey {
                    ip: *endpoint,
                    alias,
                };
                if ctx.is_neighbor_resolved(&nh) {
                    *status = NhStatus::Resolved;
                    return;
                }
                ctx.resolve_neighbor(&nh);
                *status = NhStatus::Unresolved;
            }
            EniNextHop::Remote {
                tunnel,
                vni,
                status,
                ..
            } => {
                let Some(tunnel_name) = ctx.find_vnet_tunnel(vnet) else {
                    log::error!("couldn't find tunnel name for vnet {vnet}");
                    *status = NhStatus::Unresolved;
                    return;
                };
                let Some(vnet_vni) = ctx.find_vnet_vni(vnet) else {
                    log::error!("couldn't find VNI for vnet {vnet}");
                    *status = NhStatus::Unresolved;
                    return;
                };
                *tunnel = tunnel_name;
                *vni = vnet_vni.to_string();
                *status = NhStatus::Resolved;
            }
        }
    }

    /// Redirect value written into the ACL rule row:
    /// `<ip>` for a local endpoint, `<ip>@<tunnel>,<vni>` for a remote one.
    pub fn redirect_value(&self) -> String {
        match self {
            EniNextHop::Local { endpoint, .. } => endpoint.to_string(),
            EniNextHop::Remote {
                endpoint,
                tunnel,
                vni,
                ..
            } => format!("{endpoint}@{tunnel},{vni}"),
        }
    }
}
