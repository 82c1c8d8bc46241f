//! Table names and the closed field vocabulary of the ENI-forwarding path.

/// Inbound application table carrying per-tenant forwarding intent.
pub const APP_ENI_FWD_TABLE: &str = "DASH_ENI_FORWARD_TABLE";
/// Operational neighbor table feeding the neighbor tracker.
pub const STATE_NEIGH_TABLE: &str = "NEIGH_TABLE";

/// Configuration tables read once at lazy init.
pub const DPU_TABLE: &str = "DPU";
pub const REMOTE_DPU_TABLE: &str = "REMOTE_DPU";
pub const VDPU_TABLE: &str = "VDPU";
pub const VIP_TABLE: &str = "VIP_TABLE";
pub const CFG_PORT_TABLE: &str = "PORT";
pub const CFG_INTERFACE_TABLE: &str = "INTERFACE";
pub const CFG_VNET_TABLE: &str = "VNET";

/// Downstream producer tables.
pub const APP_ACL_RULE_TABLE: &str = "ACL_RULE_TABLE";
pub const APP_ACL_TABLE_TABLE: &str = "ACL_TABLE_TABLE";
pub const APP_ACL_TABLE_TYPE_TABLE: &str = "ACL_TABLE_TYPE_TABLE";

/// Key of the single ACL table row and its table type.
pub const ACL_TABLE: &str = "ENI";
pub const ACL_TABLE_TYPE: &str = "ENI_REDIRECT";

/// ENI-forwarding request fields.
pub const VDPU_IDS: &str = "vdpu_ids";
pub const PRIMARY: &str = "primary_vdpu";

/// DPU registry fields.
pub const STATE: &str = "state";
pub const PA_V4: &str = "pa_ipv4";
pub const PA_V6: &str = "pa_ipv6";
pub const NPU_V4: &str = "npu_ipv4";
pub const NPU_V6: &str = "npu_ipv6";
pub const DPU_IDS: &str = "main_dpu_ids";

/// ACL rule fields.
pub const RULE_PRIORITY: &str = "PRIORITY";
pub const MATCH_DST_IP: &str = "DST_IP";
pub const MATCH_INNER_DST_MAC: &str = "INNER_DST_MAC";
pub const MATCH_TUNNEL_TERM: &str = "TUNNEL_TERM";
pub const ACTION_REDIRECT: &str = "REDIRECT_ACTION";

/// ACL table-type fields.
pub const TABLE_TYPE_MATCHES: &str = "MATCHES";
pub const TABLE_TYPE_ACTIONS: &str = "ACTIONS";
pub const TABLE_TYPE_BPOINT_TYPES: &str = "BIND_POINTS";

/// ACL table fields.
pub const TABLE_DESCRIPTION: &str = "POLICY_DESC";
pub const TABLE_TYPE_FIELD: &str = "TYPE";
pub const TABLE_STAGE: &str = "STAGE";
pub const TABLE_PORTS: &str = "PORTS";
pub const STAGE_INGRESS: &str = "INGRESS";
pub const BIND_POINT_TYPE_PORT: &str = "PORT";
pub const BIND_POINT_TYPE_PORTCHANNEL: &str = "PORTCHANNEL";

/// Port-role marker for internal (DPU-facing) ports.
pub const PORT_ROLE: &str = "role";
pub const PORT_ROLE_DPC: &str = "Dpc";
