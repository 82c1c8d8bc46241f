mod mgr;
pub mod service;

pub use mgr::{
    APP_SFLOW_SESSION_TABLE, APP_SFLOW_TABLE, CFG_PORT_TABLE, CFG_SFLOW_SESSION_TABLE,
    CFG_SFLOW_TABLE, STATE_PORT_TABLE, SflowMgr,
};
pub use service::{NullSamplingService, SamplingService, SystemService};
