use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use orion_error::compat_prelude::*;
use orion_error::op_context;
use orion_error::prelude::*;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use orch_config::OrchdConfig;
use orch_core::{FileProducerTable, MemoryTable, ProducerTable, TableReader};

use enifwd::tables as eni_tables;
use enifwd::{
    EniFwdCtx, EniFwdDaemon, EniFwdOrch, EniFwdServices, EniFwdTables, NeighborApi,
    NeighborTracker, TablePortsApi, TableVnetApi,
};
use sflowmgr::{SflowMgr, SystemService};

use crate::error::{RuntimeReason, RuntimeResult};
use crate::event_loop::{DaemonHandle, EventLoop};
use crate::receiver::{Receiver, RouteTable, RouteTarget};

// ---------------------------------------------------------------------------
// TaskGroup — named collection of async tasks for ordered shutdown
// ---------------------------------------------------------------------------

/// A named group of async tasks that are shut down together.
///
/// Groups are assembled in *start order* and joined in *reverse order*
/// (LIFO) during shutdown: the receiver stops feeding first, then the
/// daemon loops drain whatever is still staged and exit.
pub(crate) struct TaskGroup {
    name: &'static str,
    handles: Vec<JoinHandle<anyhow::Result<()>>>,
}

impl TaskGroup {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            handles: Vec::new(),
        }
    }

    fn push(&mut self, handle: JoinHandle<anyhow::Result<()>>) {
        self.handles.push(handle);
    }

    /// Join all tasks in this group, returning the first error.
    async fn wait(self) -> RuntimeResult<()> {
        for handle in self.handles {
            handle
                .await
                .map_err(|e| {
                    StructError::from(RuntimeReason::Shutdown)
                        .with_detail(format!("task join error: {e}"))
                })?
                .owe(RuntimeReason::Shutdown)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ConfigMirror — config tables kept in sync by the receiver
// ---------------------------------------------------------------------------

/// Config tables mirrored from the change feed; the ENI-forwarding lazy init
/// reads them once its first add operation arrives.
struct ConfigMirror {
    port: Arc<MemoryTable>,
    interface: Arc<MemoryTable>,
    vnet: Arc<MemoryTable>,
    dpu: Arc<MemoryTable>,
    remote_dpu: Arc<MemoryTable>,
    vdpu: Arc<MemoryTable>,
    vip: Arc<MemoryTable>,
}

impl ConfigMirror {
    fn new() -> Self {
        Self {
            port: Arc::new(MemoryTable::new(eni_tables::CFG_PORT_TABLE)),
            interface: Arc::new(MemoryTable::new(eni_tables::CFG_INTERFACE_TABLE)),
            vnet: Arc::new(MemoryTable::new(eni_tables::CFG_VNET_TABLE)),
            dpu: Arc::new(MemoryTable::new(eni_tables::DPU_TABLE)),
            remote_dpu: Arc::new(MemoryTable::new(eni_tables::REMOTE_DPU_TABLE)),
            vdpu: Arc::new(MemoryTable::new(eni_tables::VDPU_TABLE)),
            vip: Arc::new(MemoryTable::new(eni_tables::VIP_TABLE)),
        }
    }

    fn routes(&self) -> Vec<(&'static str, Arc<MemoryTable>)> {
        vec![
            (eni_tables::CFG_PORT_TABLE, Arc::clone(&self.port)),
            (eni_tables::CFG_INTERFACE_TABLE, Arc::clone(&self.interface)),
            (eni_tables::CFG_VNET_TABLE, Arc::clone(&self.vnet)),
            (eni_tables::DPU_TABLE, Arc::clone(&self.dpu)),
            (eni_tables::REMOTE_DPU_TABLE, Arc::clone(&self.remote_dpu)),
            (eni_tables::VDPU_TABLE, Arc::clone(&self.vdpu)),
            (eni_tables::VIP_TABLE, Arc::clone(&self.vip)),
        ]
    }
}

// ---------------------------------------------------------------------------
// Reactor — the top-level lifecycle handle
// ---------------------------------------------------------------------------

/// Manages the full lifecycle of the orchestration daemons: bootstrap, run,
/// and graceful shutdown.
pub struct Reactor {
    cancel: CancellationToken,
    /// Separate cancel token for the daemon loops — triggered only after the
    /// receiver has fully stopped, so every in-flight record is drained.
    daemon_cancel: CancellationToken,
    groups: Vec<TaskGroup>,
    listen_addr: SocketAddr,
}

impl Reactor {
    /// Bootstrap from an [`OrchdConfig`] and the directory its relative
    /// paths resolve against.
    #[tracing::instrument(name = "orchd.start", skip_all, fields(listen = %config.server.listen))]
    pub async fn start(config: OrchdConfig, base_dir: &Path) -> RuntimeResult<Self> {
        let mut op = op_context!("orchd-bootstrap").with_auto_log();
        op.record("listen", config.server.listen.as_str());

        let cancel = CancellationToken::new();
        let daemon_cancel = CancellationToken::new();
        let tick = config.runtime.tick_interval.as_duration();
        let capacity = config.runtime.channel_capacity;

        // Derived rows land in one JSON-lines file per process.
        let output = if config.runtime.output.is_relative() {
            base_dir.join(&config.runtime.output)
        } else {
            config.runtime.output.clone()
        };
        let acl_rules = Arc::new(
            FileProducerTable::open(eni_tables::APP_ACL_RULE_TABLE, &output)
                .owe(RuntimeReason::Bootstrap)?,
        );
        let acl_tables = Arc::new(acl_rules.sibling(eni_tables::APP_ACL_TABLE_TABLE));
        let acl_types = Arc::new(acl_rules.sibling(eni_tables::APP_ACL_TABLE_TYPE_TABLE));
        let app_sflow = Arc::new(acl_rules.sibling(sflowmgr::APP_SFLOW_TABLE));
        let app_session = Arc::new(acl_rules.sibling(sflowmgr::APP_SFLOW_SESSION_TABLE));

        let mirror = ConfigMirror::new();

        // sFlow daemon.
        let sflow = SflowMgr::new(
            app_sflow as Arc<dyn ProducerTable>,
            app_session as Arc<dyn ProducerTable>,
            Box::new(SystemService::new(&config.runtime.sampling_service)),
        );
        let (sflow_loop, sflow_handle) =
            EventLoop::new(sflow, capacity, tick, daemon_cancel.child_token());

        // ENI-forwarding daemon.
        let tracker = Arc::new(NeighborTracker::new(
            Arc::clone(&mirror.interface) as Arc<dyn TableReader>
        ));
        let ctx = EniFwdCtx::new(
            EniFwdServices {
                ports: Arc::new(TablePortsApi::new(
                    Arc::clone(&mirror.port) as Arc<dyn TableReader>
                )),
                neighbors: Arc::clone(&tracker) as Arc<dyn NeighborApi>,
                vnets: Arc::new(TableVnetApi::new(
                    Arc::clone(&mirror.vnet) as Arc<dyn TableReader>
                )),
            },
            EniFwdTables {
                port_cfg: Arc::clone(&mirror.port) as Arc<dyn TableReader>,
                vip_cfg: Arc::clone(&mirror.vip) as Arc<dyn TableReader>,
                dpu_cfg: Arc::clone(&mirror.dpu) as Arc<dyn TableReader>,
                remote_dpu_cfg: Arc::clone(&mirror.remote_dpu) as Arc<dyn TableReader>,
                vdpu_cfg: Arc::clone(&mirror.vdpu) as Arc<dyn TableReader>,
                acl_rules: acl_rules as Arc<dyn ProducerTable>,
                acl_tables: acl_tables as Arc<dyn ProducerTable>,
                acl_table_types: acl_types as Arc<dyn ProducerTable>,
            },
        );
        let eni_daemon = EniFwdDaemon::new(EniFwdOrch::new(ctx), tracker);
        let (eni_loop, eni_handle) =
            EventLoop::new(eni_daemon, capacity, tick, daemon_cancel.child_token());

        // Routing: daemon tables first, then the config mirror.
        let mut routes: RouteTable = HashMap::new();
        add_daemon_routes(&mut routes, &sflow_handle);
        add_daemon_routes(&mut routes, &eni_handle);
        for (table, store) in mirror.routes() {
            routes
                .entry(table.to_string())
                .or_default()
                .push(RouteTarget::Store(store));
        }

        let mut daemons = TaskGroup::new("daemons");
        daemons.push(tokio::spawn(sflow_loop.run()));
        daemons.push(tokio::spawn(eni_loop.run()));

        let receiver = Receiver::bind(&config.server.listen, routes, cancel.clone())
            .await
            .owe(RuntimeReason::Bootstrap)?;
        let listen_addr = receiver.local_addr().map_err(|e| {
            StructError::from(RuntimeReason::Bootstrap).with_detail(format!("listen addr: {e}"))
        })?;
        let mut receiver_group = TaskGroup::new("receiver");
        receiver_group.push(tokio::spawn(receiver.run()));

        orch_info!(sys, listen = %listen_addr, daemons = 2, "orchd bootstrap complete");
        op.mark_suc();
        Ok(Self {
            cancel,
            daemon_cancel,
            groups: vec![daemons, receiver_group],
            listen_addr,
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    /// Request graceful shutdown of all tasks.
    pub fn shutdown(&self) {
        orch_info!(sys, "initiating graceful shutdown");
        self.cancel.cancel();
    }

    /// Wait for all task groups after shutdown: receiver first, then the
    /// daemon loops get cancelled and drain.
    pub async fn wait(mut self) -> RuntimeResult<()> {
        while let Some(group) = self.groups.pop() {
            let name = group.name;
            orch_debug!(sys, task_group = name, "waiting for task group to finish");
            group.wait().await?;
            orch_debug!(sys, task_group = name, "task group finished");

            if name == "receiver" {
                // Receiver fully stopped: every record is staged. Now let
                // the daemon loops run their final drain.
                self.daemon_cancel.cancel();
            }
        }
        Ok(())
    }

    /// Root cancellation token, for signal integration.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

fn add_daemon_routes(routes: &mut RouteTable, handle: &DaemonHandle) {
    for (source, table) in handle.tables.iter().enumerate() {
        routes
            .entry(table.to_string())
            .or_default()
            .push(RouteTarget::Daemon {
                tx: handle.tx.clone(),
                source,
            });
    }
}

/// Block until SIGINT/SIGTERM or an external cancellation.
pub async fn wait_for_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                orch_warn!(sys, error = %e, "failed to install SIGTERM handler");
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = cancel.cancelled() => {}
                }
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => orch_info!(sys, "SIGINT received"),
            _ = term.recv() => orch_info!(sys, "SIGTERM received"),
            _ = cancel.cancelled() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => orch_info!(sys, "SIGINT received"),
            _ = cancel.cancelled() => {}
        }
    }
}
