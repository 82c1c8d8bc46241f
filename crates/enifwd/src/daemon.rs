use std::sync::{Arc, Mutex};

use orch_core::{Consumer, Observer, ObserverHub, OrchAgent, SubjectEvent, SubjectKind};

use crate::neigh::NeighborTracker;
use crate::orch::EniFwdOrch;
use crate::tables::{APP_ENI_FWD_TABLE, STATE_NEIGH_TABLE};

/// Event-loop agent for the ENI-forwarding daemon.
///
/// Routes the forwarding application table into the orchestrator and the
/// neighbor table into the tracker; tracker changes are republished through
/// the observer hub, which delivers them synchronously to the orchestrator.
pub struct EniFwdDaemon {
    orch: Arc<Mutex<EniFwdOrch>>,
    tracker: Arc<NeighborTracker>,
    hub: ObserverHub,
}

impl EniFwdDaemon {
    pub fn new(orch: EniFwdOrch, tracker: Arc<NeighborTracker>) -> Self {
        let orch = Arc::new(Mutex::new(orch));
        let mut hub = ObserverHub::new();
        let observer: Arc<Mutex<dyn Observer>> = Arc::clone(&orch) as Arc<Mutex<dyn Observer>>;
        hub.attach(SubjectKind::NeighborChange, observer);
        Self {
            orch,
            tracker,
            hub,
        }
    }

    /// Handle to the orchestrator, shared with the observer hub.
    pub fn orch(&self) -> Arc<Mutex<EniFwdOrch>> {
        Arc::clone(&self.orch)
    }
}

impl OrchAgent for EniFwdDaemon {
    fn name(&self) -> &str {
        "enifwd"
    }

    fn tables(&self) -> &[&'static str] {
        &[APP_ENI_FWD_TABLE, STATE_NEIGH_TABLE]
    }

    fn drain(&mut self, consumer: &mut Consumer) {
        let table = consumer.table().to_string();
        match table.as_str() {
            APP_ENI_FWD_TABLE => {
                self.orch.lock().expect("enifwd orch lock").drain(consumer);
            }
            STATE_NEIGH_TABLE => {
                let updates = self.tracker.drain(consumer);
                for update in updates {
                    self.hub.notify(&SubjectEvent::NeighborChange(update));
                }
            }
            other => log::warn!("enifwd: unexpected table {other}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
