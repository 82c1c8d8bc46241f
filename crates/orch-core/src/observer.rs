use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use orch_schema::MacAddr;

// ---------------------------------------------------------------------------
// Subjects
// ---------------------------------------------------------------------------

/// Identity of a neighbor: the resolved IP and the interface that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborEntry {
    pub ip: IpAddr,
    pub alias: String,
}

/// Payload published on [`SubjectKind::NeighborChange`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborUpdate {
    pub entry: NeighborEntry,
    pub mac: MacAddr,
    pub add: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubjectKind {
    NeighborChange,
}

/// Typed notification payload.
#[derive(Debug, Clone)]
pub enum SubjectEvent {
    NeighborChange(NeighborUpdate),
}

impl SubjectEvent {
    pub fn kind(&self) -> SubjectKind {
        match self {
            SubjectEvent::NeighborChange(_) => SubjectKind::NeighborChange,
        }
    }
}

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

/// Receiver side of the hub. Implementations must be idempotent: the same
/// event may be delivered more than once, and they must not publish back
/// into the hub from inside [`observe`](Self::observe).
pub trait Observer: Send {
    fn observe(&mut self, event: &SubjectEvent);
}

// ---------------------------------------------------------------------------
// ObserverHub
// ---------------------------------------------------------------------------

/// Synchronous publish/subscribe between orchestrators in one process.
///
/// Notification happens inside the publisher's stack frame, in registration
/// order, against a snapshot of the observer list taken at dispatch start —
/// so detaching during a notification is safe.
#[derive(Default)]
pub struct ObserverHub {
    observers: HashMap<SubjectKind, Vec<Arc<Mutex<dyn Observer>>>>,
}

impl ObserverHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, kind: SubjectKind, observer: Arc<Mutex<dyn Observer>>) {
        self.observers.entry(kind).or_default().push(observer);
    }

    /// Remove a previously attached observer, matched by pointer identity.
    pub fn detach(&mut self, kind: SubjectKind, observer: &Arc<Mutex<dyn Observer>>) {
        if let Some(list) = self.observers.get_mut(&kind) {
            list.retain(|o| !Arc::ptr_eq(o, observer));
        }
    }

    pub fn notify(&self, event: &SubjectEvent) {
        let Some(list) = self.observers.get(&event.kind()) else {
            return;
        };
        let snapshot: Vec<_> = list.iter().map(Arc::clone).collect();
        for observer in snapshot {
            match observer.lock() {
                Ok(mut guard) => guard.observe(event),
                Err(_) => log::error!("observer lock poisoned, skipping notification"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        tag: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Observer for Recorder {
        fn observe(&mut self, _event: &SubjectEvent) {
            self.log.lock().unwrap().push(self.tag);
        }
    }

    fn update() -> SubjectEvent {
        SubjectEvent::NeighborChange(NeighborUpdate {
            entry: NeighborEntry {
                ip: "10.0.0.1".parse().unwrap(),
                alias: "Vlan1000".to_string(),
            },
            mac: "aa:bb:cc:dd:ee:ff".parse().unwrap(),
            add: true,
        })
    }

    #[test]
    fn notifies_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut hub = ObserverHub::new();
        for tag in ["first", "second"] {
            let observer: Arc<Mutex<dyn Observer>> = Arc::new(Mutex::new(Recorder {
                tag,
                log: Arc::clone(&log),
            }));
            hub.attach(SubjectKind::NeighborChange, observer);
        }

        hub.notify(&update());
        assert_eq!(*log.lock().unwrap(), ["first", "second"]);
    }

    #[test]
    fn detach_stops_delivery() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut hub = ObserverHub::new();
        let observer: Arc<Mutex<dyn Observer>> = Arc::new(Mutex::new(Recorder {
            tag: "only",
            log: Arc::clone(&log),
        }));
        hub.attach(SubjectKind::NeighborChange, Arc::clone(&observer));
        hub.notify(&update());
        hub.detach(SubjectKind::NeighborChange, &observer);
        hub.notify(&update());
        assert_eq!(log.lock().unwrap().len(), 1);
    }
}
