use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use orch_core::{Consumer, OrchAgent};
use orch_schema::KeyOpFieldValues;

// ---------------------------------------------------------------------------
// SourceEvent / DaemonHandle
// ---------------------------------------------------------------------------

/// One inbound change record, tagged with the daemon-local source index.
#[derive(Debug)]
pub struct SourceEvent {
    pub source: usize,
    pub record: KeyOpFieldValues,
}

/// Feed-side handle to a running [`EventLoop`].
#[derive(Clone)]
pub struct DaemonHandle {
    pub name: String,
    pub tables: Vec<&'static str>,
    pub tx: mpsc::Sender<SourceEvent>,
}

impl DaemonHandle {
    pub fn source_index(&self, table: &str) -> Option<usize> {
        self.tables.iter().position(|t| *t == table)
    }
}

// ---------------------------------------------------------------------------
// EventLoop
// ---------------------------------------------------------------------------

/// Single-task cooperative loop driving one [`OrchAgent`].
///
/// Wakes on inbound records or the periodic tick. On a record it greedily
/// stages everything available, then drains every non-empty consumer; on the
/// tick it re-drains so retained entries get their retry. Cancellation and
/// channel close both run one final drain before exit.
pub struct EventLoop<A: OrchAgent> {
    agent: A,
    consumers: Vec<Consumer>,
    rx: mpsc::Receiver<SourceEvent>,
    tick: Duration,
    cancel: CancellationToken,
}

impl<A: OrchAgent> EventLoop<A> {
    pub fn new(
        agent: A,
        capacity: usize,
        tick: Duration,
        cancel: CancellationToken,
    ) -> (Self, DaemonHandle) {
        let tables = agent.tables().to_vec();
        let consumers = tables.iter().map(|t| Consumer::new(*t)).collect();
        let (tx, rx) = mpsc::channel(capacity);
        let handle = DaemonHandle {
            name: agent.name().to_string(),
            tables,
            tx,
        };
        (
            Self {
                agent,
                consumers,
                rx,
                tick,
                cancel,
            },
            handle,
        )
    }

    #[tracing::instrument(name = "daemon", skip_all, fields(daemon = self.agent.name()))]
    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut tick = tokio::time::interval(self.tick);
        loop {
            tokio::select! {
                event = self.rx.recv() => {
                    match event {
                        Some(event) => {
                            self.stage(event);
                            while let Ok(event) = self.rx.try_recv() {
                                self.stage(event);
                            }
                            self.drain_all();
                        }
                        None => {
                            // All feeders dropped: clean shutdown.
                            self.drain_all();
                            break;
                        }
                    }
                }
                _ = tick.tick() => {
                    self.drain_all();
                }
                _ = self.cancel.cancelled() => {
                    while let Ok(event) = self.rx.try_recv() {
                        self.stage(event);
                    }
                    self.drain_all();
                    break;
                }
            }
        }
        orch_debug!(sys, "daemon loop stopped");
        Ok(())
    }

    fn stage(&mut self, event: SourceEvent) {
        match self.consumers.get_mut(event.source) {
            Some(consumer) => consumer.stage(event.record),
            None => orch_warn!(bus, source = event.source, "event for unknown source index"),
        }
    }

    fn drain_all(&mut self) {
        for consumer in &mut self.consumers {
            if !consumer.is_empty() {
                self.agent.drain(consumer);
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
    use std::sync::{Arc, Mutex};

    use orch_core::DrainAction;
    use orch_schema::Op;

    /// Agent that consumes everything and records what it saw; entries whose
    /// value is "later" are retained once.
    struct ToyAgent {
        seen: Arc<Mutex<Vec<(String, String, Op)>>>,
        retained_once: Arc<Mutex<bool>>,
    }

    impl OrchAgent for ToyAgent {
        fn name(&self) -> &str {
            "toy"
        }

        fn tables(&self) -> &[&'static str] {
            &["ALPHA", "BETA"]
        }

        fn drain(&mut self, consumer: &mut Consumer) {
            let table = consumer.table().to_string();
            let seen = Arc::clone(&self.seen);
            let retained_once = Arc::clone(&self.retained_once);
            consumer.drain(|key, op, values| {
                let value = values.first().map(|(_, v)| v.clone()).unwrap_or_default();
                if value == "later" && !*retained_once.lock().unwrap() {
                    *retained_once.lock().unwrap() = true;
                    return DrainAction::Retain;
                }
                seen.lock().unwrap().push((table.clone(), key.to_string(), op));
                DrainAction::Consumed
            });
        }
    }

    fn record(key: &str, value: &str) -> KeyOpFieldValues {
        KeyOpFieldValues::set(key, vec![("f".to_string(), value.to_string())])
    }

    #[tokio::test]
    async fn routes_events_to_the_right_consumer() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let agent = ToyAgent {
            seen: Arc::clone(&seen),
            retained_once: Arc::new(Mutex::new(true)),
        };
        let cancel = CancellationToken::new();
        let (event_loop, handle) =
            EventLoop::new(agent, 16, Duration::from_millis(50), cancel.clone());
        let task = tokio::spawn(event_loop.run());

        handle
            .tx
            .send(SourceEvent {
                source: handle.source_index("BETA").unwrap(),
                record: record("k1", "now"),
            })
            .await
            .unwrap();
        handle
            .tx
            .send(SourceEvent {
                source: handle.source_index("ALPHA").unwrap(),
                record: record("k2", "now"),
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        task.await.unwrap().unwrap();

        let seen = seen.lock().unwrap();
        assert!(seen.contains(&("BETA".to_string(), "k1".to_string(), Op::Set)));
        assert!(seen.contains(&("ALPHA".to_string(), "k2".to_string(), Op::Set)));
    }

    #[tokio::test]
    async fn retained_entry_is_retried_on_tick() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let agent = ToyAgent {
            seen: Arc::clone(&seen),
            retained_once: Arc::new(Mutex::new(false)),
        };
        let cancel = CancellationToken::new();
        let (event_loop, handle) =
            EventLoop::new(agent, 16, Duration::from_millis(20), cancel.clone());
        let task = tokio::spawn(event_loop.run());

        handle
            .tx
            .send(SourceEvent {
                source: 0,
                record: record("pending", "later"),
            })
            .await
            .unwrap();

        // First drain retains; a later tick consumes.
        tokio::time::sleep(Duration::from_millis(120)).await;
        cancel.cancel();
        task.await.unwrap().unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, "pending");
    }

    #[tokio::test]
    async fn channel_close_drains_and_exits() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let agent = ToyAgent {
            seen: Arc::clone(&seen),
            retained_once: Arc::new(Mutex::new(true)),
        };
        let cancel = CancellationToken::new();
        let (event_loop, handle) = EventLoop::new(agent, 16, Duration::from_secs(60), cancel);

        handle
            .tx
            .send(SourceEvent {
                source: 0,
                record: record("k", "now"),
            })
            .await
            .unwrap();
        drop(handle);

        event_loop.run().await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
