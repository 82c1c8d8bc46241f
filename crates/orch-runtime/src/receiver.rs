use std::collections::{BTreeMap, HashMap};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use orch_core::{MemoryTable, ProducerTable};
use orch_schema::{KeyOpFieldValues, Op};

use crate::event_loop::SourceEvent;

// ---------------------------------------------------------------------------
// ChangeRecord / routing
// ---------------------------------------------------------------------------

/// Wire form of one change-feed record: one JSON object per line.
#[derive(Debug, Deserialize)]
pub struct ChangeRecord {
    pub table: String,
    pub key: String,
    pub op: Op,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

/// Where records of one table go: a daemon source channel, or a synchronous
/// write into a mirrored config table.
#[derive(Clone)]
pub enum RouteTarget {
    Daemon {
        tx: mpsc::Sender<SourceEvent>,
        source: usize,
    },
    Store(Arc<MemoryTable>),
}

pub type RouteTable = HashMap<String, Vec<RouteTarget>>;

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

/// TCP receiver for the change feed: accepts connections, decodes JSON-lines
/// [`ChangeRecord`]s, and routes each by table name. Per-connection order is
/// preserved into each daemon channel; nothing is ordered across tables from
/// different connections.
pub struct Receiver {
    listener: TcpListener,
    routes: Arc<RouteTable>,
    cancel: CancellationToken,
}

impl Receiver {
    /// Parse `"tcp://host:port"` and bind.
    pub async fn bind(
        listen: &str,
        routes: RouteTable,
        cancel: CancellationToken,
    ) -> anyhow::Result<Self> {
        let addr = listen.strip_prefix("tcp://").unwrap_or(listen);
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            routes: Arc::new(routes),
            cancel,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Blocks until the cancellation token fires.
    #[tracing::instrument(name = "receiver", skip_all)]
    pub async fn run(self) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    let (stream, peer) = result?;
                    orch_debug!(bus, peer = %peer, "accepted connection");
                    let routes = Arc::clone(&self.routes);
                    let cancel = self.cancel.child_token();
                    tokio::spawn(handle_connection(stream, routes, cancel, peer));
                }
                _ = self.cancel.cancelled() => break,
            }
        }
        Ok(())
    }
}

#[tracing::instrument(skip_all, fields(peer = %peer))]
async fn handle_connection(
    stream: TcpStream,
    routes: Arc<RouteTable>,
    cancel: CancellationToken,
    peer: SocketAddr,
) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<ChangeRecord>(&line) {
                            Ok(record) => route_record(&routes, record).await,
                            Err(e) => orch_warn!(bus, error = %e, "record decode error"),
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        orch_warn!(bus, error = %e, "connection read error");
                        break;
                    }
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
    orch_debug!(bus, peer = %peer, "connection closed");
}

async fn route_record(routes: &RouteTable, record: ChangeRecord) {
    let Some(targets) = routes.get(&record.table) else {
        orch_warn!(bus, table = %record.table, "record for unknown table");
        return;
    };
    let values: Vec<(String, String)> = record.fields.into_iter().collect();

    for target in targets {
        match target {
            RouteTarget::Daemon { tx, source } => {
                let event = SourceEvent {
                    source: *source,
                    record: KeyOpFieldValues {
                        key: record.key.clone(),
                        op: record.op,
                        values: values.clone(),
                    },
                };
                if tx.send(event).await.is_err() {
                    orch_warn!(bus, table = %record.table, "daemon channel closed, dropping record");
                }
            }
            RouteTarget::Store(table) => match record.op {
                Op::Set => table.set(&record.key, values.clone()),
                Op::Del => table.del(&record.key),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use orch_core::TableReader;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;

    async fn send_lines(addr: SocketAddr, lines: &[&str]) {
        let mut conn = TcpStream::connect(addr).await.unwrap();
        for line in lines {
            conn.write_all(line.as_bytes()).await.unwrap();
            conn.write_all(b"\n").await.unwrap();
        }
        conn.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn routes_to_daemon_and_store() {
        let (tx, mut rx) = mpsc::channel(16);
        let store = Arc::new(MemoryTable::new("DPU"));
        let mut routes: RouteTable = HashMap::new();
        routes.insert(
            "PORT".to_string(),
            vec![RouteTarget::Daemon { tx, source: 0 }],
        );
        routes.insert(
            "DPU".to_string(),
            vec![RouteTarget::Store(Arc::clone(&store))],
        );

        let cancel = CancellationToken::new();
        let receiver = Receiver::bind("tcp://127.0.0.1:0", routes, cancel.clone())
            .await
            .unwrap();
        let addr = receiver.local_addr().unwrap();
        let server = tokio::spawn(receiver.run());

        send_lines(
            addr,
            &[
                r#"{"table":"PORT","key":"Ethernet0","op":"SET","fields":{"speed":"100000"}}"#,
                r#"{"table":"DPU","key":"local_dpu","op":"SET","fields":{"pa_ipv4":"10.0.0.1","state":"up"}}"#,
                r#"not json at all"#,
                r#"{"table":"NOPE","key":"x","op":"DEL"}"#,
            ],
        )
        .await;

        let event = rx.try_recv().unwrap();
        assert_eq!(event.source, 0);
        assert_eq!(event.record.key, "Ethernet0");
        assert_eq!(event.record.op, Op::Set);

        assert_eq!(store.hget("local_dpu", "pa_ipv4").unwrap(), "10.0.0.1");

        cancel.cancel();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn delete_records_reach_the_store() {
        let store = Arc::new(MemoryTable::new("VDPU"));
        let mut routes: RouteTable = HashMap::new();
        routes.insert(
            "VDPU".to_string(),
            vec![RouteTarget::Store(Arc::clone(&store))],
        );

        let cancel = CancellationToken::new();
        let receiver = Receiver::bind("tcp://127.0.0.1:0", routes, cancel.clone())
            .await
            .unwrap();
        let addr = receiver.local_addr().unwrap();
        let server = tokio::spawn(receiver.run());

        send_lines(
            addr,
            &[
                r#"{"table":"VDPU","key":"vdpu0","op":"SET","fields":{"main_dpu_ids":"dpu0"}}"#,
                r#"{"table":"VDPU","key":"vdpu0","op":"DEL"}"#,
            ],
        )
        .await;

        assert!(!store.contains("vdpu0"));

        cancel.cancel();
        server.await.unwrap().unwrap();
    }
}
