use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::connection::SharedWriter;
use crate::frame::Frame;

/// Replication id a primary reports in `info` and `FULLRESYNC` replies.
/// Fixed for the lifetime of the process.
pub const REPLICATION_ID: &str = "8371b4fb1155b71f4a04d3e1bc3e18c4a990aeeb";

/// Point-in-time snapshot of an empty dataset, sent to a replica right after
/// the full-resync reply. The payload is opaque to both sides.
pub const EMPTY_SNAPSHOT: &[u8] = &[
    0x52, 0x45, 0x44, 0x49, 0x53, 0x30, 0x30, 0x31, 0x31, 0xfa, 0x09, 0x72,
    0x65, 0x64, 0x69, 0x73, 0x2d, 0x76, 0x65, 0x72, 0x05, 0x37, 0x2e, 0x32,
    0x2e, 0x30, 0xfa, 0x0a, 0x72, 0x65, 0x64, 0x69, 0x73, 0x2d, 0x62, 0x69,
    0x74, 0x73, 0xc0, 0x40, 0xfa, 0x05, 0x63, 0x74, 0x69, 0x6d, 0x65, 0xc2,
    0x6d, 0x08, 0xbc, 0x65, 0xfa, 0x08, 0x75, 0x73, 0x65, 0x64, 0x2d, 0x6d,
    0x65, 0x6d, 0xc2, 0xb0, 0xc4, 0x10, 0x00, 0xfa, 0x08, 0x61, 0x6f, 0x66,
    0x2d, 0x62, 0x61, 0x73, 0x65, 0xc0, 0x00, 0xff, 0xf0, 0x6e, 0x3b, 0xfe,
    0xc0, 0xff, 0x5a, 0xa2,
];

#[derive(Clone, Debug, PartialEq)]
pub enum Role {
    Primary,
    Replica,
}

#[derive(Clone, Debug)]
pub struct ReplicationInfo {
    pub role: Role,
    pub replid: String,
    pub repl_offset: u64,
}

impl ReplicationInfo {
    pub fn primary() -> ReplicationInfo {
        ReplicationInfo {
            role: Role::Primary,
            replid: REPLICATION_ID.to_string(),
            repl_offset: 0,
        }
    }

    pub fn replica() -> ReplicationInfo {
        ReplicationInfo {
            role: Role::Replica,
            replid: REPLICATION_ID.to_string(),
            repl_offset: 0,
        }
    }
}

/// The primary's view of its attached replicas, keyed by remote address.
///
/// Fan-out is best effort: a replica whose socket fails is dropped, and no
/// write ever fails the client that triggered it.
#[derive(Clone)]
pub struct ReplicaRegistry {
    replicas: Arc<Mutex<HashMap<SocketAddr, SharedWriter>>>,
}

impl ReplicaRegistry {
    pub fn new() -> ReplicaRegistry {
        ReplicaRegistry {
            replicas: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Registers a connection that has been answered with a full resync.
    pub fn attach(&self, addr: SocketAddr, writer: SharedWriter) {
        let mut replicas = self.replicas.lock().unwrap();
        replicas.insert(addr, writer);
        info!("attached replica {}", addr);
    }

    /// Returns whether the address was attached.
    pub fn detach(&self, addr: &SocketAddr) -> bool {
        let mut replicas = self.replicas.lock().unwrap();
        let removed = replicas.remove(addr).is_some();
        if removed {
            info!("detached replica {}", addr);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.replicas.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forwards a write command to every attached replica.
    ///
    /// The registry lock is released before any socket write so a slow
    /// replica cannot hold up attach/detach, and a failed write detaches the
    /// offender instead of surfacing an error.
    pub async fn propagate(&self, frame: &Frame) {
        let targets: Vec<(SocketAddr, SharedWriter)> = {
            let replicas = self.replicas.lock().unwrap();
            replicas
                .iter()
                .map(|(addr, writer)| (*addr, writer.clone()))
                .collect()
        };

        if targets.is_empty() {
            return;
        }

        let bytes = frame.serialize();

        for (addr, writer) in targets {
            let mut writer = writer.lock().await;
            match writer.write_all(&bytes).await {
                Ok(()) => debug!("propagated {} bytes to replica {}", bytes.len(), addr),
                Err(err) => {
                    warn!("dropping replica {}: {}", addr, err);
                    drop(writer);
                    self.detach(&addr);
                }
            }
        }
    }
}

impl Default for ReplicaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use bytes::Bytes;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    use crate::connection::Connection;

    async fn writer_pair() -> (SharedWriter, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = TcpStream::connect(addr).await.unwrap();
        let (server_side, _) = listener.accept().await.unwrap();

        (Connection::new(server_side).writer(), client)
    }

    #[test]
    fn replication_id_is_forty_hex_chars() {
        assert_eq!(REPLICATION_ID.len(), 40);
        assert!(REPLICATION_ID.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn attach_propagate_detach() {
        let registry = ReplicaRegistry::new();
        let (writer, mut replica_end) = writer_pair().await;
        let addr: SocketAddr = "127.0.0.1:7001".parse().unwrap();

        registry.attach(addr, writer);
        assert_eq!(registry.len(), 1);

        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("set")),
            Frame::Bulk(Bytes::from("k")),
            Frame::Bulk(Bytes::from("v")),
        ]);
        registry.propagate(&frame).await;

        let mut received = vec![0u8; frame.serialize().len()];
        replica_end.read_exact(&mut received).await.unwrap();
        assert_eq!(received, frame.serialize());

        assert!(registry.detach(&addr));
        assert!(!registry.detach(&addr));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn propagate_detaches_failed_replica() {
        let registry = ReplicaRegistry::new();
        let (writer, replica_end) = writer_pair().await;
        let addr: SocketAddr = "127.0.0.1:7002".parse().unwrap();

        registry.attach(addr, writer);
        drop(replica_end);

        // The peer is gone; a couple of propagations later the write fails
        // and the replica is pruned.
        let frame = Frame::command(&["set", "k", "v"]);
        for _ in 0..8 {
            registry.propagate(&frame).await;
            if registry.is_empty() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        }

        assert!(registry.is_empty());
    }
}
