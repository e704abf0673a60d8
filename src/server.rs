use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, instrument, warn};

use crate::commands::executable::Executable;
use crate::commands::Command;
use crate::config::Config;
use crate::connection::Connection;
use crate::frame::Frame;
use crate::replica;
use crate::replication::{ReplicaRegistry, ReplicationInfo, EMPTY_SNAPSHOT};
use crate::store::Store;
use crate::Error;

/// State every connection handler works against: the keyspace, the replica
/// registry, the process's replication identity, and the gate that keeps
/// write propagation in acceptance order.
#[derive(Clone)]
pub struct Shared {
    pub store: Store,
    pub registry: ReplicaRegistry,
    pub replication: ReplicationInfo,
    write_gate: Arc<Mutex<()>>,
}

impl Shared {
    pub fn new(replication: ReplicationInfo) -> Shared {
        Shared {
            store: Store::new(),
            registry: ReplicaRegistry::new(),
            replication,
            write_gate: Arc::new(Mutex::new(())),
        }
    }

    /// Writes accepted on different connections must reach every replica in
    /// one global order. Applying and fanning out under this guard makes the
    /// acceptance order and the propagation order the same thing.
    pub async fn write_order(&self) -> MutexGuard<'_, ()> {
        self.write_gate.lock().await
    }
}

pub async fn run(config: Config) -> Result<(), Error> {
    let _ = tracing_subscriber::fmt()
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    let replication = match config.replicaof {
        Some(_) => ReplicationInfo::replica(),
        None => ReplicationInfo::primary(),
    };
    let shared = Shared::new(replication);

    let listener = TcpListener::bind(("127.0.0.1", config.port)).await?;
    info!(
        "server listening on {} as {:?}",
        listener.local_addr()?,
        shared.replication.role
    );

    if let Some(primary) = config.replicaof.clone() {
        let shared = shared.clone();
        let listening_port = config.port;
        tokio::spawn(async move {
            // A failed replication session never takes down the server; it
            // keeps serving reads from whatever state was applied.
            if let Err(e) = replica::run(primary, listening_port, shared).await {
                error!("replication session ended: {}", e);
            }
        });
    }

    loop {
        let (socket, client_address) = listener.accept().await?;
        let shared = shared.clone();
        info!("accepted connection from {:?}", client_address);

        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, client_address, shared).await {
                error!("connection error: {}", e);
            }
        });
    }
}

#[instrument(name = "connection", skip(stream, shared))]
async fn handle_connection(
    stream: TcpStream,
    client_address: SocketAddr,
    shared: Shared,
) -> Result<(), Error> {
    let mut conn = Connection::new(stream);

    let result = serve(&mut conn, client_address, &shared).await;

    // Whatever ended the loop, a connection that was serving as a replica
    // feed must disappear from the registry.
    shared.registry.detach(&client_address);
    info!("connection closed");

    result
}

async fn serve(
    conn: &mut Connection,
    client_address: SocketAddr,
    shared: &Shared,
) -> Result<(), Error> {
    // Set once the connection has been answered with a full resync; from
    // then on the socket belongs to the replication stream and command
    // replies must not be interleaved into it.
    let mut is_replica_feed = false;

    loop {
        let frame = match conn.read_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(()),
            Err(err) => {
                // The buffer is in an unknown state after a framing error,
                // so report and drop the connection.
                if !is_replica_feed {
                    let _ = conn.write_frame(&Frame::Error(error_reply(&err))).await;
                }
                return Err(err);
            }
        };

        debug!("received frame: {}", frame);

        let cmd = match Command::try_from(frame.clone()) {
            Ok(cmd) => cmd,
            Err(err) => {
                warn!("rejected command: {}", err);
                if !is_replica_feed {
                    conn.write_frame(&Frame::Error(error_reply(&err))).await?;
                }
                continue;
            }
        };

        match cmd {
            Command::Psync(cmd) => {
                let reply = cmd.exec(shared.clone())?;
                conn.write_frame(&reply).await?;
                conn.write_snapshot(EMPTY_SNAPSHOT).await?;
                shared.registry.attach(client_address, conn.writer());
                is_replica_feed = true;
            }
            Command::Replconf(cmd) if cmd.is_ack() => {
                // Acknowledgements are collected, never gated on.
                debug!("replica {} acknowledged offset {:?}", client_address, cmd.ack_offset());
            }
            cmd if cmd.is_write() => {
                let _order = shared.write_order().await;
                let reply = exec_reply(cmd, shared);
                if !is_replica_feed {
                    conn.write_frame(&reply).await?;
                }
                if !matches!(reply, Frame::Error(_)) {
                    shared.registry.propagate(&frame).await;
                }
            }
            cmd => {
                let reply = exec_reply(cmd, shared);
                if !is_replica_feed {
                    conn.write_frame(&reply).await?;
                }
            }
        }
    }
}

fn exec_reply(cmd: Command, shared: &Shared) -> Frame {
    match cmd.exec(shared.clone()) {
        Ok(frame) => frame,
        Err(err) => Frame::Error(error_reply(&err)),
    }
}

/// Renders an error the way clients expect it on the wire: prefixed with the
/// generic `ERR` code unless the error already carries one.
fn error_reply(err: &Error) -> String {
    let message = err.to_string();
    if message.starts_with("ERR ") {
        message
    } else {
        format!("ERR {}", message)
    }
}
