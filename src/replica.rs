use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::commands::executable::Executable;
use crate::commands::Command;
use crate::config::PrimaryAddr;
use crate::connection::Connection;
use crate::frame::Frame;
use crate::server::Shared;
use crate::Error;

/// Runs one replication session against the primary: dial, handshake,
/// snapshot drain, then the live command stream until the connection dies.
pub async fn run(primary: PrimaryAddr, listening_port: u16, shared: Shared) -> Result<(), Error> {
    let mut session = ReplicaSession::connect(&primary, listening_port, shared).await?;
    session.handshake().await?;
    session.stream_commands().await
}

/// The replica's side of a primary connection.
pub struct ReplicaSession {
    conn: Connection,
    shared: Shared,
    listening_port: u16,
    // Bytes of framed commands consumed from the primary after the snapshot.
    bytes_applied: u64,
}

impl ReplicaSession {
    pub async fn connect(
        primary: &PrimaryAddr,
        listening_port: u16,
        shared: Shared,
    ) -> Result<ReplicaSession, Error> {
        info!("connecting to primary at {}:{}", primary.host, primary.port);
        let stream = TcpStream::connect((primary.host.as_str(), primary.port)).await?;

        Ok(ReplicaSession {
            conn: Connection::new(stream),
            shared,
            listening_port,
            bytes_applied: 0,
        })
    }

    /// The four-step attach sequence. Each step blocks on the primary's
    /// response before the next request goes out.
    pub async fn handshake(&mut self) -> Result<(), Error> {
        let reply = self.request(&["PING"]).await?;
        expect_simple(&reply, "PONG")?;

        let port = self.listening_port.to_string();
        let reply = self
            .request(&["REPLCONF", "listening-port", &port])
            .await?;
        expect_simple(&reply, "OK")?;

        let reply = self.request(&["REPLCONF", "capa", "psync2"]).await?;
        expect_simple(&reply, "OK")?;

        let reply = self.request(&["PSYNC", "?", "-1"]).await?;
        match reply {
            Frame::Simple(s) if s.to_uppercase().starts_with("FULLRESYNC") => {
                info!("primary replied: {}", s);
            }
            frame => return Err(format!("expected FULLRESYNC, got {}", frame).into()),
        }

        // The snapshot contents are opaque; drain and discard.
        let snapshot = self
            .conn
            .read_snapshot()
            .await?
            .ok_or("primary closed before sending a snapshot")?;
        debug!("discarded {} byte snapshot", snapshot.len());

        info!("replication handshake completed");
        Ok(())
    }

    /// Applies the primary's command stream to the local keyspace without
    /// ever writing replies on this socket, except for requested ACKs.
    pub async fn stream_commands(&mut self) -> Result<(), Error> {
        while let Some((frame, consumed)) = self.conn.read_frame_counted().await? {
            self.apply(frame, consumed).await?;
        }

        info!("primary closed the replication stream");
        Ok(())
    }

    async fn apply(&mut self, frame: Frame, consumed: usize) -> Result<(), Error> {
        match Command::try_from(frame) {
            Ok(Command::Replconf(cmd)) if cmd.is_getack() => {
                // The ACK reports how much was applied before this very
                // request; its own bytes count only afterwards.
                let offset = self.bytes_applied.to_string();
                let ack = Frame::command(&["REPLCONF", "ACK", &offset]);
                self.conn.write_frame(&ack).await?;
                debug!("acknowledged offset {}", offset);
            }
            Ok(cmd) => {
                if let Err(err) = cmd.exec(self.shared.clone()) {
                    warn!("failed to apply command from primary: {}", err);
                }
            }
            Err(err) => {
                warn!("unparseable command from primary: {}", err);
            }
        }

        self.bytes_applied += consumed as u64;
        Ok(())
    }

    /// Applied-offset counter, for inspection.
    pub fn bytes_applied(&self) -> u64 {
        self.bytes_applied
    }

    async fn request(&mut self, parts: &[&str]) -> Result<Frame, Error> {
        let frame = Frame::command(parts);
        self.conn.write_frame(&frame).await?;

        match self.conn.read_frame().await? {
            Some(reply) => {
                debug!("primary replied: {}", reply);
                Ok(reply)
            }
            None => Err("primary closed the connection during the handshake".into()),
        }
    }
}

fn expect_simple(frame: &Frame, expected: &str) -> Result<(), Error> {
    match frame {
        Frame::Simple(s) if s.eq_ignore_ascii_case(expected) => Ok(()),
        frame => Err(format!("expected +{}, got {}", expected, frame).into()),
    }
}
