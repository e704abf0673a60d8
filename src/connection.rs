use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::Decoder;

use crate::codec::{FrameCodec, SnapshotCodec};
use crate::frame::Frame;

/// Write half of a connection, shared between the per-connection handler and
/// the replica registry. Whole frames are written under the mutex so the two
/// producers never interleave mid-frame.
pub type SharedWriter = Arc<Mutex<OwnedWriteHalf>>;

pub struct Connection {
    reader: OwnedReadHalf,
    writer: SharedWriter,
    // Data is read from the socket into the read buffer. When a frame is
    // parsed, the corresponding data is removed from the buffer.
    buffer: BytesMut,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Connection {
        let (reader, writer) = stream.into_split();

        Connection {
            reader,
            writer: Arc::new(Mutex::new(writer)),
            // Allocate the buffer with 4kb of capacity.
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Handle for the replica registry to fan out through.
    pub fn writer(&self) -> SharedWriter {
        self.writer.clone()
    }

    pub async fn read_frame(&mut self) -> crate::Result<Option<Frame>> {
        let frame = self.read_frame_counted().await?;
        Ok(frame.map(|(frame, _)| frame))
    }

    /// Like [`read_frame`], but also reports how many bytes the frame
    /// occupied on the wire. Replicas account their applied offset with this.
    ///
    /// [`read_frame`]: Connection::read_frame
    pub async fn read_frame_counted(&mut self) -> crate::Result<Option<(Frame, usize)>> {
        let mut codec = FrameCodec;

        loop {
            let before = self.buffer.len();
            if let Some(frame) = codec.decode(&mut self.buffer)? {
                return Ok(Some((frame, before - self.buffer.len())));
            }

            if 0 == self.reader.read_buf(&mut self.buffer).await? {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err("connection reset by peer".into());
            }
        }
    }

    /// Reads the length-prefixed snapshot payload that follows a full-resync
    /// reply. Returns `None` if the peer closed before sending one.
    pub async fn read_snapshot(&mut self) -> crate::Result<Option<Bytes>> {
        let mut codec = SnapshotCodec;

        loop {
            if let Some(payload) = codec.decode(&mut self.buffer)? {
                return Ok(Some(payload));
            }

            if 0 == self.reader.read_buf(&mut self.buffer).await? {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err("connection reset by peer".into());
            }
        }
    }

    pub async fn write_frame(&self, frame: &Frame) -> crate::Result<()> {
        let bytes = frame.serialize();
        let mut writer = self.writer.lock().await;
        writer.write_all(&bytes).await?;
        Ok(())
    }

    /// Sends `$<len>\r\n<payload>` without a trailing CRLF, the framing a
    /// snapshot travels in.
    pub async fn write_snapshot(&self, payload: &[u8]) -> crate::Result<()> {
        let mut writer = self.writer.lock().await;
        writer
            .write_all(format!("${}\r\n", payload.len()).as_bytes())
            .await?;
        writer.write_all(payload).await?;
        Ok(())
    }
}
