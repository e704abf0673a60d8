use bytes::{Buf, Bytes, BytesMut};
use std::convert::TryInto;
use std::io::Cursor;
use tokio_util::codec::Decoder;

use crate::frame::{self, Frame};
use crate::Error;

/// Extracts whole protocol frames from a growing byte buffer.
///
/// TCP reads split messages arbitrarily, so a decode pass either consumes
/// exactly one frame's bytes from the front of `src` or leaves the buffer
/// untouched and asks for more.
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut cursor = Cursor::new(&src[..]);
        let frame = match Frame::parse(&mut cursor) {
            Ok(frame) => frame,
            Err(frame::Error::Incomplete) => return Ok(None), // Not enough data to parse a frame.
            Err(err) => return Err(err.into()),
        };

        let position: usize = cursor
            .position()
            .try_into()
            .expect("cursor position is too large");

        // Remove the parsed frame from the buffer.
        src.advance(position);

        Ok(Some(frame))
    }
}

/// Extracts the one-shot snapshot payload a primary sends after answering a
/// sync request: `$<len>\r\n<len bytes>` with NO trailing CRLF, so it is not
/// a bulk string and `FrameCodec` must not be used for it.
pub struct SnapshotCodec;

impl Decoder for SnapshotCodec {
    type Item = Bytes;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(first_byte) = src.first() else {
            return Ok(None);
        };

        if *first_byte != b'$' {
            return Err(format!("invalid snapshot header byte: {}", first_byte).into());
        }

        let Some(header_end) = src.windows(2).position(|window| window == b"\r\n") else {
            return Ok(None);
        };

        let length = std::str::from_utf8(&src[1..header_end])
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or("invalid snapshot length")?;

        let payload_start = header_end + 2;
        if src.len() < payload_start + length {
            return Ok(None);
        }

        src.advance(payload_start);
        let payload = src.split_to(length).freeze();

        Ok(Some(payload))
    }
}
