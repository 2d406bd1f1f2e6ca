use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::{Error, Result};
use super::{FRAME_END, FRAME_START, MAX_PAYLOAD_LEN};

/// One command or response on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub sequence: u8,
    pub command: u8,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(sequence: u8, command: u8, payload: impl Into<Bytes>) -> Self {
        Frame {
            sequence,
            command,
            payload: payload.into(),
        }
    }
}

/// Encodes `[0x55, sequence, command, payload.., 0xAA]`
pub fn encode(sequence: u8, command: u8, payload: &[u8]) -> Bytes {
    let mut dst = BytesMut::with_capacity(payload.len() + 4);
    put_frame(sequence, command, payload, &mut dst);
    dst.freeze()
}

/// Decodes a complete frame
pub fn decode(src: &[u8]) -> Result<Frame> {
    match (src.first(), src.last()) {
        (Some(&FRAME_START), Some(&FRAME_END)) => {}
        _ => return Err(Error::InvalidMagic),
    }
    if src.len() < 4 {
        return Err(Error::protocol(format!("frame too short: {} bytes", src.len())));
    }

    Ok(Frame {
        sequence: src[1],
        command: src[2],
        payload: Bytes::copy_from_slice(&src[3..src.len() - 1]),
    })
}

fn put_frame(sequence: u8, command: u8, payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(payload.len() + 4);
    dst.put_u8(FRAME_START);
    dst.put_u8(sequence);
    dst.put_u8(command);
    dst.put_slice(payload);
    dst.put_u8(FRAME_END);
}

/// Frame codec for GATT writes and notifications.
///
/// Every notification carries exactly one frame, so the decoder consumes the
/// whole buffer it is handed.
#[derive(Clone, Default)]
pub struct FrameCodec;

impl FrameCodec {
    /// Creates a new frame codec
    pub fn new() -> Self {
        FrameCodec
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.is_empty() {
            return Ok(None);
        }

        let datagram = src.split();
        decode(&datagram).map(Some)
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        if item.payload.len() > MAX_PAYLOAD_LEN {
            return Err(Error::protocol(format!(
                "payload of {} bytes exceeds {} byte limit",
                item.payload.len(),
                MAX_PAYLOAD_LEN
            )));
        }

        put_frame(item.sequence, item.command, &item.payload, dst);
        Ok(())
    }
}
