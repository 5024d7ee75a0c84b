use crate::NetError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

const OP_OPEN: u8 = 0x01;
const OP_DATA: u8 = 0x02;
const OP_ACK: u8 = 0x03;
const OP_CLOSE: u8 = 0x04;
const OP_RESET: u8 = 0x05;

const HEADER_LEN: usize = 1 + 2 + 2; // op | stream_id | length

/// one frame of the mux protocol
///
/// each [`MuxFrame`] is carried as the plaintext of exactly one noise
/// transport message; the outer [`NoiseEncryptedEncoder`]/[`NoiseEncryptedDecoder`]
/// already delimit frame boundaries, so encoding/decoding here never
/// needs to buffer partial frames.
///
/// [`NoiseEncryptedEncoder`]: crate::codec::NoiseEncryptedEncoder
/// [`NoiseEncryptedDecoder`]: crate::codec::NoiseEncryptedDecoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuxFrame {
    Open { stream_id: u16 },
    Data { stream_id: u16, payload: Bytes },
    Ack { stream_id: u16, bytes_freed: u32 },
    Close { stream_id: u16 },
    Reset { stream_id: u16, code: u8 },
}

impl MuxFrame {
    pub fn stream_id(&self) -> u16 {
        match self {
            Self::Open { stream_id }
            | Self::Data { stream_id, .. }
            | Self::Ack { stream_id, .. }
            | Self::Close { stream_id }
            | Self::Reset { stream_id, .. } => *stream_id,
        }
    }

    pub fn encode(&self) -> BytesMut {
        match self {
            Self::Open { stream_id } => Self::encode_header(OP_OPEN, *stream_id, 0),
            Self::Data {
                stream_id,
                payload,
            } => {
                let mut dst = Self::encode_header(OP_DATA, *stream_id, payload.len());
                dst.extend_from_slice(payload);
                dst
            }
            Self::Ack {
                stream_id,
                bytes_freed,
            } => {
                let mut dst = Self::encode_header(OP_ACK, *stream_id, 4);
                dst.put_u32(*bytes_freed);
                dst
            }
            Self::Close { stream_id } => Self::encode_header(OP_CLOSE, *stream_id, 0),
            Self::Reset { stream_id, code } => {
                let mut dst = Self::encode_header(OP_RESET, *stream_id, 1);
                dst.put_u8(*code);
                dst
            }
        }
    }

    fn encode_header(op: u8, stream_id: u16, length: usize) -> BytesMut {
        let mut dst = BytesMut::with_capacity(HEADER_LEN + length);
        dst.put_u8(op);
        dst.put_u16(stream_id);
        dst.put_u16(length as u16);
        dst
    }

    pub fn decode(mut src: &[u8]) -> Result<Self, NetError> {
        if src.len() < HEADER_LEN {
            return Err(NetError::ProtocolError("mux frame too short".into()));
        }

        let op = src.get_u8();
        let stream_id = src.get_u16();
        let length = src.get_u16() as usize;

        if src.len() != length {
            return Err(NetError::ProtocolError(
                "mux frame length does not match payload".into(),
            ));
        }

        match op {
            OP_OPEN => Ok(Self::Open { stream_id }),
            OP_DATA => Ok(Self::Data {
                stream_id,
                payload: Bytes::copy_from_slice(src),
            }),
            OP_ACK => {
                if length != 4 {
                    return Err(NetError::ProtocolError("malformed ack frame".into()));
                }
                Ok(Self::Ack {
                    stream_id,
                    bytes_freed: src.get_u32(),
                })
            }
            OP_CLOSE => Ok(Self::Close { stream_id }),
            OP_RESET => {
                if length != 1 {
                    return Err(NetError::ProtocolError("malformed reset frame".into()));
                }
                Ok(Self::Reset {
                    stream_id,
                    code: src.get_u8(),
                })
            }
            unknown => Err(NetError::ProtocolError(format!(
                "unknown mux opcode {}",
                unknown
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_frame_roundtrips() {
        let frame = MuxFrame::Data {
            stream_id: 42,
            payload: Bytes::from_static(b"hello"),
        };

        let encoded = frame.encode();
        let decoded = MuxFrame::decode(&encoded).unwrap();

        assert_eq!(frame, decoded);
    }

    #[test]
    fn ack_frame_roundtrips() {
        let frame = MuxFrame::Ack {
            stream_id: 7,
            bytes_freed: 4096,
        };

        let encoded = frame.encode();
        let decoded = MuxFrame::decode(&encoded).unwrap();

        assert_eq!(frame, decoded);
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        let mut bytes = BytesMut::new();
        bytes.put_u8(0xff);
        bytes.put_u16(1);
        bytes.put_u16(0);

        assert!(MuxFrame::decode(&bytes).is_err());
    }
}
