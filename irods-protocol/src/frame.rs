//! Message framing.
//!
//! Every message on the wire has four parts after a length prefix:
//!
//! ```text
//! +-------------+-------------------+------+-------+--------+
//! | header_len  | MsgHeader_PI      | body | error | binary |
//! | 4 bytes, BE | header_len bytes  | msgLen | errorLen | bsLen |
//! +-------------+-------------------+------+-------+--------+
//! ```
//!
//! The header is itself a packing instruction naming the message type,
//! the lengths of the three sections that follow, and an integer that
//! carries the API number on requests and the status on replies.

use crate::codec::Codec;
use crate::error::ProtocolError;
use crate::message::MsgHeader;
use crate::{MAX_HEADER_SIZE, MAX_SECTION_SIZE};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use std::str::FromStr;

/// Size of the header length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Message type carried in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgType {
    Connect,
    NegotiationResult,
    Version,
    ApiRequest,
    ApiReply,
    Disconnect,
}

impl MsgType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MsgType::Connect => "RODS_CONNECT",
            MsgType::NegotiationResult => "RODS_CS_NEG_T",
            MsgType::Version => "RODS_VERSION",
            MsgType::ApiRequest => "RODS_API_REQ",
            MsgType::ApiReply => "RODS_API_REPLY",
            MsgType::Disconnect => "RODS_DISCONNECT",
        }
    }
}

impl FromStr for MsgType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "RODS_CONNECT" => Ok(MsgType::Connect),
            "RODS_CS_NEG_T" => Ok(MsgType::NegotiationResult),
            "RODS_VERSION" => Ok(MsgType::Version),
            "RODS_API_REQ" => Ok(MsgType::ApiRequest),
            "RODS_API_REPLY" => Ok(MsgType::ApiReply),
            "RODS_DISCONNECT" => Ok(MsgType::Disconnect),
            other => Err(ProtocolError::UnknownMessageType(other.to_string())),
        }
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated header: message type and section lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub msg_type: MsgType,
    pub body_len: usize,
    pub error_len: usize,
    pub binary_len: usize,
    pub int_info: i32,
}

impl FrameHeader {
    /// Reads the header length prefix.
    pub fn prefix_len(prefix: [u8; LENGTH_PREFIX_SIZE]) -> Result<usize, ProtocolError> {
        let len = i32::from_be_bytes(prefix);
        let len = section_len("header", len)?;
        if len > MAX_HEADER_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                section: "header",
                size: len,
                max: MAX_HEADER_SIZE,
            });
        }
        Ok(len)
    }

    /// Decodes and validates the header packing instruction.
    pub fn decode(codec: &Codec, bytes: &[u8]) -> Result<Self, ProtocolError> {
        let header: MsgHeader = codec.decode_message(bytes)?;
        Ok(Self {
            msg_type: header.msg_type.parse()?,
            body_len: section_len("body", header.msg_len)?,
            error_len: section_len("error", header.error_len)?,
            binary_len: section_len("binary", header.bs_len)?,
            int_info: header.int_info,
        })
    }

    /// Total length of the three sections that follow the header.
    pub fn payload_len(&self) -> usize {
        self.body_len + self.error_len + self.binary_len
    }
}

fn section_len(section: &'static str, len: i32) -> Result<usize, ProtocolError> {
    if len < 0 {
        return Err(ProtocolError::NegativeLength {
            section,
            len: len.into(),
        });
    }
    let len = len as usize;
    if len > MAX_SECTION_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            section,
            size: len,
            max: MAX_SECTION_SIZE,
        });
    }
    Ok(len)
}

/// A complete message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub msg_type: MsgType,
    /// API number on requests, status on replies.
    pub int_info: i32,
    pub body: Bytes,
    pub error: Bytes,
    pub binary: Bytes,
}

impl Frame {
    pub fn new(msg_type: MsgType) -> Self {
        Self {
            msg_type,
            int_info: 0,
            body: Bytes::new(),
            error: Bytes::new(),
            binary: Bytes::new(),
        }
    }

    /// An API request for `api_number` carrying `body`.
    pub fn api_request(api_number: i32, body: Bytes) -> Self {
        Self::new(MsgType::ApiRequest)
            .with_int_info(api_number)
            .with_body(body)
    }

    pub fn with_int_info(mut self, int_info: i32) -> Self {
        self.int_info = int_info;
        self
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    pub fn with_error(mut self, error: Bytes) -> Self {
        self.error = error;
        self
    }

    pub fn with_binary(mut self, binary: Bytes) -> Self {
        self.binary = binary;
        self
    }

    /// Reply status, the integer carried in the header.
    pub fn status(&self) -> i32 {
        self.int_info
    }

    fn header(&self) -> Result<MsgHeader, ProtocolError> {
        let len = |section: &'static str, bytes: &Bytes| -> Result<i32, ProtocolError> {
            if bytes.len() > MAX_SECTION_SIZE {
                return Err(ProtocolError::FrameTooLarge {
                    section,
                    size: bytes.len(),
                    max: MAX_SECTION_SIZE,
                });
            }
            Ok(bytes.len() as i32)
        };
        Ok(MsgHeader {
            msg_type: self.msg_type.as_str().to_string(),
            msg_len: len("body", &self.body)?,
            error_len: len("error", &self.error)?,
            bs_len: len("binary", &self.binary)?,
            int_info: self.int_info,
        })
    }

    /// Encodes the frame, header prefix included.
    pub fn encode(&self, codec: &Codec) -> Result<BytesMut, ProtocolError> {
        let header = codec.encode_message(&self.header()?)?;
        if header.len() > MAX_HEADER_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                section: "header",
                size: header.len(),
                max: MAX_HEADER_SIZE,
            });
        }

        let total = LENGTH_PREFIX_SIZE
            + header.len()
            + self.body.len()
            + self.error.len()
            + self.binary.len();
        let mut buf = BytesMut::with_capacity(total);
        buf.put_u32(header.len() as u32);
        buf.put_slice(&header);
        buf.put_slice(&self.body);
        buf.put_slice(&self.error);
        buf.put_slice(&self.binary);
        Ok(buf)
    }

    /// Decodes a frame from the front of `buf`.
    ///
    /// Returns `Ok(Some(frame))` and consumes its bytes when a complete frame
    /// is buffered, `Ok(None)` without consuming anything when more bytes are
    /// needed, or `Err` on a malformed or oversized header.
    pub fn decode(buf: &mut BytesMut, codec: &Codec) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }
        let header_len = FrameHeader::prefix_len([buf[0], buf[1], buf[2], buf[3]])?;
        if buf.len() < LENGTH_PREFIX_SIZE + header_len {
            return Ok(None);
        }

        let header = FrameHeader::decode(
            codec,
            &buf[LENGTH_PREFIX_SIZE..LENGTH_PREFIX_SIZE + header_len],
        )?;
        if buf.len() < LENGTH_PREFIX_SIZE + header_len + header.payload_len() {
            return Ok(None);
        }

        buf.advance(LENGTH_PREFIX_SIZE + header_len);
        let body = buf.split_to(header.body_len).freeze();
        let error = buf.split_to(header.error_len).freeze();
        let binary = buf.split_to(header.binary_len).freeze();

        Ok(Some(Self {
            msg_type: header.msg_type,
            int_info: header.int_info,
            body,
            error,
            binary,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_roundtrip() {
        let codec = Codec::standard();
        let frame = Frame::api_request(702, Bytes::from_static(b"<STR_PI><myStr>x</myStr></STR_PI>"))
            .with_binary(Bytes::from_static(b"\x00\x01\x02"));

        let mut buf = frame.encode(&codec).unwrap();
        let decoded = Frame::decode(&mut buf, &codec).unwrap().unwrap();

        assert_eq!(decoded, frame);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_header_layout() {
        let codec = Codec::standard();
        let frame = Frame::new(MsgType::Disconnect);
        let buf = frame.encode(&codec).unwrap();

        let header_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(buf.len(), 4 + header_len);
        let header = std::str::from_utf8(&buf[4..]).unwrap();
        assert_eq!(
            header,
            "<MsgHeader_PI><type>RODS_DISCONNECT</type><msgLen>0</msgLen>\
             <errorLen>0</errorLen><bsLen>0</bsLen><intInfo>0</intInfo></MsgHeader_PI>"
        );
    }

    #[test]
    fn test_incomplete_frame() {
        let codec = Codec::standard();
        let frame = Frame::new(MsgType::ApiReply).with_body(Bytes::from_static(b"<INT_PI><myInt>1</myInt></INT_PI>"));
        let full = frame.encode(&codec).unwrap();

        for cut in [0, 2, 4, 10, full.len() - 1] {
            let mut partial = BytesMut::from(&full[..cut]);
            assert!(Frame::decode(&mut partial, &codec).unwrap().is_none());
            assert_eq!(partial.len(), cut);
        }
    }

    #[test]
    fn test_two_frames_in_one_buffer() {
        let codec = Codec::standard();
        let a = Frame::new(MsgType::Version).with_body(Bytes::from_static(b"a"));
        let b = Frame::new(MsgType::ApiReply).with_int_info(-808000);

        let mut buf = a.encode(&codec).unwrap();
        buf.extend_from_slice(&b.encode(&codec).unwrap());

        assert_eq!(Frame::decode(&mut buf, &codec).unwrap().unwrap(), a);
        let second = Frame::decode(&mut buf, &codec).unwrap().unwrap();
        assert_eq!(second.status(), -808000);
        assert!(Frame::decode(&mut buf, &codec).unwrap().is_none());
    }

    #[test]
    fn test_negative_section_length() {
        let codec = Codec::standard();
        let header = b"<MsgHeader_PI><type>RODS_API_REPLY</type><msgLen>-5</msgLen></MsgHeader_PI>";
        let mut buf = BytesMut::new();
        buf.put_u32(header.len() as u32);
        buf.put_slice(header);

        let err = Frame::decode(&mut buf, &codec).unwrap_err();
        assert!(matches!(err, ProtocolError::NegativeLength { section: "body", len: -5 }));
    }

    #[test]
    fn test_oversized_header_prefix() {
        let err = FrameHeader::prefix_len((MAX_HEADER_SIZE as u32 + 1).to_be_bytes()).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { section: "header", .. }));
    }

    #[test]
    fn test_unknown_message_type() {
        assert!("RODS_API_REPLY".parse::<MsgType>().is_ok());
        assert!(matches!(
            "RODS_NOPE".parse::<MsgType>(),
            Err(ProtocolError::UnknownMessageType(_))
        ));
        assert_eq!(MsgType::NegotiationResult.to_string(), "RODS_CS_NEG_T");
    }
}
