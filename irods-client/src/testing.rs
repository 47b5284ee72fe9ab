//! In-memory transport and reply builders for tests.

use crate::connection::{Connection, ConnectionConfig, Identity};
use crate::error::ClientError;
use crate::transport::Transport;
use bytes::{Bytes, BytesMut};
use irods_protocol::message::{CsNeg, RErrMsg, RError, Version};
use irods_protocol::{Codec, Frame, MsgType, PackingInstruction};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Script {
    replies: BytesMut,
    written: BytesMut,
    closed: bool,
    stall: bool,
    fail_close: bool,
}

/// Serves pre-encoded reply frames and records everything written.
///
/// Clones share the same script, so a test can keep a handle after
/// moving the transport into a connection.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `frame` after the replies already queued.
    pub fn reply(self, frame: Frame) -> Self {
        let encoded = frame.encode(&Codec::standard()).unwrap();
        self.script.lock().unwrap().replies.extend_from_slice(&encoded);
        self
    }

    /// Queues `frames` ahead of the replies already queued.
    pub fn prepend(self, frames: &[Frame]) -> Self {
        let codec = Codec::standard();
        {
            let mut script = self.script.lock().unwrap();
            let mut replies = BytesMut::new();
            for frame in frames {
                replies.extend_from_slice(&frame.encode(&codec).unwrap());
            }
            replies.extend_from_slice(&script.replies);
            script.replies = replies;
        }
        self
    }

    /// Reads block forever once the queued replies run out.
    pub fn stall_reads(self) -> Self {
        self.script.lock().unwrap().stall = true;
        self
    }

    /// Closing still closes, then reports an error.
    pub fn fail_close(self) -> Self {
        self.script.lock().unwrap().fail_close = true;
        self
    }

    /// Every frame written so far.
    pub fn sent_frames(&self) -> Vec<Frame> {
        let codec = Codec::standard();
        let mut written = self.script.lock().unwrap().written.clone();
        let mut frames = Vec::new();
        while let Some(frame) = Frame::decode(&mut written, &codec).unwrap() {
            frames.push(frame);
        }
        assert!(written.is_empty(), "partial frame written");
        frames
    }

    /// API requests written so far.
    pub fn api_requests(&self) -> Vec<Frame> {
        self.sent_frames()
            .into_iter()
            .filter(|f| f.msg_type == MsgType::ApiRequest)
            .collect()
    }
}

impl Transport for ScriptedTransport {
    async fn write_bytes(&mut self, data: &[u8]) -> Result<(), ClientError> {
        let mut script = self.script.lock().unwrap();
        if script.closed {
            return Err(ClientError::ConnectionClosed);
        }
        script.written.extend_from_slice(data);
        Ok(())
    }

    async fn read_exactly(&mut self, len: usize) -> Result<Bytes, ClientError> {
        let stall = {
            let mut script = self.script.lock().unwrap();
            if script.closed {
                return Err(ClientError::ConnectionClosed);
            }
            if script.replies.len() >= len {
                return Ok(script.replies.split_to(len).freeze());
            }
            script.stall
        };
        if stall {
            std::future::pending::<()>().await;
        }
        Err(ClientError::ConnectionClosed)
    }

    fn is_open(&self) -> bool {
        !self.script.lock().unwrap().closed
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        let mut script = self.script.lock().unwrap();
        script.closed = true;
        if script.fail_close {
            return Err(ClientError::Io(std::io::Error::other("close failed")));
        }
        Ok(())
    }
}

pub(crate) fn test_config() -> ConnectionConfig {
    ConnectionConfig::new("localhost", 1247, Identity::new("rods", "tempZone"))
}

/// An API reply with `status` and `body`.
pub(crate) fn api_reply<T: PackingInstruction>(status: i32, body: &T) -> Frame {
    Frame::new(MsgType::ApiReply)
        .with_int_info(status)
        .with_body(Codec::standard().encode_message(body).unwrap())
}

/// A reply of type `msg_type` carrying `status` and a one-message error block.
pub(crate) fn error_reply(msg_type: MsgType, status: i32, message: &str) -> Frame {
    let error = RError {
        messages: vec![RErrMsg {
            status,
            msg: message.to_string(),
        }],
    };
    Frame::new(msg_type)
        .with_int_info(status)
        .with_error(Codec::standard().encode_message(&error).unwrap())
}

/// Queues the server's side of a negotiated handshake ahead of `transport`'s replies.
pub(crate) fn handshake(transport: ScriptedTransport, server_policy: &str) -> ScriptedTransport {
    let codec = Codec::standard();
    let neg = CsNeg {
        status: 1,
        result: server_policy.to_string(),
    };
    let version = Version {
        status: 0,
        rel_version: "rods4.3.2".into(),
        api_version: "d".into(),
        reconn_port: 0,
        reconn_addr: String::new(),
        cookie: 400,
    };
    transport.prepend(&[
        Frame::new(MsgType::NegotiationResult).with_body(codec.encode_message(&neg).unwrap()),
        Frame::new(MsgType::Version).with_body(codec.encode_message(&version).unwrap()),
    ])
}

/// A ready connection whose transport then serves `transport`'s replies.
pub(crate) async fn connected(transport: ScriptedTransport) -> Connection<ScriptedTransport> {
    Connection::connect(handshake(transport, "CS_NEG_REFUSE"), test_config())
        .await
        .unwrap()
}
