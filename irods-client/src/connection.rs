//! Connection management.
//!
//! A [`Connection`] owns one transport and drives it through the startup
//! handshake, then carries API requests strictly one at a time:
//!
//! ```text
//! Disconnected -> ConnectSent -> NegotiatingSecurity -> VersionExchanged -> Ready
//!                                                                          |  ^
//!                                                                          v  |
//!                                                                    ApiCallInFlight
//! ```
//!
//! Every operation takes `&mut self`, so a connection cannot be shared by
//! concurrent callers.

use crate::auth::AuthScheme;
use crate::config::REQUEST_NEGOTIATION;
use crate::error::ClientError;
use crate::negotiation::{negotiate, NegotiationOutcome, NegotiationPolicy, STATUS_SUCCESS};
use crate::transport::{StreamTransport, Transport};
use bytes::Bytes;
use irods_protocol::api::GET_LIBRARY_FEATURES_AN;
use irods_protocol::message::{CsNeg, RError, StartupPack, StrPi, Version};
use irods_protocol::{
    Codec, Frame, FrameHeader, MsgType, PackingInstruction, API_VERSION, LENGTH_PREFIX_SIZE,
    PROTOCOL_TEXT, REL_VERSION,
};
use std::time::Duration;
use tokio::net::TcpStream;

/// A user name qualified by its zone.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Identity {
    pub name: String,
    pub zone: String,
}

impl Identity {
    pub fn new(name: impl Into<String>, zone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            zone: zone.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.name.trim().is_empty() {
            return Err(ClientError::Validation("user name is empty".into()));
        }
        if self.zone.trim().is_empty() {
            return Err(ClientError::Validation(format!(
                "zone of user {} is empty",
                self.name
            )));
        }
        Ok(())
    }
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server host name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// User the requests are made for.
    pub client: Identity,
    /// User that authenticates; the client user when unset.
    pub proxy: Option<Identity>,
    /// Prefix of the startup option string.
    pub app_name: String,
    /// Whether to ask the server for security negotiation.
    pub request_negotiation: bool,
    /// Local negotiation policy.
    pub negotiation_policy: NegotiationPolicy,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Per-operation I/O timeout (none when unset).
    pub io_timeout: Option<Duration>,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16, client: Identity) -> Self {
        Self {
            host: host.into(),
            port,
            client,
            proxy: None,
            app_name: String::new(),
            request_negotiation: true,
            negotiation_policy: NegotiationPolicy::default(),
            connect_timeout: Duration::from_secs(10),
            io_timeout: None,
        }
    }

    pub fn with_proxy(mut self, proxy: Identity) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    pub fn with_negotiation(mut self, request: bool) -> Self {
        self.request_negotiation = request;
        self
    }

    pub fn with_negotiation_policy(mut self, policy: NegotiationPolicy) -> Self {
        self.negotiation_policy = policy;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = Some(timeout);
        self
    }

    fn startup_pack(&self) -> StartupPack {
        let proxy = self.proxy.as_ref().unwrap_or(&self.client);
        let option = if self.request_negotiation {
            format!("{}{}", self.app_name, REQUEST_NEGOTIATION)
        } else {
            self.app_name.clone()
        };
        StartupPack {
            irods_prot: PROTOCOL_TEXT,
            reconn_flag: 0,
            connect_cnt: 0,
            proxy_user: proxy.name.clone(),
            proxy_zone: proxy.zone.clone(),
            client_user: self.client.name.clone(),
            client_zone: self.client.zone.clone(),
            rel_version: REL_VERSION.to_string(),
            api_version: API_VERSION.to_string(),
            option,
        }
    }
}

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    ConnectSent,
    NegotiatingSecurity,
    VersionExchanged,
    Ready,
    ApiCallInFlight,
}

/// What the server reported about itself at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerVersion {
    pub status: i32,
    pub rel_version: String,
    pub api_version: String,
    pub reconn_port: i32,
    pub reconn_addr: String,
    pub cookie: i32,
}

impl From<Version> for ServerVersion {
    fn from(v: Version) -> Self {
        Self {
            status: v.status,
            rel_version: v.rel_version,
            api_version: v.api_version,
            reconn_port: v.reconn_port,
            reconn_addr: v.reconn_addr,
            cookie: v.cookie,
        }
    }
}

/// A raw API reply.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    /// Status from the header; negative values are legacy error codes.
    pub status: i32,
    pub body: Bytes,
    pub binary: Bytes,
    /// Decoded error block, when the server sent one.
    pub error: Option<RError>,
}

impl Reply {
    pub fn is_error(&self) -> bool {
        self.status < 0
    }

    /// Text of the error block, empty when there is none.
    pub fn error_text(&self) -> String {
        self.error.as_ref().map(RError::text).unwrap_or_default()
    }

    /// Turns a negative status into [`ClientError::Api`].
    pub fn into_result(self) -> Result<Self, ClientError> {
        if self.is_error() {
            return Err(ClientError::api(self.status, self.error_text()));
        }
        Ok(self)
    }

    /// Decodes the body as `T`, or `None` when the body is empty.
    pub fn decode<T: PackingInstruction>(&self, codec: &Codec) -> Result<Option<T>, ClientError> {
        if self.body.is_empty() {
            return Ok(None);
        }
        Ok(Some(codec.decode_message(&self.body)?))
    }
}

/// A connection to a catalog server.
pub struct Connection<T> {
    transport: T,
    codec: Codec,
    config: ConnectionConfig,
    state: ConnectionState,
    server: Option<ServerVersion>,
    /// Error block of the most recent reply.
    last_error: Option<RError>,
    authenticated: bool,
    frames_sent: u64,
    frames_received: u64,
}

impl Connection<StreamTransport<TcpStream>> {
    /// Opens a TCP connection and performs the startup handshake.
    pub async fn connect_tcp(config: ConnectionConfig) -> Result<Self, ClientError> {
        let mut transport =
            StreamTransport::connect(&config.host, config.port, config.connect_timeout).await?;
        if let Some(timeout) = config.io_timeout {
            transport = transport.with_io_timeout(timeout);
        }
        Self::connect(transport, config).await
    }
}

impl<T: Transport> Connection<T> {
    /// Performs the startup handshake over `transport`.
    ///
    /// The transport is closed if the handshake fails.
    pub async fn connect(transport: T, config: ConnectionConfig) -> Result<Self, ClientError> {
        Self::connect_with_codec(transport, config, Codec::standard()).await
    }

    /// Like [`Connection::connect`], with a caller-supplied codec.
    pub async fn connect_with_codec(
        mut transport: T,
        config: ConnectionConfig,
        codec: Codec,
    ) -> Result<Self, ClientError> {
        let identities = config
            .client
            .validate()
            .and_then(|_| config.proxy.as_ref().map_or(Ok(()), Identity::validate));
        if let Err(e) = identities {
            if let Err(close_err) = transport.close().await {
                tracing::warn!("Error closing transport: {}", close_err);
            }
            return Err(e);
        }

        let mut conn = Self {
            transport,
            codec,
            config,
            state: ConnectionState::Disconnected,
            server: None,
            last_error: None,
            authenticated: false,
            frames_sent: 0,
            frames_received: 0,
        };

        tracing::debug!("Starting startup handshake...");
        match conn.handshake().await {
            Ok(()) => {
                tracing::debug!("Handshake complete");
                conn.state = ConnectionState::Ready;
                Ok(conn)
            }
            Err(e) => {
                tracing::debug!("Handshake failed: {}", e);
                conn.abort().await;
                Err(e)
            }
        }
    }

    async fn handshake(&mut self) -> Result<(), ClientError> {
        let startup = self.codec.encode_message(&self.config.startup_pack())?;
        self.send_frame(&Frame::new(MsgType::Connect).with_body(startup))
            .await?;
        self.state = ConnectionState::ConnectSent;

        let mut frame = self.read_frame().await?;
        self.check_handshake_status(&frame)?;

        if frame.msg_type == MsgType::NegotiationResult {
            self.state = ConnectionState::NegotiatingSecurity;
            self.negotiate_security(&frame).await?;
            frame = self.read_frame().await?;
            self.check_handshake_status(&frame)?;
        }

        if frame.msg_type != MsgType::Version {
            return Err(ClientError::UnexpectedMessage {
                expected: MsgType::Version,
                found: frame.msg_type,
            });
        }
        let version: Version = self.decode_body(&frame.body, "startup")?;
        tracing::debug!(
            "Server release {} (API {})",
            version.rel_version,
            version.api_version
        );
        self.server = Some(version.into());
        self.state = ConnectionState::VersionExchanged;
        Ok(())
    }

    fn check_handshake_status(&mut self, frame: &Frame) -> Result<(), ClientError> {
        let error = self.decode_error_block(&frame.error);
        if frame.int_info < 0 {
            let text = error.as_ref().map(RError::text).unwrap_or_default();
            self.last_error = error;
            return Err(ClientError::api(frame.int_info, text));
        }
        Ok(())
    }

    async fn negotiate_security(&mut self, frame: &Frame) -> Result<(), ClientError> {
        let server: CsNeg = self.decode_body(&frame.body, "negotiation")?;
        if server.status != STATUS_SUCCESS {
            return Err(ClientError::Negotiation(format!(
                "server reported negotiation status {}",
                server.status
            )));
        }

        let client_policy = self.config.negotiation_policy;
        let (outcome, reason) = match server.result.parse::<NegotiationPolicy>() {
            Ok(server_policy) => (
                negotiate(client_policy, server_policy),
                format!("client policy {client_policy} conflicts with server policy {server_policy}"),
            ),
            Err(e) => (NegotiationOutcome::Failure, e),
        };
        tracing::debug!("Negotiation outcome: {}", outcome.as_str());

        let reply = CsNeg {
            status: outcome.status(),
            result: outcome.result_string(),
        };
        let body = self.codec.encode_message(&reply)?;
        self.send_frame(&Frame::new(MsgType::NegotiationResult).with_body(body))
            .await?;

        match outcome {
            NegotiationOutcome::UseTcp => Ok(()),
            NegotiationOutcome::UseSsl => Err(ClientError::TlsUnsupported),
            NegotiationOutcome::Failure => Err(ClientError::Negotiation(reason)),
        }
    }

    /// Sends one API request and returns the reply without interpreting
    /// its status.
    ///
    /// Transport and framing errors close the connection.
    pub async fn send_request(&mut self, request: Frame) -> Result<Reply, ClientError> {
        self.ensure_ready()?;

        self.state = ConnectionState::ApiCallInFlight;
        let result = self.round_trip(&request).await;
        let frame = match result {
            Ok(frame) => frame,
            Err(e) => {
                if e.is_fatal() {
                    tracing::debug!("API {} failed, closing connection: {}", request.int_info, e);
                    self.abort().await;
                }
                return Err(e);
            }
        };
        self.state = ConnectionState::Ready;

        let error = self.decode_error_block(&frame.error);
        self.last_error = error.clone();
        if frame.status() < 0 {
            tracing::debug!("API {} returned status {}", request.int_info, frame.status());
        }
        Ok(Reply {
            status: frame.status(),
            body: frame.body,
            binary: frame.binary,
            error,
        })
    }

    async fn round_trip(&mut self, request: &Frame) -> Result<Frame, ClientError> {
        self.send_frame(request).await?;
        let reply = self.read_frame().await?;
        if reply.msg_type != MsgType::ApiReply {
            return Err(ClientError::UnexpectedMessage {
                expected: MsgType::ApiReply,
                found: reply.msg_type,
            });
        }
        Ok(reply)
    }

    /// Sends `request` to API `api_number` and returns the raw reply.
    pub async fn exchange<Req>(&mut self, api_number: i32, request: &Req) -> Result<Reply, ClientError>
    where
        Req: PackingInstruction,
    {
        let body = self.codec.encode_message(request)?;
        self.send_request(Frame::api_request(api_number, body)).await
    }

    /// Calls API `api_number`, failing on a negative status. An empty
    /// reply body yields `None`.
    pub async fn call_optional<Req, Resp>(
        &mut self,
        api_number: i32,
        request: &Req,
    ) -> Result<Option<Resp>, ClientError>
    where
        Req: PackingInstruction,
        Resp: PackingInstruction,
    {
        let reply = self.exchange(api_number, request).await?.into_result()?;
        reply.decode(&self.codec)
    }

    /// Calls API `api_number` and decodes the reply body as `Resp`.
    pub async fn call<Req, Resp>(&mut self, api_number: i32, request: &Req) -> Result<Resp, ClientError>
    where
        Req: PackingInstruction,
        Resp: PackingInstruction,
    {
        self.call_optional(api_number, request)
            .await?
            .ok_or(ClientError::MissingReply(Resp::NAME))
    }

    /// Returns the features the server library was built with.
    pub async fn library_features(&mut self) -> Result<serde_json::Value, ClientError> {
        let reply = self
            .send_request(Frame::api_request(GET_LIBRARY_FEATURES_AN, Bytes::new()))
            .await?
            .into_result()?;
        let features: StrPi = reply
            .decode(&self.codec)?
            .ok_or(ClientError::MissingReply(StrPi::NAME))?;
        Ok(serde_json::from_str(&features.my_str)?)
    }

    /// Runs `scheme` against this connection and marks it authenticated.
    pub async fn authenticate<A: AuthScheme>(&mut self, scheme: &A) -> Result<(), ClientError> {
        self.ensure_ready()?;
        tracing::debug!("Authenticating with scheme {}", scheme.name());
        scheme.authenticate(self).await?;
        self.authenticated = true;
        tracing::debug!("Authentication successful");
        Ok(())
    }

    /// Says goodbye to the server and closes the transport.
    ///
    /// Calling this on a closed connection does nothing.
    pub async fn disconnect(&mut self) -> Result<(), ClientError> {
        if !self.transport.is_open() {
            self.state = ConnectionState::Disconnected;
            return Ok(());
        }

        tracing::debug!("Disconnecting...");
        if self.state == ConnectionState::Ready {
            if let Err(e) = self.send_frame(&Frame::new(MsgType::Disconnect)).await {
                tracing::debug!("Disconnect message not sent: {}", e);
            }
        }
        self.state = ConnectionState::Disconnected;
        self.authenticated = false;
        self.transport.close().await
    }

    async fn abort(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.authenticated = false;
        if let Err(e) = self.transport.close().await {
            tracing::debug!("Error closing transport: {}", e);
        }
    }

    fn ensure_ready(&self) -> Result<(), ClientError> {
        match self.state {
            ConnectionState::Ready if self.transport.is_open() => Ok(()),
            ConnectionState::ApiCallInFlight => Err(ClientError::Desynchronized),
            _ => Err(ClientError::NotConnected),
        }
    }

    async fn send_frame(&mut self, frame: &Frame) -> Result<(), ClientError> {
        let encoded = frame.encode(&self.codec)?;
        tracing::debug!(
            "Sending {} (int_info={}, {} bytes)",
            frame.msg_type,
            frame.int_info,
            encoded.len()
        );
        self.transport.write_bytes(&encoded).await?;
        self.frames_sent += 1;
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<Frame, ClientError> {
        let prefix = self.transport.read_exactly(LENGTH_PREFIX_SIZE).await?;
        let header_len = FrameHeader::prefix_len([prefix[0], prefix[1], prefix[2], prefix[3]])?;
        let header_bytes = self.transport.read_exactly(header_len).await?;
        let header = FrameHeader::decode(&self.codec, &header_bytes)?;

        let body = self.read_section(header.body_len).await?;
        let error = self.read_section(header.error_len).await?;
        let binary = self.read_section(header.binary_len).await?;
        self.frames_received += 1;

        tracing::debug!(
            "Received {} (int_info={}, body={}, error={}, binary={})",
            header.msg_type,
            header.int_info,
            header.body_len,
            header.error_len,
            header.binary_len
        );

        Ok(Frame {
            msg_type: header.msg_type,
            int_info: header.int_info,
            body,
            error,
            binary,
        })
    }

    async fn read_section(&mut self, len: usize) -> Result<Bytes, ClientError> {
        if len == 0 {
            return Ok(Bytes::new());
        }
        self.transport.read_exactly(len).await
    }

    fn decode_body<M: PackingInstruction>(&self, body: &[u8], stage: &'static str) -> Result<M, ClientError> {
        if body.is_empty() {
            return Err(ClientError::MissingReply(stage));
        }
        Ok(self.codec.decode_message(body)?)
    }

    fn decode_error_block(&self, bytes: &[u8]) -> Option<RError> {
        if bytes.is_empty() {
            return None;
        }
        match self.codec.decode_message::<RError>(bytes) {
            Ok(error) => Some(error),
            Err(e) => {
                tracing::warn!("Ignoring undecodable error block ({} bytes): {}", bytes.len(), e);
                None
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.ensure_ready().is_ok()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Server version captured during the handshake.
    pub fn server_version(&self) -> Option<&ServerVersion> {
        self.server.as_ref()
    }

    /// Error block of the most recent reply.
    pub fn last_error(&self) -> Option<&RError> {
        self.last_error.as_ref()
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }
}
