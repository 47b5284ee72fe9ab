//! # irods-protocol
//!
//! Wire protocol for the legacy catalog service.
//!
//! This crate provides:
//! - The wire value model and a schema registry of packing instructions
//! - A schema-driven codec for the textual packing-instruction encoding
//! - Typed packing instructions for handshake, queries, rules and errors
//! - Four-section message framing with incremental decoding
//! - Legacy error codes and API numbers

pub mod api;
pub mod codec;
pub mod error;
pub mod frame;
pub mod markup;
pub mod message;
pub mod schema;
pub mod value;

pub use codec::{Codec, CodecConfig};
pub use error::{ErrorCode, ProtocolError};
pub use frame::{Frame, FrameHeader, MsgType, LENGTH_PREFIX_SIZE};
pub use message::PackingInstruction;
pub use schema::{Absence, FieldKind, FieldSpec, ItemKind, Schema, SchemaRegistry};
pub use value::{WireStruct, WireValue};

/// Protocol flavour requested at startup (1 = textual packing instructions).
pub const PROTOCOL_TEXT: i32 = 1;

/// Release version announced to the server.
pub const REL_VERSION: &str = "rods4.3.2";

/// API version announced to the server.
pub const API_VERSION: &str = "d";

/// Default server port.
pub const DEFAULT_PORT: u16 = 1247;

/// Maximum size of a packed message header (8 KiB).
pub const MAX_HEADER_SIZE: usize = 8 * 1024;

/// Maximum size of a body, error or binary section (32 MiB).
pub const MAX_SECTION_SIZE: usize = 32 * 1024 * 1024;
