//! # irods-client
//!
//! Client library for the legacy catalog protocol.
//!
//! This crate provides:
//! - Async connections with the startup handshake and security negotiation
//! - Paged general and specific queries, and GenQuery2
//! - Rule execution with typed parameter marshalling
//! - Atomic batch metadata and permission updates
//! - Environment-file configuration

pub mod atomic;
pub mod auth;
pub mod columns;
pub mod config;
pub mod connection;
pub mod error;
pub mod negotiation;
pub mod query;
pub mod rules;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::AuthScheme;
pub use config::{ClientConfig, ConfigError};
pub use connection::{Connection, ConnectionConfig, ConnectionState, Identity, Reply, ServerVersion};
pub use error::ClientError;
pub use negotiation::{NegotiationOutcome, NegotiationPolicy};
pub use query::{ColumnModifier, GenQuery, QueryOptions, QuerySummary, SpecificQuery};
pub use rules::Rule;
pub use transport::{StreamTransport, Transport};
