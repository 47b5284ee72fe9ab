//! Authentication seam.
//!
//! Schemes run against a connection that has completed its handshake.
//! They talk to the server through the connection's own request methods;
//! on success the connection is marked authenticated.

use crate::connection::Connection;
use crate::error::ClientError;
use crate::transport::Transport;
use std::future::Future;

/// An authentication scheme.
pub trait AuthScheme: Send + Sync {
    /// Scheme name, for logging.
    fn name(&self) -> &str;

    /// Proves the connection's identity to the server.
    fn authenticate<T: Transport>(
        &self,
        conn: &mut Connection<T>,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;
}
