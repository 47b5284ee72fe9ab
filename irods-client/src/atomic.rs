//! Atomic batch updates.
//!
//! A batch of metadata or permission changes is sent as one JSON document
//! and applied all or nothing. On failure the server answers with a
//! negative status and a JSON document naming the operation that failed.

use crate::connection::Connection;
use crate::error::ClientError;
use crate::transport::Transport;
use irods_protocol::api::{ATOMIC_APPLY_ACL_OPERATIONS_AN, ATOMIC_APPLY_METADATA_OPERATIONS_AN};
use irods_protocol::message::BinBytesBuf;
use serde::{Deserialize, Serialize};

/// Kind of catalog entity metadata is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Collection,
    DataObject,
    Resource,
    /// A user or a group.
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataOperationKind {
    Add,
    Remove,
}

/// One attribute/value/units change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataOperation {
    pub operation: MetadataOperationKind,
    pub attribute: String,
    pub value: String,
    pub units: String,
}

impl MetadataOperation {
    pub fn add(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(MetadataOperationKind::Add, attribute, value)
    }

    pub fn remove(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(MetadataOperationKind::Remove, attribute, value)
    }

    fn new(operation: MetadataOperationKind, attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            operation,
            attribute: attribute.into(),
            value: value.into(),
            units: String::new(),
        }
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = units.into();
        self
    }
}

/// A batch of metadata changes on one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRequest {
    pub admin_mode: bool,
    pub entity_name: String,
    pub entity_type: EntityType,
    pub operations: Vec<MetadataOperation>,
}

impl MetadataRequest {
    pub fn new(entity_type: EntityType, entity_name: impl Into<String>) -> Self {
        Self {
            admin_mode: false,
            entity_name: entity_name.into(),
            entity_type,
            operations: Vec::new(),
        }
    }

    /// Applies the batch with administrator privileges.
    pub fn as_admin(mut self) -> Self {
        self.admin_mode = true;
        self
    }

    pub fn operation(mut self, operation: MetadataOperation) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.entity_name.trim().is_empty() {
            return Err(ClientError::Validation("entity name is empty".into()));
        }
        for (i, op) in self.operations.iter().enumerate() {
            if op.attribute.is_empty() {
                return Err(ClientError::Validation(format!("operation {i}: attribute is empty")));
            }
            if op.value.is_empty() {
                return Err(ClientError::Validation(format!("operation {i}: value is empty")));
            }
        }
        Ok(())
    }
}

/// One permission change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclOperation {
    /// User or group the permission applies to.
    pub entity_name: String,
    /// Permission level, e.g. `read`, `write`, `own` or `null` to revoke.
    pub acl: String,
}

impl AclOperation {
    pub fn new(entity_name: impl Into<String>, acl: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            acl: acl.into(),
        }
    }
}

/// A batch of permission changes on one logical path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclRequest {
    pub logical_path: String,
    pub admin_mode: bool,
    pub operations: Vec<AclOperation>,
}

impl AclRequest {
    pub fn new(logical_path: impl Into<String>) -> Self {
        Self {
            logical_path: logical_path.into(),
            admin_mode: false,
            operations: Vec::new(),
        }
    }

    pub fn as_admin(mut self) -> Self {
        self.admin_mode = true;
        self
    }

    pub fn operation(mut self, operation: AclOperation) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.logical_path.trim().is_empty() {
            return Err(ClientError::Validation("logical path is empty".into()));
        }
        for (i, op) in self.operations.iter().enumerate() {
            if op.entity_name.trim().is_empty() {
                return Err(ClientError::Validation(format!("operation {i}: entity name is empty")));
            }
            if op.acl.trim().is_empty() {
                return Err(ClientError::Validation(format!("operation {i}: permission is empty")));
            }
        }
        Ok(())
    }
}

/// Outcome of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomicResult {
    pub status: i32,
    /// Error document returned with a failed batch.
    pub error: Option<serde_json::Value>,
}

impl AtomicResult {
    pub fn is_success(&self) -> bool {
        self.status >= 0
    }

    /// Turns a failed batch into [`ClientError::Api`].
    pub fn into_result(self) -> Result<(), ClientError> {
        if self.is_success() {
            return Ok(());
        }
        let message = match &self.error {
            Some(serde_json::Value::Object(doc)) => doc
                .get("error_message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| serde_json::Value::Object(doc.clone()).to_string()),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        Err(ClientError::api(self.status, message))
    }
}

/// Applies a metadata batch.
pub async fn apply_metadata<T: Transport>(
    conn: &mut Connection<T>,
    request: &MetadataRequest,
) -> Result<AtomicResult, ClientError> {
    request.validate()?;
    apply(conn, ATOMIC_APPLY_METADATA_OPERATIONS_AN, &serde_json::to_string(request)?).await
}

/// Applies a permission batch.
pub async fn apply_acl<T: Transport>(
    conn: &mut Connection<T>,
    request: &AclRequest,
) -> Result<AtomicResult, ClientError> {
    request.validate()?;
    apply(conn, ATOMIC_APPLY_ACL_OPERATIONS_AN, &serde_json::to_string(request)?).await
}

async fn apply<T: Transport>(conn: &mut Connection<T>, api_number: i32, json: &str) -> Result<AtomicResult, ClientError> {
    tracing::debug!("API {}: applying batch ({} bytes)", api_number, json.len());
    let reply = conn.exchange(api_number, &BinBytesBuf::from_text(json)).await?;
    if !reply.is_error() {
        return Ok(AtomicResult {
            status: reply.status,
            error: None,
        });
    }

    let output: Option<BinBytesBuf> = reply.decode(conn.codec())?;
    let error = output
        .map(|buf| buf.text())
        .filter(|text| !text.is_empty())
        .map(|text| {
            serde_json::from_str(&text).unwrap_or_else(|e| {
                tracing::warn!("Batch error detail is not JSON: {}", e);
                serde_json::Value::String(text)
            })
        });
    Ok(AtomicResult {
        status: reply.status,
        error,
    })
}
