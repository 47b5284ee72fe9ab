//! In-memory representation of a packable value.
//!
//! A [`WireValue`] is what the codec reads and writes. Typed packing
//! instructions convert to and from this model, the codec maps it to the
//! legacy textual encoding under the guidance of a schema.

use crate::error::ProtocolError;
use bytes::Bytes;

/// A value that can be packed onto the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WireValue {
    /// Integer scalar. Legacy `int`, `double` and `long` fields all land here.
    Int(i64),
    /// String scalar.
    Str(String),
    /// Raw bytes of a binary sub-field. Always base64 on the wire.
    Bytes(Bytes),
    /// Repeated elements. Never wrapped in a container element on the wire.
    List(Vec<WireValue>),
    /// Nested structure with ordered fields.
    Struct(WireStruct),
    /// No value.
    #[default]
    Absent,
}

impl WireValue {
    pub fn str(value: impl Into<String>) -> Self {
        WireValue::Str(value.into())
    }

    pub fn int(value: impl Into<i64>) -> Self {
        WireValue::Int(value.into())
    }

    pub fn bytes(value: impl Into<Bytes>) -> Self {
        WireValue::Bytes(value.into())
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, WireValue::Absent)
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            WireValue::Int(_) => "int",
            WireValue::Str(_) => "string",
            WireValue::Bytes(_) => "bytes",
            WireValue::List(_) => "list",
            WireValue::Struct(_) => "struct",
            WireValue::Absent => "absent",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            WireValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            WireValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            WireValue::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[WireValue]> {
        match self {
            WireValue::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&WireStruct> {
        match self {
            WireValue::Struct(v) => Some(v),
            _ => None,
        }
    }
}

impl From<WireStruct> for WireValue {
    fn from(value: WireStruct) -> Self {
        WireValue::Struct(value)
    }
}

impl From<&str> for WireValue {
    fn from(value: &str) -> Self {
        WireValue::Str(value.to_string())
    }
}

impl From<String> for WireValue {
    fn from(value: String) -> Self {
        WireValue::Str(value)
    }
}

impl From<i32> for WireValue {
    fn from(value: i32) -> Self {
        WireValue::Int(value.into())
    }
}

impl From<i64> for WireValue {
    fn from(value: i64) -> Self {
        WireValue::Int(value)
    }
}

impl<T: Into<WireValue>> From<Option<T>> for WireValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(WireValue::Absent)
    }
}

/// Ordered name/value fields of a structure.
///
/// Field order is significant: the legacy decoder on the server side reads
/// fields in schema order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WireStruct {
    fields: Vec<(String, WireValue)>,
}

impl WireStruct {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field, builder style.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<WireValue>) -> Self {
        self.push(name, value);
        self
    }

    /// Appends a field, or replaces it in place if it already exists.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<WireValue>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&WireValue> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &WireValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Reads an integer field. Absent fields read as zero.
    pub fn int(&self, name: &str) -> Result<i64, ProtocolError> {
        match self.get(name) {
            Some(WireValue::Int(v)) => Ok(*v),
            None | Some(WireValue::Absent) => Ok(0),
            Some(other) => Err(ProtocolError::type_mismatch(name, "int", other)),
        }
    }

    /// Reads an integer field that must fit the legacy 32-bit `int`.
    pub fn int32(&self, name: &str) -> Result<i32, ProtocolError> {
        let value = self.int(name)?;
        i32::try_from(value).map_err(|_| ProtocolError::InvalidValue {
            field: name.to_string(),
            reason: format!("{value} does not fit in 32 bits"),
        })
    }

    /// Reads a string field. Absent fields read as the empty string.
    pub fn string(&self, name: &str) -> Result<String, ProtocolError> {
        match self.get(name) {
            Some(WireValue::Str(v)) => Ok(v.clone()),
            None | Some(WireValue::Absent) => Ok(String::new()),
            Some(other) => Err(ProtocolError::type_mismatch(name, "string", other)),
        }
    }

    /// Reads an optional string field, keeping the distinction with absence.
    pub fn opt_string(&self, name: &str) -> Result<Option<String>, ProtocolError> {
        match self.get(name) {
            Some(WireValue::Str(v)) => Ok(Some(v.clone())),
            None | Some(WireValue::Absent) => Ok(None),
            Some(other) => Err(ProtocolError::type_mismatch(name, "string", other)),
        }
    }

    pub fn bytes(&self, name: &str) -> Result<Bytes, ProtocolError> {
        match self.get(name) {
            Some(WireValue::Bytes(v)) => Ok(v.clone()),
            None | Some(WireValue::Absent) => Ok(Bytes::new()),
            Some(other) => Err(ProtocolError::type_mismatch(name, "bytes", other)),
        }
    }

    /// Reads a list field. Absent fields read as the empty list.
    pub fn list(&self, name: &str) -> Result<&[WireValue], ProtocolError> {
        match self.get(name) {
            Some(WireValue::List(v)) => Ok(v),
            None | Some(WireValue::Absent) => Ok(&[]),
            Some(other) => Err(ProtocolError::type_mismatch(name, "list", other)),
        }
    }

    /// Reads a nested structure, `None` when absent.
    pub fn child(&self, name: &str) -> Result<Option<&WireStruct>, ProtocolError> {
        match self.get(name) {
            Some(WireValue::Struct(v)) => Ok(Some(v)),
            None | Some(WireValue::Absent) => Ok(None),
            Some(other) => Err(ProtocolError::type_mismatch(name, "struct", other)),
        }
    }
}

impl FromIterator<(String, WireValue)> for WireStruct {
    fn from_iter<I: IntoIterator<Item = (String, WireValue)>>(iter: I) -> Self {
        let mut s = WireStruct::new();
        for (name, value) in iter {
            s.push(name, value);
        }
        s
    }
}
