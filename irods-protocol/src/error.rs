//! Protocol error types and legacy error codes.

use crate::value::WireValue;
use std::fmt;
use thiserror::Error;

/// Protocol-level errors that can occur while packing, unpacking or framing.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown packing instruction: {0}")]
    SchemaResolution(String),

    #[error("binary field {field}: declared length {declared}, decoded {actual} bytes")]
    BinaryLengthMismatch {
        field: String,
        declared: i64,
        actual: usize,
    },

    #[error("binary field {field}: invalid base64: {reason}")]
    InvalidBase64 { field: String, reason: String },

    #[error("field {field}: expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("field {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("malformed packing instruction at byte {offset}: {reason}")]
    Malformed { offset: usize, reason: String },

    #[error("unexpected root element: expected {expected}, got {found}")]
    UnexpectedRoot { expected: String, found: String },

    #[error("{schema}: lists {left} and {right} differ in length")]
    ListLengthMismatch {
        schema: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("{section} section too large: {size} bytes (max {max})")]
    FrameTooLarge {
        section: &'static str,
        size: usize,
        max: usize,
    },

    #[error("negative {section} length: {len}")]
    NegativeLength { section: &'static str, len: i64 },

    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid UTF-8 in payload")]
    InvalidUtf8,
}

impl ProtocolError {
    pub(crate) fn type_mismatch(field: &str, expected: &'static str, found: &WireValue) -> Self {
        ProtocolError::TypeMismatch {
            field: field.to_string(),
            expected,
            found: found.kind(),
        }
    }

    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        ProtocolError::Malformed {
            offset,
            reason: reason.into(),
        }
    }

    /// Returns whether this error came from resolving a schema or a binary
    /// sub-field rather than from the shape of the text itself.
    pub fn is_schema_resolution(&self) -> bool {
        matches!(
            self,
            ProtocolError::SchemaResolution(_)
                | ProtocolError::BinaryLengthMismatch { .. }
                | ProtocolError::InvalidBase64 { .. }
        )
    }
}

/// A legacy numeric error code as carried in a reply header.
///
/// Codes are negative. The thousands part identifies the error, the
/// remainder optionally carries a system `errno`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    pub const SYS_UNMATCHED_API_NUM: ErrorCode = ErrorCode(-12000);
    pub const SYS_NO_API_PRIV: ErrorCode = ErrorCode(-13000);
    pub const SYS_INVALID_INPUT_PARAM: ErrorCode = ErrorCode(-130000);
    pub const SYS_INTERNAL_ERR: ErrorCode = ErrorCode(-154000);
    pub const SYS_NOT_SUPPORTED: ErrorCode = ErrorCode(-169000);
    pub const OBJ_PATH_DOES_NOT_EXIST: ErrorCode = ErrorCode(-310000);
    pub const USER__NULL_INPUT_ERR: ErrorCode = ErrorCode(-316000);
    pub const USER_INPUT_PATH_ERR: ErrorCode = ErrorCode(-317000);
    pub const CAT_SQL_ERR: ErrorCode = ErrorCode(-806000);
    pub const CAT_NO_ROWS_FOUND: ErrorCode = ErrorCode(-808000);
    pub const CAT_NAME_EXISTS_AS_COLLECTION: ErrorCode = ErrorCode(-809000);
    pub const CAT_NAME_EXISTS_AS_DATAOBJ: ErrorCode = ErrorCode(-812000);
    pub const CAT_UNKNOWN_COLLECTION: ErrorCode = ErrorCode(-814000);
    pub const CAT_INVALID_ARGUMENT: ErrorCode = ErrorCode(-816000);
    pub const CAT_UNKNOWN_FILE: ErrorCode = ErrorCode(-817000);
    pub const CAT_NO_ACCESS_PERMISSION: ErrorCode = ErrorCode(-818000);
    pub const CAT_INVALID_AUTHENTICATION: ErrorCode = ErrorCode(-826000);
    pub const CAT_INVALID_USER: ErrorCode = ErrorCode(-827000);
    pub const CAT_INSUFFICIENT_PRIVILEGE_LEVEL: ErrorCode = ErrorCode(-830000);
    pub const CAT_UNKNOWN_SPECIFIC_QUERY: ErrorCode = ErrorCode(-853000);

    const NAMES: &'static [(ErrorCode, &'static str)] = &[
        (Self::SYS_UNMATCHED_API_NUM, "SYS_UNMATCHED_API_NUM"),
        (Self::SYS_NO_API_PRIV, "SYS_NO_API_PRIV"),
        (Self::SYS_INVALID_INPUT_PARAM, "SYS_INVALID_INPUT_PARAM"),
        (Self::SYS_INTERNAL_ERR, "SYS_INTERNAL_ERR"),
        (Self::SYS_NOT_SUPPORTED, "SYS_NOT_SUPPORTED"),
        (Self::OBJ_PATH_DOES_NOT_EXIST, "OBJ_PATH_DOES_NOT_EXIST"),
        (Self::USER__NULL_INPUT_ERR, "USER__NULL_INPUT_ERR"),
        (Self::USER_INPUT_PATH_ERR, "USER_INPUT_PATH_ERR"),
        (Self::CAT_SQL_ERR, "CAT_SQL_ERR"),
        (Self::CAT_NO_ROWS_FOUND, "CAT_NO_ROWS_FOUND"),
        (Self::CAT_NAME_EXISTS_AS_COLLECTION, "CAT_NAME_EXISTS_AS_COLLECTION"),
        (Self::CAT_NAME_EXISTS_AS_DATAOBJ, "CAT_NAME_EXISTS_AS_DATAOBJ"),
        (Self::CAT_UNKNOWN_COLLECTION, "CAT_UNKNOWN_COLLECTION"),
        (Self::CAT_INVALID_ARGUMENT, "CAT_INVALID_ARGUMENT"),
        (Self::CAT_UNKNOWN_FILE, "CAT_UNKNOWN_FILE"),
        (Self::CAT_NO_ACCESS_PERMISSION, "CAT_NO_ACCESS_PERMISSION"),
        (Self::CAT_INVALID_AUTHENTICATION, "CAT_INVALID_AUTHENTICATION"),
        (Self::CAT_INVALID_USER, "CAT_INVALID_USER"),
        (
            Self::CAT_INSUFFICIENT_PRIVILEGE_LEVEL,
            "CAT_INSUFFICIENT_PRIVILEGE_LEVEL",
        ),
        (Self::CAT_UNKNOWN_SPECIFIC_QUERY, "CAT_UNKNOWN_SPECIFIC_QUERY"),
    ];

    pub fn code(&self) -> i32 {
        self.0
    }

    /// The code with any embedded `errno` stripped.
    pub fn base(&self) -> ErrorCode {
        ErrorCode(self.0 / 1000 * 1000)
    }

    /// The embedded system `errno`, zero when there is none.
    pub fn errno(&self) -> i32 {
        (self.0 % 1000).abs()
    }

    /// Symbolic name of the code, if it is one this table knows.
    pub fn name(&self) -> Option<&'static str> {
        let base = self.base();
        Self::NAMES
            .iter()
            .find(|(code, _)| *code == base)
            .map(|(_, name)| *name)
    }

    /// Whether this is the "no rows found" sentinel that ends a paginated query.
    pub fn is_no_rows_found(&self) -> bool {
        *self == Self::CAT_NO_ROWS_FOUND
    }
}

impl From<i32> for ErrorCode {
    fn from(code: i32) -> Self {
        ErrorCode(code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) if self.errno() != 0 => {
                write!(f, "{} ({}, errno {})", name, self.0, self.errno())
            }
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_names() {
        assert_eq!(
            ErrorCode::CAT_NO_ROWS_FOUND.name(),
            Some("CAT_NO_ROWS_FOUND")
        );
        assert_eq!(ErrorCode(-1234567).name(), None);
    }

    #[test]
    fn test_error_code_errno_split() {
        let code = ErrorCode(-816002);
        assert_eq!(code.base(), ErrorCode::CAT_INVALID_ARGUMENT);
        assert_eq!(code.errno(), 2);
        assert_eq!(code.name(), Some("CAT_INVALID_ARGUMENT"));
        assert!(!code.is_no_rows_found());
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(
            format!("{}", ErrorCode::CAT_NO_ROWS_FOUND),
            "CAT_NO_ROWS_FOUND (-808000)"
        );
        assert_eq!(
            format!("{}", ErrorCode(-818013)),
            "CAT_NO_ACCESS_PERMISSION (-818013, errno 13)"
        );
        assert_eq!(format!("{}", ErrorCode(-42)), "-42");
    }

    #[test]
    fn test_no_rows_sentinel_is_exact() {
        assert!(ErrorCode(-808000).is_no_rows_found());
        assert!(!ErrorCode(-808001).is_no_rows_found());
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::SchemaResolution("NOPE_PI".into());
        assert!(err.to_string().contains("NOPE_PI"));
        assert!(err.is_schema_resolution());

        let err = ProtocolError::BinaryLengthMismatch {
            field: "buf".into(),
            declared: 7,
            actual: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains('7') && msg.contains('5'));
        assert!(err.is_schema_resolution());

        let err = ProtocolError::FrameTooLarge {
            section: "body",
            size: 100,
            max: 50,
        };
        assert!(err.to_string().contains("100"));
        assert!(!err.is_schema_resolution());

        let err = ProtocolError::InvalidUtf8;
        assert!(err.to_string().contains("UTF-8"));
    }
}
