//! Packing-instruction schemas and the registry that resolves them by name.
//!
//! A schema lists the fields of one packing instruction in wire order and
//! says how each is represented. The registry is built once and handed to
//! the codec; tagged parameters resolve their payload schema through it at
//! decode time, so a tag missing from the registry is a hard error.

use crate::error::ProtocolError;
use std::collections::HashMap;

/// What to do with a field that has no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Absence {
    /// Write an empty element (or a zero-valued structure). Missing elements
    /// decode to the zero value of the field's type.
    #[default]
    EmptyIfAbsent,
    /// Leave the element out. Missing elements decode to absent.
    OmitIfAbsent,
}

/// Element type of a repeated field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Int,
    Str,
    Struct(&'static str),
}

/// Representation of a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Str,
    /// Number of elements in the named sibling list. Written from the list,
    /// never trusted when reading.
    Count(&'static str),
    /// Decoded byte length of the named sibling binary field.
    ByteLength(&'static str),
    /// Bytes carried as base64 text; the named sibling declares their length.
    Base64 { length_field: &'static str },
    /// Nested packing instruction; the element carries the field's name.
    Struct(&'static str),
    /// Repeated sibling elements without a wrapper.
    List(ItemKind),
    /// Payload whose schema is named by the value of the sibling tag field.
    /// The element itself is named after the tag.
    Tagged { tag_field: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub absence: Absence,
}

/// A packing instruction: a name plus its fields in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub name: &'static str,
    pub fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: &'static str, kind: FieldKind, absence: Absence) -> Self {
        self.fields.push(FieldSpec {
            name,
            kind,
            absence,
        });
        self
    }

    pub fn int(self, name: &'static str) -> Self {
        self.field(name, FieldKind::Int, Absence::EmptyIfAbsent)
    }

    pub fn string(self, name: &'static str) -> Self {
        self.field(name, FieldKind::Str, Absence::EmptyIfAbsent)
    }

    pub fn optional_string(self, name: &'static str) -> Self {
        self.field(name, FieldKind::Str, Absence::OmitIfAbsent)
    }

    pub fn count(self, name: &'static str, list: &'static str) -> Self {
        self.field(name, FieldKind::Count(list), Absence::EmptyIfAbsent)
    }

    pub fn list(self, name: &'static str, item: ItemKind) -> Self {
        self.field(name, FieldKind::List(item), Absence::EmptyIfAbsent)
    }

    pub fn structure(self, name: &'static str) -> Self {
        self.field(name, FieldKind::Struct(name), Absence::EmptyIfAbsent)
    }

    pub fn optional_structure(self, name: &'static str) -> Self {
        self.field(name, FieldKind::Struct(name), Absence::OmitIfAbsent)
    }

    pub fn binary(self, length_field: &'static str, name: &'static str) -> Self {
        self.field(
            length_field,
            FieldKind::ByteLength(name),
            Absence::EmptyIfAbsent,
        )
        .field(name, FieldKind::Base64 { length_field }, Absence::EmptyIfAbsent)
    }

    pub fn tagged(self, name: &'static str, tag_field: &'static str) -> Self {
        self.field(name, FieldKind::Tagged { tag_field }, Absence::OmitIfAbsent)
    }

    pub fn get(&self, field: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == field)
    }
}

/// Closed set of schemas known to a codec.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<&'static str, Schema>,
}

impl SchemaRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every packing instruction this crate speaks.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for schema in standard_schemas() {
            registry.register(schema);
        }
        registry
    }

    /// Adds a schema, returning the one it replaced.
    pub fn register(&mut self, schema: Schema) -> Option<Schema> {
        self.schemas.insert(schema.name, schema)
    }

    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.schemas.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    /// Looks up a schema, failing with a schema-resolution error.
    pub fn resolve(&self, name: &str) -> Result<&Schema, ProtocolError> {
        self.get(name)
            .ok_or_else(|| ProtocolError::SchemaResolution(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.schemas.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

fn standard_schemas() -> Vec<Schema> {
    vec![
        Schema::new("MsgHeader_PI")
            .string("type")
            .int("msgLen")
            .int("errorLen")
            .int("bsLen")
            .int("intInfo"),
        Schema::new("StartupPack_PI")
            .int("irodsProt")
            .int("reconnFlag")
            .int("connectCnt")
            .string("proxyUser")
            .string("proxyRcatZone")
            .string("clientUser")
            .string("clientRcatZone")
            .string("relVersion")
            .string("apiVersion")
            .string("option"),
        Schema::new("CS_NEG_PI").int("status").string("result"),
        Schema::new("Version_PI")
            .int("status")
            .string("relVersion")
            .string("apiVersion")
            .int("reconnPort")
            .string("reconnAddr")
            .int("cookie"),
        Schema::new("RErrMsg_PI").int("status").string("msg"),
        Schema::new("RError_PI")
            .count("count", "RErrMsg_PI")
            .list("RErrMsg_PI", ItemKind::Struct("RErrMsg_PI")),
        Schema::new("KeyValPair_PI")
            .count("ssLen", "keyWord")
            .list("keyWord", ItemKind::Str)
            .list("svalue", ItemKind::Str),
        Schema::new("InxIvalPair_PI")
            .count("iiLen", "inx")
            .list("inx", ItemKind::Int)
            .list("ivalue", ItemKind::Int),
        Schema::new("InxValPair_PI")
            .count("isLen", "inx")
            .list("inx", ItemKind::Int)
            .list("svalue", ItemKind::Str),
        Schema::new("GenQueryInp_PI")
            .int("maxRows")
            .int("continueInx")
            .int("partialStartIndex")
            .int("options")
            .structure("KeyValPair_PI")
            .structure("InxIvalPair_PI")
            .structure("InxValPair_PI"),
        Schema::new("SqlResult_PI")
            .int("attriInx")
            .int("reslen")
            .list("value", ItemKind::Str),
        Schema::new("GenQueryOut_PI")
            .int("rowCnt")
            .count("attriCnt", "SqlResult_PI")
            .int("continueInx")
            .int("totalRowCount")
            .list("SqlResult_PI", ItemKind::Struct("SqlResult_PI")),
        Schema::new("Genquery2Input_PI")
            .string("query_string")
            .optional_string("zone")
            .int("sql_only")
            .int("column_mappings"),
        Schema::new("specificQueryInp_PI")
            .string("sql")
            .string("arg1")
            .string("arg2")
            .string("arg3")
            .string("arg4")
            .string("arg5")
            .string("arg6")
            .string("arg7")
            .string("arg8")
            .string("arg9")
            .string("arg10")
            .int("maxRows")
            .int("continueInx")
            .int("rowOffset")
            .int("options")
            .structure("KeyValPair_PI"),
        Schema::new("STR_PI").string("myStr"),
        Schema::new("INT_PI").int("myInt"),
        Schema::new("BinBytesBuf_PI").binary("buflen", "buf"),
        Schema::new("MsParam_PI")
            .string("label")
            .string("type")
            .tagged("inOutStruct", "type")
            .optional_structure("BinBytesBuf_PI"),
        Schema::new("MsParamArray_PI")
            .count("paramLen", "MsParam_PI")
            .int("oprType")
            .list("MsParam_PI", ItemKind::Struct("MsParam_PI")),
        Schema::new("ExecCmdOut_PI")
            .list("BinBytesBuf_PI", ItemKind::Struct("BinBytesBuf_PI"))
            .int("status"),
        Schema::new("RHostAddr_PI")
            .string("hostAddr")
            .string("rodsZone")
            .int("port")
            .int("dummyInt"),
        Schema::new("ExecMyRuleInp_PI")
            .string("myRule")
            .structure("RHostAddr_PI")
            .structure("KeyValPair_PI")
            .string("outParamDesc")
            .optional_structure("MsParamArray_PI"),
    ]
}
