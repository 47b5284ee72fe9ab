//! Typed packing instructions.
//!
//! Each type here mirrors one schema in the standard registry and converts
//! to and from the [`WireStruct`] the codec works with, so callers above
//! this crate never build wire values by hand.

use crate::error::ProtocolError;
use crate::value::{WireStruct, WireValue};
use bytes::Bytes;

/// A typed view of one registered schema.
pub trait PackingInstruction: Sized {
    /// Schema name, also the root element on the wire.
    const NAME: &'static str;

    fn to_wire(&self) -> WireStruct;

    fn from_wire(wire: &WireStruct) -> Result<Self, ProtocolError>;
}

/// Maximum bind arguments carried by a specific query.
pub const MAX_SPECIFIC_QUERY_ARGS: usize = 10;

fn structs<'a>(wire: &'a WireStruct, name: &str) -> Result<Vec<&'a WireStruct>, ProtocolError> {
    wire.list(name)?
        .iter()
        .map(|v| {
            v.as_struct()
                .ok_or_else(|| ProtocolError::type_mismatch(name, "struct", v))
        })
        .collect()
}

fn strings(wire: &WireStruct, name: &str) -> Result<Vec<String>, ProtocolError> {
    wire.list(name)?
        .iter()
        .map(|v| match v {
            WireValue::Str(s) => Ok(s.clone()),
            other => Err(ProtocolError::type_mismatch(name, "string", other)),
        })
        .collect()
}

fn ints(wire: &WireStruct, name: &str) -> Result<Vec<i32>, ProtocolError> {
    wire.list(name)?
        .iter()
        .map(|v| match v {
            WireValue::Int(n) => i32::try_from(*n).map_err(|_| ProtocolError::InvalidValue {
                field: name.to_string(),
                reason: format!("{n} does not fit in 32 bits"),
            }),
            other => Err(ProtocolError::type_mismatch(name, "int", other)),
        })
        .collect()
}

fn pairs<A, B>(
    schema: &'static str,
    left: (&'static str, Vec<A>),
    right: (&'static str, Vec<B>),
) -> Result<Vec<(A, B)>, ProtocolError> {
    if left.1.len() != right.1.len() {
        return Err(ProtocolError::ListLengthMismatch {
            schema,
            left: left.0,
            right: right.0,
        });
    }
    Ok(left.1.into_iter().zip(right.1).collect())
}

fn child<T: PackingInstruction>(wire: &WireStruct) -> Result<T, ProtocolError> {
    match wire.child(T::NAME)? {
        Some(inner) => T::from_wire(inner),
        None => T::from_wire(&WireStruct::new()),
    }
}

fn str_list<'a>(items: impl Iterator<Item = &'a String>) -> WireValue {
    WireValue::List(items.map(|s| WireValue::Str(s.clone())).collect())
}

fn int_list(items: impl Iterator<Item = i32>) -> WireValue {
    WireValue::List(items.map(WireValue::from).collect())
}

/// Header preceding every message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MsgHeader {
    pub msg_type: String,
    pub msg_len: i32,
    pub error_len: i32,
    pub bs_len: i32,
    pub int_info: i32,
}

impl PackingInstruction for MsgHeader {
    const NAME: &'static str = "MsgHeader_PI";

    fn to_wire(&self) -> WireStruct {
        WireStruct::new()
            .with("type", self.msg_type.as_str())
            .with("msgLen", self.msg_len)
            .with("errorLen", self.error_len)
            .with("bsLen", self.bs_len)
            .with("intInfo", self.int_info)
    }

    fn from_wire(wire: &WireStruct) -> Result<Self, ProtocolError> {
        Ok(Self {
            msg_type: wire.string("type")?,
            msg_len: wire.int32("msgLen")?,
            error_len: wire.int32("errorLen")?,
            bs_len: wire.int32("bsLen")?,
            int_info: wire.int32("intInfo")?,
        })
    }
}

/// Startup payload sent with the connect message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StartupPack {
    pub irods_prot: i32,
    pub reconn_flag: i32,
    pub connect_cnt: i32,
    pub proxy_user: String,
    pub proxy_zone: String,
    pub client_user: String,
    pub client_zone: String,
    pub rel_version: String,
    pub api_version: String,
    pub option: String,
}

impl PackingInstruction for StartupPack {
    const NAME: &'static str = "StartupPack_PI";

    fn to_wire(&self) -> WireStruct {
        WireStruct::new()
            .with("irodsProt", self.irods_prot)
            .with("reconnFlag", self.reconn_flag)
            .with("connectCnt", self.connect_cnt)
            .with("proxyUser", self.proxy_user.as_str())
            .with("proxyRcatZone", self.proxy_zone.as_str())
            .with("clientUser", self.client_user.as_str())
            .with("clientRcatZone", self.client_zone.as_str())
            .with("relVersion", self.rel_version.as_str())
            .with("apiVersion", self.api_version.as_str())
            .with("option", self.option.as_str())
    }

    fn from_wire(wire: &WireStruct) -> Result<Self, ProtocolError> {
        Ok(Self {
            irods_prot: wire.int32("irodsProt")?,
            reconn_flag: wire.int32("reconnFlag")?,
            connect_cnt: wire.int32("connectCnt")?,
            proxy_user: wire.string("proxyUser")?,
            proxy_zone: wire.string("proxyRcatZone")?,
            client_user: wire.string("clientUser")?,
            client_zone: wire.string("clientRcatZone")?,
            rel_version: wire.string("relVersion")?,
            api_version: wire.string("apiVersion")?,
            option: wire.string("option")?,
        })
    }
}

/// Security negotiation message, in both directions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CsNeg {
    pub status: i32,
    pub result: String,
}

impl PackingInstruction for CsNeg {
    const NAME: &'static str = "CS_NEG_PI";

    fn to_wire(&self) -> WireStruct {
        WireStruct::new()
            .with("status", self.status)
            .with("result", self.result.as_str())
    }

    fn from_wire(wire: &WireStruct) -> Result<Self, ProtocolError> {
        Ok(Self {
            status: wire.int32("status")?,
            result: wire.string("result")?,
        })
    }
}

/// Server version, the last step of the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Version {
    pub status: i32,
    pub rel_version: String,
    pub api_version: String,
    pub reconn_port: i32,
    pub reconn_addr: String,
    pub cookie: i32,
}

impl PackingInstruction for Version {
    const NAME: &'static str = "Version_PI";

    fn to_wire(&self) -> WireStruct {
        WireStruct::new()
            .with("status", self.status)
            .with("relVersion", self.rel_version.as_str())
            .with("apiVersion", self.api_version.as_str())
            .with("reconnPort", self.reconn_port)
            .with("reconnAddr", self.reconn_addr.as_str())
            .with("cookie", self.cookie)
    }

    fn from_wire(wire: &WireStruct) -> Result<Self, ProtocolError> {
        Ok(Self {
            status: wire.int32("status")?,
            rel_version: wire.string("relVersion")?,
            api_version: wire.string("apiVersion")?,
            reconn_port: wire.int32("reconnPort")?,
            reconn_addr: wire.string("reconnAddr")?,
            cookie: wire.int32("cookie")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RErrMsg {
    pub status: i32,
    pub msg: String,
}

impl PackingInstruction for RErrMsg {
    const NAME: &'static str = "RErrMsg_PI";

    fn to_wire(&self) -> WireStruct {
        WireStruct::new()
            .with("status", self.status)
            .with("msg", self.msg.as_str())
    }

    fn from_wire(wire: &WireStruct) -> Result<Self, ProtocolError> {
        Ok(Self {
            status: wire.int32("status")?,
            msg: wire.string("msg")?,
        })
    }
}

/// Error block attached to a reply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RError {
    pub messages: Vec<RErrMsg>,
}

impl RError {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn first_message(&self) -> Option<&str> {
        self.messages.first().map(|m| m.msg.as_str())
    }

    /// All messages joined with newlines.
    pub fn text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.msg.trim_end())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl PackingInstruction for RError {
    const NAME: &'static str = "RError_PI";

    fn to_wire(&self) -> WireStruct {
        WireStruct::new().with(
            "RErrMsg_PI",
            WireValue::List(self.messages.iter().map(|m| m.to_wire().into()).collect()),
        )
    }

    fn from_wire(wire: &WireStruct) -> Result<Self, ProtocolError> {
        Ok(Self {
            messages: structs(wire, "RErrMsg_PI")?
                .into_iter()
                .map(RErrMsg::from_wire)
                .collect::<Result<_, _>>()?,
        })
    }
}

/// Ordered keyword/value options.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyValPair {
    pub pairs: Vec<(String, String)>,
}

impl KeyValPair {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Sets a keyword, replacing an earlier value for it.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.pairs.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl PackingInstruction for KeyValPair {
    const NAME: &'static str = "KeyValPair_PI";

    fn to_wire(&self) -> WireStruct {
        WireStruct::new()
            .with("keyWord", str_list(self.pairs.iter().map(|(k, _)| k)))
            .with("svalue", str_list(self.pairs.iter().map(|(_, v)| v)))
    }

    fn from_wire(wire: &WireStruct) -> Result<Self, ProtocolError> {
        Ok(Self {
            pairs: pairs(
                Self::NAME,
                ("keyWord", strings(wire, "keyWord")?),
                ("svalue", strings(wire, "svalue")?),
            )?,
        })
    }
}

/// Index/integer pairs; the selected columns of a general query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InxIvalPair {
    pub pairs: Vec<(i32, i32)>,
}

impl PackingInstruction for InxIvalPair {
    const NAME: &'static str = "InxIvalPair_PI";

    fn to_wire(&self) -> WireStruct {
        WireStruct::new()
            .with("inx", int_list(self.pairs.iter().map(|p| p.0)))
            .with("ivalue", int_list(self.pairs.iter().map(|p| p.1)))
    }

    fn from_wire(wire: &WireStruct) -> Result<Self, ProtocolError> {
        Ok(Self {
            pairs: pairs(
                Self::NAME,
                ("inx", ints(wire, "inx")?),
                ("ivalue", ints(wire, "ivalue")?),
            )?,
        })
    }
}

/// Index/text pairs; the conditions of a general query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InxValPair {
    pub pairs: Vec<(i32, String)>,
}

impl PackingInstruction for InxValPair {
    const NAME: &'static str = "InxValPair_PI";

    fn to_wire(&self) -> WireStruct {
        WireStruct::new()
            .with("inx", int_list(self.pairs.iter().map(|p| p.0)))
            .with("svalue", str_list(self.pairs.iter().map(|p| &p.1)))
    }

    fn from_wire(wire: &WireStruct) -> Result<Self, ProtocolError> {
        Ok(Self {
            pairs: pairs(
                Self::NAME,
                ("inx", ints(wire, "inx")?),
                ("svalue", strings(wire, "svalue")?),
            )?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GenQueryInp {
    pub max_rows: i32,
    pub continue_inx: i32,
    pub partial_start_index: i32,
    pub options: i32,
    pub cond_input: KeyValPair,
    pub select: InxIvalPair,
    pub conditions: InxValPair,
}

impl PackingInstruction for GenQueryInp {
    const NAME: &'static str = "GenQueryInp_PI";

    fn to_wire(&self) -> WireStruct {
        WireStruct::new()
            .with("maxRows", self.max_rows)
            .with("continueInx", self.continue_inx)
            .with("partialStartIndex", self.partial_start_index)
            .with("options", self.options)
            .with(KeyValPair::NAME, self.cond_input.to_wire())
            .with(InxIvalPair::NAME, self.select.to_wire())
            .with(InxValPair::NAME, self.conditions.to_wire())
    }

    fn from_wire(wire: &WireStruct) -> Result<Self, ProtocolError> {
        Ok(Self {
            max_rows: wire.int32("maxRows")?,
            continue_inx: wire.int32("continueInx")?,
            partial_start_index: wire.int32("partialStartIndex")?,
            options: wire.int32("options")?,
            cond_input: child(wire)?,
            select: child(wire)?,
            conditions: child(wire)?,
        })
    }
}

/// One column of a result set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SqlResult {
    pub attri_inx: i32,
    pub reslen: i32,
    pub values: Vec<String>,
}

impl PackingInstruction for SqlResult {
    const NAME: &'static str = "SqlResult_PI";

    fn to_wire(&self) -> WireStruct {
        WireStruct::new()
            .with("attriInx", self.attri_inx)
            .with("reslen", self.reslen)
            .with("value", str_list(self.values.iter()))
    }

    fn from_wire(wire: &WireStruct) -> Result<Self, ProtocolError> {
        Ok(Self {
            attri_inx: wire.int32("attriInx")?,
            reslen: wire.int32("reslen")?,
            values: strings(wire, "value")?,
        })
    }
}

/// Column-major page of general-query results.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GenQueryOut {
    pub row_cnt: i32,
    pub continue_inx: i32,
    pub total_row_count: i32,
    pub columns: Vec<SqlResult>,
}

impl GenQueryOut {
    /// Checks that every column holds exactly `row_cnt` values.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.row_cnt < 0 {
            return Err(ProtocolError::InvalidValue {
                field: "rowCnt".to_string(),
                reason: format!("negative row count {}", self.row_cnt),
            });
        }
        for column in &self.columns {
            if column.values.len() != self.row_cnt as usize {
                return Err(ProtocolError::InvalidValue {
                    field: SqlResult::NAME.to_string(),
                    reason: format!(
                        "column {} holds {} values, expected {}",
                        column.attri_inx,
                        column.values.len(),
                        self.row_cnt
                    ),
                });
            }
        }
        Ok(())
    }

    pub fn attri_cnt(&self) -> usize {
        self.columns.len()
    }
}

impl PackingInstruction for GenQueryOut {
    const NAME: &'static str = "GenQueryOut_PI";

    fn to_wire(&self) -> WireStruct {
        WireStruct::new()
            .with("rowCnt", self.row_cnt)
            .with("continueInx", self.continue_inx)
            .with("totalRowCount", self.total_row_count)
            .with(
                SqlResult::NAME,
                WireValue::List(self.columns.iter().map(|c| c.to_wire().into()).collect()),
            )
    }

    fn from_wire(wire: &WireStruct) -> Result<Self, ProtocolError> {
        Ok(Self {
            row_cnt: wire.int32("rowCnt")?,
            continue_inx: wire.int32("continueInx")?,
            total_row_count: wire.int32("totalRowCount")?,
            columns: structs(wire, SqlResult::NAME)?
                .into_iter()
                .map(SqlResult::from_wire)
                .collect::<Result<_, _>>()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Genquery2Input {
    pub query_string: String,
    pub zone: Option<String>,
    pub sql_only: bool,
    pub column_mappings: bool,
}

impl PackingInstruction for Genquery2Input {
    const NAME: &'static str = "Genquery2Input_PI";

    fn to_wire(&self) -> WireStruct {
        WireStruct::new()
            .with("query_string", self.query_string.as_str())
            .with("zone", self.zone.clone())
            .with("sql_only", i32::from(self.sql_only))
            .with("column_mappings", i32::from(self.column_mappings))
    }

    fn from_wire(wire: &WireStruct) -> Result<Self, ProtocolError> {
        Ok(Self {
            query_string: wire.string("query_string")?,
            zone: wire.opt_string("zone")?,
            sql_only: wire.int("sql_only")? != 0,
            column_mappings: wire.int("column_mappings")? != 0,
        })
    }
}

/// Input of a named, server-registered query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecificQueryInp {
    pub sql: String,
    args: Vec<String>,
    pub max_rows: i32,
    pub continue_inx: i32,
    pub row_offset: i32,
    pub options: i32,
    pub cond_input: KeyValPair,
}

impl SpecificQueryInp {
    /// Fails when more than [`MAX_SPECIFIC_QUERY_ARGS`] bind arguments are given.
    pub fn new(sql: impl Into<String>, mut args: Vec<String>) -> Result<Self, ProtocolError> {
        trim_trailing_empty(&mut args);
        if args.len() > MAX_SPECIFIC_QUERY_ARGS {
            return Err(ProtocolError::InvalidValue {
                field: "args".to_string(),
                reason: format!(
                    "{} bind arguments given, at most {MAX_SPECIFIC_QUERY_ARGS} allowed",
                    args.len()
                ),
            });
        }
        Ok(Self {
            sql: sql.into(),
            args,
            ..Default::default()
        })
    }

    /// Bind arguments in position order. Empty arguments keep their place,
    /// but trailing empty ones are not kept.
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

fn trim_trailing_empty(args: &mut Vec<String>) {
    while args.last().is_some_and(String::is_empty) {
        args.pop();
    }
}

const ARG_FIELDS: [&str; MAX_SPECIFIC_QUERY_ARGS] = [
    "arg1", "arg2", "arg3", "arg4", "arg5", "arg6", "arg7", "arg8", "arg9", "arg10",
];

impl PackingInstruction for SpecificQueryInp {
    const NAME: &'static str = "specificQueryInp_PI";

    fn to_wire(&self) -> WireStruct {
        let mut wire = WireStruct::new().with("sql", self.sql.as_str());
        for (i, name) in ARG_FIELDS.iter().enumerate() {
            wire.push(*name, self.args.get(i).cloned().unwrap_or_default());
        }
        wire.with("maxRows", self.max_rows)
            .with("continueInx", self.continue_inx)
            .with("rowOffset", self.row_offset)
            .with("options", self.options)
            .with(KeyValPair::NAME, self.cond_input.to_wire())
    }

    fn from_wire(wire: &WireStruct) -> Result<Self, ProtocolError> {
        let mut args = ARG_FIELDS
            .iter()
            .map(|name| wire.string(name))
            .collect::<Result<Vec<_>, _>>()?;
        trim_trailing_empty(&mut args);
        Ok(Self {
            sql: wire.string("sql")?,
            args,
            max_rows: wire.int32("maxRows")?,
            continue_inx: wire.int32("continueInx")?,
            row_offset: wire.int32("rowOffset")?,
            options: wire.int32("options")?,
            cond_input: child(wire)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StrPi {
    pub my_str: String,
}

impl StrPi {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            my_str: value.into(),
        }
    }
}

impl PackingInstruction for StrPi {
    const NAME: &'static str = "STR_PI";

    fn to_wire(&self) -> WireStruct {
        WireStruct::new().with("myStr", self.my_str.as_str())
    }

    fn from_wire(wire: &WireStruct) -> Result<Self, ProtocolError> {
        Ok(Self {
            my_str: wire.string("myStr")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IntPi {
    pub my_int: i32,
}

impl PackingInstruction for IntPi {
    const NAME: &'static str = "INT_PI";

    fn to_wire(&self) -> WireStruct {
        WireStruct::new().with("myInt", self.my_int)
    }

    fn from_wire(wire: &WireStruct) -> Result<Self, ProtocolError> {
        Ok(Self {
            my_int: wire.int32("myInt")?,
        })
    }
}

/// Opaque byte buffer. The declared length always follows the contents.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BinBytesBuf {
    pub buf: Bytes,
}

impl BinBytesBuf {
    pub fn new(buf: impl Into<Bytes>) -> Self {
        Self { buf: buf.into() }
    }

    pub fn from_text(text: &str) -> Self {
        Self::new(Bytes::copy_from_slice(text.as_bytes()))
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Contents as text, with trailing NULs and surrounding whitespace removed.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.buf)
            .trim_end_matches('\0')
            .trim()
            .to_string()
    }
}

impl PackingInstruction for BinBytesBuf {
    const NAME: &'static str = "BinBytesBuf_PI";

    fn to_wire(&self) -> WireStruct {
        WireStruct::new()
            .with("buflen", self.buf.len() as i64)
            .with("buf", WireValue::Bytes(self.buf.clone()))
    }

    fn from_wire(wire: &WireStruct) -> Result<Self, ProtocolError> {
        Ok(Self {
            buf: wire.bytes("buf")?,
        })
    }
}

/// A labelled parameter whose payload type is named at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MsParam {
    pub label: String,
    pub type_name: String,
    pub payload: Option<WireStruct>,
    pub binary: Option<BinBytesBuf>,
}

impl MsParam {
    /// Parameter carrying a typed payload.
    pub fn new<T: PackingInstruction>(label: impl Into<String>, payload: &T) -> Self {
        Self {
            label: label.into(),
            type_name: T::NAME.to_string(),
            payload: Some(payload.to_wire()),
            binary: None,
        }
    }

    /// Parameter carrying a string.
    pub fn string(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(label, &StrPi::new(value))
    }

    /// Decodes the payload as `T`. `None` when the parameter holds another
    /// type or no payload at all.
    pub fn payload_as<T: PackingInstruction>(&self) -> Result<Option<T>, ProtocolError> {
        if self.type_name != T::NAME {
            return Ok(None);
        }
        self.payload.as_ref().map(T::from_wire).transpose()
    }
}

/// Key of the typed payload in a parameter's [`WireStruct`]. On the wire the
/// payload element is named by the parameter type instead.
const PAYLOAD_FIELD: &str = "inOutStruct";

impl PackingInstruction for MsParam {
    const NAME: &'static str = "MsParam_PI";

    fn to_wire(&self) -> WireStruct {
        let mut wire = WireStruct::new()
            .with("label", self.label.as_str())
            .with("type", self.type_name.as_str());
        if let Some(payload) = &self.payload {
            wire.push(PAYLOAD_FIELD, payload.clone());
        }
        wire.with(
            BinBytesBuf::NAME,
            self.binary.as_ref().map(|b| WireValue::Struct(b.to_wire())),
        )
    }

    fn from_wire(wire: &WireStruct) -> Result<Self, ProtocolError> {
        let type_name = wire.string("type")?;
        let payload = if type_name.is_empty() {
            None
        } else {
            wire.child(PAYLOAD_FIELD)?.cloned()
        };
        Ok(Self {
            label: wire.string("label")?,
            type_name,
            payload,
            binary: wire
                .child(BinBytesBuf::NAME)?
                .map(BinBytesBuf::from_wire)
                .transpose()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MsParamArray {
    pub opr_type: i32,
    pub params: Vec<MsParam>,
}

impl MsParamArray {
    pub fn get(&self, label: &str) -> Option<&MsParam> {
        self.params.iter().find(|p| p.label == label)
    }
}

impl PackingInstruction for MsParamArray {
    const NAME: &'static str = "MsParamArray_PI";

    fn to_wire(&self) -> WireStruct {
        WireStruct::new().with("oprType", self.opr_type).with(
            MsParam::NAME,
            WireValue::List(self.params.iter().map(|p| p.to_wire().into()).collect()),
        )
    }

    fn from_wire(wire: &WireStruct) -> Result<Self, ProtocolError> {
        Ok(Self {
            opr_type: wire.int32("oprType")?,
            params: structs(wire, MsParam::NAME)?
                .into_iter()
                .map(MsParam::from_wire)
                .collect::<Result<_, _>>()?,
        })
    }
}

/// Captured output of a rule or command: stdout, stderr and exit status.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecCmdOut {
    pub stdout: BinBytesBuf,
    pub stderr: BinBytesBuf,
    pub status: i32,
}

impl PackingInstruction for ExecCmdOut {
    const NAME: &'static str = "ExecCmdOut_PI";

    fn to_wire(&self) -> WireStruct {
        WireStruct::new()
            .with(
                BinBytesBuf::NAME,
                WireValue::List(vec![
                    self.stdout.to_wire().into(),
                    self.stderr.to_wire().into(),
                ]),
            )
            .with("status", self.status)
    }

    fn from_wire(wire: &WireStruct) -> Result<Self, ProtocolError> {
        let buffers = structs(wire, BinBytesBuf::NAME)?;
        let buffer = |i: usize| match buffers.get(i) {
            Some(b) => BinBytesBuf::from_wire(b),
            None => Ok(BinBytesBuf::default()),
        };
        Ok(Self {
            stdout: buffer(0)?,
            stderr: buffer(1)?,
            status: wire.int32("status")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RHostAddr {
    pub host_addr: String,
    pub rods_zone: String,
    pub port: i32,
    pub dummy_int: i32,
}

impl PackingInstruction for RHostAddr {
    const NAME: &'static str = "RHostAddr_PI";

    fn to_wire(&self) -> WireStruct {
        WireStruct::new()
            .with("hostAddr", self.host_addr.as_str())
            .with("rodsZone", self.rods_zone.as_str())
            .with("port", self.port)
            .with("dummyInt", self.dummy_int)
    }

    fn from_wire(wire: &WireStruct) -> Result<Self, ProtocolError> {
        Ok(Self {
            host_addr: wire.string("hostAddr")?,
            rods_zone: wire.string("rodsZone")?,
            port: wire.int32("port")?,
            dummy_int: wire.int32("dummyInt")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecMyRuleInp {
    pub my_rule: String,
    pub addr: RHostAddr,
    pub cond_input: KeyValPair,
    pub out_param_desc: String,
    pub params: Option<MsParamArray>,
}

impl PackingInstruction for ExecMyRuleInp {
    const NAME: &'static str = "ExecMyRuleInp_PI";

    fn to_wire(&self) -> WireStruct {
        WireStruct::new()
            .with("myRule", self.my_rule.as_str())
            .with(RHostAddr::NAME, self.addr.to_wire())
            .with(KeyValPair::NAME, self.cond_input.to_wire())
            .with("outParamDesc", self.out_param_desc.as_str())
            .with(
                MsParamArray::NAME,
                self.params.as_ref().map(|p| WireValue::Struct(p.to_wire())),
            )
    }

    fn from_wire(wire: &WireStruct) -> Result<Self, ProtocolError> {
        Ok(Self {
            my_rule: wire.string("myRule")?,
            addr: child(wire)?,
            cond_input: child(wire)?,
            out_param_desc: wire.string("outParamDesc")?,
            params: wire
                .child(MsParamArray::NAME)?
                .map(MsParamArray::from_wire)
                .transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;

    fn round_trip<T: PackingInstruction + std::fmt::Debug + PartialEq>(value: &T) -> T {
        let codec = Codec::standard();
        let bytes = codec.encode_message(value).unwrap();
        codec.decode_message(&bytes).unwrap()
    }

    #[test]
    fn test_header_round_trip() {
        let header = MsgHeader {
            msg_type: "RODS_API_REQ".into(),
            msg_len: 120,
            error_len: 0,
            bs_len: 0,
            int_info: 702,
        };
        assert_eq!(round_trip(&header), header);
    }

    #[test]
    fn test_key_val_pair_insert_replaces() {
        let kvp = KeyValPair::new()
            .with("zone", "a")
            .with("instance_name", "x")
            .with("zone", "b");
        assert_eq!(kvp.len(), 2);
        assert_eq!(kvp.get("zone"), Some("b"));
        assert_eq!(round_trip(&kvp), kvp);
    }

    #[test]
    fn test_gen_query_inp_round_trip() {
        let inp = GenQueryInp {
            max_rows: 256,
            continue_inx: 5,
            options: 0x20,
            cond_input: KeyValPair::new().with("zone", "tempZone"),
            select: InxIvalPair {
                pairs: vec![(501, 0x400), (403, 1)],
            },
            conditions: InxValPair {
                pairs: vec![(501, "like '/tempZone/%'".into())],
            },
            ..Default::default()
        };
        assert_eq!(round_trip(&inp), inp);
    }

    #[test]
    fn test_gen_query_out_validation() {
        let mut out = GenQueryOut {
            row_cnt: 2,
            continue_inx: 0,
            total_row_count: 0,
            columns: vec![
                SqlResult {
                    attri_inx: 501,
                    reslen: 64,
                    values: vec!["/a".into(), "/b".into()],
                },
                SqlResult {
                    attri_inx: 403,
                    reslen: 64,
                    values: vec!["x".into(), "y".into()],
                },
            ],
        };
        assert!(out.validate().is_ok());
        assert_eq!(round_trip(&out), out);

        out.columns[1].values.pop();
        assert!(out.validate().is_err());
    }

    #[test]
    fn test_gen_query_out_empty_page() {
        let codec = Codec::standard();
        let out: GenQueryOut = codec
            .decode_message(b"<GenQueryOut_PI><rowCnt>0</rowCnt><attriCnt>0</attriCnt></GenQueryOut_PI>")
            .unwrap();
        assert_eq!(out.row_cnt, 0);
        assert!(out.columns.is_empty());
        assert!(out.validate().is_ok());
    }

    #[test]
    fn test_genquery2_zone_optional() {
        let codec = Codec::standard();
        let inp = Genquery2Input {
            query_string: "select COLL_NAME".into(),
            ..Default::default()
        };
        let bytes = codec.encode_message(&inp).unwrap();
        assert!(!String::from_utf8_lossy(&bytes).contains("<zone>"));
        assert_eq!(round_trip(&inp), inp);

        let inp = Genquery2Input {
            zone: Some("otherZone".into()),
            sql_only: true,
            ..inp
        };
        assert_eq!(round_trip(&inp), inp);
    }

    #[test]
    fn test_specific_query_args() {
        let args: Vec<String> = (0..11).map(|i| i.to_string()).collect();
        assert!(SpecificQueryInp::new("ls", args).is_err());

        let inp = SpecificQueryInp::new("ShowCollAcls", vec!["/tempZone/home".into()]).unwrap();
        let wire = inp.to_wire();
        assert_eq!(wire.string("arg1").unwrap(), "/tempZone/home");
        assert_eq!(wire.string("arg10").unwrap(), "");
        assert_eq!(round_trip(&inp), inp);

        let inp = SpecificQueryInp::new("select ?", vec!["".into(), "x".into()]).unwrap();
        let back = round_trip(&inp);
        assert_eq!(back.args(), ["", "x"]);
        assert_eq!(back, inp);

        let inp = SpecificQueryInp::new("select ?", vec!["x".into(), "".into()]).unwrap();
        assert_eq!(inp.args(), ["x"]);
        assert_eq!(round_trip(&inp), inp);
    }

    #[test]
    fn test_binary_parameter_round_trip() {
        let param = MsParam::new("*b", &BinBytesBuf::from_text("hi"));
        assert_eq!(param.type_name, "BinBytesBuf_PI");
        let array = MsParamArray {
            opr_type: 0,
            params: vec![param.clone()],
        };
        let back = round_trip(&array);
        assert_eq!(back, array);
        let payload: BinBytesBuf = back.params[0].payload_as().unwrap().unwrap();
        assert_eq!(payload.text(), "hi");

        let with_tail = MsParam {
            binary: Some(BinBytesBuf::from_text("tail")),
            ..param
        };
        let back = round_trip(&with_tail);
        assert_eq!(back, with_tail);
        assert_eq!(back.binary.unwrap().text(), "tail");
    }

    #[test]
    fn test_ms_param_payload_as() {
        let param = MsParam::string("*out", "hello");
        assert_eq!(param.type_name, "STR_PI");
        assert_eq!(param.payload_as::<StrPi>().unwrap().unwrap().my_str, "hello");
        assert!(param.payload_as::<IntPi>().unwrap().is_none());
    }

    #[test]
    fn test_rule_input_round_trip() {
        let inp = ExecMyRuleInp {
            my_rule: "@external rule { writeLine('stdout', *a) }".into(),
            cond_input: KeyValPair::new().with("instance_name", "irods_rule_engine_plugin-irods_rule_language-instance"),
            out_param_desc: "ruleExecOut".into(),
            params: Some(MsParamArray {
                opr_type: 0,
                params: vec![MsParam::string("*a", "1")],
            }),
            ..Default::default()
        };
        assert_eq!(round_trip(&inp), inp);
    }

    #[test]
    fn test_exec_cmd_out() {
        let out = ExecCmdOut {
            stdout: BinBytesBuf::from_text("hi\n\0"),
            stderr: BinBytesBuf::default(),
            status: 0,
        };
        let decoded = round_trip(&out);
        assert_eq!(decoded, out);
        assert_eq!(decoded.stdout.text(), "hi");
        assert_eq!(decoded.stderr.text(), "");
    }

    #[test]
    fn test_rerror_text() {
        let codec = Codec::standard();
        let err: RError = codec
            .decode_message(
                b"<RError_PI><count>2</count>\
                  <RErrMsg_PI><status>-1</status><msg>first\n</msg></RErrMsg_PI>\
                  <RErrMsg_PI><status>-2</status><msg>second</msg></RErrMsg_PI></RError_PI>",
            )
            .unwrap();
        assert_eq!(err.messages.len(), 2);
        assert_eq!(err.first_message(), Some("first\n"));
        assert_eq!(err.text(), "first\nsecond");
    }
}
