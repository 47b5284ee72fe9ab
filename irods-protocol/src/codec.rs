//! Schema-driven encoder and decoder for packing instructions.

use crate::error::ProtocolError;
use crate::markup::{self, Element, Writer};
use crate::message::PackingInstruction;
use crate::schema::{Absence, FieldKind, FieldSpec, ItemKind, Schema, SchemaRegistry};
use crate::value::{WireStruct, WireValue};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;

/// Output settings for a [`Codec`]. Never changes what a message means.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecConfig {
    /// Indent nested elements, one per line.
    pub pretty: bool,
}

impl CodecConfig {
    pub fn compact() -> Self {
        Self { pretty: false }
    }

    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

/// Encodes [`WireValue`]s to the textual wire form and back.
///
/// A codec owns its configuration; [`Codec::with_config`] derives a copy
/// that shares the registry, so changing output settings for one call site
/// never leaks into another.
#[derive(Debug, Clone)]
pub struct Codec {
    registry: Arc<SchemaRegistry>,
    config: CodecConfig,
}

impl Codec {
    pub fn new(registry: Arc<SchemaRegistry>, config: CodecConfig) -> Self {
        Self { registry, config }
    }

    /// Codec over the standard registry with compact output.
    pub fn standard() -> Self {
        Self::new(Arc::new(SchemaRegistry::standard()), CodecConfig::default())
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn config(&self) -> CodecConfig {
        self.config
    }

    /// A copy of this codec using `config`.
    pub fn with_config(&self, config: CodecConfig) -> Codec {
        Codec {
            registry: Arc::clone(&self.registry),
            config,
        }
    }

    /// Encodes `value` as an instance of the named schema.
    pub fn encode(&self, value: &WireValue, schema: &str) -> Result<Bytes, ProtocolError> {
        let schema = self.registry.resolve(schema)?;
        let root = match value {
            WireValue::Struct(s) => Some(s),
            WireValue::Absent => None,
            other => return Err(ProtocolError::type_mismatch(schema.name, "struct", other)),
        };

        let mut writer = Writer::new(self.config.pretty);
        self.encode_struct(&mut writer, schema, schema.name, root)?;
        Ok(Bytes::from(writer.finish()))
    }

    /// Decodes bytes holding an instance of the named schema.
    pub fn decode(&self, bytes: &[u8], schema: &str) -> Result<WireValue, ProtocolError> {
        self.decode_root(bytes, schema).map(WireValue::Struct)
    }

    pub fn encode_message<T: PackingInstruction>(&self, message: &T) -> Result<Bytes, ProtocolError> {
        self.encode(&WireValue::Struct(message.to_wire()), T::NAME)
    }

    pub fn decode_message<T: PackingInstruction>(&self, bytes: &[u8]) -> Result<T, ProtocolError> {
        let root = self.decode_root(bytes, T::NAME)?;
        T::from_wire(&root)
    }

    fn decode_root(&self, bytes: &[u8], schema: &str) -> Result<WireStruct, ProtocolError> {
        let schema = self.registry.resolve(schema)?;
        let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)?;
        // Some server builds terminate packed bodies with NUL.
        let root = markup::parse(text.trim_end_matches('\0'))?;
        if root.name != schema.name {
            return Err(ProtocolError::UnexpectedRoot {
                expected: schema.name.to_string(),
                found: root.name,
            });
        }
        self.decode_struct(schema, &root)
    }

    fn encode_struct(
        &self,
        writer: &mut Writer,
        schema: &Schema,
        element: &str,
        value: Option<&WireStruct>,
    ) -> Result<(), ProtocolError> {
        if let Some(value) = value {
            check_parallel_lists(schema, value)?;
        }

        writer.open(element);
        for field in &schema.fields {
            self.encode_field(writer, field, value)?;
        }
        writer.close(element);
        Ok(())
    }

    fn encode_field(
        &self,
        writer: &mut Writer,
        field: &FieldSpec,
        parent: Option<&WireStruct>,
    ) -> Result<(), ProtocolError> {
        let value = sibling(parent, field.name);
        let omit = value.is_absent() && field.absence == Absence::OmitIfAbsent;

        match field.kind {
            FieldKind::Int => match value {
                WireValue::Int(n) => writer.leaf(field.name, &n.to_string()),
                WireValue::Absent if omit => {}
                WireValue::Absent => writer.leaf(field.name, ""),
                other => return Err(ProtocolError::type_mismatch(field.name, "int", other)),
            },
            FieldKind::Str => match value {
                WireValue::Str(s) => writer.leaf(field.name, s),
                WireValue::Absent if omit => {}
                WireValue::Absent => writer.leaf(field.name, ""),
                other => return Err(ProtocolError::type_mismatch(field.name, "string", other)),
            },
            FieldKind::Count(list) => {
                let len = match sibling(parent, list) {
                    WireValue::List(items) => items.len(),
                    WireValue::Absent => 0,
                    other => return Err(ProtocolError::type_mismatch(list, "list", other)),
                };
                writer.leaf(field.name, &len.to_string());
            }
            FieldKind::ByteLength(buf) => {
                let len = binary_contents(buf, sibling(parent, buf))?.map_or(0, <[u8]>::len);
                writer.leaf(field.name, &len.to_string());
            }
            FieldKind::Base64 { .. } => match binary_contents(field.name, value)? {
                Some(data) => writer.leaf(field.name, &BASE64.encode(data)),
                None if omit => {}
                None => writer.leaf(field.name, ""),
            },
            FieldKind::Struct(name) => {
                let schema = self.registry.resolve(name)?;
                match value {
                    WireValue::Struct(s) => self.encode_struct(writer, schema, field.name, Some(s))?,
                    WireValue::Absent if omit => {}
                    WireValue::Absent => self.encode_struct(writer, schema, field.name, None)?,
                    other => {
                        return Err(ProtocolError::type_mismatch(field.name, "struct", other))
                    }
                }
            }
            FieldKind::List(item) => match value {
                WireValue::List(items) => {
                    for entry in items {
                        self.encode_item(writer, field.name, item, entry)?;
                    }
                }
                WireValue::Absent => {}
                other => return Err(ProtocolError::type_mismatch(field.name, "list", other)),
            },
            FieldKind::Tagged { tag_field } => {
                let tag = match sibling(parent, tag_field) {
                    WireValue::Str(tag) => tag.as_str(),
                    WireValue::Absent => "",
                    other => return Err(ProtocolError::type_mismatch(tag_field, "string", other)),
                };
                if tag.is_empty() {
                    return Ok(());
                }
                let schema = self.registry.resolve(tag)?;
                match value {
                    WireValue::Struct(payload) => {
                        self.encode_struct(writer, schema, tag, Some(payload))?
                    }
                    WireValue::Absent => {
                        return Err(ProtocolError::InvalidValue {
                            field: field.name.to_string(),
                            reason: format!("{tag_field} is {tag} but no payload is set"),
                        })
                    }
                    other => return Err(ProtocolError::type_mismatch(field.name, "struct", other)),
                }
            }
        }
        Ok(())
    }

    fn encode_item(
        &self,
        writer: &mut Writer,
        element: &str,
        item: ItemKind,
        value: &WireValue,
    ) -> Result<(), ProtocolError> {
        match (item, value) {
            (ItemKind::Int, WireValue::Int(n)) => writer.leaf(element, &n.to_string()),
            (ItemKind::Str, WireValue::Str(s)) => writer.leaf(element, s),
            (ItemKind::Struct(name), WireValue::Struct(s)) => {
                let schema = self.registry.resolve(name)?;
                self.encode_struct(writer, schema, element, Some(s))?;
            }
            (ItemKind::Int, other) => return Err(ProtocolError::type_mismatch(element, "int", other)),
            (ItemKind::Str, other) => {
                return Err(ProtocolError::type_mismatch(element, "string", other))
            }
            (ItemKind::Struct(_), other) => {
                return Err(ProtocolError::type_mismatch(element, "struct", other))
            }
        }
        Ok(())
    }

    fn decode_struct(&self, schema: &Schema, element: &Element) -> Result<WireStruct, ProtocolError> {
        let mut out = WireStruct::new();
        // A tagged payload may share its element name with a later field.
        let mut taken: HashMap<&str, usize> = HashMap::new();

        for field in &schema.fields {
            if let FieldKind::Tagged { tag_field } = field.kind {
                let tag = match element.child(tag_field) {
                    Some(el) => leaf_text(el)?.trim(),
                    None => {
                        return Err(ProtocolError::malformed(
                            element.offset,
                            format!("<{}> is missing <{tag_field}>", element.name),
                        ))
                    }
                };
                if tag.is_empty() {
                    continue;
                }
                let payload_schema = self.registry.resolve(tag)?;
                let Some(payload) = next_child(element, tag, &mut taken) else {
                    return Err(ProtocolError::malformed(
                        element.offset,
                        format!("<{}> names {tag} but carries no <{tag}>", element.name),
                    ));
                };
                let payload = self.decode_struct(payload_schema, payload)?;
                out.push(field.name, payload);
                continue;
            }
            let child = match field.kind {
                FieldKind::List(_) => None,
                _ => next_child(element, field.name, &mut taken),
            };
            let value = self.decode_field(field, element, child)?;
            out.push(field.name, value);
        }

        for field in &schema.fields {
            match field.kind {
                FieldKind::Count(list) => {
                    let len = out.list(list)?.len();
                    out.push(field.name, len as i64);
                }
                FieldKind::ByteLength(buf) => {
                    let declared = out.int(field.name)?;
                    let actual = out.bytes(buf)?.len();
                    if declared != actual as i64 {
                        return Err(ProtocolError::BinaryLengthMismatch {
                            field: buf.to_string(),
                            declared,
                            actual,
                        });
                    }
                }
                _ => {}
            }
        }

        check_parallel_lists(schema, &out)?;
        Ok(out)
    }

    fn decode_field(
        &self,
        field: &FieldSpec,
        element: &Element,
        child: Option<&Element>,
    ) -> Result<WireValue, ProtocolError> {
        let omit = field.absence == Absence::OmitIfAbsent;

        let value = match field.kind {
            FieldKind::Int | FieldKind::Count(_) | FieldKind::ByteLength(_) => match child {
                Some(el) => WireValue::Int(parse_int(field.name, el)?),
                None if omit => WireValue::Absent,
                None => WireValue::Int(0),
            },
            FieldKind::Str => match child {
                Some(el) => WireValue::Str(leaf_text(el)?.to_string()),
                None if omit => WireValue::Absent,
                None => WireValue::Str(String::new()),
            },
            FieldKind::Base64 { .. } => match child {
                Some(el) => WireValue::Bytes(decode_base64(field.name, leaf_text(el)?)?),
                None if omit => WireValue::Absent,
                None => WireValue::Bytes(Bytes::new()),
            },
            FieldKind::Struct(name) => {
                let schema = self.registry.resolve(name)?;
                match child {
                    Some(el) => WireValue::Struct(self.decode_struct(schema, el)?),
                    None if omit => WireValue::Absent,
                    None => {
                        let empty = Element {
                            name: field.name.to_string(),
                            text: String::new(),
                            children: Vec::new(),
                            offset: element.offset,
                        };
                        WireValue::Struct(self.decode_struct(schema, &empty)?)
                    }
                }
            }
            FieldKind::List(item) => WireValue::List(
                element
                    .children_named(field.name)
                    .map(|el| self.decode_item(item, el))
                    .collect::<Result<_, _>>()?,
            ),
            FieldKind::Tagged { .. } => WireValue::Absent,
        };
        Ok(value)
    }

    fn decode_item(&self, item: ItemKind, element: &Element) -> Result<WireValue, ProtocolError> {
        match item {
            ItemKind::Int => Ok(WireValue::Int(parse_int(&element.name, element)?)),
            ItemKind::Str => Ok(WireValue::Str(leaf_text(element)?.to_string())),
            ItemKind::Struct(name) => {
                let schema = self.registry.resolve(name)?;
                Ok(WireValue::Struct(self.decode_struct(schema, element)?))
            }
        }
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::standard()
    }
}

static ABSENT: WireValue = WireValue::Absent;

fn sibling<'a>(parent: Option<&'a WireStruct>, name: &str) -> &'a WireValue {
    parent.and_then(|s| s.get(name)).unwrap_or(&ABSENT)
}

/// Lists sharing a count field must be the same length.
fn check_parallel_lists(schema: &Schema, value: &WireStruct) -> Result<(), ProtocolError> {
    let Some(leader) = schema.fields.iter().find_map(|f| match f.kind {
        FieldKind::Count(list) => Some(list),
        _ => None,
    }) else {
        return Ok(());
    };

    let expected = value.list(leader)?.len();
    for field in &schema.fields {
        let is_scalar_list = matches!(
            field.kind,
            FieldKind::List(ItemKind::Int) | FieldKind::List(ItemKind::Str)
        );
        if is_scalar_list && field.name != leader && value.list(field.name)?.len() != expected {
            return Err(ProtocolError::ListLengthMismatch {
                schema: schema.name,
                left: leader,
                right: field.name,
            });
        }
    }
    Ok(())
}

fn binary_contents<'a>(field: &str, value: &'a WireValue) -> Result<Option<&'a [u8]>, ProtocolError> {
    match value {
        WireValue::Bytes(b) => Ok(Some(b)),
        WireValue::Str(s) => Ok(Some(s.as_bytes())),
        WireValue::Absent => Ok(None),
        other => Err(ProtocolError::type_mismatch(field, "bytes", other)),
    }
}

/// The next not yet consumed child named `name`.
fn next_child<'a>(
    element: &'a Element,
    name: &'a str,
    taken: &mut HashMap<&'a str, usize>,
) -> Option<&'a Element> {
    let seen = taken.entry(name).or_insert(0);
    let child = element.children_named(name).nth(*seen);
    *seen += 1;
    child
}

fn leaf_text(element: &Element) -> Result<&str, ProtocolError> {
    if element.children.is_empty() {
        Ok(&element.text)
    } else {
        Err(ProtocolError::malformed(
            element.offset,
            format!("<{}> must hold text, found nested elements", element.name),
        ))
    }
}

fn parse_int(field: &str, element: &Element) -> Result<i64, ProtocolError> {
    let text = leaf_text(element)?.trim();
    if text.is_empty() {
        return Ok(0);
    }
    text.parse().map_err(|_| ProtocolError::InvalidValue {
        field: field.to_string(),
        reason: format!("{text:?} is not an integer"),
    })
}

fn decode_base64(field: &str, text: &str) -> Result<Bytes, ProtocolError> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64
        .decode(compact.as_bytes())
        .map(Bytes::from)
        .map_err(|e| ProtocolError::InvalidBase64 {
            field: field.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn text(bytes: &Bytes) -> &str {
        std::str::from_utf8(bytes).unwrap()
    }

    fn str_param(label: &str, value: &str) -> WireValue {
        WireValue::Struct(
            WireStruct::new()
                .with("label", label)
                .with("type", "STR_PI")
                .with("inOutStruct", WireStruct::new().with("myStr", value))
                .with("BinBytesBuf_PI", WireValue::Absent),
        )
    }

    #[test]
    fn test_tagged_parameter_dispatch() {
        let codec = Codec::standard();
        let value = str_param("*x", "5");

        let encoded = codec.encode(&value, "MsParam_PI").unwrap();
        assert_eq!(
            text(&encoded),
            "<MsParam_PI><label>*x</label><type>STR_PI</type>\
             <STR_PI><myStr>5</myStr></STR_PI></MsParam_PI>"
        );

        let decoded = codec.decode(&encoded, "MsParam_PI").unwrap();
        let decoded = decoded.as_struct().unwrap();
        assert_eq!(decoded.string("type").unwrap(), "STR_PI");
        let payload = decoded.child("inOutStruct").unwrap().unwrap();
        assert_eq!(payload.string("myStr").unwrap(), "5");
    }

    #[test]
    fn test_unknown_tag_is_schema_resolution_error() {
        let codec = Codec::standard();
        let value = WireValue::Struct(
            WireStruct::new()
                .with("label", "*x")
                .with("type", "NOPE_PI")
                .with("inOutStruct", WireStruct::new()),
        );
        let err = codec.encode(&value, "MsParam_PI").unwrap_err();
        assert!(matches!(err, ProtocolError::SchemaResolution(ref n) if n == "NOPE_PI"));

        let wire = b"<MsParam_PI><label>*x</label><type>NOPE_PI</type><NOPE_PI></NOPE_PI></MsParam_PI>";
        let err = codec.decode(wire, "MsParam_PI").unwrap_err();
        assert!(err.is_schema_resolution());
    }

    #[test]
    fn test_tagged_payload_must_be_present() {
        let codec = Codec::standard();

        let wire = b"<MsParam_PI><label>*x</label><type>STR_PI</type></MsParam_PI>";
        let err = codec.decode(wire, "MsParam_PI").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { .. }), "{err}");

        let wire = b"<MsParam_PI><label>*x</label><STR_PI><myStr>5</myStr></STR_PI></MsParam_PI>";
        let err = codec.decode(wire, "MsParam_PI").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { .. }), "{err}");

        let wire = b"<MsParam_PI><label>*x</label><type></type></MsParam_PI>";
        let decoded = codec.decode(wire, "MsParam_PI").unwrap();
        assert!(decoded.as_struct().unwrap().get("inOutStruct").is_none());

        let value = WireValue::Struct(
            WireStruct::new()
                .with("label", "*x")
                .with("type", "STR_PI")
                .with("inOutStruct", WireValue::Absent),
        );
        let err = codec.encode(&value, "MsParam_PI").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidValue { .. }), "{err}");
    }

    #[test]
    fn test_binary_payload_and_trailing_binary_stay_apart() {
        let codec = Codec::standard();
        let buf = |data: &'static [u8]| {
            WireStruct::new()
                .with("buflen", data.len() as i64)
                .with("buf", WireValue::bytes(data))
        };
        let value = WireValue::Struct(
            WireStruct::new()
                .with("label", "*b")
                .with("type", "BinBytesBuf_PI")
                .with("inOutStruct", buf(b"payload"))
                .with("BinBytesBuf_PI", buf(b"tail")),
        );

        let encoded = codec.encode(&value, "MsParam_PI").unwrap();
        assert_eq!(text(&encoded).matches("<BinBytesBuf_PI>").count(), 2);
        assert_eq!(codec.decode(&encoded, "MsParam_PI").unwrap(), value);

        let payload_only = WireValue::Struct(
            WireStruct::new()
                .with("label", "*b")
                .with("type", "BinBytesBuf_PI")
                .with("inOutStruct", buf(b"hi"))
                .with("BinBytesBuf_PI", WireValue::Absent),
        );
        let encoded = codec.encode(&payload_only, "MsParam_PI").unwrap();
        assert_eq!(codec.decode(&encoded, "MsParam_PI").unwrap(), payload_only);
    }

    #[test]
    fn test_binary_length_is_decoded_length() {
        let codec = Codec::standard();
        let value = WireValue::Struct(WireStruct::new().with("buf", WireValue::bytes(&b"hello"[..])));

        let encoded = codec.encode(&value, "BinBytesBuf_PI").unwrap();
        assert_eq!(
            text(&encoded),
            "<BinBytesBuf_PI><buflen>5</buflen><buf>aGVsbG8=</buf></BinBytesBuf_PI>"
        );

        let decoded = codec.decode(&encoded, "BinBytesBuf_PI").unwrap();
        let decoded = decoded.as_struct().unwrap();
        assert_eq!(decoded.int("buflen").unwrap(), 5);
        assert_eq!(&decoded.bytes("buf").unwrap()[..], b"hello");
    }

    #[test]
    fn test_binary_length_mismatch_rejected() {
        let codec = Codec::standard();
        let wire = b"<BinBytesBuf_PI><buflen>7</buflen><buf>aGVsbG8=</buf></BinBytesBuf_PI>";
        let err = codec.decode(wire, "BinBytesBuf_PI").unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::BinaryLengthMismatch {
                declared: 7,
                actual: 5,
                ..
            }
        ));
        assert!(err.is_schema_resolution());

        let wire = b"<BinBytesBuf_PI><buflen>1</buflen><buf>@@@</buf></BinBytesBuf_PI>";
        let err = codec.decode(wire, "BinBytesBuf_PI").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidBase64 { .. }));
    }

    #[test]
    fn test_count_written_from_list_and_rebuilt_on_decode() {
        let codec = Codec::standard();
        let value = WireValue::Struct(
            WireStruct::new()
                .with("keyWord", WireValue::List(vec!["zone".into(), "a".into()]))
                .with("svalue", WireValue::List(vec!["tempZone".into(), "b".into()])),
        );
        let encoded = codec.encode(&value, "KeyValPair_PI").unwrap();
        assert!(text(&encoded).starts_with("<KeyValPair_PI><ssLen>2</ssLen>"));

        let lying = b"<KeyValPair_PI><ssLen>9</ssLen><keyWord>k</keyWord><svalue>v</svalue></KeyValPair_PI>";
        let decoded = codec.decode(lying, "KeyValPair_PI").unwrap();
        assert_eq!(decoded.as_struct().unwrap().int("ssLen").unwrap(), 1);
    }

    #[test]
    fn test_parallel_list_length_mismatch() {
        let codec = Codec::standard();
        let value = WireValue::Struct(
            WireStruct::new()
                .with("keyWord", WireValue::List(vec!["a".into(), "b".into()]))
                .with("svalue", WireValue::List(vec!["1".into()])),
        );
        assert!(matches!(
            codec.encode(&value, "KeyValPair_PI"),
            Err(ProtocolError::ListLengthMismatch { .. })
        ));

        let wire = b"<InxIvalPair_PI><iiLen>1</iiLen><inx>501</inx></InxIvalPair_PI>";
        assert!(matches!(
            codec.decode(wire, "InxIvalPair_PI"),
            Err(ProtocolError::ListLengthMismatch { .. })
        ));
    }

    #[test]
    fn test_absent_struct_encodes_as_zero_struct() {
        let codec = Codec::standard();
        let value = WireValue::Struct(WireStruct::new().with("maxRows", 256));
        let encoded = codec.encode(&value, "GenQueryInp_PI").unwrap();
        let encoded = text(&encoded);

        assert!(encoded.contains("<maxRows>256</maxRows><continueInx></continueInx>"));
        assert!(encoded.contains("<KeyValPair_PI><ssLen>0</ssLen></KeyValPair_PI>"));
        assert!(encoded.contains("<InxValPair_PI><isLen>0</isLen></InxValPair_PI>"));
    }

    #[test]
    fn test_missing_elements_decode_to_zero_values() {
        let codec = Codec::standard();
        let decoded = codec.decode(b"<GenQueryInp_PI></GenQueryInp_PI>", "GenQueryInp_PI").unwrap();
        let decoded = decoded.as_struct().unwrap();

        assert_eq!(decoded.int("maxRows").unwrap(), 0);
        let kvp = decoded.child("KeyValPair_PI").unwrap().unwrap();
        assert_eq!(kvp.int("ssLen").unwrap(), 0);
        assert!(kvp.list("keyWord").unwrap().is_empty());
    }

    #[test]
    fn test_omit_if_absent_round_trip() {
        let codec = Codec::standard();
        let without_zone = WireValue::Struct(
            WireStruct::new()
                .with("query_string", "select COLL_NAME")
                .with("zone", WireValue::Absent)
                .with("sql_only", 0)
                .with("column_mappings", 0),
        );
        let encoded = codec.encode(&without_zone, "Genquery2Input_PI").unwrap();
        assert!(!text(&encoded).contains("zone"));
        assert_eq!(codec.decode(&encoded, "Genquery2Input_PI").unwrap(), without_zone);

        let with_zone = WireValue::Struct(
            WireStruct::new()
                .with("query_string", "select COLL_NAME")
                .with("zone", "otherZone")
                .with("sql_only", 0)
                .with("column_mappings", 0),
        );
        let encoded = codec.encode(&with_zone, "Genquery2Input_PI").unwrap();
        assert!(text(&encoded).contains("<zone>otherZone</zone>"));
        assert_eq!(codec.decode(&encoded, "Genquery2Input_PI").unwrap(), with_zone);
    }

    #[test]
    fn test_nested_parameter_array_round_trip() {
        let codec = Codec::standard();
        let cmd_out = WireStruct::new()
            .with(
                "BinBytesBuf_PI",
                WireValue::List(vec![
                    WireStruct::new()
                        .with("buflen", 3)
                        .with("buf", WireValue::bytes(&b"out"[..]))
                        .into(),
                    WireStruct::new()
                        .with("buflen", 0)
                        .with("buf", WireValue::bytes(Bytes::new()))
                        .into(),
                ]),
            )
            .with("status", 0);
        let array = WireValue::Struct(
            WireStruct::new()
                .with("paramLen", 2)
                .with("oprType", 0)
                .with(
                    "MsParam_PI",
                    WireValue::List(vec![
                        str_param("*a", "1"),
                        WireStruct::new()
                            .with("label", "ruleExecOut")
                            .with("type", "ExecCmdOut_PI")
                            .with("inOutStruct", cmd_out)
                            .with("BinBytesBuf_PI", WireValue::Absent)
                            .into(),
                    ]),
                ),
        );

        let encoded = codec.encode(&array, "MsParamArray_PI").unwrap();
        assert_eq!(codec.decode(&encoded, "MsParamArray_PI").unwrap(), array);

        let empty = WireValue::Struct(
            WireStruct::new()
                .with("paramLen", 0)
                .with("oprType", 0)
                .with("MsParam_PI", WireValue::List(vec![])),
        );
        let encoded = codec.encode(&empty, "MsParamArray_PI").unwrap();
        assert_eq!(codec.decode(&encoded, "MsParamArray_PI").unwrap(), empty);
    }

    #[test]
    fn test_pretty_config_is_scoped_and_meaningless() {
        let compact = Codec::standard();
        let pretty = compact.with_config(CodecConfig::pretty());
        let value = str_param("*x", "a value");

        let a = compact.encode(&value, "MsParam_PI").unwrap();
        let b = pretty.encode(&value, "MsParam_PI").unwrap();
        assert_ne!(a, b);
        assert!(text(&b).contains('\n'));
        assert!(!text(&a).contains('\n'));
        assert_eq!(compact.config(), CodecConfig::compact());

        assert_eq!(
            compact.decode(&a, "MsParam_PI").unwrap(),
            compact.decode(&b, "MsParam_PI").unwrap()
        );
    }

    #[test]
    fn test_unexpected_root() {
        let codec = Codec::standard();
        let err = codec.decode(b"<INT_PI><myInt>1</myInt></INT_PI>", "STR_PI").unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedRoot { .. }));
    }

    #[test]
    fn test_trailing_nul_tolerated() {
        let codec = Codec::standard();
        let decoded = codec.decode(b"<INT_PI><myInt>-808000</myInt></INT_PI>\0", "INT_PI").unwrap();
        assert_eq!(decoded.as_struct().unwrap().int("myInt").unwrap(), -808000);
    }

    #[test]
    fn test_wrong_value_type_rejected() {
        let codec = Codec::standard();
        let value = WireValue::Struct(WireStruct::new().with("myInt", "seven"));
        assert!(matches!(
            codec.encode(&value, "INT_PI"),
            Err(ProtocolError::TypeMismatch { .. })
        ));
        assert!(matches!(
            codec.decode(b"<INT_PI><myInt>seven</myInt></INT_PI>", "INT_PI"),
            Err(ProtocolError::InvalidValue { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_string_values_survive_escaping(s in "\\PC*") {
            let codec = Codec::standard();
            let value = WireValue::Struct(WireStruct::new().with("myStr", s.clone()));
            let encoded = codec.encode(&value, "STR_PI").unwrap();
            let decoded = codec.decode(&encoded, "STR_PI").unwrap();
            prop_assert_eq!(decoded.as_struct().unwrap().string("myStr").unwrap(), s);
        }
    }
}
