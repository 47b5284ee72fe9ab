//! The legacy textual form of packing instructions.
//!
//! The wire text is a restricted XML dialect: elements only, no attributes,
//! no namespaces, no mixed content. This module knows nothing about schemas;
//! it turns text into an [`Element`] tree and writes elements back out.

use crate::error::ProtocolError;

/// Maximum nesting depth accepted by the parser.
pub const MAX_DEPTH: usize = 64;

/// A parsed element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    /// Text content, already unescaped. Empty for elements with children.
    pub text: String,
    pub children: Vec<Element>,
    /// Byte offset of the opening tag, for error reporting.
    pub offset: usize,
}

impl Element {
    /// First child with the given name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All children with the given name, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }
}

/// Parses a complete document into its root element.
pub fn parse(input: &str) -> Result<Element, ProtocolError> {
    let mut parser = Parser { input, pos: 0 };
    parser.skip_prolog()?;
    let root = parser.element(0)?;
    parser.skip_misc()?;
    if parser.pos != input.len() {
        return Err(ProtocolError::malformed(
            parser.pos,
            "trailing content after root element",
        ));
    }
    Ok(root)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    fn skip_until(&mut self, terminator: &str) -> Result<(), ProtocolError> {
        match self.rest().find(terminator) {
            Some(idx) => {
                self.pos += idx + terminator.len();
                Ok(())
            }
            None => Err(ProtocolError::malformed(
                self.pos,
                format!("unterminated construct, expected {terminator:?}"),
            )),
        }
    }

    /// Skips whitespace, comments and processing instructions.
    fn skip_misc(&mut self) -> Result<(), ProtocolError> {
        loop {
            self.skip_whitespace();
            if self.rest().starts_with("<!--") {
                self.skip_until("-->")?;
            } else if self.rest().starts_with("<?") {
                self.skip_until("?>")?;
            } else {
                return Ok(());
            }
        }
    }

    fn skip_prolog(&mut self) -> Result<(), ProtocolError> {
        // Tolerate a UTF-8 byte order mark.
        if self.rest().starts_with('\u{feff}') {
            self.pos += '\u{feff}'.len_utf8();
        }
        self.skip_misc()
    }

    fn name(&mut self) -> Result<&'a str, ProtocolError> {
        let rest = self.rest();
        let end = rest
            .find(|c: char| c.is_whitespace() || c == '>' || c == '/' || c == '<')
            .unwrap_or(rest.len());
        if end == 0 {
            return Err(ProtocolError::malformed(self.pos, "empty element name"));
        }
        self.pos += end;
        Ok(&rest[..end])
    }

    fn expect(&mut self, token: &str) -> Result<(), ProtocolError> {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            Ok(())
        } else {
            Err(ProtocolError::malformed(
                self.pos,
                format!("expected {token:?}"),
            ))
        }
    }

    fn element(&mut self, depth: usize) -> Result<Element, ProtocolError> {
        if depth >= MAX_DEPTH {
            return Err(ProtocolError::malformed(self.pos, "nesting too deep"));
        }

        let offset = self.pos;
        self.expect("<")?;
        let name = self.name()?.to_string();
        self.skip_whitespace();

        if self.rest().starts_with("/>") {
            self.pos += 2;
            return Ok(Element {
                name,
                text: String::new(),
                children: Vec::new(),
                offset,
            });
        }
        self.expect(">")?;

        let mut text = String::new();
        let mut children = Vec::new();

        loop {
            let rest = self.rest();
            if rest.is_empty() {
                return Err(ProtocolError::malformed(
                    self.pos,
                    format!("unclosed element <{name}>"),
                ));
            }

            if rest.starts_with("</") {
                self.pos += 2;
                let close = self.name()?;
                if close != name {
                    return Err(ProtocolError::malformed(
                        self.pos,
                        format!("mismatched closing tag </{close}> for <{name}>"),
                    ));
                }
                self.skip_whitespace();
                self.expect(">")?;
                break;
            } else if rest.starts_with("<!--") {
                self.skip_until("-->")?;
            } else if rest.starts_with('<') {
                children.push(self.element(depth + 1)?);
            } else {
                let end = rest.find('<').unwrap_or(rest.len());
                text.push_str(&unescape(&rest[..end], self.pos)?);
                self.pos += end;
            }
        }

        // Whitespace between child elements is layout, not content.
        if !children.is_empty() {
            text.clear();
        }

        Ok(Element {
            name,
            text,
            children,
            offset,
        })
    }
}

/// Escapes text for use as element content.
///
/// Quotes are left alone: the legacy server maps `&apos;` to a back-tick,
/// which would corrupt query conditions.
pub fn escape(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

/// Replaces entity and character references with the characters they name.
pub fn unescape(text: &str, offset: usize) -> Result<String, ProtocolError> {
    if !text.contains('&') {
        return Ok(text.to_string());
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let semi = after.find(';').ok_or_else(|| {
            ProtocolError::malformed(offset + text.len() - rest.len() + amp, "unterminated entity")
        })?;
        let entity = &after[..semi];
        let decoded = match entity {
            "lt" => '<',
            "gt" => '>',
            "amp" => '&',
            "quot" => '"',
            "apos" => '\'',
            _ => decode_char_ref(entity).ok_or_else(|| {
                ProtocolError::malformed(
                    offset + text.len() - rest.len() + amp,
                    format!("unknown entity &{entity};"),
                )
            })?,
        };
        out.push(decoded);
        rest = &after[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn decode_char_ref(entity: &str) -> Option<char> {
    let digits = entity.strip_prefix('#')?;
    let code = match digits.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse().ok()?,
    };
    char::from_u32(code)
}

/// Incremental writer for the textual form.
pub struct Writer {
    out: String,
    pretty: bool,
    depth: usize,
}

impl Writer {
    pub fn new(pretty: bool) -> Self {
        Self {
            out: String::with_capacity(256),
            pretty,
            depth: 0,
        }
    }

    fn indent(&mut self) {
        if self.pretty {
            for _ in 0..self.depth {
                self.out.push_str("  ");
            }
        }
    }

    fn newline(&mut self) {
        if self.pretty {
            self.out.push('\n');
        }
    }

    pub fn open(&mut self, name: &str) {
        self.indent();
        self.out.push('<');
        self.out.push_str(name);
        self.out.push('>');
        self.newline();
        self.depth += 1;
    }

    pub fn close(&mut self, name: &str) {
        self.depth -= 1;
        self.indent();
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push('>');
        self.newline();
    }

    /// Writes a leaf element holding escaped text.
    pub fn leaf(&mut self, name: &str, text: &str) {
        self.indent();
        self.out.push('<');
        self.out.push_str(name);
        self.out.push('>');
        escape(text, &mut self.out);
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push('>');
        self.newline();
    }

    pub fn finish(self) -> String {
        self.out
    }
}
