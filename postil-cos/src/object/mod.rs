//! The PDF object tree.
//!
//! Unlike the lexer and value parsers, which borrow the source buffer, the
//! object model owns its data: leaves are copied out at parse time so that a
//! parsed tree can be edited and re-serialized after the buffer is gone.

use crate::filter::decode_hex_digit;
use crate::index::Resolve;
use crate::lexer::{Lexer, ValueKind};
use crate::parse::{self, Parsed};
use crate::reader::Reader;
use crate::trivia::{is_regular_character, is_white_space_character};
use crate::{CryptInfo, Error, Result};
use smallvec::SmallVec;
use std::borrow::Borrow;
use std::fmt::{self, Debug, Formatter};
use std::ops::Deref;
use std::sync::mpsc::{self, Receiver, Sender};

pub mod dict;
pub mod resources;
pub mod stream;

pub use dict::PdfDict;
pub use resources::ResourceDict;
pub use stream::PdfStream;

/// The identity of an indirect object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectId {
    /// The object number.
    pub num: u32,
    /// The generation number.
    pub gen: u16,
}

impl ObjectId {
    /// Create a new object identity.
    pub fn new(num: u32, gen: u16) -> Self {
        Self { num, gen }
    }

    /// Emit the identity as a reference token, `N G R`.
    pub fn write_ref(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.num.to_string().as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.gen.to_string().as_bytes());
        out.extend_from_slice(b" R");
    }
}

type NameInner = SmallVec<[u8; 31]>;

/// A PDF name.
///
/// Stored unescaped; `#xx` sequences are decoded on construction and
/// re-encoded on emission for bytes that are not regular characters.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(NameInner);

impl Name {
    /// Create a new name from raw (possibly `#xx`-escaped) bytes.
    pub fn new(data: &[u8]) -> Self {
        if !data.contains(&b'#') {
            return Self(SmallVec::from_slice(data));
        }

        let mut result = SmallVec::new();
        let mut r = Reader::new(data);

        while let Some(b) = r.read_byte() {
            if b == b'#' {
                match (r.read_byte(), r.read_byte()) {
                    (Some(hi), Some(lo)) => match (decode_hex_digit(hi), decode_hex_digit(lo)) {
                        (Some(hi), Some(lo)) => result.push(hi << 4 | lo),
                        _ => {
                            result.push(b'#');
                            result.push(hi);
                            result.push(lo);
                        }
                    },
                    _ => result.push(b'#'),
                }
            } else {
                result.push(b);
            }
        }

        Self(result)
    }

    /// Create a name from bytes that contain no escapes.
    pub fn from_unescaped(data: &[u8]) -> Self {
        Self(SmallVec::from_slice(data))
    }

    /// Concatenate a prefix and a name.
    pub fn prefixed(prefix: &[u8], rest: &[u8]) -> Self {
        let mut inner = SmallVec::with_capacity(prefix.len() + rest.len());
        inner.extend_from_slice(prefix);
        inner.extend_from_slice(rest);

        Self(inner)
    }

    /// The remainder of the name after a prefix, if it carries one.
    pub fn strip_prefix(&self, prefix: &[u8]) -> Option<Name> {
        self.0.strip_prefix(prefix).map(Name::from_unescaped)
    }

    /// Return a string representation of the name.
    ///
    /// Returns a placeholder in case the name is not UTF-8 encoded.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("{non-utf8 name}")
    }

    /// Emit the name with its leading solidus, escaping irregular bytes.
    pub fn write(&self, out: &mut Vec<u8>) {
        out.push(b'/');

        for b in self.0.iter().copied() {
            if is_regular_character(b) && b != b'#' {
                out.push(b);
            } else {
                out.extend_from_slice(format!("#{b:02X}").as_bytes());
            }
        }
    }
}

impl Deref for Name {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[u8]> for Name {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Borrow<[u8]> for Name {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for Name {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => <str as Debug>::fmt(s, f),
            Err(_) => <[u8] as Debug>::fmt(&self.0, f),
        }
    }
}

/// A PDF number.
///
/// Integers and reals are kept apart so that emission is canonical: a value
/// parsed from `1.0` re-emits as `1`, while `1.5` stays `1.5`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Number(InternalNumber);

#[derive(Clone, Copy, Debug, PartialEq)]
enum InternalNumber {
    Integer(i64),
    Real(f64),
}

impl Number {
    pub fn from_f64(value: f64) -> Self {
        if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
            Self(InternalNumber::Integer(value as i64))
        } else {
            Self(InternalNumber::Real(value))
        }
    }

    pub fn from_i64(value: i64) -> Self {
        Self(InternalNumber::Integer(value))
    }

    /// Returns the number as an f64.
    pub fn as_f64(&self) -> f64 {
        match self.0 {
            InternalNumber::Integer(i) => i as f64,
            InternalNumber::Real(r) => r,
        }
    }

    /// Returns the number as an i64, truncating a real.
    pub fn as_i64(&self) -> i64 {
        match self.0 {
            InternalNumber::Integer(i) => i,
            InternalNumber::Real(r) => r as i64,
        }
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        match self.0 {
            InternalNumber::Integer(i) => out.extend_from_slice(i.to_string().as_bytes()),
            InternalNumber::Real(r) => {
                let repr = format!("{r}");

                // PDF numbers have no exponent notation.
                if repr.contains(['e', 'E']) {
                    out.extend_from_slice(format!("{r:.6}").as_bytes());
                } else {
                    out.extend_from_slice(repr.as_bytes());
                }
            }
        }
    }
}

/// A sink for change notifications of the object model.
///
/// Every mutating setter reports the identity of the owning indirect object
/// here, so the document collaborator can invalidate dependent caches.
#[derive(Clone, Debug)]
pub struct ChangeSink(Sender<ObjectId>);

impl ChangeSink {
    pub(crate) fn notify(&self, id: ObjectId) {
        // The collaborator may already be gone; edits still succeed.
        let _ = self.0.send(id);
    }
}

/// Create a change channel; the receiving half belongs to the document
/// collaborator.
pub fn change_channel() -> (ChangeSink, Receiver<ObjectId>) {
    let (tx, rx) = mpsc::channel();

    (ChangeSink(tx), rx)
}

/// A node of the object tree.
///
/// Equality is structural over the parsed values; edit state and attached
/// sinks do not take part.
#[derive(Clone, Debug, PartialEq)]
pub enum PdfObject {
    /// The null object.
    Null,
    /// A boolean.
    Bool(bool),
    /// A number.
    Number(Number),
    /// A name.
    Name(Name),
    /// A literal string; the raw bytes between the parentheses, escapes
    /// unprocessed so that re-emission is byte-exact.
    LiteralStr(Vec<u8>),
    /// A hex string; the raw bytes between the angle brackets.
    HexStr(Vec<u8>),
    /// An array of objects.
    Array(Vec<PdfObject>),
    /// A dictionary.
    Dict(PdfDict),
    /// A stream.
    Stream(PdfStream),
    /// A reference to an indirect object.
    Ref(ObjectId),
}

impl PdfObject {
    /// Parse a single object from a standalone buffer.
    pub fn from_bytes(data: &[u8]) -> Result<PdfObject> {
        let lex = Lexer::new(data).ok_or(Error::InvalidInput("empty buffer"))?;

        Self::parse_at(&lex, 0, None)
            .map(|p| p.value)
            .ok_or(Error::ParseFailure("buffer does not hold a parsable object"))
    }

    /// Parse the object starting at the given position.
    pub fn parse_at(
        lex: &Lexer,
        at: usize,
        resolver: Option<&dyn Resolve>,
    ) -> Option<Parsed<PdfObject>> {
        let i = lex.skip_empty(at)?;
        let data = lex.data();

        if data[i..].starts_with(b"null") {
            return Some(Parsed {
                value: PdfObject::Null,
                start: i,
                end: i + 3,
            });
        }

        match lex.value_kind_at(i, false) {
            ValueKind::Name => parse::name_at(lex, i, false, false)
                .map(|p| p.map_value(PdfObject::Name)),
            ValueKind::Number => parse::number_at(lex, i, true, false)
                .map(|p| p.map_value(|v| PdfObject::Number(Number::from_f64(v)))),
            ValueKind::Boolean => {
                parse::bool_at(lex, i, false).map(|p| p.map_value(PdfObject::Bool))
            }
            ValueKind::StringLiteral => {
                let bounds = lex.literal_bounds_at(i)?;
                let value = bounds
                    .content
                    .map(|c| data[c.start..=c.end].to_vec())
                    .unwrap_or_default();

                Some(Parsed {
                    value: PdfObject::LiteralStr(value),
                    start: bounds.start,
                    end: bounds.end,
                })
            }
            ValueKind::HexString => {
                let bounds = lex.hex_bounds_at(i)?;
                let value = bounds
                    .content
                    .map(|c| data[c.start..=c.end].to_vec())
                    .unwrap_or_default();

                Some(Parsed {
                    value: PdfObject::HexStr(value),
                    start: bounds.start,
                    end: bounds.end,
                })
            }
            ValueKind::Array => {
                let bounds = lex.array_bounds_at(i)?;
                let mut items = Vec::new();

                if let Some(c) = bounds.content {
                    let mut at = c.start;
                    while at <= c.end {
                        match lex.skip_empty(at) {
                            Some(j) if j <= c.end => {
                                let child = PdfObject::parse_at(lex, j, resolver)?;
                                items.push(child.value);
                                at = child.end + 1;
                            }
                            _ => break,
                        }
                    }
                }

                Some(Parsed {
                    value: PdfObject::Array(items),
                    start: bounds.start,
                    end: bounds.end,
                })
            }
            ValueKind::Dictionary => {
                let bounds = lex.dict_bounds_at(i)?;

                // A dict followed by the `stream` keyword is a stream object.
                if let Some(s) = lex.skip_empty(bounds.end + 1) {
                    if data[s..].starts_with(b"stream") {
                        return PdfStream::parse_at(lex, i, resolver)
                            .map(|p| p.map_value(PdfObject::Stream));
                    }
                }

                let dict = PdfDict::parse_range(lex, bounds, resolver)?;

                Some(Parsed {
                    value: PdfObject::Dict(dict),
                    start: bounds.start,
                    end: bounds.end,
                })
            }
            ValueKind::Reference => Self::parse_ref(lex, i).map(|p| p.map_value(PdfObject::Ref)),
            _ => None,
        }
    }

    /// Parse a reference token, `N G R`.
    pub fn parse_ref(lex: &Lexer, at: usize) -> Option<Parsed<ObjectId>> {
        let num = parse::number_at(lex, at, false, true)?;
        let gen = parse::number_at(lex, num.end + 1, false, true)?;
        let r_at = lex.skip_empty(gen.end + 1)?;

        if lex.data()[r_at] != b'R' {
            return None;
        }

        if num.value < 0.0 || gen.value < 0.0 || gen.value > u16::MAX as f64 {
            return None;
        }

        Some(Parsed {
            value: ObjectId::new(num.value as u32, gen.value as u16),
            start: num.start,
            end: r_at,
        })
    }

    /// Serialize the object, consulting the crypt hook for stream payloads.
    pub fn write_bytes(&self, out: &mut Vec<u8>, crypt: Option<&CryptInfo>) -> Result<()> {
        match self {
            PdfObject::Null => out.extend_from_slice(b"null"),
            PdfObject::Bool(b) => {
                out.extend_from_slice(if *b { b"true" } else { b"false" })
            }
            PdfObject::Number(n) => n.write(out),
            PdfObject::Name(n) => n.write(out),
            PdfObject::LiteralStr(s) => {
                out.push(b'(');
                out.extend_from_slice(s);
                out.push(b')');
            }
            PdfObject::HexStr(s) => {
                out.push(b'<');
                out.extend_from_slice(s);
                out.push(b'>');
            }
            PdfObject::Array(items) => {
                out.push(b'[');

                for (k, item) in items.iter().enumerate() {
                    if k > 0 {
                        out.push(b' ');
                    }
                    item.write_bytes(out, crypt)?;
                }

                out.push(b']');
            }
            PdfObject::Dict(d) => d.write_bytes(out, crypt)?,
            PdfObject::Stream(s) => s.write_bytes(out, crypt)?,
            PdfObject::Ref(id) => id.write_ref(out),
        }

        Ok(())
    }

    /// Serialize the object into a fresh buffer.
    pub fn to_bytes(&self, crypt: Option<&CryptInfo>) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_bytes(&mut out, crypt)?;

        Ok(out)
    }

    /// Build a literal string object from plain text, escaping as needed.
    pub fn literal_from(text: &[u8]) -> PdfObject {
        let mut escaped = Vec::with_capacity(text.len());

        for b in text.iter().copied() {
            if matches!(b, b'\\' | b'(' | b')') {
                escaped.push(b'\\');
            }
            escaped.push(b);
        }

        PdfObject::LiteralStr(escaped)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PdfObject::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PdfObject::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PdfObject::Number(n) => Some(n.as_f64()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PdfObject::Number(n) => Some(n.as_i64()),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&Name> {
        match self {
            PdfObject::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[PdfObject]> {
        match self {
            PdfObject::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&PdfDict> {
        match self {
            PdfObject::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&PdfStream> {
        match self {
            PdfObject::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_ref_id(&self) -> Option<ObjectId> {
        match self {
            PdfObject::Ref(id) => Some(*id),
            _ => None,
        }
    }

    /// The decoded content of a string object.
    pub fn string_bytes(&self) -> Option<Vec<u8>> {
        match self {
            PdfObject::LiteralStr(s) => Some(decode_literal(s)),
            PdfObject::HexStr(s) => decode_hex(s),
            _ => None,
        }
    }
}

/// Parse the `N G obj` header of an indirect object definition.
pub fn object_id_at(lex: &Lexer, at: usize) -> Option<Parsed<ObjectId>> {
    let num = parse::number_at(lex, at, false, true)?;
    let gen = parse::number_at(lex, num.end + 1, false, true)?;
    let kw = lex.skip_empty(gen.end + 1)?;

    if !lex.data()[kw..].starts_with(b"obj") {
        return None;
    }

    if num.value < 0.0 || gen.value < 0.0 || gen.value > u16::MAX as f64 {
        return None;
    }

    Some(Parsed {
        value: ObjectId::new(num.value as u32, gen.value as u16),
        start: num.start,
        end: kw + 2,
    })
}

/// Decode the escape sequences of a literal string body.
pub fn decode_literal(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut r = Reader::new(data);

    while let Some(b) = r.read_byte() {
        match b {
            b'\\' => {
                let Some(next) = r.read_byte() else { break };

                match next {
                    b'n' => out.push(b'\n'),
                    b'r' => out.push(b'\r'),
                    b't' => out.push(b'\t'),
                    b'b' => out.push(0x08),
                    b'f' => out.push(0x0C),
                    // A reverse solidus at a line end continues the string.
                    b'\r' => {
                        if r.peek_byte() == Some(b'\n') {
                            r.forward();
                        }
                    }
                    b'\n' => {}
                    b'0'..=b'7' => {
                        let mut value = (next - b'0') as u16;

                        for _ in 0..2 {
                            match r.peek_byte() {
                                Some(d @ b'0'..=b'7') => {
                                    value = value * 8 + (d - b'0') as u16;
                                    r.forward();
                                }
                                _ => break,
                            }
                        }

                        out.push((value & 0xFF) as u8);
                    }
                    other => out.push(other),
                }
            }
            // A bare end-of-line marker reads as a single line feed.
            b'\r' => {
                out.push(b'\n');

                if r.peek_byte() == Some(b'\n') {
                    r.forward();
                }
            }
            other => out.push(other),
        }
    }

    out
}

/// Decode a hex string body, ignoring white space and padding odd lengths.
pub fn decode_hex(data: &[u8]) -> Option<Vec<u8>> {
    let mut digits = Vec::with_capacity(data.len());

    for b in data.iter().copied() {
        if is_white_space_character(b) {
            continue;
        }

        digits.push(decode_hex_digit(b)?);
    }

    if digits.len() % 2 != 0 {
        digits.push(0);
    }

    Some(digits.chunks_exact(2).map(|c| c[0] << 4 | c[1]).collect())
}
