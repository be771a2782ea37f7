//! Dictionaries.

use crate::index::{ParseInfo, Resolve};
use crate::lexer::{Bounds, Lexer, Span};
use crate::object::{object_id_at, ChangeSink, Name, ObjectId, PdfObject};
use crate::parse;
use crate::util::OptionLog;
use crate::{CryptInfo, Result};
use indexmap::IndexMap;
use log::warn;

/// A dictionary: an insertion-ordered map from names to objects, together
/// with the identity and edit state of the node.
///
/// All mutations go through setters that flip the dirty flag and announce the
/// owning object on the attached change sink; raw field assignment is never
/// exposed.
#[derive(Clone, Debug, Default)]
pub struct PdfDict {
    entries: IndexMap<Name, PdfObject>,
    id: Option<ObjectId>,
    edited: bool,
    sink: Option<ChangeSink>,
    owner: Option<ObjectId>,
}

impl PartialEq for PdfDict {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl PdfDict {
    /// Create a new empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an indirect dictionary object from its definition.
    ///
    /// The identity is taken from the `N G obj` header when present.
    pub fn parse(info: &ParseInfo, resolver: Option<&dyn Resolve>) -> Option<Self> {
        let lex = info.lexer()?;
        let mut dict = Self::parse_content(&lex, info.bounds.content, resolver)?;

        if let Some(id) = object_id_at(&lex, info.bounds.start) {
            dict.id = Some(id.value);
        }

        Some(dict)
    }

    /// Parse a dictionary from its bounds (starting at `<<`).
    pub fn parse_range(lex: &Lexer, bounds: Bounds, resolver: Option<&dyn Resolve>) -> Option<Self> {
        Self::parse_content(lex, bounds.content, resolver)
    }

    /// Parse dictionary entries from the content between the delimiters.
    ///
    /// Unparsable values are dropped with a warning; the remaining entries
    /// survive, so that partially-valid documents still open.
    pub fn parse_content(
        lex: &Lexer,
        content: Option<Span>,
        resolver: Option<&dyn Resolve>,
    ) -> Option<Self> {
        let mut dict = Self::new();

        let Some(c) = content else {
            return Some(dict);
        };

        let mut i = c.start;
        while i <= c.end {
            let Some(key_at) = lex.skip_to_next_name(i, c.end) else {
                break;
            };

            let Some(key) = parse::name_at(lex, key_at, false, false) else {
                i = key_at + 1;
                continue;
            };

            match PdfObject::parse_at(lex, key.end + 1, resolver) {
                Some(value) => {
                    i = value.end + 1;
                    dict.entries.insert(key.value, value.value);
                }
                None => {
                    warn!("skipping dict entry {:?} with unparsable value", key.value);
                    i = key.end + 1;
                }
            }
        }

        Some(dict)
    }

    /// Returns the number of entries in the dictionary.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return whether the dictionary is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks whether the dictionary contains an entry with a specific key.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the entry of a key.
    pub fn get(&self, key: &[u8]) -> Option<&PdfObject> {
        self.entries.get(key)
    }

    /// Returns an iterator over all entries, in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&Name, &PdfObject)> {
        self.entries.iter()
    }

    /// Returns an iterator over all keys, in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &Name> {
        self.entries.keys()
    }

    /// Consume the dictionary, yielding its entries in insertion order.
    pub fn into_entries(self) -> impl Iterator<Item = (Name, PdfObject)> {
        self.entries.into_iter()
    }

    /// Replace an entry, marking the dictionary edited.
    pub fn set(&mut self, key: Name, value: PdfObject) {
        self.entries.insert(key, value);
        self.mark_edited();
    }

    /// Remove an entry, marking the dictionary edited on a hit.
    pub fn remove(&mut self, key: &[u8]) -> Option<PdfObject> {
        let removed = self.entries.shift_remove(key);

        if removed.is_some() {
            self.mark_edited();
        }

        removed
    }

    /// Insert an entry without touching the edit state. Used while building
    /// a dictionary from parsed bytes.
    pub(crate) fn insert_parsed(&mut self, key: Name, value: PdfObject) {
        self.entries.insert(key, value);
    }

    /// Take an entry out without touching the edit state.
    pub(crate) fn take(&mut self, key: &[u8]) -> Option<PdfObject> {
        self.entries.shift_remove(key)
    }

    /// The identity of the dictionary, if it is an indirect object.
    pub fn id(&self) -> Option<ObjectId> {
        self.id
    }

    /// Assign the identity of the dictionary.
    pub fn set_id(&mut self, id: ObjectId) {
        self.id = Some(id);

        if self.owner.is_none() {
            self.owner = Some(id);
        }
    }

    /// Whether the dictionary has been mutated since parsing.
    pub fn edited(&self) -> bool {
        self.edited
    }

    /// Flip the dirty flag and announce the owning object on the sink.
    pub fn mark_edited(&mut self) {
        self.edited = true;

        if let (Some(sink), Some(owner)) = (&self.sink, self.owner.or(self.id)) {
            sink.notify(owner);
        }
    }

    /// Attach a change sink, on behalf of the given owning object. The sink
    /// propagates to all nested dictionaries and streams.
    pub fn attach(&mut self, sink: &ChangeSink, owner: ObjectId) {
        self.sink = Some(sink.clone());
        self.owner = Some(owner);

        for value in self.entries.values_mut() {
            match value {
                PdfObject::Dict(d) => d.attach(sink, owner),
                PdfObject::Stream(s) => s.dict_mut_silent().attach(sink, owner),
                _ => {}
            }
        }
    }

    /// Serialize the dictionary.
    pub fn write_bytes(&self, out: &mut Vec<u8>, crypt: Option<&CryptInfo>) -> Result<()> {
        out.extend_from_slice(b"<<");

        for (k, (name, value)) in self.entries.iter().enumerate() {
            if k > 0 {
                out.push(b' ');
            }

            name.write(out);
            out.push(b' ');
            value.write_bytes(out, crypt)?;
        }

        out.extend_from_slice(b">>");

        Ok(())
    }

    /// Serialize the dictionary into a fresh buffer.
    pub fn to_bytes(&self, crypt: Option<&CryptInfo>) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_bytes(&mut out, crypt)?;

        Ok(out)
    }

    /// Fetch a number-valued entry, resolving an indirect reference through
    /// the given resolver.
    pub(crate) fn number_entry(&self, key: &[u8], resolver: Option<&dyn Resolve>) -> Option<f64> {
        match self.get(key)? {
            PdfObject::Number(n) => Some(n.as_f64()),
            PdfObject::Ref(id) => {
                let info = resolver?
                    .resolve(id.num)
                    .warn_none("entry points to a missing object")?;
                let lex = info.lexer()?;
                let c = info.bounds.content?;

                parse::number_at(&lex, c.start, true, true).map(|p| p.value)
            }
            _ => None,
        }
    }
}

/// Keys used by the typed dictionaries of this crate.
#[allow(missing_docs)]
pub mod keys {
    macro_rules! key {
        ($i:ident, $e:expr) => {
            pub const $i: &'static [u8] = $e;
        };
    }

    key!(BASE_FONT, b"BaseFont");
    key!(BBOX, b"BBox");
    key!(BITS_PER_COMPONENT, b"BitsPerComponent");
    key!(BM, b"BM");
    key!(CA, b"CA");
    key!(CA_NS, b"ca");
    key!(COLORSPACE, b"ColorSpace");
    key!(COLUMNS, b"Columns");
    key!(COLORS, b"Colors");
    key!(DECODE_PARMS, b"DecodeParms");
    key!(EXT_G_STATE, b"ExtGState");
    key!(FILTER, b"Filter");
    key!(FIRST_CHAR, b"FirstChar");
    key!(FONT, b"Font");
    key!(FORM, b"Form");
    key!(HEIGHT, b"Height");
    key!(IMAGE_MASK, b"ImageMask");
    key!(LAST_CHAR, b"LastChar");
    key!(LC, b"LC");
    key!(LENGTH, b"Length");
    key!(LJ, b"LJ");
    key!(LW, b"LW");
    key!(MATRIX, b"Matrix");
    key!(PATTERN, b"Pattern");
    key!(PREDICTOR, b"Predictor");
    key!(PREV, b"Prev");
    key!(PROC_SET, b"ProcSet");
    key!(PROPERTIES, b"Properties");
    key!(SHADING, b"Shading");
    key!(SUBTYPE, b"Subtype");
    key!(TYPE, b"Type");
    key!(WIDTH, b"Width");
    key!(XOBJECT, b"XObject");
}

#[cfg(test)]
mod tests {
    use super::keys::{EXT_G_STATE, LENGTH, TYPE};
    use super::PdfDict;
    use crate::lexer::Lexer;
    use crate::object::{change_channel, Name, ObjectId, PdfObject};

    fn dict_impl(data: &[u8]) -> Option<PdfDict> {
        let lex = Lexer::new(data)?;
        let bounds = lex.dict_bounds_at(0)?;

        PdfDict::parse_range(&lex, bounds, None)
    }

    #[test]
    fn empty_dict_1() {
        assert_eq!(dict_impl(b"<<>>").unwrap().len(), 0);
    }

    #[test]
    fn empty_dict_2() {
        assert_eq!(dict_impl(b"<<   \n >>").unwrap().len(), 0);
    }

    #[test]
    fn dict_1() {
        let dict = dict_impl(b"<< /Length 42 /Type /Catalog >>").unwrap();

        assert_eq!(dict.len(), 2);
        assert_eq!(dict.get(LENGTH).unwrap().as_i64(), Some(42));
        assert_eq!(
            dict.get(TYPE).unwrap().as_name(),
            Some(&Name::from_unescaped(b"Catalog"))
        );
    }

    #[test]
    fn dict_preserves_insertion_order() {
        let dict = dict_impl(b"<< /Z 1 /A 2 /M 3 >>").unwrap();
        let keys = dict.keys().map(|k| k.as_str().to_string()).collect::<Vec<_>>();

        assert_eq!(keys, ["Z", "A", "M"]);
    }

    #[test]
    fn dict_nested() {
        let dict = dict_impl(b"<< /Sub << /X 1 /Y (a(b)c) >> /N 5 >>").unwrap();
        let sub = dict.get(b"Sub").unwrap().as_dict().unwrap();

        assert_eq!(sub.len(), 2);
        assert_eq!(sub.get(b"X").unwrap().as_i64(), Some(1));
        assert_eq!(dict.get(b"N").unwrap().as_i64(), Some(5));
    }

    #[test]
    fn dict_with_refs() {
        let dict = dict_impl(b"<< /Font << /F1 7 0 R >> /Kids [3 0 R 4 0 R] >>").unwrap();
        let font = dict.get(b"Font").unwrap().as_dict().unwrap();

        assert_eq!(
            font.get(b"F1").unwrap().as_ref_id(),
            Some(ObjectId::new(7, 0))
        );

        let kids = dict.get(b"Kids").unwrap().as_array().unwrap();
        assert_eq!(kids.len(), 2);
    }

    #[test]
    fn dict_with_comment() {
        let dict = dict_impl(b"<<  /Hi % A comment \n 67.0 % Another comment \n >>").unwrap();

        assert_eq!(dict.len(), 1);
        assert_eq!(dict.get(b"Hi").unwrap().as_f64(), Some(67.0));
    }

    #[test]
    fn garbage_in_between() {
        let dict = dict_impl(
            b"<< \n/ProcSet [ /PDF /Text ] \n/Font << /F4 31 0 R /F6 23 0 R >> \n/ExtGState << /GS2 14 0 R\n2000\n /GS3 15 0 R >> \n>> ",
        )
        .unwrap();

        assert!(dict.contains_key(b"ProcSet"));
        assert!(dict.contains_key(b"Font"));

        let gs = dict.get(EXT_G_STATE).unwrap().as_dict().unwrap();
        assert_eq!(
            gs.get(b"GS2").unwrap().as_ref_id(),
            Some(ObjectId::new(14, 0))
        );
        assert_eq!(
            gs.get(b"GS3").unwrap().as_ref_id(),
            Some(ObjectId::new(15, 0))
        );
    }

    #[test]
    fn dict_with_escaped_name() {
        let dict = dict_impl(b"<< /PANTONE#20104#20C 234 >>").unwrap();

        assert!(dict.contains_key(b"PANTONE 104 C".as_ref()));
    }

    #[test]
    fn roundtrip_normalizes_tokens() {
        let source = b"<< /Length 42 /Type /Catalog /Kids [1 0 R] >>";
        let dict = dict_impl(source).unwrap();
        let bytes = dict.to_bytes(None).unwrap();
        let again = dict_impl(&bytes).unwrap();

        assert_eq!(dict, again);
    }

    #[test]
    fn setters_mark_edited() {
        let mut dict = dict_impl(b"<< /A 1 >>").unwrap();
        assert!(!dict.edited());

        dict.set(Name::from_unescaped(b"A"), PdfObject::Bool(true));
        assert!(dict.edited());
    }

    #[test]
    fn removal_marks_edited() {
        let mut dict = dict_impl(b"<< /A 1 >>").unwrap();

        assert!(dict.remove(b"Missing").is_none());
        assert!(!dict.edited());

        assert!(dict.remove(b"A").is_some());
        assert!(dict.edited());
    }

    #[test]
    fn edits_notify_the_sink() {
        let (sink, changes) = change_channel();
        let mut dict = dict_impl(b"<< /Sub << /X 1 >> >>").unwrap();

        let owner = ObjectId::new(9, 0);
        dict.attach(&sink, owner);

        dict.set(Name::from_unescaped(b"New"), PdfObject::Null);
        assert_eq!(changes.try_recv().ok(), Some(owner));
    }

    #[test]
    fn indirect_parse_takes_identity() {
        let data = b"5 0 obj << /CA 0.5 >> endobj";
        let lex = Lexer::new(data).unwrap();
        let bounds = lex.indirect_bounds_at(0).unwrap();
        let info = crate::index::ParseInfo {
            data,
            bounds,
            crypt: None,
        };

        let dict = PdfDict::parse(&info, None).unwrap();
        assert_eq!(dict.id(), Some(ObjectId::new(5, 0)));
        assert_eq!(dict.get(b"CA").unwrap().as_f64(), Some(0.5));
    }
}
