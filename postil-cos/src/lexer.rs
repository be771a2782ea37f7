//! Classifying values and computing their bounds.

use crate::parse;
use crate::reader::{Direction, Reader, Search};
use crate::trivia::{is_digit, is_regular_character};

/// An inclusive byte range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// The bounds of a value.
///
/// `start` and `end` are inclusive. Composite values additionally carry the
/// inclusive range inside their delimiters; values with empty content omit it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bounds {
    pub start: usize,
    pub end: usize,
    pub content: Option<Span>,
}

impl Bounds {
    /// Bounds without content.
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            content: None,
        }
    }

    /// Bounds with an inner content range.
    pub fn with_content(start: usize, end: usize, content_start: usize, content_end: usize) -> Self {
        debug_assert!(start <= content_start && content_start <= content_end && content_end <= end);

        Self {
            start,
            end,
            content: Some(Span {
                start: content_start,
                end: content_end,
            }),
        }
    }
}

/// The kind of value found at a position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Name,
    Number,
    StringLiteral,
    HexString,
    Array,
    Dictionary,
    Stream,
    Boolean,
    Reference,
    Comment,
    Unknown,
}

/// A lexer over the bytes of a PDF file.
///
/// The lexer never consumes anything; every method takes and returns byte
/// indices into the shared buffer.
#[derive(Clone, Copy, Debug)]
pub struct Lexer<'a> {
    data: &'a [u8],
}

impl<'a> Lexer<'a> {
    /// Create a new lexer. Fails on an empty buffer.
    pub fn new(data: &'a [u8]) -> Option<Self> {
        if data.is_empty() {
            return None;
        }

        Some(Self { data })
    }

    /// The underlying bytes.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// A reader over the same bytes.
    pub fn reader(&self) -> Reader<'a> {
        Reader::new(self.data)
    }

    /// The largest valid byte index.
    pub fn max_index(&self) -> usize {
        self.data.len() - 1
    }

    /// Advance past white space and full-line comments.
    ///
    /// Returns `None` if the buffer is exhausted before a meaningful byte.
    pub fn skip_empty(&self, at: usize) -> Option<usize> {
        let r = self.reader();
        let mut i = r.find_non_space(Direction::Forward, at)?;

        while self.data[i] == b'%' {
            let next = r.find_newline(Direction::Forward, i)?;
            i = r.find_non_space(Direction::Forward, next)?;
        }

        Some(i)
    }

    /// Classify the value starting at the given position.
    pub fn value_kind_at(&self, at: usize, skip_empty: bool) -> ValueKind {
        let i = if skip_empty {
            match self.skip_empty(at) {
                Some(i) => i,
                None => return ValueKind::Unknown,
            }
        } else {
            at
        };

        if self.reader().is_outside(i) {
            return ValueKind::Unknown;
        }

        let next = |k: usize| self.data.get(i + k).copied();

        match self.data[i] {
            b'/' => {
                if next(1).is_some_and(is_regular_character) {
                    ValueKind::Name
                } else {
                    ValueKind::Unknown
                }
            }
            b'[' => ValueKind::Array,
            b'(' => ValueKind::StringLiteral,
            b'%' => ValueKind::Comment,
            b'<' => {
                if next(1) == Some(b'<') {
                    ValueKind::Dictionary
                } else {
                    ValueKind::HexString
                }
            }
            b if is_digit(b) => self.reference_or_number(i),
            b'.' | b'-' => {
                if next(1).is_some_and(is_digit) {
                    ValueKind::Number
                } else {
                    ValueKind::Unknown
                }
            }
            b's' => self.keyword_kind(i, b"stream", ValueKind::Stream),
            b't' => self.keyword_kind(i, b"true", ValueKind::Boolean),
            b'f' => self.keyword_kind(i, b"false", ValueKind::Boolean),
            _ => ValueKind::Unknown,
        }
    }

    /// Compute the bounds of the dictionary starting at the given position.
    ///
    /// Dict delimiters inside string literals are ignored, and `<<`/`>>` pairs
    /// match non-overlapping: once a byte closed a pair it cannot open the
    /// next one.
    pub fn dict_bounds_at(&self, start: usize) -> Option<Bounds> {
        let r = self.reader();
        if r.is_outside(start + 1) || &self.data[start..=start + 1] != b"<<" {
            return None;
        }

        let max = self.max_index();
        let mut dict_depth = 1u32;
        let mut literal_depth = 0u32;
        // Whether the previous byte was consumed as the second half of a pair.
        let mut consumed = true;
        let mut end = None;

        let mut i = start + 2;
        while i <= max {
            let b = self.data[i];
            let escaped = self.data[i - 1] == b'\\';
            let mut now = false;

            if literal_depth > 0 {
                if b == b'(' && !escaped {
                    literal_depth += 1;
                } else if b == b')' && !escaped {
                    literal_depth -= 1;
                }
            } else if b == b'(' && !escaped {
                literal_depth += 1;
            } else if b == b'<' && self.data[i - 1] == b'<' && !consumed {
                dict_depth += 1;
                now = true;
            } else if b == b'>' && self.data[i - 1] == b'>' && !consumed {
                dict_depth -= 1;
                now = true;

                if dict_depth == 0 {
                    end = Some(i);
                    break;
                }
            }

            consumed = now;
            i += 1;
        }

        let end = end?;

        // The closing pair occupies `end - 1..=end`.
        let content_start = r.find_non_space(Direction::Forward, start + 2)?;
        if content_start >= end - 1 {
            return Some(Bounds::new(start, end));
        }
        let content_end = r.find_non_space(Direction::Backward, end - 2)?;
        if content_end < content_start {
            return Some(Bounds::new(start, end));
        }

        Some(Bounds::with_content(start, end, content_start, content_end))
    }

    /// Compute the bounds of the array starting at the given position.
    pub fn array_bounds_at(&self, start: usize) -> Option<Bounds> {
        let r = self.reader();
        if r.is_outside(start) || self.data[start] != b'[' {
            return None;
        }

        let max = self.max_index();
        let mut depth = 1u32;
        let mut end = None;

        let mut i = start + 1;
        while i <= max {
            match self.data[i] {
                b'[' => depth += 1,
                b']' => {
                    depth -= 1;

                    if depth == 0 {
                        end = Some(i);
                        break;
                    }
                }
                _ => {}
            }

            i += 1;
        }

        let end = end?;

        let content_start = r.find_non_space(Direction::Forward, start + 1)?;
        if content_start >= end {
            return Some(Bounds::new(start, end));
        }
        let content_end = r.find_non_space(Direction::Backward, end - 1)?;
        if content_end < content_start {
            return Some(Bounds::new(start, end));
        }

        Some(Bounds::with_content(start, end, content_start, content_end))
    }

    /// Compute the bounds of the hex string starting at the given position.
    pub fn hex_bounds_at(&self, start: usize) -> Option<Bounds> {
        let r = self.reader();
        if r.is_outside(start)
            || self.data[start] != b'<'
            || self.data.get(start + 1).copied() == Some(b'<')
        {
            return None;
        }

        let end = r.find_byte(b'>', Direction::Forward, start + 1)?;
        if end == start + 1 {
            return Some(Bounds::new(start, end));
        }

        let content_start = r.find_non_space(Direction::Forward, start + 1)?;
        if content_start >= end {
            return Some(Bounds::new(start, end));
        }
        let content_end = r.find_non_space(Direction::Backward, end - 1)?;
        if content_end < content_start {
            return Some(Bounds::new(start, end));
        }

        Some(Bounds::with_content(start, end, content_start, content_end))
    }

    /// Compute the bounds of the literal string starting at the given position.
    ///
    /// The content range is the raw inside of the parentheses; escape
    /// sequences stay unprocessed so that re-emission is byte-exact.
    pub fn literal_bounds_at(&self, start: usize) -> Option<Bounds> {
        let r = self.reader();
        if r.is_outside(start) || self.data[start] != b'(' {
            return None;
        }

        let max = self.max_index();
        let mut opened = 1u32;
        let mut escaped = false;
        let mut end = None;

        let mut i = start + 1;
        while i <= max {
            let b = self.data[i];

            if escaped {
                escaped = false;
            } else {
                match b {
                    b'\\' => escaped = true,
                    b'(' => opened += 1,
                    b')' => {
                        opened -= 1;

                        if opened == 0 {
                            end = Some(i);
                            break;
                        }
                    }
                    _ => {}
                }
            }

            i += 1;
        }

        let end = end?;

        if end == start + 1 {
            Some(Bounds::new(start, end))
        } else {
            Some(Bounds::with_content(start, end, start + 1, end - 1))
        }
    }

    /// Compute the bounds of the indirect object definition at the given
    /// position (`N G obj ... endobj`).
    ///
    /// The content range trims surrounding white space; when the content is a
    /// bare dictionary, it is additionally narrowed past the `<<`/`>>` pair so
    /// that the caller receives the dict interior.
    pub fn indirect_bounds_at(&self, start: usize) -> Option<Bounds> {
        let r = self.reader();
        let obj = r.find_subarray(b"obj", &Search::keyword(start))?;
        let endobj = r.find_subarray(b"endobj", &Search::keyword(obj.end + 1))?;

        let mut content_start = r.find_non_space(Direction::Forward, obj.end + 1)?;
        if content_start >= endobj.start {
            return Some(Bounds::new(start, endobj.end));
        }
        let mut content_end = r.find_non_space(Direction::Backward, endobj.start - 1)?;
        if content_end < content_start {
            return Some(Bounds::new(start, endobj.end));
        }

        if content_end >= content_start + 3
            && &self.data[content_start..=content_start + 1] == b"<<"
            && &self.data[content_end - 1..=content_end] == b">>"
        {
            content_start += 2;
            content_end -= 2;

            if content_start > content_end {
                return Some(Bounds::new(start, endobj.end));
            }

            content_start = r.find_non_space(Direction::Forward, content_start)?;
            if content_start > content_end {
                return Some(Bounds::new(start, endobj.end));
            }
            content_end = r.find_non_space(Direction::Backward, content_end)?;
        }

        Some(Bounds::with_content(
            start,
            endobj.end,
            content_start,
            content_end,
        ))
    }

    /// Compute the bounds of the cross-reference table at the given position
    /// (`xref ... trailer`). Empty tables return `None`.
    pub fn xref_bounds_at(&self, start: usize) -> Option<Bounds> {
        let r = self.reader();
        let xref = r.find_subarray(b"xref", &Search::keyword(start))?;
        let trailer = r.find_subarray(b"trailer", &Search::keyword(xref.end + 1))?;

        let content_start = r.find_non_space(Direction::Forward, xref.end + 1)?;
        if content_start >= trailer.start {
            return None;
        }
        let content_end = r.find_non_space(Direction::Backward, trailer.start - 1)?;
        if content_end < content_start {
            return None;
        }

        Some(Bounds::with_content(
            xref.start,
            trailer.end,
            content_start,
            content_end,
        ))
    }

    /// Walk forward until the start of the next name, skipping over whole
    /// composite values, tokens and comments on the way.
    pub fn skip_to_next_name(&self, start: usize, max_index: usize) -> Option<usize> {
        let max = max_index.min(self.max_index());
        let mut i = start;

        while i <= max {
            match self.value_kind_at(i, false) {
                ValueKind::Name => return Some(i),
                ValueKind::Dictionary => match self.dict_bounds_at(i) {
                    Some(b) => i = b.end + 1,
                    None => i += 1,
                },
                ValueKind::Array => match self.array_bounds_at(i) {
                    Some(b) => i = b.end + 1,
                    None => i += 1,
                },
                ValueKind::StringLiteral => match self.literal_bounds_at(i) {
                    Some(b) => i = b.end + 1,
                    None => i += 1,
                },
                ValueKind::HexString => match self.hex_bounds_at(i) {
                    Some(b) => i = b.end + 1,
                    None => i += 1,
                },
                ValueKind::Number | ValueKind::Reference => {
                    match parse::number_at(self, i, true, false) {
                        Some(p) => i = p.end + 1,
                        None => i += 1,
                    }
                }
                ValueKind::Boolean => match parse::bool_at(self, i, false) {
                    Some(p) => i = p.end + 1,
                    None => i += 1,
                },
                ValueKind::Comment => match self.reader().find_newline(Direction::Forward, i) {
                    Some(next) => i = next,
                    None => return None,
                },
                _ => i += 1,
            }
        }

        None
    }

    fn keyword_kind(&self, at: usize, keyword: &[u8], kind: ValueKind) -> ValueKind {
        if self.data[at..].starts_with(keyword) {
            kind
        } else {
            ValueKind::Unknown
        }
    }

    // A token starting with a digit stretches to the next delimiter, spanning
    // white space, so that `12 0 R` is one candidate. The token is a reference
    // if it contains an `R` not followed by a regular byte.
    fn reference_or_number(&self, at: usize) -> ValueKind {
        let r = self.reader();
        let token_end = r
            .find_delimiter(Direction::Forward, at)
            .map(|d| d - 1)
            .unwrap_or_else(|| r.max_index());

        let search = Search {
            direction: Direction::Backward,
            min_index: Some(at),
            max_index: Some(token_end),
            ..Search::default()
        };

        if let Some(hit) = r.find_subarray(b"R", &search) {
            let past = hit.end + 1;
            if r.is_outside(past) || !is_regular_character(self.data[past]) {
                return ValueKind::Reference;
            }
        }

        ValueKind::Number
    }
}

#[cfg(test)]
mod tests {
    use super::{Bounds, Lexer, Span, ValueKind};

    fn lexer(data: &[u8]) -> Lexer<'_> {
        Lexer::new(data).unwrap()
    }

    #[test]
    fn empty_buffer() {
        assert!(Lexer::new(b"").is_none());
    }

    #[test]
    fn skip_empty_1() {
        let lex = lexer(b"   \n\t /Name");
        assert_eq!(lex.skip_empty(0), Some(6));
    }

    #[test]
    fn skip_empty_comment() {
        let lex = lexer(b"  % a comment\n  /Name");
        assert_eq!(lex.skip_empty(0), Some(16));
    }

    #[test]
    fn skip_empty_stacked_comments() {
        let lex = lexer(b"% one\n% two\n42");
        assert_eq!(lex.skip_empty(0), Some(12));
    }

    #[test]
    fn skip_empty_exhausted() {
        let lex = lexer(b"  % only a comment");
        assert_eq!(lex.skip_empty(0), None);
    }

    #[test]
    fn skip_empty_idempotent() {
        let lex = lexer(b" % c\n  << >>");
        let first = lex.skip_empty(0).unwrap();
        assert_eq!(lex.skip_empty(first), Some(first));
    }

    #[test]
    fn kind_name() {
        let lex = lexer(b"/Type");
        assert_eq!(lex.value_kind_at(0, false), ValueKind::Name);
    }

    #[test]
    fn kind_bare_solidus() {
        let lex = lexer(b"/ x");
        assert_eq!(lex.value_kind_at(0, false), ValueKind::Unknown);
    }

    #[test]
    fn kind_dict_vs_hex() {
        let lex = lexer(b"<</A 1>>");
        assert_eq!(lex.value_kind_at(0, false), ValueKind::Dictionary);

        let lex = lexer(b"<AABB>");
        assert_eq!(lex.value_kind_at(0, false), ValueKind::HexString);
    }

    #[test]
    fn kind_reference() {
        let lex = lexer(b"12 0 R");
        assert_eq!(lex.value_kind_at(0, false), ValueKind::Reference);
    }

    #[test]
    fn kind_number_pair() {
        let lex = lexer(b"5 0");
        assert_eq!(lex.value_kind_at(0, false), ValueKind::Number);
    }

    #[test]
    fn kind_not_a_reference_when_followed_by_regular() {
        // `RG` is a content stream operator, not a reference keyword.
        let lex = lexer(b"0 0 RG");
        assert_eq!(lex.value_kind_at(0, false), ValueKind::Number);
    }

    #[test]
    fn kind_reference_stops_at_delimiter() {
        let lex = lexer(b"12 0 R/Next");
        assert_eq!(lex.value_kind_at(0, false), ValueKind::Reference);
    }

    #[test]
    fn kind_negative_and_leading_dot() {
        assert_eq!(lexer(b"-5").value_kind_at(0, false), ValueKind::Number);
        assert_eq!(lexer(b".5").value_kind_at(0, false), ValueKind::Number);
        assert_eq!(lexer(b"- x").value_kind_at(0, false), ValueKind::Unknown);
        assert_eq!(lexer(b".x").value_kind_at(0, false), ValueKind::Unknown);
    }

    #[test]
    fn kind_keywords() {
        assert_eq!(lexer(b"true").value_kind_at(0, false), ValueKind::Boolean);
        assert_eq!(lexer(b"false ").value_kind_at(0, false), ValueKind::Boolean);
        assert_eq!(lexer(b"stream\n").value_kind_at(0, false), ValueKind::Stream);
        assert_eq!(lexer(b"tr").value_kind_at(0, false), ValueKind::Unknown);
    }

    #[test]
    fn kind_skips_leading_trivia() {
        let lex = lexer(b"  % c\n [1 2]");
        assert_eq!(lex.value_kind_at(0, true), ValueKind::Array);
    }

    #[test]
    fn dict_bounds_simple() {
        let lex = lexer(b"<< /Length 42 /Type /Catalog >>");
        let b = lex.dict_bounds_at(0).unwrap();
        assert_eq!(b, Bounds::with_content(0, 30, 3, 27));
    }

    #[test]
    fn dict_bounds_empty() {
        let lex = lexer(b"<<>>");
        let b = lex.dict_bounds_at(0).unwrap();
        assert_eq!(b, Bounds::new(0, 3));
    }

    #[test]
    fn dict_bounds_blank() {
        let lex = lexer(b"<<   \n >>");
        let b = lex.dict_bounds_at(0).unwrap();
        assert_eq!(b, Bounds::new(0, 8));
    }

    #[test]
    fn dict_bounds_nested() {
        let lex = lexer(b"<< /A (>>) /B <</X 1>> >>");
        let b = lex.dict_bounds_at(0).unwrap();
        // The `>>` inside the literal must not close the outer dict.
        assert_eq!(b, Bounds::with_content(0, 24, 3, 21));
    }

    #[test]
    fn dict_bounds_escaped_paren_in_literal() {
        let lex = lexer(b"<</K (a\\)b)>>");
        let b = lex.dict_bounds_at(0).unwrap();
        assert_eq!(b, Bounds::with_content(0, 12, 2, 10));
    }

    #[test]
    fn dict_bounds_escaped_open_paren() {
        // `\(` inside the literal does not nest, so the literal closes at the
        // first `)` and the trailing `>>` closes the dict.
        let lex = lexer(b"<</K (x\\(y) /Z 1>>");
        let b = lex.dict_bounds_at(0).unwrap();
        assert_eq!(b.end, 17);
    }

    #[test]
    fn dict_bounds_non_overlapping_pairs() {
        let lex = lexer(b"<<<<>>>>");
        let b = lex.dict_bounds_at(0).unwrap();
        assert_eq!(b.end, 7);
    }

    #[test]
    fn dict_bounds_unterminated() {
        let lex = lexer(b"<< /A 1 >");
        assert!(lex.dict_bounds_at(0).is_none());
    }

    #[test]
    fn dict_bounds_wrong_start() {
        let lex = lexer(b"[1 2]");
        assert!(lex.dict_bounds_at(0).is_none());
    }

    #[test]
    fn array_bounds_nested() {
        let lex = lexer(b"[1 [2 3] 4]");
        let b = lex.array_bounds_at(0).unwrap();
        assert_eq!(b, Bounds::with_content(0, 10, 1, 9));
    }

    #[test]
    fn array_bounds_unbalanced() {
        let lex = lexer(b"[1 [2 3]");
        assert!(lex.array_bounds_at(0).is_none());
    }

    #[test]
    fn array_bounds_empty() {
        let lex = lexer(b"[]");
        assert_eq!(lex.array_bounds_at(0).unwrap(), Bounds::new(0, 1));
    }

    #[test]
    fn hex_bounds() {
        let lex = lexer(b"<00 1F> tail");
        let b = lex.hex_bounds_at(0).unwrap();
        assert_eq!(b, Bounds::with_content(0, 6, 1, 5));
    }

    #[test]
    fn hex_bounds_empty() {
        let lex = lexer(b"<>");
        assert_eq!(lex.hex_bounds_at(0).unwrap(), Bounds::new(0, 1));
    }

    #[test]
    fn literal_bounds_escapes() {
        let lex = lexer(b"(abc\\(def\\)ghi)");
        let b = lex.literal_bounds_at(0).unwrap();
        assert_eq!(b, Bounds::with_content(0, 14, 1, 13));
    }

    #[test]
    fn literal_bounds_nested() {
        let lex = lexer(b"(a (b) c)");
        let b = lex.literal_bounds_at(0).unwrap();
        assert_eq!(b.end, 8);
    }

    #[test]
    fn literal_bounds_unterminated() {
        let lex = lexer(b"(a \\)");
        assert!(lex.literal_bounds_at(0).is_none());
    }

    #[test]
    fn indirect_bounds_dict_interior() {
        let data = b"5 0 obj << /CA 0.5 >> endobj";
        let lex = lexer(data);
        let b = lex.indirect_bounds_at(0).unwrap();
        assert_eq!(b.start, 0);
        assert_eq!(b.end, 27);
        // Content narrows past the dict delimiters.
        let c = b.content.unwrap();
        assert_eq!(&data[c.start..=c.end], b"/CA 0.5");
    }

    #[test]
    fn indirect_bounds_non_dict() {
        let data = b"7 0 obj 42 endobj";
        let lex = lexer(data);
        let b = lex.indirect_bounds_at(0).unwrap();
        let c = b.content.unwrap();
        assert_eq!(&data[c.start..=c.end], b"42");
    }

    #[test]
    fn indirect_bounds_empty_dict() {
        let data = b"3 0 obj <<>> endobj";
        let lex = lexer(data);
        let b = lex.indirect_bounds_at(0).unwrap();
        assert!(b.content.is_none());
    }

    #[test]
    fn indirect_bounds_missing_endobj() {
        let lex = lexer(b"5 0 obj << /CA 0.5 >>");
        assert!(lex.indirect_bounds_at(0).is_none());
    }

    #[test]
    fn xref_bounds() {
        let data = b"xref\n0 1\n0000000000 65535 f\ntrailer <<>>";
        let lex = lexer(data);
        let b = lex.xref_bounds_at(0).unwrap();
        assert_eq!((b.start, b.end), (0, 34));
        let c = b.content.unwrap();
        assert_eq!(c, Span { start: 5, end: 26 });
    }

    #[test]
    fn xref_bounds_empty_table() {
        let lex = lexer(b"xref\ntrailer <<>>");
        assert!(lex.xref_bounds_at(0).is_none());
    }

    #[test]
    fn skip_to_next_name_over_tokens() {
        let data = b"<< /Length 42 /Type /Catalog >>";
        let lex = lexer(data);
        assert_eq!(lex.skip_to_next_name(3, 27), Some(3));
        assert_eq!(lex.skip_to_next_name(4, 27), Some(14));
        assert_eq!(lex.skip_to_next_name(15, 27), Some(20));
        assert_eq!(lex.skip_to_next_name(21, 27), None);
    }

    #[test]
    fn skip_to_next_name_over_composites() {
        let data = b"(string /NotAName) [/Also /Not] /Yes";
        let lex = lexer(data);
        assert_eq!(lex.skip_to_next_name(0, data.len() - 1), Some(32));
    }

    #[test]
    fn skip_to_next_name_over_comment() {
        let data = b"% /Hidden\n/Seen";
        let lex = lexer(data);
        assert_eq!(lex.skip_to_next_name(0, data.len() - 1), Some(10));
    }
}
