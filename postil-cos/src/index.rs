//! The object index: from object numbers to definition bytes.

use crate::crypt::CryptInfo;
use crate::lexer::{Bounds, Lexer, Span};
use crate::object::dict::keys::PREV;
use crate::object::{object_id_at, PdfDict};
use crate::parse;
use crate::reader::{Direction, Search};
use crate::trivia::{is_digit, is_regular_character};
use log::warn;
use rustc_hash::FxHashMap;

/// Everything needed to parse one indirect object: the shared buffer, the
/// bounds of the definition, and the document credentials.
#[derive(Clone, Debug)]
pub struct ParseInfo<'a> {
    pub data: &'a [u8],
    pub bounds: Bounds,
    pub crypt: Option<CryptInfo>,
}

impl<'a> ParseInfo<'a> {
    /// A lexer over the shared buffer.
    pub fn lexer(&self) -> Option<Lexer<'a>> {
        Lexer::new(self.data)
    }
}

/// The indirect-resolution contract.
///
/// `None` means the reference is dangling; callers drop the affected entry
/// and keep going rather than failing the whole parse.
pub trait Resolve {
    fn resolve(&self, num: u32) -> Option<ParseInfo<'_>>;
}

#[derive(Clone, Copy, Debug)]
struct IndexEntry {
    gen: u16,
    offset: usize,
}

/// A map from object numbers to the byte ranges of their definitions.
///
/// Built from the cross-reference table when one parses, or by scanning the
/// buffer for `N G obj` headers when none does.
#[derive(Clone, Debug)]
pub struct ObjectIndex<'a> {
    data: &'a [u8],
    map: FxHashMap<u32, IndexEntry>,
    crypt: Option<CryptInfo>,
}

impl<'a> ObjectIndex<'a> {
    /// Build the index for a buffer. Fails on an empty buffer.
    pub fn build(data: &'a [u8]) -> Option<Self> {
        let lex = Lexer::new(data)?;
        let mut map = FxHashMap::default();

        if !from_tables(&lex, &mut map) {
            warn!("no usable xref table, scanning for object definitions");
            from_scan(&lex, &mut map);
        }

        Some(Self {
            data,
            map,
            crypt: None,
        })
    }

    /// Attach document credentials; they travel with every `ParseInfo`.
    pub fn set_crypt(&mut self, crypt: CryptInfo) {
        self.crypt = Some(crypt);
    }

    /// The number of indexed objects.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Whether an object number is indexed.
    pub fn contains(&self, num: u32) -> bool {
        self.map.contains_key(&num)
    }

    /// The recorded generation number of an object.
    pub fn generation(&self, num: u32) -> Option<u16> {
        self.map.get(&num).map(|e| e.gen)
    }

    /// Like [`Resolve::resolve`], but a hard error on a dangling reference,
    /// for consumers that post-validate instead of degrading.
    pub fn require(&self, num: u32) -> crate::Result<ParseInfo<'_>> {
        self.resolve(num).ok_or(crate::Error::MissingReference(num))
    }
}

impl Resolve for ObjectIndex<'_> {
    fn resolve(&self, num: u32) -> Option<ParseInfo<'_>> {
        let entry = self.map.get(&num)?;
        let lex = Lexer::new(self.data)?;
        let bounds = lex.indirect_bounds_at(entry.offset)?;

        // A stale offset may land inside a different definition.
        let header = object_id_at(&lex, entry.offset)?;
        if header.value.num != num {
            warn!(
                "object header at offset {} belongs to {} rather than {}",
                entry.offset, header.value.num, num
            );

            return None;
        }

        Some(ParseInfo {
            data: self.data,
            bounds,
            crypt: self.crypt.clone(),
        })
    }
}

/// Walk the table chain starting at the offset behind the last `startxref`.
fn from_tables(lex: &Lexer, map: &mut FxHashMap<u32, IndexEntry>) -> bool {
    let r = lex.reader();
    let search = Search {
        direction: Direction::Backward,
        closed_only: true,
        ..Search::default()
    };

    let Some(keyword) = r.find_subarray(b"startxref", &search) else {
        return false;
    };
    let Some(first) = parse::number_at(lex, keyword.end + 1, false, true) else {
        return false;
    };

    let mut visited = Vec::new();
    let mut next = Some(first.value as usize);
    let mut any = false;

    while let Some(pos) = next {
        if visited.contains(&pos) || lex.reader().is_outside(pos) {
            break;
        }
        visited.push(pos);

        let Some(bounds) = lex.xref_bounds_at(pos) else {
            break;
        };
        let Some(content) = bounds.content else {
            break;
        };

        any |= parse_table(lex, content, map);

        // Incremental updates chain to the previous table.
        next = trailer_prev(lex, bounds.end + 1);
    }

    any
}

fn trailer_prev(lex: &Lexer, after: usize) -> Option<usize> {
    let at = lex.skip_empty(after)?;
    let bounds = lex.dict_bounds_at(at)?;
    let dict = PdfDict::parse_range(lex, bounds, None)?;
    let prev = dict.get(PREV)?.as_i64()?;

    (prev >= 0).then_some(prev as usize)
}

/// Parse the subsections of one table. Earlier tables in the chain are newer,
/// so existing entries win.
fn parse_table(lex: &Lexer, content: Span, map: &mut FxHashMap<u32, IndexEntry>) -> bool {
    let mut inserted = false;
    let mut i = content.start;

    'subsections: while i <= content.end {
        let Some(first_num) = parse::number_at(lex, i, false, true) else {
            break;
        };
        let Some(count) = parse::number_at(lex, first_num.end + 1, false, true) else {
            break;
        };
        if count.end > content.end {
            break;
        }

        i = count.end + 1;

        for k in 0..count.value as u64 {
            let Some(offset) = parse::number_at(lex, i, false, true) else {
                break 'subsections;
            };
            let Some(gen) = parse::number_at(lex, offset.end + 1, false, true) else {
                break 'subsections;
            };
            let Some(flag_at) = lex.skip_empty(gen.end + 1) else {
                break 'subsections;
            };
            if flag_at > content.end {
                break 'subsections;
            }

            let flag = lex.data()[flag_at];
            if flag != b'n' && flag != b'f' {
                break 'subsections;
            }

            if flag == b'n' {
                let num = first_num.value as u32 + k as u32;
                map.entry(num).or_insert(IndexEntry {
                    gen: gen.value as u16,
                    offset: offset.value as usize,
                });
                inserted = true;
            }

            i = flag_at + 1;
        }
    }

    inserted
}

/// Brute-force repair: scan the whole buffer for `N G obj` headers. Later
/// definitions override earlier ones, matching incremental-update order.
fn from_scan(lex: &Lexer, map: &mut FxHashMap<u32, IndexEntry>) {
    let r = lex.reader();
    let mut at = 0;

    while let Some(hit) = r.find_subarray(b"obj", &Search::keyword(at)) {
        at = hit.end + 1;

        let Some((num, gen, def_start)) = def_before(lex, hit.start) else {
            continue;
        };

        let Some(bounds) = lex.indirect_bounds_at(def_start) else {
            continue;
        };

        map.insert(
            num,
            IndexEntry {
                gen,
                offset: def_start,
            },
        );
        at = bounds.end + 1;
    }
}

/// Read the `N G` pair directly before an `obj` keyword.
fn def_before(lex: &Lexer, obj_at: usize) -> Option<(u32, u16, usize)> {
    let r = lex.reader();
    let data = lex.data();

    if obj_at == 0 {
        return None;
    }

    let gen_end = r.find_non_space(Direction::Backward, obj_at - 1)?;
    let gen_start = digit_run_start(data, gen_end)?;
    if gen_start == 0 {
        return None;
    }

    let num_end = r.find_non_space(Direction::Backward, gen_start - 1)?;
    let num_start = digit_run_start(data, num_end)?;
    if num_start > 0 && is_regular_character(data[num_start - 1]) {
        return None;
    }

    let num = std::str::from_utf8(&data[num_start..=num_end])
        .ok()?
        .parse::<u32>()
        .ok()?;
    let gen = std::str::from_utf8(&data[gen_start..=gen_end])
        .ok()?
        .parse::<u16>()
        .ok()?;

    Some((num, gen, num_start))
}

fn digit_run_start(data: &[u8], end: usize) -> Option<usize> {
    if !is_digit(data[end]) {
        return None;
    }

    let mut start = end;
    while start > 0 && is_digit(data[start - 1]) {
        start -= 1;
    }

    Some(start)
}
