//! Typed decoders for leaf values.

use crate::lexer::{Lexer, Span};
use crate::object::Name;
use crate::reader::{Direction, Search};
use crate::trivia::{is_digit, is_regular_character};

/// A decoded leaf value together with the inclusive range it was read from.
#[derive(Clone, Debug, PartialEq)]
pub struct Parsed<T> {
    pub value: T,
    pub start: usize,
    pub end: usize,
}

impl<T> Parsed<T> {
    pub(crate) fn map_value<U>(self, f: impl FnOnce(T) -> U) -> Parsed<U> {
        Parsed {
            value: f(self.value),
            start: self.start,
            end: self.end,
        }
    }
}

/// Parse a number at the given position.
///
/// The rule is lenient: `-.5`, `.5`, `5`, `5.` and `5.0` are all valid. With
/// `float = false` a decimal point fails the parse.
pub fn number_at(lex: &Lexer, at: usize, float: bool, skip_empty: bool) -> Option<Parsed<f64>> {
    let start = resolve(lex, at, skip_empty)?;
    let data = lex.data();
    let max = lex.max_index();

    let mut repr = String::new();
    let mut i = start;

    if data[i] == b'-' {
        repr.push('-');
        i += 1;

        if i > max {
            return None;
        }
    }

    let mut seen_dot = false;
    if data[i] == b'.' {
        if !float {
            return None;
        }

        // A leading dot expands to `0.`.
        repr.push_str("0.");
        seen_dot = true;
        i += 1;
    }

    let int_start = i;
    while i <= max && is_digit(data[i]) {
        repr.push(data[i] as char);
        i += 1;
    }
    let mut has_digits = i > int_start;

    if float && !seen_dot && i <= max && data[i] == b'.' {
        repr.push('.');
        i += 1;

        let frac_start = i;
        while i <= max && is_digit(data[i]) {
            repr.push(data[i] as char);
            i += 1;
        }
        has_digits |= i > frac_start;
    }

    if !has_digits {
        return None;
    }

    if repr.ends_with('.') {
        repr.push('0');
    }

    let value = repr.parse::<f64>().ok()?;

    Some(Parsed {
        value,
        start,
        end: i - 1,
    })
}

/// Parse a name at the given position.
///
/// The returned value includes the solidus iff `include_slash`; `#xx` escapes
/// are decoded either way. An empty body fails.
pub fn name_at(lex: &Lexer, at: usize, include_slash: bool, skip_empty: bool) -> Option<Parsed<Name>> {
    let start = resolve(lex, at, skip_empty)?;
    let data = lex.data();
    let max = lex.max_index();

    if data[start] != b'/' {
        return None;
    }

    let mut i = start + 1;
    while i <= max && is_regular_character(data[i]) {
        if data[i] == b'#' {
            // An escape must be a full hex pair.
            if i + 2 > max
                || !data[i + 1].is_ascii_hexdigit()
                || !data[i + 2].is_ascii_hexdigit()
            {
                return None;
            }

            i += 2;
        }

        i += 1;
    }

    if i == start + 1 {
        return None;
    }

    let name = Name::new(&data[start + 1..i]);
    let value = if include_slash {
        Name::prefixed(b"/", &name)
    } else {
        name
    };

    Some(Parsed {
        value,
        start,
        end: i - 1,
    })
}

/// Parse a run of regular characters at the given position.
pub fn regular_run_at<'a>(lex: &Lexer<'a>, at: usize, skip_empty: bool) -> Option<Parsed<&'a [u8]>> {
    let start = resolve(lex, at, skip_empty)?;
    let data = lex.data();
    let max = lex.max_index();

    let mut i = start;
    while i <= max && is_regular_character(data[i]) {
        i += 1;
    }

    if i == start {
        return None;
    }

    Some(Parsed {
        value: &data[start..i],
        start,
        end: i - 1,
    })
}

/// Parse a boolean at the given position.
///
/// `true` and `false` are tried as closed matches within the sub-range
/// bounded by the next delimiter.
pub fn bool_at(lex: &Lexer, at: usize, skip_empty: bool) -> Option<Parsed<bool>> {
    let start = resolve(lex, at, skip_empty)?;
    let r = lex.reader();

    let limit = match r.find_delimiter(Direction::Forward, start) {
        Some(d) if d == start => return None,
        Some(d) => d - 1,
        None => r.max_index(),
    };

    let search = Search {
        min_index: Some(start),
        max_index: Some(limit),
        closed_only: true,
        ..Search::default()
    };

    for (keyword, value) in [(b"true".as_slice(), true), (b"false".as_slice(), false)] {
        if let Some(m) = r.find_subarray(keyword, &search) {
            return Some(Parsed {
                value,
                start: m.start,
                end: m.end,
            });
        }
    }

    None
}

/// Parse an array of numbers, stopping at the first unparsable byte.
pub fn number_array_at(
    lex: &Lexer,
    at: usize,
    float: bool,
    skip_empty: bool,
) -> Option<Parsed<Vec<f64>>> {
    let start = resolve(lex, at, skip_empty)?;
    let bounds = lex.array_bounds_at(start)?;

    let mut values = Vec::new();
    if let Some(c) = bounds.content {
        let mut i = c.start;
        while i <= c.end {
            match number_at(lex, i, float, true) {
                Some(p) if p.end <= c.end => {
                    values.push(p.value);
                    i = p.end + 1;
                }
                _ => break,
            }
        }
    }

    Some(Parsed {
        value: values,
        start: bounds.start,
        end: bounds.end,
    })
}

/// Parse an array of names, stopping at the first unparsable byte.
pub fn name_array_at(
    lex: &Lexer,
    at: usize,
    include_slash: bool,
    skip_empty: bool,
) -> Option<Parsed<Vec<Name>>> {
    let start = resolve(lex, at, skip_empty)?;
    let bounds = lex.array_bounds_at(start)?;

    let mut values = Vec::new();
    if let Some(c) = bounds.content {
        let mut i = c.start;
        while i <= c.end {
            match name_at(lex, i, include_slash, true) {
                Some(p) if p.end <= c.end => {
                    values.push(p.value);
                    i = p.end + 1;
                }
                _ => break,
            }
        }
    }

    Some(Parsed {
        value: values,
        start: bounds.start,
        end: bounds.end,
    })
}

/// Look up a name-valued property inside dict content bounds.
///
/// The scan uses the same literal/dict-nesting tracker as the dict bounds
/// finder and only accepts a match at depth exactly 1 whose following byte is
/// non-regular. `name` includes the solidus, e.g. `b"/Subtype"`.
pub fn dict_name_property_at(lex: &Lexer, content: Span, name: &[u8]) -> Option<Parsed<Name>> {
    let data = lex.data();
    let mut dict_depth = 1u32;
    let mut literal_depth = 0u32;
    let mut consumed = false;
    let mut found = None;

    let mut i = content.start;
    while i <= content.end {
        let b = data[i];
        let escaped = i > 0 && data[i - 1] == b'\\';
        let mut now = false;

        if literal_depth > 0 {
            if b == b'(' && !escaped {
                literal_depth += 1;
            } else if b == b')' && !escaped {
                literal_depth -= 1;
            }
        } else if b == b'(' && !escaped {
            literal_depth += 1;
        } else if i > content.start && b == b'<' && data[i - 1] == b'<' && !consumed {
            dict_depth += 1;
            now = true;
        } else if i > content.start && b == b'>' && data[i - 1] == b'>' && !consumed {
            dict_depth -= 1;
            now = true;
        } else if dict_depth == 1 && data[i..].starts_with(name) {
            let past = i + name.len();
            if past > lex.max_index() || !is_regular_character(data[past]) {
                found = Some(past);
                break;
            }
        }

        consumed = now;
        i += 1;
    }

    name_at(lex, found?, false, true)
}

fn resolve(lex: &Lexer, at: usize, skip_empty: bool) -> Option<usize> {
    let i = if skip_empty { lex.skip_empty(at)? } else { at };

    (!lex.reader().is_outside(i)).then_some(i)
}
