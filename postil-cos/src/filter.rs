//! Stream filter descriptors and decoding.

use crate::object::dict::keys::{
    BITS_PER_COMPONENT, COLORS, COLUMNS, DECODE_PARMS, FILTER, PREDICTOR,
};
use crate::object::{Name, PdfDict, PdfObject};
use crate::trivia::is_white_space_character;
use log::warn;

/// The filters the core knows about.
///
/// Image codecs (`DCTDecode`, `JPXDecode`, ...) are host concerns: their
/// payloads pass through raw and the renderer decodes them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterKind {
    Flate,
    AsciiHex,
    Passthrough(Name),
}

impl FilterKind {
    fn from_name(name: &Name) -> Self {
        match name.as_ref() {
            b"FlateDecode" | b"Fl" => Self::Flate,
            b"ASCIIHexDecode" | b"AHx" => Self::AsciiHex,
            _ => Self::Passthrough(name.clone()),
        }
    }
}

/// One step of a filter chain: the filter and its decode parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterSpec {
    pub kind: FilterKind,
    pub parms: Option<PdfDict>,
}

/// Read the filter chain of a stream dictionary, pairing each `/Filter`
/// entry with its `/DecodeParms` entry.
pub fn specs_from_dict(dict: &PdfDict) -> Vec<FilterSpec> {
    let parms_at = |index: usize| -> Option<PdfDict> {
        match dict.get(DECODE_PARMS) {
            Some(PdfObject::Dict(d)) if index == 0 => Some(d.clone()),
            Some(PdfObject::Array(a)) => match a.get(index) {
                Some(PdfObject::Dict(d)) => Some(d.clone()),
                _ => None,
            },
            _ => None,
        }
    };

    match dict.get(FILTER) {
        None => Vec::new(),
        Some(PdfObject::Name(n)) => vec![FilterSpec {
            kind: FilterKind::from_name(n),
            parms: parms_at(0),
        }],
        Some(PdfObject::Array(filters)) => filters
            .iter()
            .enumerate()
            .filter_map(|(i, f)| match f {
                PdfObject::Name(n) => Some(FilterSpec {
                    kind: FilterKind::from_name(n),
                    parms: parms_at(i),
                }),
                _ => {
                    warn!("ignoring non-name filter entry");

                    None
                }
            })
            .collect(),
        Some(_) => {
            warn!("ignoring malformed /Filter entry");

            Vec::new()
        }
    }
}

/// Apply a single filter. `None` means the data could not be decoded.
pub fn decode(data: &[u8], spec: &FilterSpec) -> Option<Vec<u8>> {
    match &spec.kind {
        FilterKind::Flate => {
            let inflated = miniz_oxide::inflate::decompress_to_vec_zlib(data)
                .or_else(|_| miniz_oxide::inflate::decompress_to_vec(data))
                .ok()?;

            apply_predictor(inflated, spec.parms.as_ref())
        }
        FilterKind::AsciiHex => {
            let body = match data.iter().position(|b| *b == b'>') {
                Some(end) => &data[..end],
                None => data,
            };

            let mut digits = Vec::with_capacity(body.len());
            for b in body.iter().copied() {
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
        FilterKind::Passthrough(name) => {
            warn!("filter {:?} is decoded by the host, passing raw data through", name);

            Some(data.to_vec())
        }
    }
}

pub(crate) fn decode_hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

struct PredictorParams {
    predictor: u8,
    colors: u8,
    bits_per_component: u8,
    columns: usize,
}

impl PredictorParams {
    fn from_dict(dict: Option<&PdfDict>) -> Self {
        let get = |key: &[u8], default: i64| -> i64 {
            dict.and_then(|d| d.get(key)).and_then(|o| o.as_i64()).unwrap_or(default)
        };

        Self {
            predictor: get(PREDICTOR, 1) as u8,
            colors: get(COLORS, 1) as u8,
            bits_per_component: get(BITS_PER_COMPONENT, 8) as u8,
            columns: get(COLUMNS, 1) as usize,
        }
    }

    fn bytes_per_pixel(&self) -> usize {
        (((self.colors as usize * self.bits_per_component as usize) + 7) / 8).max(1)
    }

    fn row_length(&self) -> usize {
        (self.columns * self.colors as usize * self.bits_per_component as usize + 7) / 8
    }
}

fn apply_predictor(data: Vec<u8>, parms: Option<&PdfDict>) -> Option<Vec<u8>> {
    let params = PredictorParams::from_dict(parms);

    if params.row_length() == 0 {
        warn!("degenerate predictor parameters, leaving data unfiltered");

        return Some(data);
    }

    match params.predictor {
        1 => Some(data),
        2 => {
            if params.bits_per_component != 8 {
                warn!("TIFF predictor with sub-byte components is unsupported");

                return Some(data);
            }

            let mut out = data;
            let bpp = params.bytes_per_pixel();
            let row_len = params.row_length();

            for row in out.chunks_mut(row_len) {
                for i in bpp..row.len() {
                    row[i] = row[i].wrapping_add(row[i - bpp]);
                }
            }

            Some(out)
        }
        10..=15 => Some(unfilter_png(&data, &params)),
        other => {
            warn!("unknown predictor {other}, leaving data unfiltered");

            Some(data)
        }
    }
}

// PNG row filters per RFC 2083; each row carries a leading filter-type byte.
fn unfilter_png(data: &[u8], params: &PredictorParams) -> Vec<u8> {
    let row_len = params.row_length();
    let bpp = params.bytes_per_pixel();
    let mut out: Vec<u8> = Vec::with_capacity(data.len());
    let mut prev_row = vec![0u8; row_len];

    for chunk in data.chunks(row_len + 1) {
        if chunk.len() < 2 {
            break;
        }

        let filter_type = chunk[0];
        let mut row = chunk[1..].to_vec();

        for i in 0..row.len() {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = prev_row.get(i).copied().unwrap_or(0);
            let up_left = if i >= bpp {
                prev_row.get(i - bpp).copied().unwrap_or(0)
            } else {
                0
            };

            let add = match filter_type {
                0 => 0,
                1 => left,
                2 => up,
                3 => (((left as u16) + (up as u16)) / 2) as u8,
                4 => paeth(left, up, up_left),
                _ => 0,
            };

            row[i] = row[i].wrapping_add(add);
        }

        out.extend_from_slice(&row);
        prev_row = row;
    }

    out
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();

    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

#[cfg(test)]
mod tests {
    use super::{decode, specs_from_dict, FilterKind, FilterSpec};
    use crate::lexer::Lexer;
    use crate::object::PdfDict;

    fn dict_impl(data: &[u8]) -> PdfDict {
        let lex = Lexer::new(data).unwrap();
        let bounds = lex.dict_bounds_at(0).unwrap();

        PdfDict::parse_range(&lex, bounds, None).unwrap()
    }

    #[test]
    fn single_filter() {
        let dict = dict_impl(b"<< /Filter /FlateDecode >>");
        let specs = specs_from_dict(&dict);

        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].kind, FilterKind::Flate);
        assert!(specs[0].parms.is_none());
    }

    #[test]
    fn filter_chain_with_parms() {
        let dict = dict_impl(
            b"<< /Filter [/ASCIIHexDecode /FlateDecode] /DecodeParms [null << /Predictor 12 /Columns 4 >>] >>",
        );
        let specs = specs_from_dict(&dict);

        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].kind, FilterKind::AsciiHex);
        assert!(specs[0].parms.is_none());
        assert_eq!(specs[1].kind, FilterKind::Flate);
        assert!(specs[1].parms.is_some());
    }

    #[test]
    fn ascii_hex_decode() {
        let spec = FilterSpec {
            kind: FilterKind::AsciiHex,
            parms: None,
        };

        assert_eq!(decode(b"48 65 6C 6C 6F>", &spec), Some(b"Hello".to_vec()));
        assert_eq!(decode(b"486", &spec), Some(b"H`".to_vec()));
        assert_eq!(decode(b"4Z", &spec), None);
    }

    #[test]
    fn flate_decode() {
        use miniz_oxide::deflate::compress_to_vec_zlib;

        let spec = FilterSpec {
            kind: FilterKind::Flate,
            parms: None,
        };
        let compressed = compress_to_vec_zlib(b"postil", 6);

        assert_eq!(decode(&compressed, &spec), Some(b"postil".to_vec()));
        assert_eq!(decode(b"not deflate at all", &spec), None);
    }

    #[test]
    fn flate_with_png_predictor() {
        use miniz_oxide::deflate::compress_to_vec_zlib;

        // Two rows of four bytes, each row filtered with "Sub" (type 1).
        let filtered: Vec<u8> = vec![1, 10, 10, 10, 10, 1, 20, 10, 10, 10];
        let compressed = compress_to_vec_zlib(&filtered, 6);

        let dict = dict_impl(b"<< /Predictor 12 /Columns 4 >>");
        let spec = FilterSpec {
            kind: FilterKind::Flate,
            parms: Some(dict),
        };

        let decoded = decode(&compressed, &spec).unwrap();
        assert_eq!(decoded, vec![10, 20, 30, 40, 20, 30, 40, 50]);
    }

    #[test]
    fn unknown_filter_passes_through() {
        let dict = dict_impl(b"<< /Filter /DCTDecode >>");
        let specs = specs_from_dict(&dict);

        assert!(matches!(specs[0].kind, FilterKind::Passthrough(_)));
        assert_eq!(decode(b"jpeg bytes", &specs[0]), Some(b"jpeg bytes".to_vec()));
    }
}
