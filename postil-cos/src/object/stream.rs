//! Streams.

use crate::filter::{self, FilterSpec};
use crate::index::Resolve;
use crate::lexer::Lexer;
use crate::object::dict::keys::{DECODE_PARMS, FILTER, LENGTH};
use crate::object::{Name, Number, ObjectId, PdfDict, PdfObject};
use crate::parse::Parsed;
use crate::reader::Reader;
use crate::util::OptionLog;
use crate::{CryptInfo, Error, Result};
use log::warn;

/// A stream: a dictionary plus a byte payload and the chain of filters the
/// payload is encoded with.
#[derive(Clone, Debug)]
pub struct PdfStream {
    dict: PdfDict,
    data: Vec<u8>,
    filters: Vec<FilterSpec>,
}

impl PartialEq for PdfStream {
    fn eq(&self, other: &Self) -> bool {
        self.dict == other.dict && self.data == other.data
    }
}

impl PdfStream {
    /// Create a stream around an unfiltered payload.
    pub fn new(dict: PdfDict, data: Vec<u8>) -> Self {
        Self {
            dict,
            data,
            filters: Vec::new(),
        }
    }

    /// Parse the stream whose dictionary starts at the given position.
    ///
    /// The payload length comes from `/Length`, resolving an indirect value
    /// through the given resolver when necessary.
    pub fn parse_at(
        lex: &Lexer,
        dict_start: usize,
        resolver: Option<&dyn Resolve>,
    ) -> Option<Parsed<PdfStream>> {
        let bounds = lex.dict_bounds_at(dict_start)?;
        let dict = PdfDict::parse_range(lex, bounds, resolver)?;

        let keyword = lex.skip_empty(bounds.end + 1)?;
        if !lex.data()[keyword..].starts_with(b"stream") {
            return None;
        }

        let mut r = Reader::new_at(lex.data(), keyword + b"stream".len());
        r.forward_tag(b"\r\n")
            .or_else(|| r.forward_tag(b"\n"))
            .or_else(|| r.forward_tag(b"\r"))?;

        let length = dict
            .number_entry(LENGTH, resolver)
            .warn_none("stream has no usable /Length")?;
        if length < 0.0 {
            return None;
        }

        let data = r.read_bytes(length as usize)?.to_vec();
        r.skip_white_spaces();
        r.forward_tag(b"endstream")?;

        let filters = filter::specs_from_dict(&dict);

        Some(Parsed {
            value: PdfStream {
                dict,
                data,
                filters,
            },
            start: dict_start,
            end: r.offset() - 1,
        })
    }

    /// The stream dictionary.
    pub fn dict(&self) -> &PdfDict {
        &self.dict
    }

    /// The identity of the stream, if it is an indirect object.
    pub fn id(&self) -> Option<ObjectId> {
        self.dict.id()
    }

    /// Assign the identity of the stream.
    pub fn set_id(&mut self, id: ObjectId) {
        self.dict.set_id(id);
    }

    /// The filter chain of the payload.
    pub fn filters(&self) -> &[FilterSpec] {
        &self.filters
    }

    /// The raw payload, as stored in the file.
    pub fn raw_data(&self) -> &[u8] {
        &self.data
    }

    /// Replace the payload with unfiltered bytes.
    ///
    /// The filter chain no longer applies to the new payload, so the filter
    /// entries are dropped from the dictionary.
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = data;
        self.filters.clear();
        self.dict.remove(FILTER);
        self.dict.remove(DECODE_PARMS);
        self.dict.mark_edited();
    }

    /// Decode the payload: decrypt when credentials are supplied, then run
    /// the filter chain.
    ///
    /// The result is not cached, so calling this repeatedly is expensive.
    pub fn decoded(&self, crypt: Option<&CryptInfo>) -> Result<Vec<u8>> {
        let mut current = match (crypt, self.dict.id()) {
            (Some(c), Some(id)) => c.decrypt(id, &self.data),
            _ => self.data.clone(),
        };

        for spec in &self.filters {
            current = filter::decode(&current, spec)
                .ok_or(Error::ParseFailure("stream filter could not be applied"))?;
        }

        Ok(current)
    }

    /// Serialize the stream, encrypting the payload when credentials are
    /// supplied and fixing `/Length` up to the emitted payload.
    pub fn write_bytes(&self, out: &mut Vec<u8>, crypt: Option<&CryptInfo>) -> Result<()> {
        let payload = match (crypt, self.dict.id()) {
            (Some(c), Some(id)) => c.encrypt(id, &self.data),
            _ => self.data.clone(),
        };

        let length = PdfObject::Number(Number::from_i64(payload.len() as i64));

        out.extend_from_slice(b"<<");
        let mut wrote_length = false;
        let mut first = true;

        for (name, value) in self.dict.entries() {
            if !first {
                out.push(b' ');
            }
            first = false;

            name.write(out);
            out.push(b' ');

            if name.as_ref() == LENGTH {
                wrote_length = true;
                length.write_bytes(out, crypt)?;
            } else {
                value.write_bytes(out, crypt)?;
            }
        }

        if !wrote_length {
            if !first {
                out.push(b' ');
            }

            Name::from_unescaped(LENGTH).write(out);
            out.push(b' ');
            length.write_bytes(out, crypt)?;
        }

        out.extend_from_slice(b">>");
        out.extend_from_slice(b"\nstream\n");
        out.extend_from_slice(&payload);
        out.extend_from_slice(b"\nendstream");

        Ok(())
    }

    /// Serialize the stream into a fresh buffer.
    pub fn to_bytes(&self, crypt: Option<&CryptInfo>) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_bytes(&mut out, crypt)?;

        Ok(out)
    }

    pub(crate) fn dict_mut_silent(&mut self) -> &mut PdfDict {
        &mut self.dict
    }

    pub(crate) fn require_id(&self) -> Result<ObjectId> {
        self.dict.id().ok_or_else(|| {
            warn!("stream object is required to be indirect but has no reference");

            Error::SerializationFailure("stream object has no indirect reference")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::PdfStream;
    use crate::crypt::testing::xor_crypt;
    use crate::index::{ObjectIndex, Resolve};
    use crate::lexer::Lexer;
    use crate::object::{ObjectId, PdfObject};

    fn stream_impl(data: &[u8]) -> Option<PdfStream> {
        PdfStream::parse_at(&Lexer::new(data)?, 0, None).map(|p| p.value)
    }

    #[test]
    fn stream_plain() {
        let stream = stream_impl(b"<< /Length 10 >> stream\nabcdefghij\nendstream").unwrap();

        assert_eq!(stream.raw_data(), b"abcdefghij");
        assert_eq!(stream.decoded(None).unwrap(), b"abcdefghij");
    }

    #[test]
    fn stream_crlf_after_keyword() {
        let stream = stream_impl(b"<< /Length 3 >> stream\r\nabc\nendstream").unwrap();

        assert_eq!(stream.raw_data(), b"abc");
    }

    #[test]
    fn stream_without_length() {
        assert!(stream_impl(b"<< /Type /XObject >> stream\nabc\nendstream").is_none());
    }

    #[test]
    fn stream_length_through_resolver() {
        let data =
            b"1 0 obj << /Length 2 0 R >> stream\nabcde\nendstream endobj\n2 0 obj 5 endobj";
        let index = ObjectIndex::build(data).unwrap();
        let info = index.resolve(1).unwrap();
        let lex = Lexer::new(data).unwrap();

        let stream = PdfStream::parse_at(&lex, info.bounds.content.unwrap().start, Some(&index))
            .unwrap()
            .value;

        assert_eq!(stream.raw_data(), b"abcde");
    }

    #[test]
    fn stream_roundtrip_fixes_length() {
        let mut stream = stream_impl(b"<< /Length 3 /K 1 >> stream\nabc\nendstream").unwrap();
        stream.set_data(b"longer payload".to_vec());

        let bytes = stream.to_bytes(None).unwrap();
        let again = stream_impl(&bytes).unwrap();

        assert_eq!(again.raw_data(), b"longer payload");
        assert_eq!(again.dict().get(b"Length").unwrap().as_i64(), Some(14));
        assert_eq!(again.dict().get(b"K").unwrap().as_i64(), Some(1));
    }

    #[test]
    fn set_data_drops_filters() {
        let mut stream =
            stream_impl(b"<< /Length 3 /Filter /FlateDecode >> stream\nabc\nendstream").unwrap();
        assert_eq!(stream.filters().len(), 1);

        stream.set_data(b"plain".to_vec());
        assert!(stream.filters().is_empty());
        assert!(stream.dict().get(b"Filter").is_none());
        assert!(stream.dict().edited());
    }

    #[test]
    fn crypt_hook_is_consulted_on_emission() {
        let mut stream = stream_impl(b"<< /Length 2 >> stream\nhi\nendstream").unwrap();
        stream.set_id(ObjectId::new(1, 0));

        let crypt = xor_crypt();
        let bytes = stream.to_bytes(Some(&crypt)).unwrap();
        let lex = Lexer::new(&bytes).unwrap();
        let emitted = PdfStream::parse_at(&lex, 0, None).unwrap().value;

        // The payload on disk is encrypted; decoding with the same
        // credentials recovers it. The emitted copy has no id, so decrypt
        // has to go through a stream that knows its identity.
        assert_ne!(emitted.raw_data(), b"hi");
        let mut with_id = emitted;
        with_id.set_id(ObjectId::new(1, 0));
        assert_eq!(with_id.decoded(Some(&crypt)).unwrap(), b"hi");
    }

    #[test]
    fn flate_decoding() {
        use miniz_oxide::deflate::compress_to_vec_zlib;

        let payload = compress_to_vec_zlib(b"hello hello hello", 6);
        let mut source = format!("<< /Length {} /Filter /FlateDecode >> stream\n", payload.len())
            .into_bytes();
        source.extend_from_slice(&payload);
        source.extend_from_slice(b"\nendstream");

        let stream = stream_impl(&source).unwrap();
        assert_eq!(stream.decoded(None).unwrap(), b"hello hello hello");
    }

    #[test]
    fn structural_equality_ignores_whitespace() {
        let a = stream_impl(b"<< /Length 3 >> stream\nabc\nendstream").unwrap();
        let b = stream_impl(b"<<  /Length  3  >>  stream\nabc\nendstream").unwrap();

        assert_eq!(PdfObject::Stream(a), PdfObject::Stream(b));
    }
}
