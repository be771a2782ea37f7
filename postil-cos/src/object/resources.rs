//! Resource dictionaries and their typed children.
//!
//! A resource dict keeps two views of each category: the raw sub-map as it
//! appeared in the file (names mapping to references or inline dicts), and a
//! resolved map of typed children built through the object index. Resolved
//! keys carry their category prefix (`ExtGState...`, `Font...`, `XObject...`)
//! so that a `/F1` font and a `/F1` pattern never collide; the prefix is
//! stripped again on emission.

use crate::index::{ParseInfo, Resolve};
use crate::lexer::{Bounds, Lexer};
use crate::object::dict::keys::{
    BASE_FONT, BBOX, BITS_PER_COMPONENT, BM, CA, CA_NS, COLORSPACE, EXT_G_STATE, FIRST_CHAR,
    FONT, FORM, HEIGHT, IMAGE_MASK, LAST_CHAR, LC, LJ, LW, MATRIX, PATTERN, PROC_SET, PROPERTIES,
    SHADING, SUBTYPE, WIDTH, XOBJECT,
};
use crate::object::{object_id_at, Name, ObjectId, PdfDict, PdfObject, PdfStream};
use crate::parse;
use crate::util::OptionLog;
use crate::{CryptInfo, Result};
use indexmap::IndexMap;
use log::warn;

/// An entry of a raw resource sub-map.
#[derive(Clone, Debug, PartialEq)]
pub enum MapEntry {
    /// A reference to an indirect object.
    Ref(ObjectId),
    /// An inline dictionary.
    Inline(PdfDict),
}

/// A raw resource sub-map: names mapping to references or inline dicts, in
/// insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectMapDict {
    entries: IndexMap<Name, MapEntry>,
}

impl ObjectMapDict {
    /// Build a sub-map from a parsed dict object. Entries that are neither
    /// references nor dicts are dropped with a warning.
    pub fn from_object(obj: &PdfObject) -> Option<Self> {
        let dict = obj.as_dict()?;
        let mut entries = IndexMap::new();

        for (name, value) in dict.entries() {
            match value {
                PdfObject::Ref(id) => {
                    entries.insert(name.clone(), MapEntry::Ref(*id));
                }
                PdfObject::Dict(d) => {
                    entries.insert(name.clone(), MapEntry::Inline(d.clone()));
                }
                _ => {
                    warn!("dropping resource entry {name:?}: neither a reference nor a dict");
                }
            }
        }

        Some(Self { entries })
    }

    pub fn get(&self, name: &[u8]) -> Option<&MapEntry> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Name, &MapEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert_ref(&mut self, name: Name, id: ObjectId) {
        self.entries.insert(name, MapEntry::Ref(id));
    }

    pub fn write_bytes(&self, out: &mut Vec<u8>, crypt: Option<&CryptInfo>) -> Result<()> {
        out.extend_from_slice(b"<<");

        for (k, (name, entry)) in self.entries.iter().enumerate() {
            if k > 0 {
                out.push(b' ');
            }

            name.write(out);
            out.push(b' ');

            match entry {
                MapEntry::Ref(id) => id.write_ref(out),
                MapEntry::Inline(d) => d.write_bytes(out, crypt)?,
            }
        }

        out.extend_from_slice(b">>");

        Ok(())
    }
}

/// A graphics state parameter dictionary (`/ExtGState`).
///
/// Typed fields re-emit in declaration order; everything else round-trips
/// through the raw bag.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GraphicsStateDict {
    stroke_alpha: Option<f64>,
    fill_alpha: Option<f64>,
    blend_mode: Option<Name>,
    line_width: Option<f64>,
    line_cap: Option<i64>,
    line_join: Option<i64>,
    // The `[font_ref size]` pair; kept as the raw object since the reference
    // inside it resolves through the document index like any other.
    font: Option<PdfObject>,
    rest: PdfDict,
}

impl GraphicsStateDict {
    /// Parse a graphics state from an indirect object definition.
    pub fn parse(info: &ParseInfo) -> Option<Self> {
        let lex = info.lexer()?;
        let mut dict = PdfDict::parse_content(&lex, info.bounds.content, None)?;

        if let Some(id) = object_id_at(&lex, info.bounds.start) {
            dict.set_id(id.value);
        }

        Some(Self::from_dict(dict))
    }

    /// Split an already-parsed dict into typed fields and the raw bag.
    pub fn from_dict(mut dict: PdfDict) -> Self {
        Self {
            stroke_alpha: dict.take(CA).and_then(|o| o.as_f64()),
            fill_alpha: dict.take(CA_NS).and_then(|o| o.as_f64()),
            blend_mode: dict.take(BM).and_then(|o| o.as_name().cloned()),
            line_width: dict.take(LW).and_then(|o| o.as_f64()),
            line_cap: dict.take(LC).and_then(|o| o.as_i64()),
            line_join: dict.take(LJ).and_then(|o| o.as_i64()),
            font: dict.take(FONT),
            rest: dict,
        }
    }

    pub fn stroke_alpha(&self) -> Option<f64> {
        self.stroke_alpha
    }

    pub fn fill_alpha(&self) -> Option<f64> {
        self.fill_alpha
    }

    pub fn blend_mode(&self) -> Option<&Name> {
        self.blend_mode.as_ref()
    }

    pub fn line_width(&self) -> Option<f64> {
        self.line_width
    }

    pub fn line_cap(&self) -> Option<i64> {
        self.line_cap
    }

    pub fn line_join(&self) -> Option<i64> {
        self.line_join
    }

    /// The `/Font` entry, a `[font_ref size]` pair.
    pub fn font(&self) -> Option<&PdfObject> {
        self.font.as_ref()
    }

    pub fn set_stroke_alpha(&mut self, value: f64) {
        self.stroke_alpha = Some(value);
        self.rest.mark_edited();
    }

    pub fn set_fill_alpha(&mut self, value: f64) {
        self.fill_alpha = Some(value);
        self.rest.mark_edited();
    }

    pub fn set_blend_mode(&mut self, value: Name) {
        self.blend_mode = Some(value);
        self.rest.mark_edited();
    }

    pub fn set_line_width(&mut self, value: f64) {
        self.line_width = Some(value);
        self.rest.mark_edited();
    }

    pub fn set_font(&mut self, value: PdfObject) {
        self.font = Some(value);
        self.rest.mark_edited();
    }

    pub fn id(&self) -> Option<ObjectId> {
        self.rest.id()
    }

    pub(crate) fn set_id(&mut self, id: ObjectId) {
        self.rest.set_id(id);
    }

    pub fn edited(&self) -> bool {
        self.rest.edited()
    }

    pub fn write_bytes(&self, out: &mut Vec<u8>, crypt: Option<&CryptInfo>) -> Result<()> {
        out.extend_from_slice(b"<<");
        let mut first = true;

        if let Some(v) = self.stroke_alpha {
            write_number_entry(out, &mut first, CA, v);
        }
        if let Some(v) = self.fill_alpha {
            write_number_entry(out, &mut first, CA_NS, v);
        }
        if let Some(v) = &self.blend_mode {
            write_key(out, &mut first, BM);
            v.write(out);
        }
        if let Some(v) = self.line_width {
            write_number_entry(out, &mut first, LW, v);
        }
        if let Some(v) = self.line_cap {
            write_number_entry(out, &mut first, LC, v as f64);
        }
        if let Some(v) = self.line_join {
            write_number_entry(out, &mut first, LJ, v as f64);
        }
        if let Some(v) = &self.font {
            write_key(out, &mut first, FONT);
            v.write_bytes(out, crypt)?;
        }

        for (name, value) in self.rest.entries() {
            if !first {
                out.push(b' ');
            }
            first = false;

            name.write(out);
            out.push(b' ');
            value.write_bytes(out, crypt)?;
        }

        out.extend_from_slice(b">>");

        Ok(())
    }

    pub fn to_bytes(&self, crypt: Option<&CryptInfo>) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_bytes(&mut out, crypt)?;

        Ok(out)
    }
}

/// A font dictionary, typed just deep enough for the annotation tools.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FontDict {
    subtype: Option<Name>,
    base_font: Option<Name>,
    first_char: Option<i64>,
    last_char: Option<i64>,
    rest: PdfDict,
}

impl FontDict {
    /// Parse a font from an indirect object definition.
    pub fn parse(info: &ParseInfo) -> Option<Self> {
        let lex = info.lexer()?;
        let mut dict = PdfDict::parse_content(&lex, info.bounds.content, None)?;

        if let Some(id) = object_id_at(&lex, info.bounds.start) {
            dict.set_id(id.value);
        }

        Some(Self::from_dict(dict))
    }

    pub fn from_dict(mut dict: PdfDict) -> Self {
        Self {
            subtype: dict.take(SUBTYPE).and_then(|o| o.as_name().cloned()),
            base_font: dict.take(BASE_FONT).and_then(|o| o.as_name().cloned()),
            first_char: dict.take(FIRST_CHAR).and_then(|o| o.as_i64()),
            last_char: dict.take(LAST_CHAR).and_then(|o| o.as_i64()),
            rest: dict,
        }
    }

    pub fn subtype(&self) -> Option<&Name> {
        self.subtype.as_ref()
    }

    pub fn base_font(&self) -> Option<&Name> {
        self.base_font.as_ref()
    }

    pub fn first_char(&self) -> Option<i64> {
        self.first_char
    }

    pub fn last_char(&self) -> Option<i64> {
        self.last_char
    }

    pub fn id(&self) -> Option<ObjectId> {
        self.rest.id()
    }

    pub(crate) fn set_id(&mut self, id: ObjectId) {
        self.rest.set_id(id);
    }

    pub fn write_bytes(&self, out: &mut Vec<u8>, crypt: Option<&CryptInfo>) -> Result<()> {
        out.extend_from_slice(b"<<");
        let mut first = true;

        if let Some(v) = &self.subtype {
            write_key(out, &mut first, SUBTYPE);
            v.write(out);
        }
        if let Some(v) = &self.base_font {
            write_key(out, &mut first, BASE_FONT);
            v.write(out);
        }
        if let Some(v) = self.first_char {
            write_number_entry(out, &mut first, FIRST_CHAR, v as f64);
        }
        if let Some(v) = self.last_char {
            write_number_entry(out, &mut first, LAST_CHAR, v as f64);
        }

        for (name, value) in self.rest.entries() {
            if !first {
                out.push(b' ');
            }
            first = false;

            name.write(out);
            out.push(b' ');
            value.write_bytes(out, crypt)?;
        }

        out.extend_from_slice(b">>");

        Ok(())
    }
}

/// A form XObject: a reusable nested content stream.
#[derive(Clone, Debug, PartialEq)]
pub struct XFormStream {
    bbox: [f64; 4],
    matrix: Option<[f64; 6]>,
    stream: PdfStream,
}

impl XFormStream {
    /// Parse a form from an indirect object definition.
    pub fn parse(info: &ParseInfo, resolver: Option<&dyn Resolve>) -> Option<Self> {
        let mut stream = parse_stream_object(info, resolver)?;

        if let Some(id) = header_id(info) {
            stream.set_id(id);
        }

        Self::from_stream(stream)
    }

    /// Split a parsed stream into the typed form fields.
    pub fn from_stream(stream: PdfStream) -> Option<Self> {
        let bbox = stream
            .dict()
            .get(BBOX)
            .and_then(number_slice::<4>)
            .warn_none("form has no usable /BBox")?;
        let matrix = stream.dict().get(MATRIX).and_then(number_slice::<6>);

        Some(Self {
            bbox,
            matrix,
            stream,
        })
    }

    pub fn bbox(&self) -> [f64; 4] {
        self.bbox
    }

    pub fn matrix(&self) -> Option<[f64; 6]> {
        self.matrix
    }

    pub fn stream(&self) -> &PdfStream {
        &self.stream
    }

    pub fn id(&self) -> Option<ObjectId> {
        self.stream.id()
    }
}

/// An image XObject.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageStream {
    width: i64,
    height: i64,
    bits_per_component: Option<i64>,
    color_space: Option<PdfObject>,
    image_mask: bool,
    stream: PdfStream,
}

impl ImageStream {
    /// Parse an image from an indirect object definition.
    pub fn parse(info: &ParseInfo, resolver: Option<&dyn Resolve>) -> Option<Self> {
        let mut stream = parse_stream_object(info, resolver)?;

        if let Some(id) = header_id(info) {
            stream.set_id(id);
        }

        Self::from_stream(stream)
    }

    /// Split a parsed stream into the typed image fields.
    pub fn from_stream(stream: PdfStream) -> Option<Self> {
        let width = stream
            .dict()
            .get(WIDTH)
            .and_then(|o| o.as_i64())
            .warn_none("image has no usable /Width")?;
        let height = stream
            .dict()
            .get(HEIGHT)
            .and_then(|o| o.as_i64())
            .warn_none("image has no usable /Height")?;

        Some(Self {
            width,
            height,
            bits_per_component: stream.dict().get(BITS_PER_COMPONENT).and_then(|o| o.as_i64()),
            color_space: stream.dict().get(COLORSPACE).cloned(),
            image_mask: stream
                .dict()
                .get(IMAGE_MASK)
                .and_then(|o| o.as_bool())
                .unwrap_or(false),
            stream,
        })
    }

    pub fn width(&self) -> i64 {
        self.width
    }

    pub fn height(&self) -> i64 {
        self.height
    }

    pub fn bits_per_component(&self) -> Option<i64> {
        self.bits_per_component
    }

    pub fn color_space(&self) -> Option<&PdfObject> {
        self.color_space.as_ref()
    }

    pub fn image_mask(&self) -> bool {
        self.image_mask
    }

    pub fn stream(&self) -> &PdfStream {
        &self.stream
    }

    pub fn id(&self) -> Option<ObjectId> {
        self.stream.id()
    }
}

/// A resolved XObject: a form or an image.
#[derive(Clone, Debug, PartialEq)]
pub enum XObject {
    Form(XFormStream),
    Image(ImageStream),
}

impl XObject {
    pub fn stream(&self) -> &PdfStream {
        match self {
            XObject::Form(f) => f.stream(),
            XObject::Image(i) => i.stream(),
        }
    }

    pub fn id(&self) -> Option<ObjectId> {
        self.stream().id()
    }

    pub fn as_form(&self) -> Option<&XFormStream> {
        match self {
            XObject::Form(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&ImageStream> {
        match self {
            XObject::Image(i) => Some(i),
            _ => None,
        }
    }
}

const GS_PREFIX: &[u8] = EXT_G_STATE;
const FONT_PREFIX: &[u8] = FONT;
const XOBJECT_PREFIX: &[u8] = XOBJECT;

/// A page-level resource dictionary.
#[derive(Clone, Debug, Default)]
pub struct ResourceDict {
    ext_g_state: Option<ObjectMapDict>,
    color_space: Option<PdfObject>,
    pattern: Option<PdfObject>,
    shading: Option<PdfObject>,
    xobject: Option<ObjectMapDict>,
    font: Option<ObjectMapDict>,
    properties: Option<PdfObject>,
    proc_set: Option<Vec<Name>>,
    gs_map: IndexMap<Name, GraphicsStateDict>,
    font_map: IndexMap<Name, FontDict>,
    xobject_map: IndexMap<Name, XObject>,
    rest: PdfDict,
}

impl ResourceDict {
    /// Parse a resource dict from an indirect object definition and resolve
    /// its sub-maps.
    pub fn parse(info: &ParseInfo, resolver: Option<&dyn Resolve>) -> Option<Self> {
        let lex = info.lexer()?;
        let mut dict = PdfDict::parse_content(&lex, info.bounds.content, resolver)?;

        if let Some(id) = object_id_at(&lex, info.bounds.start) {
            dict.set_id(id.value);
        }

        let mut resources = Self::from_dict(dict);
        if let Some(resolver) = resolver {
            resources.fill_maps(resolver);
        }

        Some(resources)
    }

    /// Parse a resource dict from its bounds (starting at `<<`), e.g. when it
    /// sits inline in a page dictionary.
    pub fn parse_range(
        lex: &Lexer,
        bounds: Bounds,
        resolver: Option<&dyn Resolve>,
    ) -> Option<Self> {
        let dict = PdfDict::parse_range(lex, bounds, resolver)?;
        let mut resources = Self::from_dict(dict);

        if let Some(resolver) = resolver {
            resources.fill_maps(resolver);
        }

        Some(resources)
    }

    /// Split an already-parsed dict into the category sub-maps.
    pub fn from_dict(dict: PdfDict) -> Self {
        let mut resources = Self::default();
        let id = dict.id();

        for (name, value) in dict.into_entries() {
            let key: &[u8] = name.as_ref();

            if key == EXT_G_STATE {
                resources.ext_g_state = ObjectMapDict::from_object(&value);
            } else if key == COLORSPACE {
                resources.color_space = Some(value);
            } else if key == PATTERN {
                resources.pattern = Some(value);
            } else if key == SHADING {
                resources.shading = Some(value);
            } else if key == XOBJECT {
                resources.xobject = ObjectMapDict::from_object(&value);
            } else if key == FONT {
                resources.font = ObjectMapDict::from_object(&value);
            } else if key == PROC_SET {
                resources.proc_set = value
                    .as_array()
                    .map(|a| a.iter().filter_map(|o| o.as_name().cloned()).collect());
            } else if key == PROPERTIES {
                resources.properties = Some(value);
            } else {
                resources.rest.insert_parsed(name, value);
            }
        }

        if let Some(id) = id {
            resources.rest.set_id(id);
        }

        resources
    }

    /// Rebuild the resolved maps from the raw sub-maps.
    ///
    /// Dangling references are dropped with a warning; the remaining entries
    /// survive.
    pub fn fill_maps(&mut self, resolver: &dyn Resolve) {
        self.gs_map.clear();
        self.font_map.clear();
        self.xobject_map.clear();

        if let Some(raw) = &self.ext_g_state {
            for (name, entry) in raw.iter() {
                let key = Name::prefixed(GS_PREFIX, name);

                match entry {
                    MapEntry::Ref(id) => {
                        let Some(info) = resolver
                            .resolve(id.num)
                            .warn_none("dropping graphics state with dangling reference")
                        else {
                            continue;
                        };
                        let Some(mut gs) = GraphicsStateDict::parse(&info) else {
                            continue;
                        };

                        if gs.id().is_none() {
                            gs.set_id(*id);
                        }

                        self.gs_map.insert(key, gs);
                    }
                    MapEntry::Inline(d) => {
                        self.gs_map.insert(key, GraphicsStateDict::from_dict(d.clone()));
                    }
                }
            }
        }

        if let Some(raw) = &self.font {
            for (name, entry) in raw.iter() {
                match entry {
                    MapEntry::Ref(id) => {
                        let Some(info) = resolver
                            .resolve(id.num)
                            .warn_none("dropping font with dangling reference")
                        else {
                            continue;
                        };
                        let Some(mut font) = FontDict::parse(&info) else {
                            continue;
                        };

                        if font.id().is_none() {
                            font.set_id(*id);
                        }

                        self.font_map.insert(Name::prefixed(FONT_PREFIX, name), font);
                    }
                    MapEntry::Inline(_) => {
                        warn!("ignoring inline font resource {name:?}");
                    }
                }
            }
        }

        if let Some(raw) = &self.xobject {
            for (name, entry) in raw.iter() {
                let MapEntry::Ref(id) = entry else {
                    warn!("ignoring inline xobject resource {name:?}");
                    continue;
                };

                let Some(info) = resolver
                    .resolve(id.num)
                    .warn_none("dropping xobject with dangling reference")
                else {
                    continue;
                };
                let Some(xobject) = parse_xobject(&info, resolver, *id) else {
                    continue;
                };

                self.xobject_map
                    .insert(Name::prefixed(XOBJECT_PREFIX, name), xobject);
            }
        }
    }

    /// Look up a resolved graphics state by its raw name.
    pub fn graphics_state(&self, name: &[u8]) -> Option<&GraphicsStateDict> {
        let key = Name::prefixed(GS_PREFIX, name);

        self.gs_map.get(key.as_ref())
    }

    /// Look up a resolved font by its raw name.
    pub fn font(&self, name: &[u8]) -> Option<&FontDict> {
        let key = Name::prefixed(FONT_PREFIX, name);

        self.font_map.get(key.as_ref())
    }

    /// Look up a resolved XObject by its raw name.
    pub fn xobject(&self, name: &[u8]) -> Option<&XObject> {
        let key = Name::prefixed(XOBJECT_PREFIX, name);

        self.xobject_map.get(key.as_ref())
    }

    /// Resolved graphics states, as `(prefixed name, value)` pairs in
    /// insertion order.
    pub fn graphics_states(&self) -> impl Iterator<Item = (&Name, &GraphicsStateDict)> {
        self.gs_map.iter()
    }

    /// Resolved fonts, as `(prefixed name, value)` pairs in insertion order.
    pub fn fonts(&self) -> impl Iterator<Item = (&Name, &FontDict)> {
        self.font_map.iter()
    }

    /// Resolved XObjects, as `(prefixed name, value)` pairs in insertion
    /// order.
    pub fn xobjects(&self) -> impl Iterator<Item = (&Name, &XObject)> {
        self.xobject_map.iter()
    }

    /// Insert a graphics state under its raw name.
    pub fn set_graphics_state(&mut self, name: &[u8], gs: GraphicsStateDict) {
        self.gs_map.insert(Name::prefixed(GS_PREFIX, name), gs);
        self.rest.mark_edited();
    }

    /// Insert a font under its raw name.
    pub fn set_font(&mut self, name: &[u8], font: FontDict) {
        self.font_map.insert(Name::prefixed(FONT_PREFIX, name), font);
        self.rest.mark_edited();
    }

    /// Insert an XObject under its raw name.
    pub fn set_xobject(&mut self, name: &[u8], xobject: XObject) {
        self.xobject_map
            .insert(Name::prefixed(XOBJECT_PREFIX, name), xobject);
        self.rest.mark_edited();
    }

    /// The `/ProcSet` names.
    pub fn proc_set(&self) -> Option<&[Name]> {
        self.proc_set.as_deref()
    }

    pub fn id(&self) -> Option<ObjectId> {
        self.rest.id()
    }

    pub fn edited(&self) -> bool {
        self.rest.edited()
    }

    /// Serialize the resource dict in its fixed category order.
    ///
    /// Resolved `ExtGState`/`XObject`/`Font` maps win over the raw ones when
    /// they are populated; an XObject child without a reference aborts the
    /// emission, since forms and images are always indirect.
    pub fn write_bytes(&self, out: &mut Vec<u8>, crypt: Option<&CryptInfo>) -> Result<()> {
        out.extend_from_slice(b"<<");
        let mut first = true;

        if !self.gs_map.is_empty() {
            write_key(out, &mut first, EXT_G_STATE);
            out.extend_from_slice(b"<<");

            for (k, (key, gs)) in self.gs_map.iter().enumerate() {
                if k > 0 {
                    out.push(b' ');
                }

                strip_category(key, GS_PREFIX).write(out);
                out.push(b' ');

                match gs.id() {
                    Some(id) => id.write_ref(out),
                    None => gs.write_bytes(out, crypt)?,
                }
            }

            out.extend_from_slice(b">>");
        } else if let Some(raw) = &self.ext_g_state {
            write_key(out, &mut first, EXT_G_STATE);
            raw.write_bytes(out, crypt)?;
        }

        if !self.xobject_map.is_empty() {
            write_key(out, &mut first, XOBJECT);
            out.extend_from_slice(b"<<");

            for (k, (key, xobject)) in self.xobject_map.iter().enumerate() {
                if k > 0 {
                    out.push(b' ');
                }

                strip_category(key, XOBJECT_PREFIX).write(out);
                out.push(b' ');
                xobject.stream().require_id()?.write_ref(out);
            }

            out.extend_from_slice(b">>");
        } else if let Some(raw) = &self.xobject {
            write_key(out, &mut first, XOBJECT);
            raw.write_bytes(out, crypt)?;
        }

        if let Some(v) = &self.color_space {
            write_key(out, &mut first, COLORSPACE);
            v.write_bytes(out, crypt)?;
        }
        if let Some(v) = &self.pattern {
            write_key(out, &mut first, PATTERN);
            v.write_bytes(out, crypt)?;
        }
        if let Some(v) = &self.shading {
            write_key(out, &mut first, SHADING);
            v.write_bytes(out, crypt)?;
        }
        if !self.font_map.is_empty() {
            write_key(out, &mut first, FONT);
            out.extend_from_slice(b"<<");

            for (k, (key, font)) in self.font_map.iter().enumerate() {
                if k > 0 {
                    out.push(b' ');
                }

                strip_category(key, FONT_PREFIX).write(out);
                out.push(b' ');

                match font.id() {
                    Some(id) => id.write_ref(out),
                    None => font.write_bytes(out, crypt)?,
                }
            }

            out.extend_from_slice(b">>");
        } else if let Some(raw) = &self.font {
            write_key(out, &mut first, FONT);
            raw.write_bytes(out, crypt)?;
        }
        if let Some(v) = &self.properties {
            write_key(out, &mut first, PROPERTIES);
            v.write_bytes(out, crypt)?;
        }
        if let Some(names) = &self.proc_set {
            write_key(out, &mut first, PROC_SET);
            out.push(b'[');

            for (k, name) in names.iter().enumerate() {
                if k > 0 {
                    out.push(b' ');
                }
                name.write(out);
            }

            out.push(b']');
        }

        for (name, value) in self.rest.entries() {
            if !first {
                out.push(b' ');
            }
            first = false;

            name.write(out);
            out.push(b' ');
            value.write_bytes(out, crypt)?;
        }

        out.extend_from_slice(b">>");

        Ok(())
    }

    pub fn to_bytes(&self, crypt: Option<&CryptInfo>) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_bytes(&mut out, crypt)?;

        Ok(out)
    }
}

fn parse_stream_object(info: &ParseInfo, resolver: Option<&dyn Resolve>) -> Option<PdfStream> {
    let lex = info.lexer()?;
    let content = info.bounds.content?;

    PdfStream::parse_at(&lex, content.start, resolver).map(|p| p.value)
}

fn header_id(info: &ParseInfo) -> Option<ObjectId> {
    let lex = info.lexer()?;

    object_id_at(&lex, info.bounds.start).map(|p| p.value)
}

/// Decide form vs image by sniffing `/Subtype` inside the child's dict.
fn parse_xobject(info: &ParseInfo, resolver: &dyn Resolve, id: ObjectId) -> Option<XObject> {
    let lex = info.lexer()?;
    let content = info.bounds.content?;
    let dict_bounds = lex.dict_bounds_at(content.start)?;
    let subtype = dict_bounds
        .content
        .and_then(|c| parse::dict_name_property_at(&lex, c, b"/Subtype"));

    let is_form = subtype
        .as_ref()
        .map(|p| p.value.as_ref() == FORM)
        .unwrap_or(false);

    let xobject = if is_form {
        XFormStream::parse(info, Some(resolver)).map(XObject::Form)
    } else {
        ImageStream::parse(info, Some(resolver)).map(XObject::Image)
    };

    let mut xobject = xobject?;
    if xobject.id().is_none() {
        match &mut xobject {
            XObject::Form(f) => f.stream.set_id(id),
            XObject::Image(i) => i.stream.set_id(id),
        }
    }

    Some(xobject)
}

fn strip_category(key: &Name, prefix: &[u8]) -> Name {
    key.strip_prefix(prefix).unwrap_or_else(|| key.clone())
}

fn number_slice<const N: usize>(obj: &PdfObject) -> Option<[f64; N]> {
    let array = obj.as_array()?;
    if array.len() != N {
        return None;
    }

    let mut out = [0.0; N];
    for (i, item) in array.iter().enumerate() {
        out[i] = item.as_f64()?;
    }

    Some(out)
}

fn write_key(out: &mut Vec<u8>, first: &mut bool, key: &[u8]) {
    if !*first {
        out.push(b' ');
    }
    *first = false;

    Name::from_unescaped(key).write(out);
    out.push(b' ');
}

fn write_number_entry(out: &mut Vec<u8>, first: &mut bool, key: &[u8], value: f64) {
    write_key(out, first, key);
    crate::object::Number::from_f64(value).write(out);
}

#[cfg(test)]
mod tests {
    use super::{FontDict, GraphicsStateDict, ResourceDict, XObject};
    use crate::index::{ObjectIndex, Resolve};
    use crate::lexer::Lexer;
    use crate::object::{Name, PdfDict, PdfStream};
    use crate::Error;

    fn objects() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"5 0 obj << /Type /ExtGState /CA 0.5 >> endobj\n");
        data.extend_from_slice(
            b"7 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
        );
        data.extend_from_slice(
            b"8 0 obj << /Type /XObject /Subtype /Form /BBox [0 0 10 10] /Length 5 >> stream\n0 0 m\nendstream endobj\n",
        );
        data.extend_from_slice(
            b"9 0 obj << /Type /XObject /Subtype /Image /Width 2 /Height 2 /BitsPerComponent 8 /Length 4 >> stream\nAAAA\nendstream endobj\n",
        );

        data
    }

    fn resources_impl(source: &[u8], resolver: &dyn Resolve) -> Option<ResourceDict> {
        let lex = Lexer::new(source)?;
        let bounds = lex.dict_bounds_at(0)?;

        ResourceDict::parse_range(&lex, bounds, Some(resolver))
    }

    #[test]
    fn resolves_graphics_state() {
        let data = objects();
        let index = ObjectIndex::build(&data).unwrap();

        let res = resources_impl(b"<< /ExtGState << /GS1 5 0 R >> >>", &index).unwrap();

        let gs = res.graphics_state(b"GS1").unwrap();
        assert_eq!(gs.stroke_alpha(), Some(0.5));

        // Resolved keys carry the category prefix.
        let keys = res
            .graphics_states()
            .map(|(k, _)| k.clone())
            .collect::<Vec<_>>();
        assert_eq!(keys, vec![Name::from_unescaped(b"ExtGStateGS1")]);
    }

    #[test]
    fn resolves_inline_graphics_state() {
        let data = objects();
        let index = ObjectIndex::build(&data).unwrap();

        let res =
            resources_impl(b"<< /ExtGState << /GS9 << /ca 0.25 >> >> >>", &index).unwrap();

        assert_eq!(res.graphics_state(b"GS9").unwrap().fill_alpha(), Some(0.25));
    }

    #[test]
    fn discriminates_forms_and_images() {
        let data = objects();
        let index = ObjectIndex::build(&data).unwrap();

        let res =
            resources_impl(b"<< /XObject << /Fm0 8 0 R /Im0 9 0 R >> >>", &index).unwrap();

        let form = res.xobject(b"Fm0").unwrap().as_form().unwrap();
        assert_eq!(form.bbox(), [0.0, 0.0, 10.0, 10.0]);

        let image = res.xobject(b"Im0").unwrap().as_image().unwrap();
        assert_eq!((image.width(), image.height()), (2, 2));
    }

    #[test]
    fn prefixed_keys_never_collide() {
        let data = objects();
        let index = ObjectIndex::build(&data).unwrap();

        // The same raw name in two categories.
        let res = resources_impl(
            b"<< /ExtGState << /X 5 0 R >> /Font << /X 7 0 R >> >>",
            &index,
        )
        .unwrap();

        assert!(res.graphics_state(b"X").is_some());
        assert!(res.font(b"X").is_some());

        let gs_keys = res.graphics_states().map(|(k, _)| k.clone()).collect::<Vec<_>>();
        let font_keys = res.fonts().map(|(k, _)| k.clone()).collect::<Vec<_>>();
        assert_ne!(gs_keys, font_keys);
    }

    #[test]
    fn dangling_reference_is_dropped() {
        let data = objects();
        let index = ObjectIndex::build(&data).unwrap();

        let res = resources_impl(
            b"<< /ExtGState << /GS1 5 0 R /Bad 99 0 R >> >>",
            &index,
        )
        .unwrap();

        assert!(res.graphics_state(b"GS1").is_some());
        assert!(res.graphics_state(b"Bad").is_none());
    }

    #[test]
    fn roundtrip_preserves_resolved_structure() {
        let data = objects();
        let index = ObjectIndex::build(&data).unwrap();
        let source = b"<< /ExtGState << /GS1 5 0 R >> /Font << /F1 7 0 R >> /XObject << /Fm0 8 0 R /Im0 9 0 R >> /ProcSet [/PDF /Text] >>";

        let res = resources_impl(source, &index).unwrap();
        let bytes = res.to_bytes(None).unwrap();
        let again = resources_impl(&bytes, &index).unwrap();

        let keys = |r: &ResourceDict| {
            (
                r.graphics_states().map(|(k, _)| k.clone()).collect::<Vec<_>>(),
                r.fonts().map(|(k, _)| k.clone()).collect::<Vec<_>>(),
                r.xobjects().map(|(k, _)| k.clone()).collect::<Vec<_>>(),
            )
        };

        assert_eq!(keys(&res), keys(&again));
        assert_eq!(
            again.graphics_state(b"GS1").unwrap().stroke_alpha(),
            Some(0.5)
        );
        assert!(again.xobject(b"Fm0").unwrap().as_form().is_some());
        assert!(again.xobject(b"Im0").unwrap().as_image().is_some());
        assert_eq!(again.proc_set().unwrap().len(), 2);
    }

    #[test]
    fn xobject_without_reference_fails_serialization() {
        let mut res = ResourceDict::default();
        let stream = PdfStream::new(PdfDict::new(), b"x".to_vec());
        let form = super::XFormStream {
            bbox: [0.0; 4],
            matrix: None,
            stream,
        };

        res.set_xobject(b"Fm1", XObject::Form(form));

        match res.to_bytes(None) {
            Err(Error::SerializationFailure(_)) => {}
            other => panic!("expected a serialization failure, got {other:?}"),
        }
    }

    #[test]
    fn setters_mark_edited() {
        let mut res = ResourceDict::default();
        assert!(!res.edited());

        res.set_graphics_state(b"GS1", GraphicsStateDict::default());
        assert!(res.edited());
    }

    #[test]
    fn set_font_reaches_serialization() {
        let data = objects();
        let index = ObjectIndex::build(&data).unwrap();
        let font = FontDict::parse(&index.resolve(7).unwrap()).unwrap();

        let mut res = ResourceDict::default();
        res.set_font(b"F1", font);
        assert!(res.edited());

        let bytes = res.to_bytes(None).unwrap();
        let again = resources_impl(&bytes, &index).unwrap();

        assert_eq!(
            again.font(b"F1").unwrap().base_font(),
            Some(&Name::from_unescaped(b"Helvetica"))
        );
    }

    #[test]
    fn graphics_state_font_entry() {
        let lex = Lexer::new(b"<< /Type /ExtGState /Font [7 0 R 12] /CA 1 >>").unwrap();
        let bounds = lex.dict_bounds_at(0).unwrap();
        let gs = GraphicsStateDict::from_dict(PdfDict::parse_range(&lex, bounds, None).unwrap());

        assert!(gs.font().is_some());
        // `/Font` sits in its declaration-order slot, before the raw bag.
        assert_eq!(
            gs.to_bytes(None).unwrap(),
            b"<</CA 1 /Font [7 0 R 12] /Type /ExtGState>>".to_vec()
        );
    }

    #[test]
    fn graphics_state_declaration_order_emission() {
        let data = objects();
        let index = ObjectIndex::build(&data).unwrap();
        let info = index.resolve(5).unwrap();

        let mut gs = GraphicsStateDict::parse(&info).unwrap();
        gs.set_line_width(2.0);

        // Typed fields first, in declaration order, then the raw bag.
        assert_eq!(gs.to_bytes(None).unwrap(), b"<</CA 0.5 /LW 2 /Type /ExtGState>>".to_vec());
    }
}
