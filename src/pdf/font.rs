//! Font registration and embedding
//!
//! Watermark text is drawn either with one of the standard PDF base fonts
//! (nothing embedded, WinAnsi single-byte text) or with a TrueType font read
//! from disk. TrueType fonts are embedded as a Type0 / CIDFontType2 pair with
//! Identity-H encoding so any glyph the font has (CJK included) can be drawn:
//! - **Type0 font**: top-level dictionary referencing
//!   - **CIDFont**: glyph widths, referencing
//!     - **FontDescriptor** and its **FontFile2** (the TrueType program)
//!   - **ToUnicode CMap**: glyph IDs back to text, for copy/paste

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use rustybuzz::ttf_parser::GlyphId;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// The standard base fonts every PDF reader provides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardFont {
    Helvetica,
    TimesRoman,
    Courier,
}

impl StandardFont {
    /// PostScript name used as `/BaseFont`
    pub fn base_font(&self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
            StandardFont::TimesRoman => "Times-Roman",
            StandardFont::Courier => "Courier",
        }
    }
}

#[derive(Clone)]
enum FontProgram {
    Standard(StandardFont),
    TrueType(Arc<Vec<u8>>),
}

/// A font that can be drawn with, looked up by identifier
#[derive(Clone)]
pub struct RegisteredFont {
    name: String,
    program: FontProgram,
}

impl std::fmt::Debug for RegisteredFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.program {
            FontProgram::Standard(font) => font.base_font().to_string(),
            FontProgram::TrueType(data) => format!("TrueType ({} bytes)", data.len()),
        };
        f.debug_struct("RegisteredFont")
            .field("name", &self.name)
            .field("program", &kind)
            .finish()
    }
}

/// A font dictionary added to a document plus the text encoded for it
#[derive(Debug, Clone)]
pub struct EmbeddedText {
    /// Font dictionary to reference from `/Resources /Font`
    pub font_id: ObjectId,
    /// String operand for `Tj`
    pub operand: Object,
}

/// Fonts available to the overlay builder, keyed by identifier
#[derive(Debug, Clone, Default)]
pub struct FontRegistry {
    fonts: HashMap<String, RegisteredFont>,
}

impl FontRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the standard base fonts under their PostScript names
    pub fn with_standard_fonts() -> Self {
        let mut registry = Self::new();
        for font in [StandardFont::Helvetica, StandardFont::TimesRoman, StandardFont::Courier] {
            registry.register_standard(font.base_font(), font);
        }
        registry
    }

    /// Register a standard base font under `name`
    pub fn register_standard(&mut self, name: &str, font: StandardFont) {
        self.fonts.insert(
            name.to_string(),
            RegisteredFont {
                name: name.to_string(),
                program: FontProgram::Standard(font),
            },
        );
    }

    /// Load a TrueType file from disk and register it under `name`
    pub fn register_file(&mut self, name: &str, path: &Path) -> Result<()> {
        let data = std::fs::read(path).map_err(|e| Error::FontRegistration {
            name: name.to_string(),
            reason: format!("{}: {}", path.display(), e),
        })?;
        self.register_bytes(name, data)
    }

    /// Register TrueType font data under `name`
    pub fn register_bytes(&mut self, name: &str, data: Vec<u8>) -> Result<()> {
        let face = rustybuzz::Face::from_slice(&data, 0).ok_or_else(|| Error::FontRegistration {
            name: name.to_string(),
            reason: "not a valid TrueType font".to_string(),
        })?;
        debug!(font = name, glyphs = face.number_of_glyphs(), "registered TrueType font");

        self.fonts.insert(
            name.to_string(),
            RegisteredFont {
                name: name.to_string(),
                program: FontProgram::TrueType(Arc::new(data)),
            },
        );
        Ok(())
    }

    /// Whether `name` was registered
    pub fn contains(&self, name: &str) -> bool {
        self.fonts.contains_key(name)
    }

    /// Look up a registered font
    pub fn get(&self, name: &str) -> Result<&RegisteredFont> {
        self.fonts
            .get(name)
            .ok_or_else(|| Error::FontNotRegistered(name.to_string()))
    }
}

impl RegisteredFont {
    /// Add this font to `doc` and encode `text` for it
    pub fn embed_text(&self, doc: &mut Document, text: &str) -> Result<EmbeddedText> {
        match &self.program {
            FontProgram::Standard(font) => {
                let bytes = encode_win_ansi(text).map_err(|c| {
                    Error::Font(format!("{} cannot encode {:?}", font.base_font(), c))
                })?;
                let font_id = add_standard_font(doc, *font);
                Ok(EmbeddedText {
                    font_id,
                    operand: Object::String(bytes, StringFormat::Literal),
                })
            }
            FontProgram::TrueType(data) => self.embed_true_type(doc, data, text),
        }
    }

    fn embed_true_type(
        &self,
        doc: &mut Document,
        data: &Arc<Vec<u8>>,
        text: &str,
    ) -> Result<EmbeddedText> {
        let face = rustybuzz::Face::from_slice(data, 0).ok_or_else(|| {
            Error::Font(format!("{} is not a valid TrueType font", self.name))
        })?;
        let shaped = ShapedText::new(&face, text);
        if shaped.missing > 0 {
            warn!(
                font = %self.name,
                missing = shaped.missing,
                "font has no glyph for some characters"
            );
        }

        let base_font = pdf_font_name(&self.name);

        let mut font_file = Stream::new(
            Dictionary::from_iter(vec![("Length1", Object::Integer(data.len() as i64))]),
            data.to_vec(),
        );
        font_file.compress()?;
        let font_file_id = doc.add_object(Object::Stream(font_file));

        let bbox = face.global_bounding_box();
        let mut descriptor = Dictionary::new();
        descriptor.set("Type", Object::Name(b"FontDescriptor".to_vec()));
        descriptor.set("FontName", Object::Name(base_font.clone().into_bytes()));
        descriptor.set("Flags", Object::Integer(4)); // Symbolic
        descriptor.set(
            "FontBBox",
            Object::Array(vec![
                Object::Integer(i64::from(bbox.x_min)),
                Object::Integer(i64::from(bbox.y_min)),
                Object::Integer(i64::from(bbox.x_max)),
                Object::Integer(i64::from(bbox.y_max)),
            ]),
        );
        descriptor.set("ItalicAngle", Object::Integer(0));
        descriptor.set("Ascent", Object::Integer(i64::from(face.ascender())));
        descriptor.set("Descent", Object::Integer(i64::from(face.descender())));
        descriptor.set(
            "CapHeight",
            Object::Integer(i64::from(face.capital_height().unwrap_or_else(|| face.ascender()))),
        );
        descriptor.set("StemV", Object::Integer(80));
        descriptor.set("FontFile2", Object::Reference(font_file_id));
        let descriptor_id = doc.add_object(Object::Dictionary(descriptor));

        let mut cid_font = Dictionary::new();
        cid_font.set("Type", Object::Name(b"Font".to_vec()));
        cid_font.set("Subtype", Object::Name(b"CIDFontType2".to_vec()));
        cid_font.set("BaseFont", Object::Name(base_font.clone().into_bytes()));
        cid_font.set("CIDSystemInfo", Object::Dictionary(Dictionary::from_iter(vec![
            ("Registry", Object::String(b"Adobe".to_vec(), StringFormat::Literal)),
            ("Ordering", Object::String(b"Identity".to_vec(), StringFormat::Literal)),
            ("Supplement", Object::Integer(0)),
        ])));
        cid_font.set("FontDescriptor", Object::Reference(descriptor_id));
        cid_font.set("DW", Object::Integer(1000));
        cid_font.set("W", Object::Array(shaped.widths_array()));
        cid_font.set("CIDToGIDMap", Object::Name(b"Identity".to_vec()));
        let cid_font_id = doc.add_object(Object::Dictionary(cid_font));

        let to_unicode_id = doc.add_object(Stream::new(
            Dictionary::new(),
            shaped.to_unicode_cmap().into_bytes(),
        ));

        let mut font = Dictionary::new();
        font.set("Type", Object::Name(b"Font".to_vec()));
        font.set("Subtype", Object::Name(b"Type0".to_vec()));
        font.set("BaseFont", Object::Name(base_font.into_bytes()));
        font.set("Encoding", Object::Name(b"Identity-H".to_vec()));
        font.set("DescendantFonts", Object::Array(vec![Object::Reference(cid_font_id)]));
        font.set("ToUnicode", Object::Reference(to_unicode_id));
        let font_id = doc.add_object(Object::Dictionary(font));

        Ok(EmbeddedText {
            font_id,
            operand: Object::String(shaped.glyph_bytes(), StringFormat::Hexadecimal),
        })
    }
}

/// Text run mapped to glyph IDs of one face
struct ShapedText {
    glyphs: Vec<u16>,
    /// Advance in 1/1000 em per glyph
    widths: BTreeMap<u16, i64>,
    /// Source text for each glyph
    unicode: BTreeMap<u16, String>,
    missing: usize,
}

impl ShapedText {
    fn new(face: &rustybuzz::Face<'_>, text: &str) -> Self {
        let mut buffer = rustybuzz::UnicodeBuffer::new();
        buffer.push_str(text);
        let output = rustybuzz::shape(face, &[], buffer);
        let infos = output.glyph_infos();

        let units_per_em = f64::from(face.units_per_em());
        let mut cluster_starts: Vec<usize> =
            infos.iter().map(|info| info.cluster as usize).collect();
        cluster_starts.sort_unstable();
        cluster_starts.dedup();

        let mut shaped = Self {
            glyphs: Vec::with_capacity(infos.len()),
            widths: BTreeMap::new(),
            unicode: BTreeMap::new(),
            missing: 0,
        };

        for info in infos {
            let gid = info.glyph_id as u16;
            if gid == 0 {
                shaped.missing += 1;
            }
            shaped.glyphs.push(gid);

            let advance = face.glyph_hor_advance(GlyphId(gid)).unwrap_or(0);
            shaped
                .widths
                .entry(gid)
                .or_insert_with(|| (f64::from(advance) * 1000.0 / units_per_em).round() as i64);

            let start = info.cluster as usize;
            let end = cluster_starts
                .iter()
                .copied()
                .find(|&s| s > start)
                .unwrap_or(text.len());
            if let Some(source) = text.get(start..end) {
                shaped.unicode.entry(gid).or_insert_with(|| source.to_string());
            }
        }

        shaped
    }

    fn glyph_bytes(&self) -> Vec<u8> {
        self.glyphs.iter().flat_map(|gid| gid.to_be_bytes()).collect()
    }

    /// `[gid [w] gid [w] ...]`
    fn widths_array(&self) -> Vec<Object> {
        self.widths
            .iter()
            .flat_map(|(gid, width)| {
                [
                    Object::Integer(i64::from(*gid)),
                    Object::Array(vec![Object::Integer(*width)]),
                ]
            })
            .collect()
    }

    fn to_unicode_cmap(&self) -> String {
        let mut cmap = String::from(
            "/CIDInit /ProcSet findresource begin\n\
             12 dict begin\n\
             begincmap\n\
             /CIDSystemInfo\n\
             << /Registry (Adobe)\n/Ordering (UCS)\n/Supplement 0\n>> def\n\
             /CMapName /Adobe-Identity-UCS def\n\
             /CMapType 2 def\n\
             1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
        );

        let entries: Vec<(&u16, &String)> =
            self.unicode.iter().filter(|(gid, _)| **gid != 0).collect();
        // At most 100 entries per bfchar block
        for chunk in entries.chunks(100) {
            let _ = writeln!(cmap, "{} beginbfchar", chunk.len());
            for (gid, text) in chunk {
                let utf16: String = text
                    .encode_utf16()
                    .map(|unit| format!("{:04X}", unit))
                    .collect();
                let _ = writeln!(cmap, "<{:04X}> <{}>", gid, utf16);
            }
            cmap.push_str("endbfchar\n");
        }

        cmap.push_str(
            "endcmap\n\
             CMapName currentdict /CMap defineresource pop\n\
             end\n\
             end\n",
        );
        cmap
    }
}

fn add_standard_font(doc: &mut Document, font: StandardFont) -> ObjectId {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"Font".to_vec()));
    dict.set("Subtype", Object::Name(b"Type1".to_vec()));
    dict.set("BaseFont", Object::Name(font.base_font().as_bytes().to_vec()));
    dict.set("Encoding", Object::Name(b"WinAnsiEncoding".to_vec()));
    doc.add_object(Object::Dictionary(dict))
}

/// Encode text as WinAnsi bytes, returning the first character that has no code
fn encode_win_ansi(text: &str) -> std::result::Result<Vec<u8>, char> {
    text.chars()
        .map(|c| match c {
            ' '..='~' | '\u{A0}'..='\u{FF}' => Ok(c as u8),
            '€' => Ok(0x80),
            '‚' => Ok(0x82),
            '…' => Ok(0x85),
            '‘' => Ok(0x91),
            '’' => Ok(0x92),
            '“' => Ok(0x93),
            '”' => Ok(0x94),
            '•' => Ok(0x95),
            '–' => Ok(0x96),
            '—' => Ok(0x97),
            '™' => Ok(0x99),
            _ => Err(c),
        })
        .collect()
}

/// Reduce an identifier to characters that are safe in a PDF name
fn pdf_font_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    if cleaned.is_empty() {
        "WatermarkFont".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_fonts_registered() {
        let registry = FontRegistry::with_standard_fonts();
        assert!(registry.contains("Helvetica"));
        assert!(registry.contains("Times-Roman"));
        assert!(registry.contains("Courier"));
        assert!(!registry.contains("SimSun"));
    }

    #[test]
    fn test_unregistered_font() {
        let registry = FontRegistry::new();
        assert!(matches!(
            registry.get("SimSun"),
            Err(Error::FontNotRegistered(name)) if name == "SimSun"
        ));
    }

    #[test]
    fn test_register_missing_file() {
        let mut registry = FontRegistry::new();
        let result = registry.register_file("SimSun", Path::new("no/such/font.ttf"));
        assert!(matches!(result, Err(Error::FontRegistration { .. })));
        assert!(!registry.contains("SimSun"));
    }

    #[test]
    fn test_register_invalid_bytes() {
        let mut registry = FontRegistry::new();
        let result = registry.register_bytes("Broken", b"definitely not a font".to_vec());
        assert!(matches!(result, Err(Error::FontRegistration { .. })));
    }

    #[test]
    fn test_win_ansi_encoding() {
        assert_eq!(encode_win_ansi("DRAFT").unwrap(), b"DRAFT".to_vec());
        assert_eq!(encode_win_ansi("café").unwrap(), vec![b'c', b'a', b'f', 0xE9]);
        assert_eq!(encode_win_ansi("€").unwrap(), vec![0x80]);
        assert_eq!(encode_win_ansi("水印"), Err('水'));
    }

    #[test]
    fn test_standard_font_embedding() {
        let registry = FontRegistry::with_standard_fonts();
        let mut doc = Document::with_version("1.5");
        let embedded = registry.get("Helvetica").unwrap().embed_text(&mut doc, "DRAFT").unwrap();

        let font = doc.get_object(embedded.font_id).unwrap().as_dict().unwrap();
        assert_eq!(font.get(b"BaseFont").unwrap().as_name().unwrap(), b"Helvetica");
        assert_eq!(embedded.operand, Object::String(b"DRAFT".to_vec(), StringFormat::Literal));
    }

    #[test]
    fn test_standard_font_rejects_cjk() {
        let registry = FontRegistry::with_standard_fonts();
        let mut doc = Document::with_version("1.5");
        let result = registry.get("Helvetica").unwrap().embed_text(&mut doc, "水印");
        assert!(matches!(result, Err(Error::Font(_))));
    }

    #[test]
    fn test_pdf_font_name() {
        assert_eq!(pdf_font_name("SimSun"), "SimSun");
        assert_eq!(pdf_font_name("Noto Serif CJK"), "NotoSerifCJK");
        assert_eq!(pdf_font_name("宋体"), "WatermarkFont");
    }
}
