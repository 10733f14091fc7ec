//! Watermark overlay generation
//!
//! An overlay is a standalone single-page PDF, sized from the target page,
//! holding nothing but the tiled watermark text. It lives in memory; the
//! compositor reads its page back and turns it into a Form XObject.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

use crate::config::WatermarkSpec;
use crate::error::{Error, Result};
use crate::layout::{OverlayLayout, PageDimensions};
use super::font::FontRegistry;

/// Resource name of the watermark font inside the overlay page
const FONT_RESOURCE: &str = "F1";

/// Resource name of the transparency graphics state inside the overlay page
const ALPHA_RESOURCE: &str = "GS1";

/// A rendered overlay page held as PDF bytes
#[derive(Debug, Clone)]
pub struct Overlay {
    layout: OverlayLayout,
    pdf: Vec<u8>,
}

impl Overlay {
    /// Wrap already-serialized overlay bytes
    pub fn new(layout: OverlayLayout, pdf: Vec<u8>) -> Self {
        Self { layout, pdf }
    }

    /// Geometry the overlay was drawn with
    pub fn layout(&self) -> &OverlayLayout {
        &self.layout
    }

    /// Parse the overlay back into a document
    pub fn document(&self) -> Result<Document> {
        Ok(Document::load_mem(&self.pdf)?)
    }
}

/// Produces an overlay for a page size
pub trait OverlayBuilder {
    fn build(&mut self, page: PageDimensions, spec: &WatermarkSpec) -> Result<Overlay>;
}

/// Draws the watermark text grid with a font from the registry
#[derive(Debug, Clone)]
pub struct TextOverlayBuilder<'a> {
    fonts: &'a FontRegistry,
}

impl<'a> TextOverlayBuilder<'a> {
    pub fn new(fonts: &'a FontRegistry) -> Self {
        Self { fonts }
    }
}

impl OverlayBuilder for TextOverlayBuilder<'_> {
    fn build(&mut self, page: PageDimensions, spec: &WatermarkSpec) -> Result<Overlay> {
        let font = self.fonts.get(&spec.font)?;
        let layout = OverlayLayout::new(page, f64::from(spec.size), f64::from(spec.angle));

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let text = font.embed_text(&mut doc, &spec.text)?;
        let alpha = spec.clamped_alpha();
        let gs_id = doc.add_object(dictionary! {
            "Type" => "ExtGState",
            "ca" => Object::Real(alpha),
        });

        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                FONT_RESOURCE => text.font_id,
            },
            "ExtGState" => dictionary! {
                ALPHA_RESOURCE => gs_id,
            },
        });

        let content = Content {
            operations: watermark_operations(&layout, text.operand),
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

        let media_box = vec![
            0.into(),
            0.into(),
            Object::Real(layout.width.pt() as f32),
            Object::Real(layout.height.pt() as f32),
        ];
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => media_box,
            "Resources" => resources_id,
            "Contents" => content_id,
        });
        finish_single_page(&mut doc, pages_id, page_id);

        let mut pdf = Vec::new();
        doc.save_to(&mut pdf)?;

        debug!(
            width_cm = layout.width.cm(),
            height_cm = layout.height.cm(),
            font_size = layout.font_size,
            bytes = pdf.len(),
            "built watermark overlay"
        );

        Ok(Overlay::new(layout, pdf))
    }
}

/// Content stream drawing every tile of the grid
///
/// Graphics state is set once, then each tile is a separate text object
/// positioned in the translated and rotated coordinate system.
fn watermark_operations(layout: &OverlayLayout, text: Object) -> Vec<Operation> {
    let t = layout.transform();
    let mut ops = vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                Object::Real(t.sx),
                Object::Real(t.ky),
                Object::Real(t.kx),
                Object::Real(t.sy),
                Object::Real(t.tx),
                Object::Real(t.ty),
            ],
        ),
        Operation::new("RG", vec![0.into(), 1.into(), 0.into()]),
        Operation::new("rg", vec![0.into(), 0.into(), 0.into()]),
        Operation::new("gs", vec![Object::Name(ALPHA_RESOURCE.as_bytes().to_vec())]),
    ];

    for tile in layout.tiles() {
        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new(
            "Tf",
            vec![
                Object::Name(FONT_RESOURCE.as_bytes().to_vec()),
                Object::Real(layout.font_size as f32),
            ],
        ));
        ops.push(Operation::new(
            "Tm",
            vec![
                1.into(),
                0.into(),
                0.into(),
                1.into(),
                Object::Real(tile.x.pt() as f32),
                Object::Real(tile.y.pt() as f32),
            ],
        ));
        ops.push(Operation::new("Tj", vec![text.clone()]));
        ops.push(Operation::new("ET", vec![]));
    }

    ops.push(Operation::new("Q", vec![]));
    ops
}

fn finish_single_page(doc: &mut Document, pages_id: ObjectId, page_id: ObjectId) {
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
}

/// First page of an overlay document with its media box
pub(crate) fn overlay_page(doc: &Document) -> Result<(ObjectId, [f32; 4])> {
    let page_id = doc
        .get_pages()
        .values()
        .next()
        .copied()
        .ok_or_else(|| Error::General("overlay document has no page".to_string()))?;
    let media_box = super::metadata::media_box(doc, page_id)
        .ok_or_else(|| Error::PageDimensions {
            page: 1,
            reason: "overlay page has no media box".to_string(),
        })?;
    Ok((page_id, media_box))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn helvetica_spec(text: &str) -> WatermarkSpec {
        WatermarkSpec {
            font: "Helvetica".to_string(),
            ..WatermarkSpec::new(text)
        }
    }

    fn overlay_operations(overlay: &Overlay) -> Vec<Operation> {
        let doc = overlay.document().unwrap();
        let (page_id, _) = overlay_page(&doc).unwrap();
        let content = doc.get_page_content(page_id).unwrap();
        Content::decode(&content).unwrap().operations
    }

    #[test]
    fn test_overlay_matches_letter_size() {
        let fonts = FontRegistry::with_standard_fonts();
        let mut builder = TextOverlayBuilder::new(&fonts);
        let overlay = builder.build(PageDimensions::letter(), &helvetica_spec("DRAFT")).unwrap();

        let doc = overlay.document().unwrap();
        assert_eq!(doc.get_pages().len(), 1);

        let (_, media_box) = overlay_page(&doc).unwrap();
        let width_cm = media_box[2] as f64 / 72.0 * 2.54;
        let height_cm = media_box[3] as f64 / 72.0 * 2.54;
        assert!((width_cm - 612.0 * 0.0352).abs() < 1e-3);
        assert!((height_cm - 792.0 * 0.0352).abs() < 1e-3);
        assert!((overlay.layout().width.cm() - 612.0 * 0.0352).abs() < 1e-9);
    }

    #[test]
    fn test_overlay_draws_full_grid() {
        let fonts = FontRegistry::with_standard_fonts();
        let mut builder = TextOverlayBuilder::new(&fonts);
        let overlay = builder.build(PageDimensions::a4(), &helvetica_spec("DRAFT")).unwrap();

        let ops = overlay_operations(&overlay);
        let shown: Vec<&Operation> = ops.iter().filter(|op| op.operator == "Tj").collect();
        assert_eq!(shown.len(), 50);
        for op in shown {
            assert_eq!(op.operands[0].as_str().unwrap(), b"DRAFT");
        }
    }

    #[test]
    fn test_tile_positions_follow_layout() {
        let fonts = FontRegistry::with_standard_fonts();
        let mut builder = TextOverlayBuilder::new(&fonts);
        let overlay = builder.build(PageDimensions::a4(), &helvetica_spec("DRAFT")).unwrap();

        let ops = overlay_operations(&overlay);
        let positions: Vec<(f32, f32)> = ops
            .iter()
            .filter(|op| op.operator == "Tm")
            .map(|op| (op.operands[4].as_float().unwrap(), op.operands[5].as_float().unwrap()))
            .collect();

        let expected: Vec<(f32, f32)> = overlay
            .layout()
            .tiles()
            .iter()
            .map(|tile| (tile.x.pt() as f32, tile.y.pt() as f32))
            .collect();
        assert_eq!(positions.len(), expected.len());
        for (got, want) in positions.iter().zip(&expected) {
            assert!((got.0 - want.0).abs() < 0.01);
            assert!((got.1 - want.1).abs() < 0.01);
        }
    }

    #[test]
    fn test_identical_inputs_give_identical_overlays() {
        let fonts = FontRegistry::with_standard_fonts();
        let mut builder = TextOverlayBuilder::new(&fonts);
        let spec = helvetica_spec("DRAFT");

        let a = builder.build(PageDimensions::letter(), &spec).unwrap();
        let b = builder.build(PageDimensions::letter(), &spec).unwrap();
        assert_eq!(a.layout().tiles(), b.layout().tiles());
        let fields = |ops: Vec<lopdf::content::Operation>| {
            ops.into_iter().map(|op| (op.operator, op.operands)).collect::<Vec<_>>()
        };
        assert_eq!(fields(overlay_operations(&a)), fields(overlay_operations(&b)));
    }

    #[test]
    fn test_alpha_boundaries() {
        let fonts = FontRegistry::with_standard_fonts();
        let mut builder = TextOverlayBuilder::new(&fonts);

        for alpha in [0.0_f32, 1.0] {
            let spec = WatermarkSpec { alpha, ..helvetica_spec("DRAFT") };
            let overlay = builder.build(PageDimensions::letter(), &spec).unwrap();

            let doc = overlay.document().unwrap();
            let gs = doc
                .objects
                .values()
                .filter_map(|obj| obj.as_dict().ok())
                .find(|dict| {
                    dict.get(b"Type").and_then(|t| t.as_name()).ok()
                        == Some(b"ExtGState".as_slice())
                })
                .expect("overlay has an ExtGState");
            assert_eq!(gs.get(b"ca").unwrap().as_float().unwrap(), alpha);
        }
    }

    #[test]
    fn test_unregistered_font_fails() {
        let fonts = FontRegistry::with_standard_fonts();
        let mut builder = TextOverlayBuilder::new(&fonts);
        let spec = WatermarkSpec::new("DRAFT"); // SimSun is not registered

        let result = builder.build(PageDimensions::letter(), &spec);
        assert!(matches!(result, Err(Error::FontNotRegistered(_))));
    }

    #[test]
    fn test_rotation_written_to_content() {
        let fonts = FontRegistry::with_standard_fonts();
        let mut builder = TextOverlayBuilder::new(&fonts);
        let spec = WatermarkSpec { angle: 90.0, ..helvetica_spec("DRAFT") };
        let overlay = builder.build(PageDimensions::letter(), &spec).unwrap();

        let ops = overlay_operations(&overlay);
        let cm = ops.iter().find(|op| op.operator == "cm").unwrap();
        let m: Vec<f32> = cm.operands.iter().map(|o| o.as_float().unwrap()).collect();
        assert!(m[0].abs() < 1e-4);
        assert!((m[1] - 1.0).abs() < 1e-4);
        assert!((m[2] + 1.0).abs() < 1e-4);
        assert!(m[3].abs() < 1e-4);
        assert!((m[4] as f64 - overlay.layout().origin.0.pt()).abs() < 0.01);
        assert!((m[5] as f64 - overlay.layout().origin.1.pt()).abs() < 0.01);
    }
}
