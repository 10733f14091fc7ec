//! Compositing watermark overlays onto document pages
//!
//! The overlay page is imported once per distinct page size as a Form
//! XObject. Each page's original content is wrapped in `q`/`Q` so its
//! graphics state cannot leak, then the XObject is drawn on top.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, info};

use crate::config::{validate_input_path, WatermarkSpec};
use crate::error::{Error, Result};
use crate::layout::PageDimensions;
use super::metadata::page_dimensions;
use super::overlay::{overlay_page, Overlay, OverlayBuilder};

/// Preferred resource name for the overlay XObject on each page
const OVERLAY_XOBJECT: &str = "WaterMark";

/// Outcome of a successful conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatermarkReport {
    /// Pages watermarked
    pub pages: usize,
    /// Overlays generated, one per run of equally sized pages
    pub overlays_built: usize,
}

/// Overlay currently imported into the document and the page size it fits
#[derive(Debug, Clone, Copy)]
struct CachedOverlay {
    dimensions: PageDimensions,
    xobject_id: ObjectId,
}

/// Watermark every page of `source` and write the result to `output`
///
/// The output file is written once, after every page has been processed; a
/// failure on any page leaves no output behind.
///
/// # Example
///
/// ```no_run
/// use watermarker::config::WatermarkSpec;
/// use watermarker::pdf::{apply_watermark, FontRegistry, TextOverlayBuilder};
/// use std::path::Path;
///
/// let fonts = FontRegistry::with_standard_fonts();
/// let spec = WatermarkSpec {
///     font: "Helvetica".to_string(),
///     ..WatermarkSpec::new("DRAFT")
/// };
///
/// apply_watermark(
///     Path::new("input.pdf"),
///     Path::new("output.pdf"),
///     &spec,
///     &mut TextOverlayBuilder::new(&fonts),
/// ).expect("Failed to watermark");
/// ```
pub fn apply_watermark<B: OverlayBuilder>(
    source: &Path,
    output: &Path,
    spec: &WatermarkSpec,
    builder: &mut B,
) -> Result<WatermarkReport> {
    validate_input_path(source)?;
    spec.validate()?;

    if !source.exists() {
        return Err(Error::FileNotFound(source.to_path_buf()));
    }

    let data = std::fs::read(source)?;
    // lopdf rebuilds broken cross-reference tables instead of rejecting them
    let mut doc = Document::load_mem(&data)?;
    if doc.get_pages().is_empty() {
        return Err(Error::EmptyPdf(source.to_path_buf()));
    }

    let report = watermark_document(&mut doc, spec, builder)?;

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)?;
    std::fs::write(output, &buffer)?;

    info!(
        source = %source.display(),
        output = %output.display(),
        pages = report.pages,
        overlays = report.overlays_built,
        bytes = buffer.len(),
        "watermark applied"
    );

    Ok(report)
}

/// Watermark every page of an already loaded document in place
pub fn watermark_document<B: OverlayBuilder>(
    doc: &mut Document,
    spec: &WatermarkSpec,
    builder: &mut B,
) -> Result<WatermarkReport> {
    let pages: Vec<(u32, ObjectId)> = doc.get_pages().into_iter().collect();
    let mut cached: Option<CachedOverlay> = None;
    let mut overlays_built = 0;

    for (page_number, page_id) in &pages {
        let dimensions = page_dimensions(doc, *page_number, *page_id)?;

        let xobject_id = match cached {
            Some(overlay) if overlay.dimensions == dimensions => overlay.xobject_id,
            _ => {
                debug!(
                    page = page_number,
                    width = dimensions.width,
                    height = dimensions.height,
                    "page size changed, building overlay"
                );
                let overlay = builder.build(dimensions, spec)?;
                let xobject_id = import_overlay(doc, &overlay)?;
                overlays_built += 1;
                cached = Some(CachedOverlay { dimensions, xobject_id });
                xobject_id
            }
        };

        merge_overlay(doc, *page_id, xobject_id)?;
    }

    // Drop the content streams replaced by the merged ones
    doc.prune_objects();

    Ok(WatermarkReport {
        pages: pages.len(),
        overlays_built,
    })
}

/// Copy an overlay's first page into `doc` as a Form XObject
fn import_overlay(doc: &mut Document, overlay: &Overlay) -> Result<ObjectId> {
    let overlay_doc = overlay.document()?;
    let (page_id, media_box) = overlay_page(&overlay_doc)?;
    let content = page_content(&overlay_doc, page_id)?;

    let resources = match overlay_doc.get_object(page_id)?.as_dict()?.get(b"Resources") {
        Ok(Object::Reference(id)) => overlay_doc.get_object(*id)?.clone(),
        Ok(obj) => obj.clone(),
        Err(_) => Object::Dictionary(Dictionary::new()),
    };

    // Only the objects the resources need come along; the overlay's page tree stays behind
    let mut reachable = BTreeSet::new();
    collect_references(&overlay_doc, &resources, &mut reachable);

    let mut id_map: HashMap<ObjectId, ObjectId> = HashMap::new();
    for old_id in &reachable {
        id_map.insert(*old_id, doc.new_object_id());
    }
    for old_id in &reachable {
        let object = overlay_doc.get_object(*old_id)?;
        doc.objects.insert(id_map[old_id], renumber_object_references(object, &id_map));
    }

    let mut xobject_dict = Dictionary::new();
    xobject_dict.set("Type", Object::Name(b"XObject".to_vec()));
    xobject_dict.set("Subtype", Object::Name(b"Form".to_vec()));
    xobject_dict.set("FormType", Object::Integer(1));
    xobject_dict.set(
        "BBox",
        Object::Array(media_box.iter().map(|v| Object::Real(*v)).collect()),
    );
    xobject_dict.set(
        "Matrix",
        Object::Array(vec![
            Object::Integer(1),
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(1),
            Object::Integer(0),
            Object::Integer(0),
        ]),
    );
    xobject_dict.set("Resources", renumber_object_references(&resources, &id_map));

    let mut xobject = Stream::new(xobject_dict, content);
    xobject.compress()?;

    Ok(doc.add_object(Object::Stream(xobject)))
}

/// Collect every object id reachable from `object`
fn collect_references(doc: &Document, object: &Object, seen: &mut BTreeSet<ObjectId>) {
    match object {
        Object::Reference(id) => {
            if seen.insert(*id) {
                if let Ok(target) = doc.get_object(*id) {
                    collect_references(doc, target, seen);
                }
            }
        }
        Object::Array(items) => {
            for item in items {
                collect_references(doc, item, seen);
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter() {
                collect_references(doc, value, seen);
            }
        }
        Object::Stream(stream) => {
            for (_, value) in stream.dict.iter() {
                collect_references(doc, value, seen);
            }
        }
        _ => {}
    }
}

/// Renumber all object references in an object
fn renumber_object_references(object: &Object, id_map: &HashMap<ObjectId, ObjectId>) -> Object {
    match object {
        Object::Reference(old_id) => Object::Reference(*id_map.get(old_id).unwrap_or(old_id)),
        Object::Array(arr) => {
            Object::Array(arr.iter().map(|obj| renumber_object_references(obj, id_map)).collect())
        }
        Object::Dictionary(dict) => Object::Dictionary(renumber_dictionary(dict, id_map)),
        Object::Stream(stream) => {
            let mut new_stream = stream.clone();
            new_stream.dict = renumber_dictionary(&stream.dict, id_map);
            Object::Stream(new_stream)
        }
        _ => object.clone(),
    }
}

fn renumber_dictionary(dict: &Dictionary, id_map: &HashMap<ObjectId, ObjectId>) -> Dictionary {
    let mut new_dict = Dictionary::new();
    for (key, value) in dict.iter() {
        new_dict.set(key.clone(), renumber_object_references(value, id_map));
    }
    new_dict
}

/// Draw the overlay XObject on top of a page and compress the page content
fn merge_overlay(doc: &mut Document, page_id: ObjectId, xobject_id: ObjectId) -> Result<()> {
    let mut resources = page_resources(doc, page_id)?;

    let mut xobjects = match resources.get(b"XObject") {
        Ok(Object::Dictionary(dict)) => dict.clone(),
        Ok(Object::Reference(id)) => doc.get_object(*id)?.as_dict()?.clone(),
        _ => Dictionary::new(),
    };
    let name = unused_resource_name(&xobjects, OVERLAY_XOBJECT);
    xobjects.set(name.clone(), Object::Reference(xobject_id));
    resources.set("XObject", Object::Dictionary(xobjects));

    let original = page_content(doc, page_id)?;
    let mut content = Vec::with_capacity(original.len() + 32);
    content.extend_from_slice(b"q\n");
    content.extend_from_slice(&original);
    content.extend_from_slice(b"Q\nq\n/");
    content.extend_from_slice(name.as_bytes());
    content.extend_from_slice(b" Do\nQ\n");

    let mut stream = Stream::new(Dictionary::new(), content);
    stream.compress()?;
    let content_id = doc.add_object(Object::Stream(stream));

    let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
    page.set("Resources", Object::Dictionary(resources));
    page.set("Contents", Object::Reference(content_id));

    Ok(())
}

/// Decoded content of every stream of a page, each followed by a newline
///
/// Streams are split on token boundaries only by convention, so joining them
/// without a separator can fuse the last operator of one with the first of
/// the next.
fn page_content(doc: &Document, page_id: ObjectId) -> Result<Vec<u8>> {
    let mut content = Vec::new();
    for stream_id in doc.get_page_contents(page_id) {
        let stream = doc.get_object(stream_id)?.as_stream()?;
        if stream.dict.has(b"Filter") {
            content.extend_from_slice(&stream.decompressed_content()?);
        } else {
            content.extend_from_slice(&stream.content);
        }
        content.push(b'\n');
    }
    Ok(content)
}

/// A copy of the page's resources, following references and inheritance
fn page_resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary> {
    let mut current = doc.get_object(page_id)?.as_dict()?;

    for _ in 0..64 {
        match current.get(b"Resources") {
            Ok(Object::Dictionary(dict)) => return Ok(dict.clone()),
            Ok(Object::Reference(id)) => return Ok(doc.get_object(*id)?.as_dict()?.clone()),
            _ => {}
        }
        match current.get(b"Parent") {
            Ok(Object::Reference(parent_id)) => current = doc.get_object(*parent_id)?.as_dict()?,
            _ => break,
        }
    }

    Ok(Dictionary::new())
}

/// `base`, or `base1`, `base2`, … whichever is not yet taken
fn unused_resource_name(existing: &Dictionary, base: &str) -> String {
    if !existing.has(base.as_bytes()) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{}{}", base, n))
        .find(|candidate| !existing.has(candidate.as_bytes()))
        .unwrap_or_else(|| base.to_string())
}
