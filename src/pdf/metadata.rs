//! Page counting and page size lookup

use std::path::Path;
use lopdf::{Document, Object, ObjectId};
use crate::error::{Error, Result};
use crate::layout::PageDimensions;

/// Count the pages of a PDF file
pub fn count_pages(path: &Path) -> Result<usize> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }

    let doc = Document::load(path)?;
    let page_count = doc.get_pages().len();

    if page_count == 0 {
        return Err(Error::EmptyPdf(path.to_path_buf()));
    }

    Ok(page_count)
}

/// Physical size of a page from its media box
///
/// `page_number` is only used for the error message.
pub fn page_dimensions(
    doc: &Document,
    page_number: u32,
    page_id: ObjectId,
) -> Result<PageDimensions> {
    let [llx, lly, urx, ury] = media_box(doc, page_id).ok_or_else(|| Error::PageDimensions {
        page: page_number,
        reason: "no usable MediaBox on the page or its parents".to_string(),
    })?;

    let width = f64::from((urx - llx).abs());
    let height = f64::from((ury - lly).abs());
    if width == 0.0 || height == 0.0 || !width.is_finite() || !height.is_finite() {
        return Err(Error::PageDimensions {
            page: page_number,
            reason: format!("degenerate MediaBox {}x{}", width, height),
        });
    }

    Ok(PageDimensions::from_points(width, height))
}

/// Media box `[llx lly urx ury]` of a page, walking up `/Parent` when it is inherited
pub fn media_box(doc: &Document, page_id: ObjectId) -> Option<[f32; 4]> {
    let mut current = doc.get_object(page_id).ok()?.as_dict().ok()?;

    // Page trees are shallow; the bound only guards against Parent cycles
    for _ in 0..64 {
        if let Ok(obj) = current.get(b"MediaBox") {
            if let Object::Array(values) = resolve(doc, obj) {
                if values.len() == 4 {
                    let mut rect = [0.0; 4];
                    for (slot, value) in rect.iter_mut().zip(values) {
                        *slot = number(resolve(doc, value))?;
                    }
                    return Some(rect);
                }
            }
        }

        match current.get(b"Parent") {
            Ok(Object::Reference(parent_id)) => {
                current = doc.get_object(*parent_id).ok()?.as_dict().ok()?;
            }
            _ => return None,
        }
    }

    None
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn doc_with_page(
        page_box: Option<Vec<Object>>,
        parent_box: Option<Vec<Object>>,
    ) -> (Document, ObjectId) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        };
        if let Some(rect) = page_box {
            page.set("MediaBox", rect);
        }
        let page_id = doc.add_object(page);

        let mut pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        };
        if let Some(rect) = parent_box {
            pages.set("MediaBox", rect);
        }
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        (doc, page_id)
    }

    #[test]
    fn test_count_pages_nonexistent_file() {
        let result = count_pages(Path::new("nonexistent.pdf"));
        assert!(matches!(result.unwrap_err(), Error::FileNotFound(_)));
    }

    #[test]
    fn test_direct_media_box() {
        let (doc, page_id) = doc_with_page(
            Some(vec![0.into(), 0.into(), 612.into(), 792.into()]),
            None,
        );
        let dims = page_dimensions(&doc, 1, page_id).unwrap();
        assert_eq!(dims, PageDimensions::letter());
    }

    #[test]
    fn test_inherited_media_box() {
        let (doc, page_id) = doc_with_page(
            None,
            Some(vec![0.into(), 0.into(), 595.into(), 842.into()]),
        );
        let dims = page_dimensions(&doc, 1, page_id).unwrap();
        assert_eq!(dims, PageDimensions::a4());
    }

    #[test]
    fn test_offset_media_box() {
        let (doc, page_id) = doc_with_page(
            Some(vec![10.into(), 20.into(), Object::Real(430.0), Object::Real(615.0)]),
            None,
        );
        let dims = page_dimensions(&doc, 1, page_id).unwrap();
        assert_eq!(dims, PageDimensions::from_points(420.0, 595.0));
    }

    #[test]
    fn test_missing_media_box() {
        let (doc, page_id) = doc_with_page(None, None);
        let result = page_dimensions(&doc, 3, page_id);
        assert!(matches!(result, Err(Error::PageDimensions { page: 3, .. })));
    }

    #[test]
    fn test_degenerate_media_box() {
        let (doc, page_id) = doc_with_page(
            Some(vec![0.into(), 0.into(), 0.into(), 792.into()]),
            None,
        );
        assert!(page_dimensions(&doc, 1, page_id).is_err());
    }
}
