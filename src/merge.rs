// ABOUTME: PDF merging for the slidepress application
// ABOUTME: Concatenates per-slide PDFs into one document in slide order

use crate::errors::{PressError, Result};
use log::{debug, info};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Page attributes a page may inherit from its parent `Pages` node
const INHERITABLE_KEYS: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Merge `inputs` into `output`, keeping their order.
///
/// Nothing is written to `output` unless every input was appended.
pub fn merge_pages(inputs: &[PathBuf], output: &Path) -> Result<PathBuf> {
    if inputs.is_empty() {
        return Err(PressError::MergeFailed("no pages to merge".to_string()));
    }

    let mut max_id = 1;
    let mut pages: Vec<(ObjectId, Dictionary)> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for input in inputs {
        let name = display_name(input);
        let metadata = fs::metadata(input)
            .map_err(|e| PressError::MergeFailed(format!("{}: {}", name, e)))?;
        if metadata.len() == 0 {
            return Err(PressError::MergeFailed(format!("{}: file is empty", name)));
        }

        let mut doc = Document::load(input)
            .map_err(|e| PressError::MergeFailed(format!("{}: {}", name, e)))?;
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        if page_ids.is_empty() {
            return Err(PressError::MergeFailed(format!("{}: contains no pages", name)));
        }

        for page_id in page_ids {
            let page = flatten_page(&doc, page_id)
                .map_err(|e| PressError::MergeFailed(format!("{}: {}", name, e)))?;
            pages.push((page_id, page));
        }

        debug!("Loaded {} for merging", name);
        objects.extend(doc.objects);
    }

    let mut merged = Document::with_version("1.5");
    let mut catalog: Option<(ObjectId, Dictionary)> = None;
    let mut pages_root: Option<(ObjectId, Dictionary)> = None;

    for (id, object) in objects {
        let kind = dict_type(&object).map(<[u8]>::to_vec);
        match kind.as_deref() {
            Some(b"Catalog") => {
                if catalog.is_none() {
                    catalog = object.as_dict().ok().map(|d| (id, d.clone()));
                }
            }
            Some(b"Pages") => {
                if pages_root.is_none() {
                    pages_root = object.as_dict().ok().map(|d| (id, d.clone()));
                }
            }
            // Pages are re-inserted below with their new parent
            Some(b"Page") => {}
            Some(b"Outlines") | Some(b"Outline") => {}
            _ => {
                merged.objects.insert(id, object);
            }
        }
    }

    let (catalog_id, mut catalog) = catalog
        .ok_or_else(|| PressError::MergeFailed("no document catalog found".to_string()))?;
    let (pages_id, mut pages_dict) = pages_root
        .ok_or_else(|| PressError::MergeFailed("no page tree found".to_string()))?;

    let page_count = pages.len();
    let mut kids = Vec::with_capacity(page_count);
    for (id, mut page) in pages {
        page.set("Parent", Object::Reference(pages_id));
        merged.objects.insert(id, Object::Dictionary(page));
        kids.push(Object::Reference(id));
    }

    pages_dict.set("Count", page_count as i64);
    pages_dict.set("Kids", kids);
    pages_dict.remove(b"Parent");
    merged.objects.insert(pages_id, Object::Dictionary(pages_dict));

    catalog.set("Pages", Object::Reference(pages_id));
    catalog.remove(b"Outlines");
    merged.objects.insert(catalog_id, Object::Dictionary(catalog));

    merged.trailer.set("Root", Object::Reference(catalog_id));
    merged.max_id = merged.objects.keys().map(|(id, _)| *id).max().unwrap_or(0);
    merged.renumber_objects();
    merged.compress();

    write_atomically(&mut merged, output)?;

    info!("Merged {} pages into {:?}", page_count, output);
    Ok(output.to_path_buf())
}

/// Number of pages in a PDF
pub fn page_count(path: &Path) -> Result<usize> {
    let doc = Document::load(path)
        .map_err(|e| PressError::MergeFailed(format!("{}: {}", display_name(path), e)))?;
    Ok(doc.get_pages().len())
}

/// `(width, height)` in points of every page, in page order
pub fn page_sizes(path: &Path) -> Result<Vec<(f64, f64)>> {
    let doc = Document::load(path)
        .map_err(|e| PressError::MergeFailed(format!("{}: {}", display_name(path), e)))?;

    doc.get_pages()
        .into_values()
        .map(|id| {
            let page = flatten_page(&doc, id)?;
            media_box_size(&page).ok_or_else(|| {
                PressError::MergeFailed(format!("page {:?} has no usable MediaBox", id))
            })
        })
        .collect()
}

/// Copy a page dictionary, pulling in attributes it inherits from ancestors
fn flatten_page(doc: &Document, page_id: ObjectId) -> Result<Dictionary> {
    let mut page = doc
        .get_object(page_id)
        .and_then(Object::as_dict)
        .map_err(|e| PressError::MergeFailed(format!("page {:?}: {}", page_id, e)))?
        .clone();

    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;
    while let Some(parent_id) = parent {
        // Guard against cyclic page trees
        depth += 1;
        if depth > 32 {
            break;
        }
        let Ok(node) = doc.get_object(parent_id).and_then(Object::as_dict) else {
            break;
        };
        for key in INHERITABLE_KEYS {
            if !page.has(key) {
                if let Ok(value) = node.get(key) {
                    page.set(key.to_vec(), value.clone());
                }
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }

    Ok(page)
}

fn media_box_size(page: &Dictionary) -> Option<(f64, f64)> {
    let values = page.get(b"MediaBox").and_then(Object::as_array).ok()?;
    if values.len() != 4 {
        return None;
    }
    let nums: Vec<f64> = values.iter().filter_map(number).collect();
    if nums.len() != 4 {
        return None;
    }
    Some(((nums[2] - nums[0]).abs(), (nums[3] - nums[1]).abs()))
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

fn dict_type(object: &Object) -> Option<&[u8]> {
    object
        .as_dict()
        .ok()?
        .get(b"Type")
        .and_then(Object::as_name)
        .ok()
}

fn write_atomically(doc: &mut Document, output: &Path) -> Result<()> {
    let partial = output.with_extension("pdf.partial");
    if let Err(e) = doc.save(&partial) {
        let _ = fs::remove_file(&partial);
        return Err(PressError::MergeFailed(format!(
            "failed to write {}: {}",
            display_name(output),
            e
        )));
    }
    fs::rename(&partial, output).map_err(|e| {
        let _ = fs::remove_file(&partial);
        PressError::MergeFailed(format!("failed to finalize {}: {}", display_name(output), e))
    })
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}
