//! Page-level concatenation of PDF documents.

use lopdf::{Dictionary, Document, Object};
use tracing::warn;

use crate::error::PesuError;

/// Attributes a page may inherit from its page tree. They are copied onto
/// the page before it is moved under the merged tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];
const MAX_TREE_DEPTH: usize = 32;

/// Appends the pages of every readable input, in input order. Inputs that do
/// not parse are skipped; if no page survives the merge fails.
pub fn merge(inputs: &[&[u8]]) -> Result<Vec<u8>, PesuError> {
    let mut merged = Document::with_version("1.5");
    let mut next_id = 1;
    let mut pages = Vec::new();

    for (position, input) in inputs.iter().enumerate() {
        let mut doc = match Document::load_mem(input) {
            Ok(doc) => doc,
            Err(err) => {
                warn!(position, error = %err, "skipping unreadable PDF");
                continue;
            }
        };
        doc.renumber_objects_with(next_id);
        next_id = doc.max_id + 1;

        for page_id in doc.get_pages().into_values() {
            let Ok(page) = doc.get_dictionary(page_id) else {
                continue;
            };
            let mut page = page.clone();
            for key in INHERITABLE {
                if !page.has(key)
                    && let Some(value) = inherited(&doc, &page, key)
                {
                    page.set(key, value);
                }
            }
            pages.push((page_id, page));
        }

        for (id, object) in std::mem::take(&mut doc.objects) {
            if !matches!(type_name(&object), Some(b"Catalog" | b"Pages" | b"Page")) {
                merged.objects.insert(id, object);
            }
        }
    }

    if pages.is_empty() {
        return Err(PesuError::Pdf("no readable pages to merge".to_string()));
    }

    merged.max_id = next_id - 1;
    let tree_id = merged.new_object_id();
    let count = pages.len() as i64;
    let mut kids = Vec::with_capacity(pages.len());
    for (page_id, mut page) in pages {
        page.set("Parent", Object::Reference(tree_id));
        merged.objects.insert(page_id, Object::Dictionary(page));
        kids.push(Object::Reference(page_id));
    }

    let mut tree = Dictionary::new();
    tree.set("Type", Object::Name(b"Pages".to_vec()));
    tree.set("Count", Object::Integer(count));
    tree.set("Kids", Object::Array(kids));
    merged.objects.insert(tree_id, Object::Dictionary(tree));

    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(tree_id));
    let catalog_id = merged.add_object(Object::Dictionary(catalog));
    merged.trailer.set("Root", Object::Reference(catalog_id));

    let mut bytes = Vec::new();
    merged
        .save_to(&mut bytes)
        .map_err(|err| PesuError::Pdf(err.to_string()))?;
    Ok(bytes)
}

fn type_name(object: &Object) -> Option<&[u8]> {
    object.as_dict().ok()?.get(b"Type").ok()?.as_name().ok()
}

fn inherited(doc: &Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    for _ in 0..MAX_TREE_DEPTH {
        let node = doc.get_dictionary(parent?).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A document of blank pages whose media box lives on the page tree.
    fn blank_pdf(pages: usize) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let tree_id = doc.new_object_id();
        let kids = (0..pages)
            .map(|_| {
                let mut page = Dictionary::new();
                page.set("Type", Object::Name(b"Page".to_vec()));
                page.set("Parent", Object::Reference(tree_id));
                Object::Reference(doc.add_object(Object::Dictionary(page)))
            })
            .collect::<Vec<_>>();
        let mut tree = Dictionary::new();
        tree.set("Type", Object::Name(b"Pages".to_vec()));
        tree.set("Count", Object::Integer(pages as i64));
        tree.set("Kids", Object::Array(kids));
        tree.set(
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(595),
                Object::Integer(842),
            ]),
        );
        doc.objects.insert(tree_id, Object::Dictionary(tree));
        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("Pages", Object::Reference(tree_id));
        let catalog_id = doc.add_object(Object::Dictionary(catalog));
        doc.trailer.set("Root", Object::Reference(catalog_id));
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn pages_are_concatenated_with_inherited_attributes() {
        let first = blank_pdf(2);
        let second = blank_pdf(3);
        let merged = merge(&[first.as_slice(), second.as_slice()]).unwrap();

        let doc = Document::load_mem(&merged).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 5);
        for page_id in pages.values() {
            assert!(doc.get_dictionary(*page_id).unwrap().has(b"MediaBox"));
        }
    }

    #[test]
    fn unreadable_inputs_are_skipped() {
        let pdf = blank_pdf(2);
        let merged = merge(&[b"not a pdf".as_slice(), pdf.as_slice()]).unwrap();
        let doc = Document::load_mem(&merged).unwrap();
        assert_eq!(doc.get_pages().len(), 2);

        let result = merge(&[b"still not a pdf".as_slice()]);
        assert!(matches!(result, Err(PesuError::Pdf(_))));
    }
}
