//! Structural validation of a loaded or about-to-be-written document.
//!
//! Rules marked relaxed-skippable are the ones real-world writers get wrong
//! without making a file unreadable; strict mode enforces all of them.

use log::warn;

use crate::config::ValidationMode;
use crate::error::ValidationError;
use crate::object::{Object, ObjectId};
use crate::rectangle::Rectangle;
use crate::xref::{MAX_GENERATION, XrefEntry};
use crate::{Document, Error, Result};

/// Validate with the default (strict) rule set.
pub fn validate(document: &Document) -> Result<()> {
    validate_with(document, ValidationMode::Strict)
}

/// Validate, skipping the forgivable rules in relaxed mode. The first
/// violated rule is returned; every violation is logged.
pub fn validate_with(document: &Document, mode: ValidationMode) -> Result<()> {
    if mode == ValidationMode::Disabled {
        return Ok(());
    }
    let mut first: Option<ValidationError> = None;
    let mut report = |error: ValidationError| {
        warn!("validation: {}", error);
        if first.is_none() {
            first = Some(error);
        }
    };

    check_trailer(document, &mut report);
    check_free_list(document, &mut report);
    check_size(document, mode, &mut report);
    check_compressed_entries(document, &mut report);
    check_page_tree(document, &mut report);
    check_page_boxes(document, &mut report);
    check_stream_lengths(document, mode, &mut report);

    match first {
        Some(error) => Err(Error::Validation(error)),
        None => Ok(()),
    }
}

fn rule(rule: &'static str, object: Option<ObjectId>, detail: String) -> ValidationError {
    ValidationError { rule, object, detail }
}

fn check_trailer(document: &Document, report: &mut impl FnMut(ValidationError)) {
    match document.trailer.get(b"Root").and_then(Object::as_reference) {
        Ok(root) => {
            let catalog_ok = document
                .get_dictionary(root)
                .map(|dict| dict.has_type(b"Catalog"))
                .unwrap_or(false);
            if !catalog_ok {
                report(rule(
                    "trailer-root",
                    Some(root),
                    "Root does not resolve to a Catalog dictionary".to_string(),
                ));
            }
        }
        Err(_) => report(rule(
            "trailer-root",
            None,
            "trailer has no usable Root entry".to_string(),
        )),
    }
}

fn check_free_list(document: &Document, report: &mut impl FnMut(ValidationError)) {
    match document.reference_table.get(0) {
        Some(XrefEntry::Free { generation, .. }) if *generation == MAX_GENERATION => {}
        Some(other) => report(rule(
            "free-list-head",
            None,
            format!("entry 0 must be free with generation 65535, found {:?}", other),
        )),
        None => report(rule("free-list-head", None, "entry 0 is missing".to_string())),
    }

    if document.reference_table.free_list().is_none() {
        report(rule(
            "free-list-cycle",
            None,
            "following next-free pointers from entry 0 does not return to entry 0".to_string(),
        ));
    }
}

fn check_size(document: &Document, mode: ValidationMode, report: &mut impl FnMut(ValidationError)) {
    // Object number 0 is reserved for the free list head.
    if document.objects.keys().any(|id| id.0 == 0) {
        report(rule(
            "object-zero",
            Some((0, 0)),
            "object number 0 is reserved".to_string(),
        ));
    }

    if mode == ValidationMode::Strict {
        if let Ok(size) = document.trailer.get(b"Size").and_then(Object::as_i64) {
            let expected = document
                .objects
                .keys()
                .map(|id| id.0)
                .max()
                .unwrap_or(0)
                .max(document.reference_table.max_id())
                + 1;
            if size != expected as i64 {
                report(rule(
                    "trailer-size",
                    None,
                    format!("Size is {}, expected {}", size, expected),
                ));
            }
        }
    }
}

fn check_compressed_entries(document: &Document, report: &mut impl FnMut(ValidationError)) {
    for (id, entry) in &document.reference_table.entries {
        let XrefEntry::Compressed { container, .. } = entry else {
            continue;
        };
        match document.reference_table.get(*container) {
            Some(XrefEntry::Normal { .. }) => {}
            other => report(rule(
                "compressed-container",
                Some((*id, 0)),
                format!(
                    "container {} of compressed entry is not a directly stored object ({:?})",
                    container, other
                ),
            )),
        }
    }
}

fn check_page_tree(document: &Document, report: &mut impl FnMut(ValidationError)) {
    let Ok(catalog) = document.catalog() else {
        return; // reported by check_trailer
    };
    let Ok(pages_id) = catalog.get(b"Pages").and_then(Object::as_reference) else {
        report(rule(
            "page-tree-root",
            None,
            "catalog has no indirect Pages entry".to_string(),
        ));
        return;
    };
    let Ok(pages) = document.get_dictionary(pages_id) else {
        report(rule(
            "page-tree-root",
            Some(pages_id),
            "Pages does not resolve to a dictionary".to_string(),
        ));
        return;
    };
    if !pages.has_type(b"Pages") {
        report(rule(
            "page-tree-root",
            Some(pages_id),
            "page tree root is not of type Pages".to_string(),
        ));
    }
    if let Ok(count) = pages.get(b"Count").and_then(Object::as_i64) {
        let actual = document.page_count() as i64;
        if count != actual {
            report(rule(
                "page-tree-count",
                Some(pages_id),
                format!("Count is {}, tree holds {} pages", count, actual),
            ));
        }
    }
}

/// Every page-level box must be a four-number rectangle.
fn check_page_boxes(document: &Document, report: &mut impl FnMut(ValidationError)) {
    for (id, object) in &document.objects {
        let Ok(dict) = object.as_dict() else {
            continue;
        };
        if !dict.has_type(b"Page") && !dict.has_type(b"Pages") {
            continue;
        }
        for key in [&b"MediaBox"[..], b"CropBox", b"BleedBox", b"TrimBox", b"ArtBox"] {
            let Ok((_, boxed)) = dict.get(key).and_then(|b| document.dereference(b)) else {
                continue;
            };
            if Rectangle::try_from(boxed).is_err() {
                report(rule(
                    "page-box",
                    Some(*id),
                    format!("{} is not a rectangle", String::from_utf8_lossy(key)),
                ));
            }
        }
    }
}

fn check_stream_lengths(document: &Document, mode: ValidationMode, report: &mut impl FnMut(ValidationError)) {
    if mode != ValidationMode::Strict {
        return;
    }
    for (id, object) in &document.objects {
        let Object::Stream(stream) = object else {
            continue;
        };
        match stream.dict.get(b"Length").and_then(|l| document.dereference(l)) {
            Ok((_, Object::Integer(length))) => {
                if *length as usize != stream.content.len() {
                    report(rule(
                        "stream-length",
                        Some(*id),
                        format!("Length is {}, content holds {} bytes", length, stream.content.len()),
                    ));
                }
            }
            _ => report(rule(
                "stream-length",
                Some(*id),
                "stream has no resolvable integer Length".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationMode;
    use crate::dictionary;

    fn valid_document() -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = (2u32, 0u16);
        let page = doc.add_object(dictionary! {
            "Type" => Object::name("Page"),
            "Parent" => pages_id,
        });
        let pages = doc.add_object(dictionary! {
            "Type" => Object::name("Pages"),
            "Kids" => vec![page.into()],
            "Count" => 1,
        });
        assert_eq!(pages, pages_id);
        let catalog = doc.add_object(dictionary! {
            "Type" => Object::name("Catalog"),
            "Pages" => pages,
        });
        doc.trailer.set("Root", catalog);
        doc.trailer.set("Size", 4);
        doc
    }

    #[test]
    fn a_clean_document_passes() {
        assert!(validate(&valid_document()).is_ok());
    }

    #[test]
    fn missing_root_is_reported() {
        let mut doc = valid_document();
        doc.trailer.remove(b"Root");
        let err = validate(&doc).unwrap_err();
        assert!(err.to_string().contains("trailer-root"));
    }

    #[test]
    fn wrong_page_count_is_reported() {
        let mut doc = valid_document();
        let pages_id = doc.catalog().unwrap().get(b"Pages").and_then(Object::as_reference).unwrap();
        doc.get_dictionary_mut(pages_id).unwrap().set("Count", 7);
        let err = validate(&doc).unwrap_err();
        assert!(err.to_string().contains("page-tree-count"));
    }

    #[test]
    fn wrong_size_skipped_in_relaxed_mode() {
        let mut doc = valid_document();
        doc.trailer.set("Size", 99);
        assert!(validate(&doc).is_err());
        assert!(validate_with(&doc, ValidationMode::Relaxed).is_ok());
        assert!(validate_with(&doc, ValidationMode::Disabled).is_ok());
    }

    #[test]
    fn malformed_media_box_is_reported() {
        let mut doc = valid_document();
        doc.get_dictionary_mut((1, 0))
            .unwrap()
            .set("MediaBox", vec![1.into(), 2.into()]);
        let err = validate(&doc).unwrap_err();
        assert!(err.to_string().contains("page-box"));
    }

    #[test]
    fn broken_free_list_is_reported() {
        let mut doc = valid_document();
        doc.reference_table
            .insert(9, crate::xref::XrefEntry::Free { next_free: 7, generation: 1 });
        doc.reference_table.insert(
            0,
            crate::xref::XrefEntry::Free {
                next_free: 9,
                generation: MAX_GENERATION,
            },
        );
        let err = validate(&doc).unwrap_err();
        assert!(err.to_string().contains("free-list-cycle"));
    }
}
