use super::*;
use crate::config::{LoadOptions, ValidationMode};
use crate::{Document, Object};

/// Assemble a classical-xref file from raw object bodies, computing the
/// offsets as we go.
fn build_pdf(objects: &[&[u8]]) -> Vec<u8> {
    let mut buffer = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for body in objects {
        offsets.push(buffer.len());
        buffer.extend_from_slice(body);
    }
    let xref_pos = buffer.len();
    buffer.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    buffer.extend_from_slice(b"0000000000 65535 f \n");
    for offset in &offsets {
        buffer.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    buffer.extend_from_slice(
        format!(
            "trailer\n<</Size {}/Root 1 0 R>>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_pos
        )
        .as_bytes(),
    );
    buffer
}

fn one_page_objects(content_object: &'static [u8], length_object: Option<&'static [u8]>) -> Vec<&'static [u8]> {
    let mut objects: Vec<&[u8]> = vec![
        b"1 0 obj<</Type/Catalog/Pages 2 0 R>>endobj\n",
        b"2 0 obj<</Type/Pages/Kids[3 0 R]/Count 1>>endobj\n",
        b"3 0 obj<</Type/Page/Parent 2 0 R/Contents 4 0 R>>endobj\n",
        content_object,
    ];
    if let Some(length_object) = length_object {
        objects.push(length_object);
    }
    objects
}

#[test]
fn load_document() {
    let bytes = build_pdf(&one_page_objects(
        b"4 0 obj<</Length 5>>stream\nhello\nendstream endobj\n",
        None,
    ));
    let doc = Document::load_mem(&bytes).unwrap();
    assert_eq!(doc.version, "1.4");
    assert_eq!(doc.page_count(), 1);
    let stream = doc.get_object((4, 0)).and_then(Object::as_stream).unwrap();
    assert_eq!(stream.content, b"hello");
}

#[test]
#[should_panic(expected = "Xref(Start)")]
fn load_short_document() {
    let _doc = Document::load_mem(b"%PDF-1.5\n%%EOF\n").unwrap();
}

#[test]
fn load_document_with_preceding_bytes() {
    let mut content = b"garbage".to_vec();
    content.extend(build_pdf(&one_page_objects(
        b"4 0 obj<</Length 5>>stream\nhello\nendstream endobj\n",
        None,
    )));

    let doc = Document::load_mem(&content).unwrap();
    assert_eq!(doc.version, "1.4");
    assert_eq!(doc.page_count(), 1);

    assert!(Document::load_mem_with(&content, LoadOptions::new().strict()).is_err());
}

#[test]
fn indirect_stream_length_is_resolved() {
    let bytes = build_pdf(&one_page_objects(
        b"4 0 obj<</Length 5 0 R>>stream\nhello\nendstream endobj\n",
        Some(b"5 0 obj 5 endobj\n"),
    ));
    let doc = Document::load_mem(&bytes).unwrap();
    let stream = doc.get_object((4, 0)).and_then(Object::as_stream).unwrap();
    assert_eq!(stream.content, b"hello");
}

#[test]
fn wrong_stream_length_recovers_in_relaxed_mode() {
    // /Length claims 3 but the payload runs to the endstream marker.
    let bytes = build_pdf(&one_page_objects(
        b"4 0 obj<</Length 3>>stream\nhello\nendstream endobj\n",
        None,
    ));

    let doc = Document::load_mem(&bytes).unwrap();
    let stream = doc.get_object((4, 0)).and_then(Object::as_stream).unwrap();
    assert_eq!(stream.content, b"hello");
    assert_eq!(stream.dict.get(b"Length").and_then(Object::as_i64).unwrap(), 5);

    let strict = Document::load_mem_with(&bytes, LoadOptions::new().validation(ValidationMode::Strict));
    assert!(strict.is_err());
}

#[test]
fn object_id_mismatch_is_detected() {
    // The xref table points object 4's entry at object 9's body.
    let bytes = build_pdf(&one_page_objects(b"9 0 obj<</Length 0>>stream\n\nendstream endobj\n", None));
    let strict = Document::load_mem_with(&bytes, LoadOptions::new().strict());
    assert!(strict.is_err());
}

#[test]
fn search_substring_finds_last_occurrence() {
    assert_eq!(Reader::search_substring(b"hello world", b"xyz", 0), None);
    assert_eq!(Reader::search_substring(b"hello world", b"world", 0), Some(6));

    let buffer = b"%%EOF\ntest%%EOF\nend";
    assert_eq!(Reader::search_substring(buffer, b"%%EOF", 0), Some(10));
    assert_eq!(Reader::search_substring(buffer, b"%%EOF", 6), Some(10));
    assert_eq!(Reader::search_substring(buffer, b"%%EOF", 15), None);
    assert_eq!(Reader::search_substring(b"%%EOF", b"%%EOF", 0), Some(0));

    let buffer_with_many_percents = b"%%%PDF-1.3%%%comment%%%more%%EOF";
    assert_eq!(
        Reader::search_substring(buffer_with_many_percents, b"%%EOF", 0),
        Some(27)
    );
}

#[test]
fn hybrid_prev_chain_is_followed() {
    // An incremental update that redefines the page object: the newer
    // definition must shadow the older one.
    let base = build_pdf(&one_page_objects(
        b"4 0 obj<</Length 5>>stream\nhello\nendstream endobj\n",
        None,
    ));
    let base_xref_pos = Reader::search_substring(&base, b"xref\n0 ", 0).unwrap();

    let mut updated = base.clone();
    let new_page_offset = updated.len();
    updated.extend_from_slice(b"3 0 obj<</Type/Page/Parent 2 0 R/Contents 4 0 R/Rotate 90>>endobj\n");
    let xref_pos = updated.len();
    updated.extend_from_slice(format!("xref\n3 1\n{:010} 00000 n \n", new_page_offset).as_bytes());
    updated.extend_from_slice(
        format!(
            "trailer\n<</Size 5/Root 1 0 R/Prev {}>>\nstartxref\n{}\n%%EOF\n",
            base_xref_pos, xref_pos
        )
        .as_bytes(),
    );

    let doc = Document::load_mem(&updated).unwrap();
    assert_eq!(doc.page_count(), 1);
    let page = doc.get_dictionary((3, 0)).unwrap();
    assert_eq!(page.get(b"Rotate").and_then(Object::as_i64).unwrap(), 90);
}
