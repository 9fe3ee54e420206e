//! End-to-end behavior: build documents through the public API, write them,
//! read them back and check what a consumer would observe.

use crate::config::{LoadOptions, SaveOptions};
use crate::encryption::{EncryptionSettings, EncryptionVariant, Permissions};
use crate::object::{Object, ObjectId, Stream};
use crate::{Document, Error, IncrementalDocument, dictionary, optimize, validate};

const CONTENT: &[u8] = b"BT /F1 12 Tf 100 700 Td (Hi) Tj ET";

/// The minimal five-object document: catalog, pages node, two pages and one
/// shared content stream.
fn two_page_document() -> (Document, ObjectId) {
    let mut doc = Document::with_version("1.5");
    let content_id = doc.add_object(Stream::new(dictionary! {}, CONTENT.to_vec()).with_compression(false));
    let pages_id = (doc.max_id + 3, 0);
    let page1 = doc.add_object(dictionary! {
        "Type" => Object::name("Page"),
        "Parent" => pages_id,
        "Contents" => content_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    });
    let page2 = doc.add_object(dictionary! {
        "Type" => Object::name("Page"),
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = doc.add_object(dictionary! {
        "Type" => Object::name("Pages"),
        "Kids" => vec![page1.into(), page2.into()],
        "Count" => 2,
    });
    assert_eq!(pages, pages_id);
    let catalog = doc.add_object(dictionary! {
        "Type" => Object::name("Catalog"),
        "Pages" => pages,
    });
    doc.trailer.set("Root", catalog);
    (doc, content_id)
}

fn saved(doc: &mut Document) -> Vec<u8> {
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

fn content_bytes(doc: &Document) -> Vec<u8> {
    let page_id = doc.get_pages()[&1];
    let contents_id = doc
        .get_dictionary(page_id)
        .unwrap()
        .get(b"Contents")
        .and_then(Object::as_reference)
        .unwrap();
    doc.get_object(contents_id)
        .and_then(Object::as_stream)
        .unwrap()
        .content
        .clone()
}

#[test]
fn read_write_read_two_page_document() {
    let (mut doc, _) = two_page_document();
    let bytes = saved(&mut doc);

    let reloaded = Document::load_mem(&bytes).unwrap();
    assert_eq!(reloaded.page_count(), 2);
    let pages = reloaded
        .catalog()
        .unwrap()
        .get(b"Pages")
        .and_then(Object::as_reference)
        .and_then(|id| reloaded.get_dictionary(id))
        .unwrap();
    assert_eq!(pages.get(b"Count").and_then(Object::as_i64).unwrap(), 2);
    assert_eq!(content_bytes(&reloaded), CONTENT);
    assert!(validate(&reloaded).is_ok());
}

#[test]
fn write_read_identity_up_to_graph_equality() {
    let (mut doc, _) = two_page_document();
    let first = saved(&mut doc);
    let mut reloaded = Document::load_mem(&first).unwrap();
    let second = saved(&mut reloaded);
    let reread = Document::load_mem(&second).unwrap();

    assert_eq!(reloaded.objects, reread.objects);
    assert_eq!(reloaded.page_count(), reread.page_count());
}

#[test]
fn deterministic_output_for_identical_input() {
    let (mut doc, _) = two_page_document();
    doc.refresh_document_id();
    let mut a = Vec::new();
    doc.save_to(&mut a).unwrap();
    let mut b = Vec::new();
    doc.save_to(&mut b).unwrap();
    assert_eq!(a, b);
}

#[test]
fn encrypt_then_decrypt_recovers_content() {
    for variant in [
        EncryptionVariant::Rc4With40BitKey,
        EncryptionVariant::Rc4With128BitKey,
        EncryptionVariant::Aes128,
        EncryptionVariant::Aes256,
    ] {
        let (mut doc, _) = two_page_document();
        doc.encrypt(&EncryptionSettings {
            variant,
            user_password: b"u",
            owner_password: b"o",
            permissions: Permissions::default(),
        })
        .unwrap();
        let bytes = saved(&mut doc);

        // The payload on disk must not be the plaintext.
        assert!(
            !bytes.windows(CONTENT.len()).any(|w| w == CONTENT),
            "{variant:?} left the content stream in the clear"
        );

        let reloaded =
            Document::load_mem_with(&bytes, LoadOptions::default().user_password(&b"u"[..])).unwrap();
        assert_eq!(content_bytes(&reloaded), CONTENT, "{variant:?}");
        assert_eq!(reloaded.page_count(), 2);

        let owner = Document::load_mem_with(&bytes, LoadOptions::default().owner_password(&b"o"[..])).unwrap();
        assert!(owner.encryption_state.unwrap().owner_authenticated);

        let wrong = Document::load_mem_with(&bytes, LoadOptions::default().user_password(&b"nope"[..]));
        assert!(matches!(wrong, Err(Error::InvalidPassword)), "{variant:?}");
    }
}

#[test]
fn changing_the_user_password_reencrypts() {
    let (mut doc, _) = two_page_document();
    doc.encrypt(&EncryptionSettings {
        variant: EncryptionVariant::Aes256,
        user_password: b"old",
        owner_password: b"owner",
        permissions: Permissions::default(),
    })
    .unwrap();
    doc.change_user_password(b"new").unwrap();
    let bytes = saved(&mut doc);

    assert!(Document::load_mem_with(&bytes, LoadOptions::default().user_password(&b"old"[..])).is_err());
    let reloaded = Document::load_mem_with(&bytes, LoadOptions::default().user_password(&b"new"[..])).unwrap();
    assert_eq!(content_bytes(&reloaded), CONTENT);
}

#[test]
fn object_stream_packing_round_trips() {
    let (mut doc, _) = two_page_document();
    let originals = doc.objects.clone();
    let mut bytes = Vec::new();
    doc.save_with(&mut bytes, SaveOptions::new().object_streams(true)).unwrap();

    let hits = bytes.windows(b"/Type/ObjStm".len()).filter(|w| *w == b"/Type/ObjStm").count();
    assert_eq!(hits, 1, "expected exactly one object stream container");

    let reloaded = Document::load_mem(&bytes).unwrap();
    for (id, original) in &originals {
        assert_eq!(reloaded.get_object(*id).unwrap(), original, "object {} {}", id.0, id.1);
    }
    assert_eq!(reloaded.page_count(), 2);
}

#[test]
fn xref_stream_output_reloads() {
    let (mut doc, _) = two_page_document();
    let mut bytes = Vec::new();
    doc.save_with(&mut bytes, SaveOptions::new().xref_streams(true)).unwrap();

    assert!(bytes.windows(b"/Type/XRef".len()).any(|w| w == b"/Type/XRef"));
    assert!(bytes.starts_with(b"%PDF-1.5"));

    let reloaded = Document::load_mem(&bytes).unwrap();
    assert_eq!(reloaded.page_count(), 2);
    assert_eq!(content_bytes(&reloaded), CONTENT);
}

#[test]
fn incremental_update_appends_only() {
    let (mut doc, _) = two_page_document();
    let original = saved(&mut doc);

    let mut incremental: IncrementalDocument = original.as_slice().try_into().unwrap();
    let page_id = incremental.document.get_pages()[&1];
    let annot_id = incremental.document.add_object(dictionary! {
        "Type" => Object::name("Annot"),
        "Subtype" => Object::name("Text"),
        "Rect" => vec![10.into(), 10.into(), 40.into(), 40.into()],
        "Contents" => Object::string_literal("note"),
    });
    incremental
        .document
        .get_dictionary_mut(page_id)
        .unwrap()
        .set("Annots", vec![annot_id.into()]);

    let changed = incremental.changed_objects();
    assert_eq!(changed, vec![page_id, annot_id]);

    let mut updated = Vec::new();
    incremental.save_to(&mut updated).unwrap();

    // Nothing before the original end may change.
    assert_eq!(&updated[..original.len()], original.as_slice());
    let tail = &updated[original.len()..];
    assert!(tail.windows(b"/Prev".len()).any(|w| w == b"/Prev"));
    assert!(updated.ends_with(b"%%EOF\n"));

    let reloaded = Document::load_mem(&updated).unwrap();
    assert_eq!(reloaded.page_count(), 2);
    let annots = reloaded
        .get_dictionary(page_id)
        .unwrap()
        .get(b"Annots")
        .and_then(Object::as_array)
        .unwrap();
    assert_eq!(annots[0].as_reference().unwrap(), annot_id);
    assert!(
        reloaded.get_dictionary(annot_id).unwrap().has_type(b"Annot")
    );
}

#[test]
fn unmodified_incremental_update_references_zero_entries() {
    let (mut doc, _) = two_page_document();
    let original = saved(&mut doc);

    let mut incremental: IncrementalDocument = original.as_slice().try_into().unwrap();
    assert!(incremental.changed_objects().is_empty());

    let mut updated = Vec::new();
    incremental.save_to(&mut updated).unwrap();
    assert_eq!(&updated[..original.len()], original.as_slice());

    let tail = std::str::from_utf8(&updated[original.len()..]).unwrap();
    // An empty update: the xref keyword immediately followed by the trailer.
    assert!(tail.contains("xref\ntrailer\n"), "tail was: {tail}");

    let reloaded = Document::load_mem(&updated).unwrap();
    assert_eq!(reloaded.page_count(), 2);
}

#[test]
fn lzw_early_change_zero_stream_decodes() {
    let payload = b"TOBEORNOTTOBEORTOBEORNOT";
    let encoded = crate::filters::lzw::encode(payload, false).unwrap();

    let stream = Stream::new(
        dictionary! {
            "Filter" => Object::name("LZWDecode"),
            "DecodeParms" => dictionary! { "EarlyChange" => 0 },
        },
        encoded,
    );
    assert_eq!(stream.decompressed_content().unwrap(), payload);
}

#[test]
fn relaxed_mode_forgives_trailing_garbage() {
    let (mut doc, _) = two_page_document();
    let mut bytes = saved(&mut doc);
    bytes.extend(std::iter::repeat_n(b'A', 2048));

    let strict = Document::load_mem_with(&bytes, LoadOptions::new().strict());
    assert!(strict.is_err());

    let relaxed = Document::load_mem(&bytes).unwrap();
    assert_eq!(relaxed.page_count(), 2);
}

#[test]
fn broken_startxref_triggers_linear_scan_rebuild() {
    let (mut doc, _) = two_page_document();
    let bytes = saved(&mut doc);

    // Point startxref far outside the file.
    let pos = bytes.windows(9).rposition(|w| w == b"startxref").unwrap();
    let mut broken = bytes[..pos].to_vec();
    broken.extend_from_slice(b"startxref\n99999999\n%%EOF\n");

    assert!(Document::load_mem_with(&broken, LoadOptions::new().strict()).is_err());

    let recovered = Document::load_mem(&broken).unwrap();
    assert_eq!(recovered.page_count(), 2);
    assert_eq!(content_bytes(&recovered), CONTENT);
}

#[test]
fn optimize_then_save_keeps_the_document_usable() {
    let (mut doc, _) = two_page_document();
    let font = dictionary! {
        "Type" => Object::name("Font"),
        "Subtype" => Object::name("Type1"),
        "BaseFont" => Object::name("Helvetica"),
    };
    let font_a = doc.add_object(font.clone());
    let font_b = doc.add_object(font);
    let pages = doc.get_pages();
    doc.get_dictionary_mut(pages[&1])
        .unwrap()
        .set("Resources", dictionary! { "Font" => dictionary! { "F1" => font_a } });
    doc.get_dictionary_mut(pages[&2])
        .unwrap()
        .set("Resources", dictionary! { "Font" => dictionary! { "F1" => font_b } });

    let summary = optimize(&mut doc).unwrap();
    assert_eq!(summary.fonts_coalesced, 1);

    let bytes = saved(&mut doc);
    let reloaded = Document::load_mem(&bytes).unwrap();
    assert_eq!(reloaded.page_count(), 2);
    assert!(validate(&reloaded).is_ok());
}

#[test]
fn empty_containers_and_zero_length_streams_round_trip() {
    let (mut doc, _) = two_page_document();
    let empty_dict = doc.add_object(dictionary! {});
    let empty_array = doc.add_object(Object::Array(vec![]));
    let empty_stream = doc.add_object(Stream::new(dictionary! {}, vec![]));
    doc.catalog_mut().unwrap().set("PieceInfo", empty_dict);
    doc.catalog_mut().unwrap().set("Extras", empty_array);
    doc.catalog_mut().unwrap().set("Metadata", empty_stream);

    let bytes = saved(&mut doc);
    let reloaded = Document::load_mem(&bytes).unwrap();
    assert_eq!(reloaded.get_object(empty_dict).unwrap(), &Object::Dictionary(dictionary! {}));
    assert_eq!(reloaded.get_object(empty_array).unwrap(), &Object::Array(vec![]));
    let stream = reloaded.get_object(empty_stream).and_then(Object::as_stream).unwrap();
    assert!(stream.content.is_empty());
    assert_eq!(stream.dict.get(b"Length").and_then(Object::as_i64).unwrap(), 0);
}

#[test]
fn pdf_two_headers_are_rejected() {
    let err = Document::load_mem(b"%PDF-2.0\nwhatever").unwrap_err();
    assert!(matches!(err, Error::UnsupportedVersion(_)));
}

#[test]
fn cancellation_aborts_the_load() {
    let (mut doc, _) = two_page_document();
    let bytes = saved(&mut doc);

    let cancel = crate::CancelSignal::new();
    cancel.cancel();
    let result = Document::load_mem_with(&bytes, LoadOptions::new().cancel(cancel));
    assert!(matches!(result, Err(Error::Cancelled)));
}

#[test]
fn dead_objects_stay_dead_after_rewrite() {
    let (mut doc, _) = two_page_document();
    let orphan = doc.add_object(Object::string_literal("unreferenced"));
    let bytes = saved(&mut doc);
    let reloaded = Document::load_mem(&bytes).unwrap();
    // The writer only emits reachable objects.
    assert!(reloaded.get_object(orphan).is_err());
}

#[test]
fn metadata_fast_path_matches_full_load() {
    let (mut doc, _) = two_page_document();
    let info = doc.add_object(dictionary! {
        "Title" => Object::string_literal("Minimal"),
        "Producer" => Object::string_literal("pdfmill"),
    });
    doc.trailer.set("Info", info);
    let bytes = saved(&mut doc);

    let metadata = Document::load_metadata_mem(&bytes).unwrap();
    assert_eq!(metadata.page_count, 2);
    assert_eq!(metadata.version, "1.5");
    assert_eq!(metadata.title.as_deref(), Some("Minimal"));
    assert_eq!(metadata.producer.as_deref(), Some("pdfmill"));
}
