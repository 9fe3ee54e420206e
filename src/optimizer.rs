//! Redundancy removal for full rewrites: coalesce duplicate fonts, images
//! and Info strings, strip linearization residue, then sweep objects no
//! longer reachable from the trailer. Incremental updates never run this.

use log::{debug, info};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::object::{Object, ObjectId};
use crate::{Document, Result};

/// What one optimization pass changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OptimizationSummary {
    pub fonts_coalesced: u32,
    pub images_coalesced: u32,
    pub info_strings_coalesced: u32,
    pub linearization_dicts_removed: u32,
    pub objects_freed: u32,
}

impl OptimizationSummary {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Run every policy in order and free the victims through the free list.
pub fn optimize(document: &mut Document) -> Result<OptimizationSummary> {
    let mut summary = OptimizationSummary::default();

    let reachable: BTreeSet<ObjectId> = document.reachable_objects().into_iter().collect();

    let font_mapping = coalesce_by_fingerprint(document, &reachable, font_fingerprint);
    summary.fonts_coalesced = font_mapping.len() as u32;
    redirect_references(document, &font_mapping);

    let image_mapping = coalesce_by_fingerprint(document, &reachable, image_fingerprint);
    summary.images_coalesced = image_mapping.len() as u32;
    redirect_references(document, &image_mapping);

    summary.info_strings_coalesced = coalesce_info_strings(document);
    summary.linearization_dicts_removed = remove_linearization_residue(document);

    summary.objects_freed = document.prune_unreachable_objects().len() as u32;

    if summary.is_noop() {
        debug!("optimization pass found nothing to do");
    } else {
        info!(
            "optimization: {} fonts, {} images, {} info strings coalesced, {} linearization dicts, {} objects freed",
            summary.fonts_coalesced,
            summary.images_coalesced,
            summary.info_strings_coalesced,
            summary.linearization_dicts_removed,
            summary.objects_freed
        );
    }
    Ok(summary)
}

/// Group reachable objects by fingerprint; within each group the first
/// object survives and the rest map onto it.
fn coalesce_by_fingerprint(
    document: &Document, reachable: &BTreeSet<ObjectId>,
    fingerprint: fn(&Document, &Object) -> Option<Vec<u8>>,
) -> BTreeMap<ObjectId, ObjectId> {
    let mut groups: HashMap<Vec<u8>, ObjectId> = HashMap::new();
    let mut mapping = BTreeMap::new();
    for &id in reachable {
        let Ok(object) = document.get_object(id) else {
            continue;
        };
        let Some(print) = fingerprint(document, object) else {
            continue;
        };
        match groups.get(&print) {
            Some(&survivor) => {
                mapping.insert(id, survivor);
            }
            None => {
                groups.insert(print, id);
            }
        }
    }
    mapping
}

/// Identity of a font: base font, subtype, encoding, descriptor shape and
/// embedded program bytes.
fn font_fingerprint(document: &Document, object: &Object) -> Option<Vec<u8>> {
    let dict = object.as_dict().ok()?;
    if !dict.has_type(b"Font") {
        return None;
    }
    let mut hasher = Sha256::new();
    hasher.update(b"font");
    for key in [&b"BaseFont"[..], b"Subtype", b"Encoding"] {
        hasher.update([0]);
        hash_value(document, dict.get(key).ok(), &mut hasher, 0);
    }
    if let Ok((_, descriptor)) = dict
        .get(b"FontDescriptor")
        .and_then(|d| document.dereference(d))
    {
        hash_value(document, Some(descriptor), &mut hasher, 0);
        if let Ok(descriptor) = descriptor.as_dict() {
            for key in [&b"FontFile"[..], b"FontFile2", b"FontFile3"] {
                if let Ok((_, program)) = descriptor.get(key).and_then(|f| document.dereference(f)) {
                    if let Ok(stream) = program.as_stream() {
                        hasher.update(&stream.content);
                    }
                }
            }
        }
    }
    Some(hasher.finalize().to_vec())
}

/// Identity of an image XObject: geometry, color space, filters and pixel
/// bytes.
fn image_fingerprint(document: &Document, object: &Object) -> Option<Vec<u8>> {
    let stream = object.as_stream().ok()?;
    let dict = &stream.dict;
    if dict.get(b"Subtype").and_then(Object::as_name).ok()? != b"Image" {
        return None;
    }
    let mut hasher = Sha256::new();
    hasher.update(b"image");
    for key in [&b"Width"[..], b"Height", b"ColorSpace", b"BitsPerComponent", b"Filter"] {
        hasher.update([0]);
        hash_value(document, dict.get(key).ok(), &mut hasher, 0);
    }
    hasher.update(&stream.content);
    Some(hasher.finalize().to_vec())
}

/// Feed a dereferenced object's structure into the hash.
fn hash_value(document: &Document, value: Option<&Object>, hasher: &mut Sha256, depth: u8) {
    let Some(value) = value else {
        hasher.update(b"-");
        return;
    };
    if depth > 8 {
        return;
    }
    let resolved = match document.dereference(value) {
        Ok((_, resolved)) => resolved,
        Err(_) => value,
    };
    match resolved {
        Object::Null => hasher.update(b"n"),
        Object::Boolean(b) => hasher.update(if *b { b"t" } else { b"f" }),
        Object::Integer(i) => hasher.update(i.to_le_bytes()),
        Object::Real(r) => hasher.update(r.to_le_bytes()),
        Object::Name(n) => {
            hasher.update(b"/");
            hasher.update(n);
        }
        Object::String(s, _) => {
            hasher.update(b"(");
            hasher.update(s);
        }
        Object::Array(items) => {
            hasher.update(b"[");
            for item in items {
                hash_value(document, Some(item), hasher, depth + 1);
            }
        }
        Object::Dictionary(dict) => {
            hasher.update(b"<");
            for (key, item) in dict {
                hasher.update(key);
                hash_value(document, Some(item), hasher, depth + 1);
            }
        }
        Object::Stream(stream) => {
            hasher.update(b"s");
            hasher.update(&stream.content);
        }
        Object::Reference(_) => hasher.update(b"r"),
    }
}

/// Rewrite every reference according to `mapping`, leaving the victims to
/// the reachability sweep.
fn redirect_references(document: &mut Document, mapping: &BTreeMap<ObjectId, ObjectId>) {
    if mapping.is_empty() {
        return;
    }
    fn rewrite(object: &mut Object, mapping: &BTreeMap<ObjectId, ObjectId>) {
        match object {
            Object::Reference(id) => {
                if let Some(survivor) = mapping.get(id) {
                    *id = *survivor;
                }
            }
            Object::Array(items) => items.iter_mut().for_each(|item| rewrite(item, mapping)),
            Object::Dictionary(dict) => dict.iter_mut().for_each(|(_, value)| rewrite(value, mapping)),
            Object::Stream(stream) => stream.dict.iter_mut().for_each(|(_, value)| rewrite(value, mapping)),
            _ => {}
        }
    }
    let victims: BTreeSet<ObjectId> = mapping.keys().copied().collect();
    for (id, object) in document.objects.iter_mut() {
        if !victims.contains(id) {
            rewrite(object, mapping);
        }
    }
}

/// Collapse byte-identical strings inside the Info dictionary (Producer,
/// Creator and Author frequently repeat across merged files).
fn coalesce_info_strings(document: &mut Document) -> u32 {
    let Ok(info_id) = document.trailer.get(b"Info").and_then(Object::as_reference) else {
        return 0;
    };
    let Ok(info) = document.get_object(info_id).and_then(Object::as_dict) else {
        return 0;
    };

    // Map each indirect string leaf to the first leaf carrying the same
    // bytes.
    let mut first_by_value: HashMap<Vec<u8>, ObjectId> = HashMap::new();
    let mut mapping: BTreeMap<ObjectId, ObjectId> = BTreeMap::new();
    for (_, value) in info {
        let Ok(leaf_id) = value.as_reference() else {
            continue;
        };
        let Ok(bytes) = document.get_object(leaf_id).and_then(Object::as_str) else {
            continue;
        };
        match first_by_value.get(bytes) {
            Some(&survivor) if survivor != leaf_id => {
                mapping.insert(leaf_id, survivor);
            }
            Some(_) => {}
            None => {
                first_by_value.insert(bytes.to_vec(), leaf_id);
            }
        }
    }
    let collapsed = mapping.len() as u32;
    redirect_references(document, &mapping);
    collapsed
}

/// A linearized file carries a parameter dictionary (usually object 1) and
/// hint streams that are stale after any rewrite.
fn remove_linearization_residue(document: &mut Document) -> u32 {
    let mut removed = 0;
    let doomed: Vec<ObjectId> = document
        .objects
        .iter()
        .filter(|(_, object)| {
            object.as_dict().map(|d| d.has(b"Linearized")).unwrap_or(false)
                || object
                    .as_stream()
                    .map(|s| s.dict.has(b"S") && s.dict.has(b"Linearized"))
                    .unwrap_or(false)
        })
        .map(|(id, _)| *id)
        .collect();
    for id in doomed {
        document.delete_object(id);
        removed += 1;
    }
    removed
}
