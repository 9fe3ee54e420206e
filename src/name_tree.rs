//! Name trees: the catalog's `/Names` subtrees ("Dests", "EmbeddedFiles",
//! "JavaScript", ...). A tree node either carries `/Kids` with `/Limits`
//! bounding every descendant key, or a `/Names` leaf array of sorted
//! key-value pairs. Lookup descends by bisecting on the limits; insertion
//! keeps leaf arrays sorted and repairs `/Limits` bottom-up.

use indexmap::IndexMap;
use log::warn;
use std::collections::HashSet;

use crate::object::{Dictionary, Object, ObjectId};
use crate::{Document, Error, Result};

#[derive(Debug, Clone)]
pub struct NameTree {
    root: Object,
}

impl NameTree {
    /// Find the tree of the given kind under the catalog's `/Names` entry.
    pub fn load(document: &Document, kind: &[u8]) -> Result<NameTree> {
        let names = document.catalog()?.get(b"Names")?;
        let (_, names) = document.dereference(names)?;
        let root = names.as_dict()?.get(kind)?;
        Ok(NameTree { root: root.clone() })
    }

    fn node<'a>(&self, document: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
        document.dereference(object).ok()?.1.as_dict().ok()
    }

    /// Bisected descent: follow the child whose `/Limits` bound `key`, then
    /// binary-search the leaf's `/Names` array.
    pub fn locate(&self, document: &Document, key: &[u8]) -> Option<Object> {
        let mut seen = HashSet::new();
        let mut current = self.root.clone();
        loop {
            if let Ok(id) = current.as_reference() {
                if !seen.insert(id) {
                    warn!("name tree contains a cycle through object {} {}", id.0, id.1);
                    return None;
                }
            }
            let node = self.node(document, &current)?.clone();

            if let Ok(names) = node.get(b"Names").and_then(Object::as_array) {
                return Self::search_leaf(names, key);
            }

            let kids = node.get(b"Kids").and_then(Object::as_array).ok()?.clone();
            let mut descend = None;
            for kid in &kids {
                let Some(kid_node) = self.node(document, kid) else {
                    continue;
                };
                match Self::limits(kid_node) {
                    Some((low, high)) if key >= low.as_slice() && key <= high.as_slice() => {
                        descend = Some(kid.clone());
                        break;
                    }
                    Some(_) => {}
                    // A kid without limits can hold anything; remember it as
                    // a fallback.
                    None => descend = descend.or_else(|| Some(kid.clone())),
                }
            }
            current = descend?;
        }
    }

    fn search_leaf(names: &[Object], key: &[u8]) -> Option<Object> {
        let pairs: Vec<_> = names.chunks_exact(2).collect();
        let found = pairs
            .binary_search_by(|pair| pair[0].as_str().unwrap_or(b"").cmp(key))
            .ok()?;
        Some(pairs[found][1].clone())
    }

    fn limits(node: &Dictionary) -> Option<(Vec<u8>, Vec<u8>)> {
        let limits = node.get(b"Limits").and_then(Object::as_array).ok()?;
        if limits.len() != 2 {
            return None;
        }
        Some((limits[0].as_str().ok()?.to_vec(), limits[1].as_str().ok()?.to_vec()))
    }

    /// Every (key, value) pair in the tree, in key order.
    pub fn entries(&self, document: &Document) -> IndexMap<Vec<u8>, Object> {
        let mut out = IndexMap::new();
        self.collect(document, &self.root, &mut out, &mut HashSet::new());
        out
    }

    fn collect(
        &self, document: &Document, node: &Object, out: &mut IndexMap<Vec<u8>, Object>,
        seen: &mut HashSet<ObjectId>,
    ) {
        if let Ok(id) = node.as_reference() {
            if !seen.insert(id) {
                return;
            }
        }
        let Some(node) = self.node(document, node) else {
            return;
        };
        if let Ok(kids) = node.get(b"Kids").and_then(Object::as_array) {
            for kid in kids.clone() {
                self.collect(document, &kid, out, seen);
            }
        }
        if let Ok(names) = node.get(b"Names").and_then(Object::as_array) {
            let mut pairs = names.iter();
            while let (Some(key), Some(value)) = (pairs.next(), pairs.next()) {
                if let Ok(key) = key.as_str() {
                    out.insert(key.to_vec(), value.clone());
                }
            }
        }
    }
}

/// Insert `(key, value)` into the catalog's tree of the given kind, creating
/// the tree when absent, and repair `/Limits` along the descent path.
pub fn insert(document: &mut Document, kind: &[u8], key: &[u8], value: Object) -> Result<()> {
    document.clear_name_tree_cache();

    let catalog_id = document.trailer.get(b"Root").and_then(Object::as_reference)?;

    // An entry may be absent, a direct dictionary (hoisted into an indirect
    // object so the update below is uniform), or already indirect.
    fn ensure_indirect_entry(
        document: &mut Document, owner: ObjectId, key: &[u8], empty: fn() -> Dictionary,
    ) -> Result<ObjectId> {
        let existing: Option<Option<ObjectId>> = match document.get_dictionary(owner)?.get(key) {
            Ok(entry) => Some(document.dereference(entry)?.0),
            Err(_) => None,
        };
        match existing {
            Some(Some(id)) => Ok(id),
            Some(None) => {
                let direct = document.get_dictionary(owner)?.get(key)?.as_dict()?.clone();
                let id = document.add_object(direct);
                document.get_dictionary_mut(owner)?.set(key, id);
                Ok(id)
            }
            None => {
                let id = document.add_object(empty());
                document.get_dictionary_mut(owner)?.set(key, id);
                Ok(id)
            }
        }
    }

    let names_id = ensure_indirect_entry(document, catalog_id, b"Names", Dictionary::new)?;
    let root_id = ensure_indirect_entry(document, names_id, kind, || {
        let mut leaf = Dictionary::new();
        leaf.set("Names", Object::Array(vec![]));
        leaf
    })?;

    let mut path = vec![root_id];
    descend_to_leaf(document, root_id, key, &mut path)?;
    let leaf_id = *path.last().expect("path always holds the root");

    // Sorted insertion into the leaf's /Names array; an existing key is
    // replaced in place.
    let existing_keys: Vec<Vec<u8>> = document
        .get_dictionary(leaf_id)?
        .get(b"Names")
        .and_then(Object::as_array)
        .map(|names| {
            names
                .iter()
                .step_by(2)
                .map(|k| k.as_str().unwrap_or(b"").to_vec())
                .collect()
        })
        .unwrap_or_default();
    let mut action = existing_keys.len() * 2;
    let mut replace = false;
    for (index, existing) in existing_keys.iter().enumerate() {
        if existing.as_slice() == key {
            action = index * 2;
            replace = true;
            break;
        }
        if existing.as_slice() > key {
            action = index * 2;
            break;
        }
    }

    let leaf = document.get_dictionary_mut(leaf_id)?;
    if !leaf.has(b"Names") {
        leaf.set("Names", Object::Array(vec![]));
    }
    let names = leaf.get_mut(b"Names")?.as_array_mut()?;
    if replace {
        names[action + 1] = value;
    } else {
        names.insert(action, value);
        names.insert(action, Object::string_literal(key));
    }

    repair_limits(document, &path)?;
    Ok(())
}

fn descend_to_leaf(document: &Document, node_id: ObjectId, key: &[u8], path: &mut Vec<ObjectId>) -> Result<()> {
    if path.len() > 64 {
        return Err(Error::ReferenceCycle(node_id));
    }
    let node = document.get_dictionary(node_id)?;
    if node.has(b"Names") || !node.has(b"Kids") {
        return Ok(());
    }
    let kids = node.get(b"Kids").and_then(Object::as_array)?;
    let mut chosen = None;
    for kid in kids {
        let kid_id = kid.as_reference()?;
        let kid_node = document.get_dictionary(kid_id)?;
        chosen = Some(kid_id);
        if let Some((_, high)) = NameTree::limits(kid_node) {
            if key <= high.as_slice() {
                break;
            }
        }
    }
    let next = chosen.ok_or(Error::DictKey)?;
    path.push(next);
    descend_to_leaf(document, next, key, path)
}

/// Recompute `/Limits` bottom-up along the touched path.
fn repair_limits(document: &mut Document, path: &[ObjectId]) -> Result<()> {
    for &node_id in path.iter().rev() {
        let node = document.get_dictionary(node_id)?;
        let bounds = if let Ok(names) = node.get(b"Names").and_then(Object::as_array) {
            let keys: Vec<&[u8]> = names.iter().step_by(2).filter_map(|k| k.as_str().ok()).collect();
            match (keys.first(), keys.last()) {
                (Some(first), Some(last)) => Some((first.to_vec(), last.to_vec())),
                _ => None,
            }
        } else if let Ok(kids) = node.get(b"Kids").and_then(Object::as_array) {
            let mut low: Option<Vec<u8>> = None;
            let mut high: Option<Vec<u8>> = None;
            for kid in kids {
                let kid_id = kid.as_reference()?;
                if let Some((kid_low, kid_high)) = NameTree::limits(document.get_dictionary(kid_id)?) {
                    low = Some(low.map_or(kid_low.clone(), |l| l.min(kid_low)));
                    high = Some(high.map_or(kid_high.clone(), |h| h.max(kid_high)));
                }
            }
            low.zip(high)
        } else {
            None
        };

        if let Some((low, high)) = bounds {
            // The root node of a name tree carries no /Limits.
            if node_id != path[0] {
                document.get_dictionary_mut(node_id)?.set(
                    "Limits",
                    Object::Array(vec![Object::string_literal(low), Object::string_literal(high)]),
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary;

    fn document_with_catalog() -> (Document, ObjectId) {
        let mut doc = Document::new();
        let catalog = doc.add_object(dictionary! { "Type" => Object::name("Catalog") });
        doc.trailer.set("Root", catalog);
        (doc, catalog)
    }

    #[test]
    fn insert_creates_and_sorts_a_leaf() {
        let (mut doc, _) = document_with_catalog();
        insert(&mut doc, b"Dests", b"zeta", Object::Integer(26)).unwrap();
        insert(&mut doc, b"Dests", b"alpha", Object::Integer(1)).unwrap();
        insert(&mut doc, b"Dests", b"mu", Object::Integer(13)).unwrap();

        assert_eq!(doc.get_named(b"Dests", b"alpha"), Some(Object::Integer(1)));
        assert_eq!(doc.get_named(b"Dests", b"mu"), Some(Object::Integer(13)));
        assert_eq!(doc.get_named(b"Dests", b"zeta"), Some(Object::Integer(26)));
        assert_eq!(doc.get_named(b"Dests", b"nope"), None);

        let tree = NameTree::load(&doc, b"Dests").unwrap();
        let keys: Vec<_> = tree.entries(&doc).into_keys().collect();
        assert_eq!(keys, vec![b"alpha".to_vec(), b"mu".to_vec(), b"zeta".to_vec()]);
    }

    #[test]
    fn replacing_a_key_keeps_one_pair() {
        let (mut doc, _) = document_with_catalog();
        insert(&mut doc, b"Dests", b"key", Object::Integer(1)).unwrap();
        insert(&mut doc, b"Dests", b"key", Object::Integer(2)).unwrap();
        assert_eq!(doc.get_named(b"Dests", b"key"), Some(Object::Integer(2)));
        let tree = NameTree::load(&doc, b"Dests").unwrap();
        assert_eq!(tree.entries(&doc).len(), 1);
    }

    #[test]
    fn lookup_descends_through_kids_by_limits() {
        let (mut doc, _) = document_with_catalog();
        let left = doc.add_object(dictionary! {
            "Limits" => vec!["a".into(), "f".into()],
            "Names" => vec!["a".into(), Object::Integer(1), "f".into(), Object::Integer(6)],
        });
        let right = doc.add_object(dictionary! {
            "Limits" => vec!["g".into(), "z".into()],
            "Names" => vec!["g".into(), Object::Integer(7), "z".into(), Object::Integer(26)],
        });
        let root = doc.add_object(dictionary! {
            "Kids" => vec![left.into(), right.into()],
        });
        let names = doc.add_object(dictionary! { "EmbeddedFiles" => root });
        let catalog_id = doc.trailer.get(b"Root").and_then(Object::as_reference).unwrap();
        doc.get_dictionary_mut(catalog_id).unwrap().set("Names", names);

        assert_eq!(doc.get_named(b"EmbeddedFiles", b"g"), Some(Object::Integer(7)));
        assert_eq!(doc.get_named(b"EmbeddedFiles", b"a"), Some(Object::Integer(1)));
        assert_eq!(doc.get_named(b"EmbeddedFiles", b"m"), None);
    }

    #[test]
    fn insert_into_kids_repairs_limits() {
        let (mut doc, _) = document_with_catalog();
        let left = doc.add_object(dictionary! {
            "Limits" => vec!["b".into(), "f".into()],
            "Names" => vec!["b".into(), Object::Integer(2), "f".into(), Object::Integer(6)],
        });
        let right = doc.add_object(dictionary! {
            "Limits" => vec!["g".into(), "y".into()],
            "Names" => vec!["g".into(), Object::Integer(7), "y".into(), Object::Integer(25)],
        });
        let root = doc.add_object(dictionary! {
            "Kids" => vec![left.into(), right.into()],
        });
        let names = doc.add_object(dictionary! { "Dests" => root });
        let catalog_id = doc.trailer.get(b"Root").and_then(Object::as_reference).unwrap();
        doc.get_dictionary_mut(catalog_id).unwrap().set("Names", names);

        insert(&mut doc, b"Dests", b"a", Object::Integer(1)).unwrap();
        let limits = doc
            .get_dictionary(left)
            .unwrap()
            .get(b"Limits")
            .and_then(Object::as_array)
            .unwrap()
            .clone();
        assert_eq!(limits[0].as_str().unwrap(), b"a");
        assert_eq!(doc.get_named(b"Dests", b"a"), Some(Object::Integer(1)));
    }
}
