use log::warn;
use rand::RngCore;
use std::cell::{OnceCell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::encryption::{EncryptionSettings, EncryptionState};
use crate::error::DecryptionError;
use crate::name_tree::NameTree;
use crate::object::{Dictionary, Object, ObjectId, StringFormat};
use crate::xref::{Xref, XrefType};
use crate::{Error, Result};

/// An in-memory PDF document: the full object graph, the cross-reference
/// table it was loaded through, and the trailer that ties them together.
///
/// A document is owned by exactly one caller at a time; there is no internal
/// locking. Cross-object links are `Object::Reference` values resolved
/// through [`Document::get_object`], so cyclic page trees and annotation
/// back-references need no shared ownership.
#[derive(Debug, Clone)]
pub struct Document {
    /// The version of the PDF specification from the file header.
    pub version: String,
    /// The binary comment bytes from the second line, if any.
    pub binary_mark: Vec<u8>,
    /// The trailer dictionary: Root, Info, ID, Size, Prev.
    pub trailer: Dictionary,
    /// The cross-reference table.
    pub reference_table: Xref,
    /// The objects, keyed by (object number, generation).
    pub objects: BTreeMap<ObjectId, Object>,
    /// Current maximum object number.
    pub max_id: u32,
    /// Byte offset of the active cross-reference section in the source file.
    pub xref_start: usize,
    /// Present when the source was encrypted or encryption was requested;
    /// object payloads in `objects` are always held decrypted.
    pub encryption_state: Option<EncryptionState>,

    page_count: OnceCell<u32>,
    name_trees: RefCell<BTreeMap<Vec<u8>, NameTree>>,
}

impl Document {
    pub fn new() -> Document {
        Document {
            version: "1.4".to_string(),
            binary_mark: vec![],
            trailer: Dictionary::new(),
            reference_table: Xref::new(1, XrefType::CrossReferenceTable),
            objects: BTreeMap::new(),
            max_id: 0,
            xref_start: 0,
            encryption_state: None,
            page_count: OnceCell::new(),
            name_trees: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn with_version<S: Into<String>>(version: S) -> Document {
        let mut document = Self::new();
        document.version = version.into();
        document
    }

    /// `major.minor` of a version string; unknown strings read as 0.0.
    fn version_pair(version: &str) -> (u8, u8) {
        let mut parts = version.splitn(2, '.');
        let major = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        (major, minor)
    }

    /// The version that governs feature decisions: the later of the header
    /// version and the catalog's `/Version` entry.
    pub fn effective_version(&self) -> String {
        let header = Self::version_pair(&self.version);
        let root = self
            .catalog()
            .ok()
            .and_then(|catalog| catalog.get(b"Version").ok())
            .and_then(|v| v.as_name().ok())
            .map(|name| String::from_utf8_lossy(name).into_owned());
        match root {
            Some(root_version) if Self::version_pair(&root_version) > header => root_version,
            _ => self.version.clone(),
        }
    }

    /// Raise the header version to at least `floor`.
    pub fn ensure_version_at_least(&mut self, floor: &str) {
        if Self::version_pair(&self.version) < Self::version_pair(floor) {
            self.version = floor.to_string();
        }
    }

    pub fn get_object(&self, id: ObjectId) -> Result<&Object> {
        self.objects.get(&id).ok_or(Error::ObjectNotFound(id))
    }

    pub fn get_object_mut(&mut self, id: ObjectId) -> Result<&mut Object> {
        self.objects.get_mut(&id).ok_or(Error::ObjectNotFound(id))
    }

    pub fn has_object(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Follow reference chains until a concrete object, guarding cycles.
    pub fn dereference<'a>(&'a self, object: &'a Object) -> Result<(Option<ObjectId>, &'a Object)> {
        let mut seen = HashSet::new();
        let mut id = None;
        let mut current = object;
        while let Object::Reference(reference) = current {
            if !seen.insert(*reference) {
                return Err(Error::ReferenceCycle(*reference));
            }
            id = Some(*reference);
            current = self.get_object(*reference)?;
        }
        Ok((id, current))
    }

    pub fn get_dictionary(&self, id: ObjectId) -> Result<&Dictionary> {
        self.get_object(id).and_then(Object::as_dict)
    }

    pub fn get_dictionary_mut(&mut self, id: ObjectId) -> Result<&mut Dictionary> {
        self.get_object_mut(id).and_then(Object::as_dict_mut)
    }

    /// Store `object` under a fresh object number.
    pub fn add_object<T: Into<Object>>(&mut self, object: T) -> ObjectId {
        self.max_id += 1;
        let id = (self.max_id, 0);
        self.objects.insert(id, object.into());
        id
    }

    /// Store `object`, reusing a slot from the free list when one exists.
    /// The recycled slot keeps its bumped generation number.
    pub fn add_object_recycled<T: Into<Object>>(&mut self, object: T) -> ObjectId {
        match self.reference_table.recycle() {
            Some((number, generation)) => {
                let id = (number, generation);
                self.objects.insert(id, object.into());
                id
            }
            None => self.add_object(object),
        }
    }

    /// Remove an object and push its number onto the free list.
    pub fn delete_object(&mut self, id: ObjectId) -> Option<Object> {
        let removed = self.objects.remove(&id);
        if removed.is_some() {
            self.reference_table.free(id.0);
            self.page_count = OnceCell::new();
        }
        removed
    }

    /// The catalog dictionary the trailer's `/Root` points at.
    pub fn catalog(&self) -> Result<&Dictionary> {
        self.trailer
            .get(b"Root")
            .and_then(Object::as_reference)
            .and_then(|id| self.get_dictionary(id))
    }

    pub fn catalog_mut(&mut self) -> Result<&mut Dictionary> {
        let id = self.trailer.get(b"Root").and_then(Object::as_reference)?;
        self.get_dictionary_mut(id)
    }

    /// The Info dictionary, if the trailer names one.
    pub fn info(&self) -> Result<&Dictionary> {
        let (_, info) = self.dereference(self.trailer.get(b"Info")?)?;
        info.as_dict()
    }

    /// Page object ids in display order, keyed by 1-based page number.
    pub fn get_pages(&self) -> BTreeMap<u32, ObjectId> {
        self.page_iter().enumerate().map(|(i, id)| (i as u32 + 1, id)).collect()
    }

    pub fn page_iter(&self) -> impl Iterator<Item = ObjectId> + '_ {
        let mut pages = Vec::new();
        if let Ok(catalog) = self.catalog() {
            if let Ok(root) = catalog.get(b"Pages").and_then(Object::as_reference) {
                self.collect_pages(root, &mut pages, &mut HashSet::new());
            }
        }
        pages.into_iter()
    }

    fn collect_pages(&self, node_id: ObjectId, pages: &mut Vec<ObjectId>, seen: &mut HashSet<ObjectId>) {
        if !seen.insert(node_id) {
            warn!("page tree contains a cycle through object {} {}", node_id.0, node_id.1);
            return;
        }
        let Ok(node) = self.get_dictionary(node_id) else {
            return;
        };
        match node.get_type() {
            Ok(node_type) if node_type == b"Pages" => {
                if let Ok(kids) = node.get(b"Kids").and_then(Object::as_array) {
                    for kid in kids {
                        if let Ok(kid_id) = kid.as_reference() {
                            self.collect_pages(kid_id, pages, seen);
                        }
                    }
                }
            }
            // A leaf node, even when its /Type is missing or wrong.
            _ => pages.push(node_id),
        }
    }

    /// Number of pages, computed once and cached.
    pub fn page_count(&self) -> u32 {
        *self.page_count.get_or_init(|| self.page_iter().count() as u32)
    }

    /// Find one entry in the catalog's `/Names` tree of the given kind
    /// ("Dests", "EmbeddedFiles", ...). Trees are materialized lazily and
    /// cached for later lookups.
    pub fn get_named(&self, kind: &[u8], key: &[u8]) -> Option<Object> {
        let mut cache = self.name_trees.borrow_mut();
        if !cache.contains_key(kind) {
            let tree = NameTree::load(self, kind).ok()?;
            cache.insert(kind.to_vec(), tree);
        }
        cache.get(kind).and_then(|tree| tree.locate(self, key))
    }

    pub(crate) fn clear_name_tree_cache(&self) {
        self.name_trees.borrow_mut().clear();
    }

    /// The Encrypt dictionary from the trailer, direct or indirect.
    pub fn get_encrypt_dict(&self) -> Result<&Dictionary> {
        let encrypt = self
            .trailer
            .get(b"Encrypt")
            .map_err(|_| Error::Decryption(DecryptionError::MissingEncryptDictionary))?;
        let (_, object) = self.dereference(encrypt)?;
        object.as_dict()
    }

    pub fn is_encrypted(&self) -> bool {
        self.trailer.get(b"Encrypt").is_ok() || self.encryption_state.is_some()
    }

    /// Check a password against the document's encryption dictionary.
    pub fn authenticate_password(&self, password: &[u8]) -> Result<()> {
        EncryptionState::decode(self, password).map(|_| ())
    }

    /// Arrange for the document to be encrypted when it is next saved.
    /// Objects in memory stay in the clear.
    pub fn encrypt(&mut self, settings: &EncryptionSettings) -> Result<()> {
        if self.trailer.get(b"ID").is_err() {
            self.refresh_document_id();
        }
        let file_id = self.first_file_id().unwrap_or_default();
        self.encryption_state = Some(EncryptionState::from_settings(settings, &file_id)?);
        Ok(())
    }

    /// Drop encryption; the next save produces a plaintext document.
    pub fn decrypt(&mut self) -> Result<()> {
        match self.encryption_state.take() {
            Some(state) => {
                if !state.owner_authenticated {
                    self.encryption_state = Some(state);
                    return Err(Error::PermissionDenied("remove encryption"));
                }
                self.trailer.remove(b"Encrypt");
                Ok(())
            }
            None => Err(Error::Decryption(DecryptionError::NotEncrypted)),
        }
    }

    pub fn change_user_password(&mut self, new_password: &[u8]) -> Result<()> {
        let file_id = self.first_file_id().unwrap_or_default();
        let state = self
            .encryption_state
            .as_mut()
            .ok_or(Error::Decryption(DecryptionError::NotEncrypted))?;
        state.change_user_password(new_password, &file_id)
    }

    pub fn change_owner_password(&mut self, new_password: &[u8]) -> Result<()> {
        let file_id = self.first_file_id().unwrap_or_default();
        let state = self
            .encryption_state
            .as_mut()
            .ok_or(Error::Decryption(DecryptionError::NotEncrypted))?;
        state.change_owner_password(new_password, &file_id)
    }

    pub(crate) fn first_file_id(&self) -> Option<Vec<u8>> {
        self.trailer
            .get(b"ID")
            .and_then(Object::as_array)
            .ok()
            .and_then(|id| id.first())
            .and_then(|first| first.as_str().ok())
            .map(<[u8]>::to_vec)
    }

    /// Replace the `/ID` pair with fresh random bytes.
    pub fn refresh_document_id(&mut self) {
        let mut id = [0u8; 16];
        rand::rng().fill_bytes(&mut id);
        let id = Object::String(id.to_vec(), StringFormat::Hexadecimal);
        self.trailer.set("ID", Object::Array(vec![id.clone(), id]));
    }

    /// Every id directly referenced from `object`.
    pub fn collect_references(object: &Object, out: &mut Vec<ObjectId>) {
        match object {
            Object::Reference(id) => out.push(*id),
            Object::Array(items) => {
                for item in items {
                    Self::collect_references(item, out);
                }
            }
            Object::Dictionary(dict) => {
                for (_, value) in dict {
                    Self::collect_references(value, out);
                }
            }
            Object::Stream(stream) => {
                for (_, value) in &stream.dict {
                    Self::collect_references(value, out);
                }
            }
            _ => {}
        }
    }

    /// Objects reachable from the trailer, in deterministic depth-first
    /// order.
    pub fn reachable_objects(&self) -> Vec<ObjectId> {
        let mut order = Vec::new();
        let mut seen = BTreeSet::new();
        let mut stack = Vec::new();

        let trailer_object = Object::Dictionary(self.trailer.clone());
        let mut roots = Vec::new();
        Self::collect_references(&trailer_object, &mut roots);
        // Depth-first from each trailer root in turn, catalog first.
        for root in roots {
            stack.push(root);
            while let Some(id) = stack.pop() {
                if !seen.insert(id) {
                    continue;
                }
                let Ok(object) = self.get_object(id) else {
                    warn!("dangling reference to object {} {}", id.0, id.1);
                    seen.remove(&id);
                    continue;
                };
                order.push(id);
                let mut children = Vec::new();
                Self::collect_references(object, &mut children);
                // Reverse so the first child is visited first.
                for child in children.into_iter().rev() {
                    stack.push(child);
                }
            }
        }
        order
    }

    /// Delete objects not reachable from the trailer. Returns the freed ids.
    pub fn prune_unreachable_objects(&mut self) -> Vec<ObjectId> {
        let reachable: BTreeSet<ObjectId> = self.reachable_objects().into_iter().collect();
        let doomed: Vec<ObjectId> = self
            .objects
            .keys()
            .filter(|id| !reachable.contains(*id))
            .copied()
            .collect();
        for id in &doomed {
            self.delete_object(*id);
        }
        doomed
    }

    /// Renumber objects consecutively from 1, in reachability order,
    /// rewriting every reference. Unreachable objects keep trailing numbers.
    pub fn renumber_objects(&mut self) {
        let mut mapping: BTreeMap<ObjectId, ObjectId> = BTreeMap::new();
        let mut next = 1u32;
        for id in self.reachable_objects() {
            mapping.insert(id, (next, 0));
            next += 1;
        }
        for id in self.objects.keys().copied().collect::<Vec<_>>() {
            if !mapping.contains_key(&id) {
                mapping.insert(id, (next, 0));
                next += 1;
            }
        }

        let mut renumbered = BTreeMap::new();
        for (old_id, mut object) in std::mem::take(&mut self.objects) {
            Self::rewrite_references(&mut object, &mapping);
            renumbered.insert(mapping[&old_id], object);
        }
        self.objects = renumbered;

        let mut trailer_object = Object::Dictionary(std::mem::take(&mut self.trailer));
        Self::rewrite_references(&mut trailer_object, &mapping);
        if let Object::Dictionary(trailer) = trailer_object {
            self.trailer = trailer;
        }

        self.max_id = next - 1;
        self.reference_table.clear();
        self.clear_name_tree_cache();
    }

    fn rewrite_references(object: &mut Object, mapping: &BTreeMap<ObjectId, ObjectId>) {
        match object {
            Object::Reference(id) => {
                if let Some(new_id) = mapping.get(id) {
                    *id = *new_id;
                }
            }
            Object::Array(items) => {
                for item in items {
                    Self::rewrite_references(item, mapping);
                }
            }
            Object::Dictionary(dict) => {
                for (_, value) in dict.iter_mut() {
                    Self::rewrite_references(value, mapping);
                }
            }
            Object::Stream(stream) => {
                for (_, value) in stream.dict.iter_mut() {
                    Self::rewrite_references(value, mapping);
                }
            }
            _ => {}
        }
    }

    /// Flate-compress every stream that allows it.
    pub fn compress(&mut self) {
        for object in self.objects.values_mut() {
            if let Object::Stream(stream) = object {
                if stream.allows_compression {
                    if let Err(err) = stream.compress() {
                        warn!("stream compression skipped: {}", err);
                    }
                }
            }
        }
    }

    /// Decode every stream in place, dropping filters.
    pub fn decompress(&mut self) {
        for object in self.objects.values_mut() {
            if let Object::Stream(stream) = object {
                if let Err(err) = stream.decompress() {
                    warn!("stream left encoded: {}", err);
                }
            }
        }
    }

}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary;

    fn two_page_document() -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = (doc.max_id + 3, 0);
        let page1 = doc.add_object(dictionary! {
            "Type" => Object::name("Page"),
            "Parent" => pages_id,
        });
        let page2 = doc.add_object(dictionary! {
            "Type" => Object::name("Page"),
            "Parent" => pages_id,
        });
        let kids = vec![page1.into(), page2.into()];
        let pages = doc.add_object(dictionary! {
            "Type" => Object::name("Pages"),
            "Kids" => kids,
            "Count" => 2,
        });
        assert_eq!(pages, pages_id);
        let catalog = doc.add_object(dictionary! {
            "Type" => Object::name("Catalog"),
            "Pages" => pages,
        });
        doc.trailer.set("Root", catalog);
        doc
    }

    #[test]
    fn page_walk_and_count() {
        let doc = two_page_document();
        assert_eq!(doc.page_count(), 2);
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[&1], (1, 0));
        assert_eq!(pages[&2], (2, 0));
    }

    #[test]
    fn delete_then_recycle_reuses_the_slot() {
        let mut doc = two_page_document();
        let extra = doc.add_object(Object::Integer(1));
        doc.delete_object(extra);
        let recycled = doc.add_object_recycled(Object::Integer(2));
        assert_eq!(recycled.0, extra.0);
        assert_eq!(recycled.1, extra.1 + 1);
    }

    #[test]
    fn dereference_follows_chains() {
        let mut doc = Document::new();
        let target = doc.add_object(Object::Integer(7));
        let hop = doc.add_object(Object::Reference(target));
        let hop_ref = Object::Reference(hop);
        let (id, value) = doc.dereference(&hop_ref).unwrap();
        assert_eq!(id, Some(target));
        assert_eq!(value, &Object::Integer(7));
    }

    #[test]
    fn dereference_detects_cycles() {
        let mut doc = Document::new();
        let a = doc.add_object(Object::Null);
        let b = doc.add_object(Object::Reference(a));
        *doc.get_object_mut(a).unwrap() = Object::Reference(b);
        assert!(matches!(
            doc.dereference(&Object::Reference(a)),
            Err(Error::ReferenceCycle(_))
        ));
    }

    #[test]
    fn effective_version_prefers_later_catalog_version() {
        let mut doc = two_page_document();
        assert_eq!(doc.effective_version(), "1.5");
        doc.catalog_mut().unwrap().set("Version", Object::name("1.7"));
        assert_eq!(doc.effective_version(), "1.7");
        doc.catalog_mut().unwrap().set("Version", Object::name("1.2"));
        assert_eq!(doc.effective_version(), "1.5");
    }

    #[test]
    fn unreachable_objects_are_pruned() {
        let mut doc = two_page_document();
        let orphan = doc.add_object(Object::string_literal("orphan"));
        let doomed = doc.prune_unreachable_objects();
        assert_eq!(doomed, vec![orphan]);
        assert!(doc.get_object(orphan).is_err());
        assert_eq!(doc.page_count(), 2);
    }

    #[test]
    fn renumbering_rewrites_references() {
        let mut doc = two_page_document();
        doc.renumber_objects();
        assert_eq!(doc.page_count(), 2);
        let catalog_id = doc.trailer.get(b"Root").and_then(Object::as_reference).unwrap();
        // The catalog is the first trailer root, so it gets number 1.
        assert_eq!(catalog_id, (1, 0));
        let pages_id = doc
            .catalog()
            .unwrap()
            .get(b"Pages")
            .and_then(Object::as_reference)
            .unwrap();
        assert!(doc.get_dictionary(pages_id).unwrap().has_type(b"Pages"));
    }
}
