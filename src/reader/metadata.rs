use std::collections::HashSet;

use super::Reader;
use crate::error::ParseError;
use crate::parser::{self, ParserInput};
use crate::{Dictionary, Object, ObjectId, Result};

/// Document metadata extracted without loading the entire object graph.
/// Only the trailer, the Info dictionary and the page tree are resolved,
/// each lazily through the cross-reference table.
#[derive(Debug, Clone, Default)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    /// PDF date strings (`D:YYYYMMDDHHmmSSOHH'mm'`), verbatim.
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub page_count: u32,
    pub version: String,
}

impl Reader<'_> {
    /// Read metadata only. For encrypted documents the options must carry a
    /// valid password.
    pub fn read_metadata(mut self) -> Result<DocumentMetadata> {
        let offset = self.buffer.windows(5).position(|w| w == b"%PDF-").unwrap_or(0);
        self.buffer = &self.buffer[offset..];

        let version =
            parser::header(ParserInput::new_extra(self.buffer, "header")).ok_or(ParseError::InvalidFileHeader)?;

        let (mut xref, trailer) = self.read_xref_chain()?;
        let xref_entry_count = xref.max_id().checked_add(1).ok_or(ParseError::InvalidXref)?;
        xref.size = xref.size.max(xref_entry_count);

        self.document.reference_table = xref;
        self.document.trailer = trailer;

        if self.document.trailer.get(b"Encrypt").is_ok() {
            self.parse_encryption_dictionary()?;
            self.authenticate_and_setup_encryption()?;
        }

        let info = self.extract_info_metadata();
        let page_count = self.extract_page_count()?;

        Ok(DocumentMetadata {
            page_count,
            version,
            ..info
        })
    }

    /// Info dictionary strings; every field is optional and failure to
    /// resolve any of them just leaves the field empty.
    pub(super) fn extract_info_metadata(&self) -> DocumentMetadata {
        let info_dict = self
            .document
            .trailer
            .get(b"Info")
            .ok()
            .and_then(|info| info.as_reference().ok())
            .and_then(|id| self.get_object(id, &mut HashSet::new()).ok())
            .and_then(|object| object.as_dict().cloned().ok());

        let Some(dict) = info_dict else {
            return DocumentMetadata::default();
        };

        DocumentMetadata {
            title: Self::extract_string_field(&dict, b"Title"),
            author: Self::extract_string_field(&dict, b"Author"),
            subject: Self::extract_string_field(&dict, b"Subject"),
            keywords: Self::extract_string_field(&dict, b"Keywords"),
            creator: Self::extract_string_field(&dict, b"Creator"),
            producer: Self::extract_string_field(&dict, b"Producer"),
            creation_date: Self::extract_string_field(&dict, b"CreationDate"),
            modification_date: Self::extract_string_field(&dict, b"ModDate"),
            ..DocumentMetadata::default()
        }
    }

    fn extract_string_field(dict: &Dictionary, key: &[u8]) -> Option<String> {
        dict.get(key).ok()?.as_text_string().ok()
    }

    /// Page count from the page tree, resolving only the tree nodes.
    pub(super) fn extract_page_count(&self) -> Result<u32> {
        let root_ref = match self.document.trailer.get(b"Root").and_then(Object::as_reference) {
            Ok(id) => id,
            Err(_) => return Ok(0),
        };

        let catalog = match self.get_object(root_ref, &mut HashSet::new()) {
            Ok(object) => object,
            Err(_) => return Ok(0),
        };
        let pages_ref = match catalog
            .as_dict()
            .and_then(|catalog| catalog.get(b"Pages"))
            .and_then(Object::as_reference)
        {
            Ok(id) => id,
            Err(_) => return Ok(0),
        };

        self.get_pages_tree_count(pages_ref, &mut HashSet::new()).or(Ok(0))
    }

    fn get_pages_tree_count(&self, pages_id: ObjectId, seen: &mut HashSet<ObjectId>) -> Result<u32> {
        if !seen.insert(pages_id) {
            return Err(crate::Error::ReferenceCycle(pages_id));
        }

        let node = match self.get_object(pages_id, &mut HashSet::new()) {
            Ok(object) => object,
            Err(_) => return Ok(0),
        };
        let Ok(dict) = node.as_dict() else {
            return Ok(0);
        };

        match dict.get_type() {
            Ok(node_type) if node_type == b"Pages" => {
                // Trust /Count when present; otherwise sum the kids.
                if let Ok(count) = dict.get(b"Count").and_then(Object::as_i64) {
                    if count >= 0 {
                        return Ok(count as u32);
                    }
                }
                let Ok(kids) = dict.get(b"Kids").and_then(Object::as_array) else {
                    return Ok(0);
                };
                let mut total = 0u32;
                for kid in kids {
                    if let Ok(kid_ref) = kid.as_reference() {
                        total += self.get_pages_tree_count(kid_ref, seen).unwrap_or(0);
                    }
                }
                Ok(total)
            }
            _ => Ok(1),
        }
    }
}
