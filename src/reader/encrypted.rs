use log::warn;
use std::collections::{HashMap, HashSet};

use super::Reader;
use crate::encryption::{self, EncryptionState};
use crate::error::ParseError;
use crate::object_stream::ObjectStream;
use crate::parser::{self, ParserInput};
use crate::xref::XrefEntry;
use crate::{Error, Object, ObjectId, Result};

impl Reader<'_> {
    /// Loading strategy for encrypted documents: collect every object's raw
    /// bytes first, authenticate, then parse and decrypt in one pass so that
    /// string and stream payloads are only ever interpreted in the clear.
    pub(super) fn load_encrypted_document(&mut self) -> Result<()> {
        let entries: Vec<_> = self
            .document
            .reference_table
            .entries
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect();

        let mut compressed_entries = Vec::new();
        for (object_nr, entry) in entries {
            self.options.check_cancelled()?;
            match entry {
                XrefEntry::Normal { offset, .. } => {
                    if let Ok((object_id, raw_bytes)) = self.extract_raw_object(offset as usize) {
                        self.raw_objects.insert(object_id, raw_bytes);
                    }
                }
                XrefEntry::Compressed { container, index } => {
                    compressed_entries.push((object_nr, container, index));
                }
                XrefEntry::Free { .. } | XrefEntry::UnusableFree => {}
            }
        }

        self.parse_encryption_dictionary()?;
        self.authenticate_and_setup_encryption()?;

        let Some(state) = self.encryption_state.clone() else {
            return Err(Error::InvalidPassword);
        };

        let encrypt_ref = self
            .document
            .trailer
            .get(b"Encrypt")
            .ok()
            .and_then(|o| o.as_reference().ok());

        for (object_id, raw_bytes) in &self.raw_objects {
            if encrypt_ref == Some(*object_id) {
                continue;
            }
            match self.parse_raw_object(raw_bytes) {
                Ok((id, mut object)) => {
                    encryption::decrypt_object(&state, *object_id, &mut object)?;
                    self.document.objects.insert(id, object);
                }
                Err(err) => {
                    warn!("skipping object {} {}: {}", object_id.0, object_id.1, err);
                    if !self.options.is_relaxed() {
                        return Err(err);
                    }
                }
            }
        }

        // Objects inside object streams are never encrypted individually;
        // the container stream was, and has been decrypted above.
        let mut containers: HashMap<u32, Vec<u32>> = HashMap::new();
        for (object_nr, container_id, _index) in compressed_entries {
            containers.entry(container_id).or_default().push(object_nr);
        }
        for (container_id, members) in containers {
            let Some(container) = self.document.objects.remove(&(container_id, 0)) else {
                warn!("object stream {} referenced but not present", container_id);
                continue;
            };
            let stream = container.as_stream()?;
            match ObjectStream::with_limits(stream, &self.options.limits) {
                Ok(unpacked) => {
                    for object_nr in members {
                        if let Some(object) = unpacked.objects.get(&(object_nr, 0)) {
                            self.document.objects.entry((object_nr, 0)).or_insert(object.clone());
                        }
                    }
                }
                Err(err) => {
                    warn!("object stream {} unusable: {}", container_id, err);
                    if !self.options.is_relaxed() {
                        return Err(err);
                    }
                }
            }
        }

        self.document.encryption_state = Some(state);

        // The encryption dictionary is consumed into the state; the trailer
        // entry is restored by the writer.
        if let Some(encrypt_ref) = encrypt_ref {
            self.document.objects.remove(&encrypt_ref);
        }
        self.document.trailer.remove(b"Encrypt");

        Ok(())
    }

    pub(super) fn parse_raw_object(&self, raw_bytes: &[u8]) -> Result<(ObjectId, Object)> {
        parser::indirect_object(
            ParserInput::new_extra(raw_bytes, "indirect object"),
            0,
            None,
            self,
            &mut HashSet::new(),
        )
    }

    /// The `/Encrypt` dictionary has to be parsed ahead of everything else;
    /// it is itself never encrypted.
    pub(super) fn parse_encryption_dictionary(&mut self) -> Result<()> {
        if let Ok(encrypt_ref) = self.document.trailer.get(b"Encrypt").and_then(|o| o.as_reference()) {
            if let Some(raw_bytes) = self.raw_objects.get(&encrypt_ref) {
                if let Ok((_, object)) = self.parse_raw_object(raw_bytes) {
                    self.document.objects.insert(encrypt_ref, object);
                }
            } else {
                let offset = self.get_offset(encrypt_ref)?;
                let (_, encrypt_obj) = self.read_object(offset as usize, Some(encrypt_ref), &mut HashSet::new())?;
                self.document.objects.insert(encrypt_ref, encrypt_obj);
            }
        }
        Ok(())
    }

    /// Try the empty password first (most encrypted files restrict
    /// permissions, not reading), then the caller's passwords.
    pub(super) fn authenticate_and_setup_encryption(&mut self) -> Result<()> {
        let candidates: Vec<Vec<u8>> = [
            Some(vec![]),
            self.options.user_password.clone(),
            self.options.owner_password.clone(),
        ]
        .into_iter()
        .flatten()
        .collect();

        for password in &candidates {
            match EncryptionState::decode(&self.document, password) {
                Ok(state) => {
                    self.encryption_state = Some(state);
                    return Ok(());
                }
                Err(Error::InvalidPassword) => continue,
                Err(err) => return Err(err),
            }
        }

        warn!("no supplied password matches the document's encryption");
        Err(Error::InvalidPassword)
    }

    /// Raw byte span of the object at `offset`, from its `n g obj` header
    /// through `endobj`, without interpreting the payload.
    pub(super) fn extract_raw_object(&mut self, offset: usize) -> Result<(ObjectId, Vec<u8>)> {
        if offset > self.buffer.len() {
            return Err(Error::InvalidOffset(offset));
        }

        let slice = &self.buffer[offset..];
        let mut pos = 0;
        let mut skip_whitespace = |pos: &mut usize| {
            while *pos < slice.len() && slice[*pos].is_ascii_whitespace() {
                *pos += 1;
            }
        };

        skip_whitespace(&mut pos);
        let number_start = pos;
        while pos < slice.len() && slice[pos].is_ascii_digit() {
            pos += 1;
        }
        let object_nr: u32 = std::str::from_utf8(&slice[number_start..pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(Error::Parse(ParseError::InvalidXref))?;

        skip_whitespace(&mut pos);
        let generation_start = pos;
        while pos < slice.len() && slice[pos].is_ascii_digit() {
            pos += 1;
        }
        let generation: u16 = std::str::from_utf8(&slice[generation_start..pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(Error::Parse(ParseError::InvalidXref))?;

        skip_whitespace(&mut pos);
        if pos + 3 > slice.len() || &slice[pos..pos + 3] != b"obj" {
            return Err(Error::Parse(ParseError::InvalidXref));
        }
        pos += 3;

        let endobj_pattern = b"endobj";
        let mut end_pos = pos;
        while end_pos + endobj_pattern.len() <= slice.len() {
            if &slice[end_pos..end_pos + endobj_pattern.len()] == endobj_pattern {
                end_pos += endobj_pattern.len();
                break;
            }
            end_pos += 1;
        }
        if end_pos > slice.len() {
            return Err(Error::Parse(ParseError::InvalidXref));
        }

        Ok(((object_nr, generation), slice[..end_pos].to_vec()))
    }
}
