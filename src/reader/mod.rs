mod encrypted;
mod load;
mod metadata;
mod object_loader;

#[cfg(test)]
mod tests;

use log::{error, warn};
use std::cmp;
use std::collections::{BTreeMap, HashSet};

use crate::config::LoadOptions;
use crate::encryption::EncryptionState;
use crate::error::{ParseError, XrefError};
use crate::object_stream::ObjectStream;
use crate::parser::{self, ParserInput};
use crate::xref::{Xref, XrefEntry, XrefType};
use crate::{Dictionary, Document, Error, Object, ObjectId, Result};

pub use metadata::DocumentMetadata;

/// Maximum allowed embedding of literal strings.
pub const MAX_BRACKET: usize = 100;

/// How far into the file the `%PDF-` marker may sit in relaxed mode, and how
/// far back from the end the `startxref` keyword is searched for.
const HEADER_SCAN_WINDOW: usize = 1024;

pub struct Reader<'a> {
    pub buffer: &'a [u8],
    pub document: Document,
    pub options: LoadOptions,
    pub encryption_state: Option<EncryptionState>,
    pub(crate) raw_objects: BTreeMap<ObjectId, Vec<u8>>,
}

impl<'a> Reader<'a> {
    pub fn new(buffer: &'a [u8], options: LoadOptions) -> Reader<'a> {
        Reader {
            buffer,
            document: Document::new(),
            options,
            encryption_state: None,
            raw_objects: BTreeMap::new(),
        }
    }

    /// Read the whole document.
    pub fn read(mut self) -> Result<Document> {
        // The document structure can be expressed in PEG as:
        //   document <- header indirect_object* xref trailer xref_start
        let offset = self
            .buffer
            .windows(5)
            .take(HEADER_SCAN_WINDOW)
            .position(|w| w == b"%PDF-")
            .ok_or(ParseError::InvalidFileHeader)?;
        if offset != 0 {
            if !self.options.is_relaxed() {
                return Err(Error::Parse(ParseError::InvalidFileHeader));
            }
            warn!("{} bytes of leading garbage before the file header", offset);
        }
        self.buffer = &self.buffer[offset..];

        let version =
            parser::header(ParserInput::new_extra(self.buffer, "header")).ok_or(ParseError::InvalidFileHeader)?;
        Self::reject_unsupported_version(&version)?;

        // The binary mark sits on line 2, directly after the version.
        if let Some(pos) = self.buffer.iter().position(|&byte| byte == b'\n') {
            if let Some(binary_mark) =
                parser::binary_mark(ParserInput::new_extra(&self.buffer[pos + 1..], "binary_mark"))
            {
                if !binary_mark.is_empty() && binary_mark.iter().all(|&byte| byte >= 128) {
                    self.document.binary_mark = binary_mark;
                }
            }
        }

        let (mut xref, trailer) = match self.read_xref_chain() {
            Ok(result) => result,
            Err(err) if self.options.is_relaxed() => {
                warn!("cross-reference structure unusable ({}), rebuilding by linear scan", err);
                self.reconstruct_xref()?
            }
            Err(err) => return Err(err),
        };

        let xref_entry_count = xref.max_id().checked_add(1).ok_or(ParseError::InvalidXref)?;
        if xref.size != xref_entry_count {
            warn!(
                "Size entry of trailer dictionary is {}, correct value is {}.",
                xref.size, xref_entry_count
            );
            xref.size = xref_entry_count;
        }

        self.document.version = version;
        self.document.max_id = xref.size - 1;
        self.document.trailer = trailer;
        self.document.reference_table = xref;

        if self.document.trailer.get(b"Encrypt").is_ok() {
            // Encrypted documents need authentication before their string
            // and stream payloads can be interpreted.
            self.load_encrypted_document()?;
        } else {
            self.load_objects_raw()?;
        }

        Self::reject_unsupported_version(&self.document.effective_version())?;

        Ok(self.document)
    }

    fn reject_unsupported_version(version: &str) -> Result<()> {
        let supported = matches!(version.as_bytes(), [b'1', b'.', minor] if minor.is_ascii_digit());
        if supported {
            Ok(())
        } else {
            Err(Error::UnsupportedVersion(version.to_string()))
        }
    }

    /// Walk the `startxref` offset and every `/Prev` (and hybrid `/XRefStm`)
    /// section, newest first.
    fn read_xref_chain(&mut self) -> Result<(Xref, Dictionary)> {
        let xref_start = Self::get_xref_start(self.buffer, self.options.is_relaxed())?;
        if xref_start > self.buffer.len() {
            return Err(Error::Xref(XrefError::Start));
        }
        self.document.xref_start = xref_start;

        let (mut xref, mut trailer) =
            parser::xref_and_trailer(ParserInput::new_extra(&self.buffer[xref_start..], "xref"), self)?;

        // Previous sections of linearized or incrementally updated files.
        let mut already_seen = HashSet::new();
        let mut prev_xref_start = trailer.remove(b"Prev");
        while let Some(prev) = prev_xref_start.and_then(|offset| offset.as_i64().ok()) {
            if already_seen.contains(&prev) {
                break;
            }
            already_seen.insert(prev);
            if prev < 0 || prev as usize > self.buffer.len() {
                return Err(Error::Xref(XrefError::PrevStart));
            }

            let (prev_xref, prev_trailer) =
                parser::xref_and_trailer(ParserInput::new_extra(&self.buffer[prev as usize..], ""), self)?;
            xref.merge(prev_xref);

            // Cross-reference stream of a hybrid-reference file.
            let prev_xref_stream_start = trailer.remove(b"XRefStm");
            if let Some(prev) = prev_xref_stream_start.and_then(|offset| offset.as_i64().ok()) {
                if prev < 0 || prev as usize > self.buffer.len() {
                    return Err(Error::Xref(XrefError::StreamStart));
                }

                let (prev_xref, _) =
                    parser::xref_and_trailer(ParserInput::new_extra(&self.buffer[prev as usize..], ""), self)?;
                xref.merge(prev_xref);
            }

            prev_xref_start = prev_trailer.get(b"Prev").cloned().ok();
        }

        Ok((xref, trailer))
    }

    /// Relaxed-mode recovery: sweep the whole file for `n g obj` headers and
    /// rebuild the table from what is actually present. Later definitions
    /// win, matching incremental-update semantics.
    fn reconstruct_xref(&mut self) -> Result<(Xref, Dictionary)> {
        let mut xref = Xref::new(0, XrefType::CrossReferenceTable);
        let mut found = 0usize;

        let mut pos = 0usize;
        while let Some(hit) = Self::search_forward(self.buffer, b"obj", pos) {
            pos = hit + 3;
            if self.buffer.get(hit + 3).is_some_and(|c| c.is_ascii_alphanumeric()) {
                continue;
            }
            let Some((start, id)) = Self::object_header_before(self.buffer, hit) else {
                continue;
            };
            xref.insert(
                id.0,
                XrefEntry::Normal {
                    offset: start as u64,
                    generation: id.1,
                },
            );
            found += 1;
        }
        if found == 0 {
            return Err(Error::Xref(XrefError::Start));
        }
        warn!("cross-reference table rebuilt from {} scanned objects", found);

        // Newer trailers override older ones key by key.
        let mut trailer = Dictionary::new();
        let mut scan = 0usize;
        while let Some(hit) = Self::search_forward(self.buffer, b"trailer", scan) {
            scan = hit + 7;
            if let Some(dict) = parser::trailer_at(ParserInput::new_extra(&self.buffer[hit..], "trailer")) {
                for (key, value) in &dict {
                    trailer.set(key.clone(), value.clone());
                }
            }
        }
        trailer.remove(b"Prev");
        trailer.remove(b"XRefStm");

        if trailer.get(b"Root").is_err() {
            // No trailer survived; look for the catalog among the scanned
            // objects.
            let entries: Vec<(u32, u16, u64)> = xref
                .entries
                .iter()
                .filter_map(|(id, entry)| match entry {
                    XrefEntry::Normal { offset, generation } => Some((*id, *generation, *offset)),
                    _ => None,
                })
                .collect();
            for (id, generation, offset) in entries {
                let parsed = parser::indirect_object(
                    ParserInput::new_extra(self.buffer, "scan"),
                    offset as usize,
                    Some((id, generation)),
                    self,
                    &mut HashSet::new(),
                );
                if let Ok((object_id, object)) = parsed {
                    if object.as_dict().map(|d| d.has_type(b"Catalog")).unwrap_or(false) {
                        trailer.set("Root", object_id);
                        break;
                    }
                }
            }
        }
        if trailer.get(b"Root").is_err() {
            return Err(Error::Parse(ParseError::InvalidTrailer));
        }

        xref.size = xref.max_id() + 1;
        trailer.set("Size", xref.size as i64);
        Ok((xref, trailer))
    }

    /// Parse `n g ` immediately before the `obj` keyword ending at `end`,
    /// returning the header's starting offset and object id.
    fn object_header_before(buffer: &[u8], end: usize) -> Option<(usize, ObjectId)> {
        fn eat_back(buffer: &[u8], mut pos: usize, pred: fn(u8) -> bool) -> Option<usize> {
            let stop = pos;
            while pos > 0 && pred(buffer[pos - 1]) {
                pos -= 1;
            }
            (pos != stop).then_some(pos)
        }
        let is_sep: fn(u8) -> bool = |c| matches!(c, b' ' | b'\r' | b'\n' | b'\t');
        let is_digit: fn(u8) -> bool = |c| c.is_ascii_digit();

        let gen_end = eat_back(buffer, end, is_sep)?;
        let gen_start = eat_back(buffer, gen_end, is_digit)?;
        let nr_end = eat_back(buffer, gen_start, is_sep)?;
        let nr_start = eat_back(buffer, nr_end, is_digit)?;

        let number: u32 = std::str::from_utf8(&buffer[nr_start..nr_end]).ok()?.parse().ok()?;
        let generation: u16 = std::str::from_utf8(&buffer[gen_start..gen_end]).ok()?.parse().ok()?;
        if number == 0 {
            return None;
        }
        Some((nr_start, (number, generation)))
    }

    fn load_objects_raw(&mut self) -> Result<()> {
        let mut zero_length_streams = vec![];
        let mut object_streams: BTreeMap<ObjectId, Object> = BTreeMap::new();

        let entries: Vec<(u32, XrefEntry)> = self
            .document
            .reference_table
            .entries
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect();

        for (id, entry) in entries {
            self.options.check_cancelled()?;
            let XrefEntry::Normal { offset, generation } = entry else {
                continue;
            };
            // Strict mode holds the file to its own table: the object parsed
            // at an entry's offset must carry that entry's id.
            let expected = (!self.options.is_relaxed()).then_some((id, generation));
            let (object_id, mut object) = match self.read_object(offset as usize, expected, &mut HashSet::new()) {
                Ok(parsed) => parsed,
                Err(e) => {
                    error!("object load error at offset {}: {e:?}", offset);
                    if self.options.is_relaxed() {
                        continue;
                    }
                    return Err(e);
                }
            };

            if let Ok(stream) = object.as_stream_mut() {
                if stream.dict.has_type(b"ObjStm") {
                    match ObjectStream::with_limits(stream, &self.options.limits) {
                        Ok(unpacked) => {
                            object_streams.extend(unpacked.objects);
                            // The container has served its purpose; its
                            // entries live on as plain objects.
                            continue;
                        }
                        Err(e) => {
                            warn!("object stream {} {} unusable: {}", object_id.0, object_id.1, e);
                            if !self.options.is_relaxed() {
                                return Err(e);
                            }
                        }
                    }
                } else if stream.content.is_empty() && stream.start_position.is_some() {
                    zero_length_streams.push(object_id);
                }
            }

            self.document.objects.insert(object_id, object);
        }

        // Per the specification, the first definition wins for duplicate
        // object numbers, and direct objects shadow compressed ones.
        for (id, object) in object_streams {
            self.document.objects.entry(id).or_insert(object);
        }

        for object_id in zero_length_streams {
            let _ = self.read_stream_content(object_id);
        }

        Ok(())
    }

    fn get_xref_start(buffer: &[u8], relaxed: bool) -> Result<usize> {
        let seek_pos = buffer.len() - cmp::min(buffer.len(), HEADER_SCAN_WINDOW);
        Self::search_substring(buffer, b"%%EOF", seek_pos)
            // Trailing garbage after %%EOF is only forgiven in relaxed mode.
            .or_else(|| relaxed.then(|| Self::search_substring(buffer, b"%%EOF", 0)).flatten())
            .and_then(|eof_pos| if eof_pos > 25 { Some(eof_pos) } else { None })
            .and_then(|eof_pos| Self::search_substring(buffer, b"startxref", eof_pos - 25))
            .ok_or(Error::Xref(XrefError::Start))
            .and_then(
                |xref_pos| match parser::xref_start(ParserInput::new_extra(&buffer[xref_pos..], "xref")) {
                    Some(startxref) if startxref >= 0 => Ok(startxref as usize),
                    _ => Err(Error::Xref(XrefError::Start)),
                },
            )
    }

    /// Last occurrence of `pattern` at or after `start_pos`.
    pub(crate) fn search_substring(buffer: &[u8], pattern: &[u8], start_pos: usize) -> Option<usize> {
        buffer
            .get(start_pos..)?
            .windows(pattern.len())
            .rposition(|window| window == pattern)
            .map(|pos| start_pos + pos)
    }

    /// First occurrence of `pattern` at or after `start_pos`.
    fn search_forward(buffer: &[u8], pattern: &[u8], start_pos: usize) -> Option<usize> {
        buffer
            .get(start_pos..)?
            .windows(pattern.len())
            .position(|window| window == pattern)
            .map(|pos| start_pos + pos)
    }
}
