use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::object::{Object, ObjectId};
use crate::writer::{CountingWriter, Writer};
use crate::xref::{XrefEntry, XrefType};
use crate::{Document, Error, Result};

/// A document whose mutations are saved as an incremental update: the
/// original bytes are preserved verbatim and only objects that changed since
/// loading are appended, followed by an update cross-reference section whose
/// trailer links back to the previous one with `/Prev`.
#[derive(Debug, Clone)]
pub struct IncrementalDocument {
    /// The source file exactly as read.
    original_bytes: Vec<u8>,
    /// The object graph as it was at load time, for change detection.
    baseline: Document,
    /// The working document the caller mutates.
    pub document: Document,
}

impl IncrementalDocument {
    pub fn create_from(original_bytes: Vec<u8>, document: Document) -> Self {
        IncrementalDocument {
            original_bytes,
            baseline: document.clone(),
            document,
        }
    }

    pub fn original_bytes(&self) -> &[u8] {
        &self.original_bytes
    }

    /// Objects added or mutated since load, in object-number order.
    pub fn changed_objects(&self) -> Vec<ObjectId> {
        self.document
            .objects
            .iter()
            .filter(|(id, object)| self.baseline.objects.get(id) != Some(object))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Object numbers deleted since load.
    fn freed_objects(&self) -> Vec<ObjectId> {
        self.baseline
            .objects
            .keys()
            .filter(|id| !self.document.objects.contains_key(id))
            .copied()
            .collect()
    }

    /// Save the update to a file.
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<File> {
        let mut target = BufWriter::new(File::create(path)?);
        self.save_to(&mut target)?;
        target.into_inner().map_err(|err| Error::Io(err.into_error()))
    }

    /// Append the incremental update. Nothing already in the source bytes is
    /// rewritten; an unmodified document appends an update section that
    /// references zero entries.
    pub fn save_to<W: Write>(&mut self, target: &mut W) -> Result<()> {
        let version = self.document.version.clone();
        if Self::version_below_1_4(&version) {
            return Err(Error::UnsupportedVersion(format!(
                "incremental update requires 1.4 or later, source is {}",
                version
            )));
        }

        target.write_all(&self.original_bytes)?;
        let mut counting = CountingWriter::with_offset(target, self.original_bytes.len() as u64);
        if !self.original_bytes.ends_with(b"\n") {
            counting.write_all(b"\n")?;
        }

        let state = self.document.encryption_state.clone();
        let mut entries: BTreeMap<u32, XrefEntry> = BTreeMap::new();

        for id in self.changed_objects() {
            let offset = counting.bytes_written();
            entries.insert(id.0, XrefEntry::Normal { offset, generation: id.1 });
            let object = self.document.get_object(id)?;
            Writer::write_indirect_object(&mut counting, id, object, state.as_ref())?;
        }
        for id in self.freed_objects() {
            entries.insert(
                id.0,
                XrefEntry::Free {
                    next_free: 0,
                    generation: id.1.saturating_add(1),
                },
            );
        }

        let mut trailer = self.document.trailer.clone();
        trailer.remove(b"XRefStm");
        trailer.set("Size", (self.document.max_id + 1) as i64);
        trailer.set("Prev", self.document.xref_start as i64);

        let xref_offset = counting.bytes_written();
        if self.document.reference_table.cross_reference_type == XrefType::CrossReferenceStream {
            // A stream-based file must continue with stream-based updates.
            let xref_id = (self.document.max_id + 1, 0);
            entries.insert(
                xref_id.0,
                XrefEntry::Normal {
                    offset: xref_offset,
                    generation: 0,
                },
            );
            trailer.set("Size", (xref_id.0 + 1) as i64);
            let stream = Writer::build_xref_stream(&entries, &trailer)?;
            Writer::write_indirect_object(&mut counting, xref_id, &Object::Stream(stream), None)?;
        } else {
            Self::write_update_xref_table(&mut counting, &entries)?;
            counting.write_all(b"trailer\n")?;
            Writer::write_dictionary(&mut counting, &trailer)?;
            counting.write_all(b"\n")?;
        }
        write!(counting, "startxref\n{}\n%%EOF\n", xref_offset)?;

        // The appended section becomes the baseline for the next update.
        let written = self.changed_objects();
        for id in written {
            self.baseline.objects.insert(id, self.document.get_object(id)?.clone());
        }
        Ok(())
    }

    /// Like the full writer's table, but without synthesizing entry 0: an
    /// update section lists only what changed.
    fn write_update_xref_table<W: Write>(target: &mut W, entries: &BTreeMap<u32, XrefEntry>) -> Result<()> {
        target.write_all(b"xref\n")?;
        let ids: Vec<u32> = entries.keys().copied().collect();
        let mut start = 0usize;
        while start < ids.len() {
            let mut end = start + 1;
            while end < ids.len() && ids[end] == ids[end - 1] + 1 {
                end += 1;
            }
            writeln!(target, "{} {}", ids[start], end - start)?;
            for id in &ids[start..end] {
                Writer::write_classical_entry(target, &entries[id])?;
            }
            start = end;
        }
        Ok(())
    }

    fn version_below_1_4(version: &str) -> bool {
        let mut parts = version.splitn(2, '.');
        let major: u8 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        let minor: u8 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        (major, minor) < (1, 4)
    }
}
