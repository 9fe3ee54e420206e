use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::config::SaveOptions;
use crate::encryption;
use crate::object::{Dictionary, Object, ObjectId, Stream, StringFormat};
use crate::object_stream::{self, ObjectStreamBuilder};
use crate::xref::{XrefEntry, XrefType};
use crate::{Document, Error, Result};

/// The binary comment recommended on line two of files carrying binary data.
const BINARY_MARK: [u8; 4] = [0xE2, 0xE3, 0xCF, 0xD3];

/// Largest offset a classical table entry can express: its offset field is
/// fixed at ten decimal digits.
const MAX_CLASSICAL_OFFSET: u64 = 9_999_999_999;

impl Document {
    /// Save the document to a file, rewriting it completely.
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<File> {
        let mut target = BufWriter::new(File::create(path)?);
        self.save_internal(&mut target, SaveOptions::default())?;
        target.into_inner().map_err(|err| Error::Io(err.into_error()))
    }

    /// Save into any writer.
    pub fn save_to<W: Write>(&mut self, target: &mut W) -> Result<()> {
        self.save_internal(target, SaveOptions::default())
    }

    /// Save with explicit options (object streams, cross-reference streams,
    /// version override, cancellation).
    pub fn save_with<W: Write>(&mut self, target: &mut W, options: SaveOptions) -> Result<()> {
        self.save_internal(target, options)
    }

    fn save_internal<W: Write>(&mut self, target: &mut W, options: SaveOptions) -> Result<()> {
        if self.trailer.get(b"ID").is_err() {
            self.refresh_document_id();
        }
        let mut counting = CountingWriter::new(target);
        Writer::save(self, &mut counting, &options)?;
        counting.flush()?;
        Ok(())
    }
}

pub struct Writer;

impl Writer {
    /// Full rewrite: header, live objects in deterministic reachability
    /// order, buffered object streams, then one cross-reference section and
    /// the trailer.
    fn save<W: Write>(document: &Document, target: &mut CountingWriter<W>, options: &SaveOptions) -> Result<()> {
        let pack_objects = options.object_streams;
        let use_xref_stream = options.xref_streams
            || pack_objects
            || document.reference_table.cross_reference_type == XrefType::CrossReferenceStream;

        let mut version = options.version.clone().unwrap_or_else(|| document.effective_version());
        if use_xref_stream && version.as_str() < "1.5" {
            version = "1.5".to_string();
        }

        target.write_all(b"%PDF-")?;
        target.write_all(version.as_bytes())?;
        target.write_all(b"\n%")?;
        if document.binary_mark.is_empty() {
            target.write_all(&BINARY_MARK)?;
        } else {
            target.write_all(&document.binary_mark)?;
        }
        target.write_all(b"\n")?;

        let state = document.encryption_state.as_ref();
        let live = document.reachable_objects();
        let info_id = document.trailer.get(b"Info").and_then(Object::as_reference).ok();
        let mut next_id = document.max_id + 1;
        let mut entries: BTreeMap<u32, XrefEntry> = BTreeMap::new();

        let mut builder = ObjectStreamBuilder::new();
        let mut pending: Vec<ObjectId> = Vec::new();

        for id in live {
            options.check_cancelled()?;
            let object = document.get_object(id)?;

            if pack_objects && object_stream::packable(id, object, &[info_id]) {
                let index = builder.push(id, object)?;
                pending.push(id);
                debug_assert_eq!(index as usize + 1, builder.len());
                if builder.is_full() {
                    Self::flush_object_stream(
                        document, target, &mut builder, &mut pending, &mut entries, &mut next_id,
                    )?;
                }
                continue;
            }

            let offset = target.bytes_written();
            entries.insert(id.0, XrefEntry::Normal { offset, generation: id.1 });
            Self::write_indirect_object(target, id, object, state)?;
        }

        if !builder.is_empty() {
            Self::flush_object_stream(document, target, &mut builder, &mut pending, &mut entries, &mut next_id)?;
        }

        let mut trailer = document.trailer.clone();
        trailer.remove(b"Prev");
        trailer.remove(b"XRefStm");

        if let Some(state) = state {
            let encrypt_id = (next_id, 0);
            next_id += 1;
            entries.insert(
                encrypt_id.0,
                XrefEntry::Normal {
                    offset: target.bytes_written(),
                    generation: 0,
                },
            );
            // The encryption dictionary itself is written in the clear.
            Self::write_indirect_object(target, encrypt_id, &Object::Dictionary(state.dictionary.clone()), None)?;
            trailer.set("Encrypt", encrypt_id);
        }

        if use_xref_stream {
            let xref_id = (next_id, 0);
            let xref_offset = target.bytes_written();
            entries.insert(
                xref_id.0,
                XrefEntry::Normal {
                    offset: xref_offset,
                    generation: 0,
                },
            );
            trailer.set("Size", (Self::max_written_id(&entries) + 1) as i64);
            let stream = Self::build_xref_stream(&entries, &trailer)?;
            Self::write_indirect_object(target, xref_id, &Object::Stream(stream), None)?;
            write!(target, "startxref\n{}\n%%EOF\n", xref_offset)?;
        } else {
            let xref_offset = target.bytes_written();
            Self::write_xref_table(target, &entries)?;
            trailer.set("Size", (Self::max_written_id(&entries) + 1) as i64);
            target.write_all(b"trailer\n")?;
            Self::write_dictionary(target, &trailer)?;
            write!(target, "\nstartxref\n{}\n%%EOF\n", xref_offset)?;
        }

        Ok(())
    }

    fn max_written_id(entries: &BTreeMap<u32, XrefEntry>) -> u32 {
        entries.keys().next_back().copied().unwrap_or(0)
    }

    fn flush_object_stream<W: Write>(
        document: &Document, target: &mut CountingWriter<W>, builder: &mut ObjectStreamBuilder,
        pending: &mut Vec<ObjectId>, entries: &mut BTreeMap<u32, XrefEntry>, next_id: &mut u32,
    ) -> Result<()> {
        let container_id = (*next_id, 0);
        *next_id += 1;

        for (index, member) in pending.drain(..).enumerate() {
            entries.insert(
                member.0,
                XrefEntry::Compressed {
                    container: container_id.0,
                    index: index as u16,
                },
            );
        }

        let stream = builder.finish()?;
        entries.insert(
            container_id.0,
            XrefEntry::Normal {
                offset: target.bytes_written(),
                generation: 0,
            },
        );
        Self::write_indirect_object(target, container_id, &Object::Stream(stream), document.encryption_state.as_ref())?;
        Ok(())
    }

    /// `n g obj ... endobj`, encrypting strings and stream payloads when the
    /// document carries encryption state.
    pub(crate) fn write_indirect_object<W: Write>(
        target: &mut W, id: ObjectId, object: &Object, state: Option<&encryption::EncryptionState>,
    ) -> Result<()> {
        let mut itoa_buffer = itoa::Buffer::new();
        target.write_all(itoa_buffer.format(id.0).as_bytes())?;
        target.write_all(b" ")?;
        target.write_all(itoa_buffer.format(id.1).as_bytes())?;
        target.write_all(b" obj\n")?;
        match state {
            Some(state) => {
                let mut encrypted = object.clone();
                encryption::encrypt_object(state, id, &mut encrypted)?;
                Self::write_object(target, &encrypted)?;
            }
            None => Self::write_object(target, object)?,
        }
        target.write_all(b"\nendobj\n")?;
        Ok(())
    }

    /// Serialize one object in its on-disk form.
    pub fn write_object<W: Write>(target: &mut W, object: &Object) -> Result<()> {
        match object {
            Object::Null => target.write_all(b"null")?,
            Object::Boolean(true) => target.write_all(b"true")?,
            Object::Boolean(false) => target.write_all(b"false")?,
            Object::Integer(value) => {
                let mut buffer = itoa::Buffer::new();
                target.write_all(buffer.format(*value).as_bytes())?;
            }
            Object::Real(value) => target.write_all(format_real(*value).as_bytes())?,
            Object::Name(name) => Self::write_name(target, name)?,
            Object::String(bytes, StringFormat::Literal) => Self::write_string_literal(target, bytes)?,
            Object::String(bytes, StringFormat::Hexadecimal) => {
                target.write_all(b"<")?;
                for byte in bytes {
                    write!(target, "{:02x}", byte)?;
                }
                target.write_all(b">")?;
            }
            Object::Array(items) => {
                target.write_all(b"[")?;
                let mut first = true;
                for item in items {
                    if !first && needs_separator(item) {
                        target.write_all(b" ")?;
                    }
                    Self::write_object(target, item)?;
                    first = false;
                }
                target.write_all(b"]")?;
            }
            Object::Dictionary(dict) => Self::write_dictionary(target, dict)?,
            Object::Stream(stream) => Self::write_stream(target, stream)?,
            Object::Reference(id) => {
                let mut buffer = itoa::Buffer::new();
                target.write_all(buffer.format(id.0).as_bytes())?;
                target.write_all(b" ")?;
                target.write_all(buffer.format(id.1).as_bytes())?;
                target.write_all(b" R")?;
            }
        }
        Ok(())
    }

    pub(crate) fn write_dictionary<W: Write>(target: &mut W, dict: &Dictionary) -> Result<()> {
        target.write_all(b"<<")?;
        for (key, value) in dict {
            Self::write_name(target, key)?;
            if needs_separator(value) {
                target.write_all(b" ")?;
            }
            Self::write_object(target, value)?;
        }
        target.write_all(b">>")?;
        Ok(())
    }

    fn write_stream<W: Write>(target: &mut W, stream: &Stream) -> Result<()> {
        Self::write_dictionary(target, &stream.dict)?;
        target.write_all(b"\nstream\n")?;
        target.write_all(&stream.content)?;
        target.write_all(b"\nendstream")?;
        Ok(())
    }

    /// Names escape everything outside the printable regular-character set
    /// as `#xx`.
    fn write_name<W: Write>(target: &mut W, name: &[u8]) -> Result<()> {
        target.write_all(b"/")?;
        for &byte in name {
            let regular = !matches!(
                byte,
                b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%' | b'#'
            ) && (0x21..=0x7E).contains(&byte);
            if regular {
                target.write_all(&[byte])?;
            } else {
                write!(target, "#{:02X}", byte)?;
            }
        }
        Ok(())
    }

    fn write_string_literal<W: Write>(target: &mut W, bytes: &[u8]) -> Result<()> {
        target.write_all(b"(")?;
        for &byte in bytes {
            match byte {
                b'(' => target.write_all(br"\(")?,
                b')' => target.write_all(br"\)")?,
                b'\\' => target.write_all(br"\\")?,
                b'\n' => target.write_all(br"\n")?,
                b'\r' => target.write_all(br"\r")?,
                other => target.write_all(&[other])?,
            }
        }
        target.write_all(b")")?;
        Ok(())
    }

    /// One 20-byte classical table entry. The offset field is fixed at ten
    /// decimal digits, so larger offsets cannot be expressed here.
    pub(crate) fn write_classical_entry<W: Write>(target: &mut W, entry: &XrefEntry) -> Result<()> {
        match entry {
            XrefEntry::Normal { offset, generation } => {
                if *offset > MAX_CLASSICAL_OFFSET {
                    return Err(Error::Unimplemented(
                        "offsets beyond ten digits require a cross-reference stream",
                    ));
                }
                write!(target, "{:010} {:05} n \n", offset, generation)?;
            }
            XrefEntry::Free { next_free, generation } => {
                write!(target, "{:010} {:05} f \n", next_free, generation)?;
            }
            XrefEntry::UnusableFree => {
                write!(target, "{:010} {:05} f \n", 0, crate::xref::MAX_GENERATION)?;
            }
            XrefEntry::Compressed { .. } => {
                return Err(Error::Unimplemented(
                    "compressed entries require a cross-reference stream",
                ));
            }
        }
        Ok(())
    }

    /// Classical cross-reference table: 20-byte entries, one subsection per
    /// run of consecutive object numbers.
    pub(crate) fn write_xref_table<W: Write>(target: &mut W, entries: &BTreeMap<u32, XrefEntry>) -> Result<()> {
        target.write_all(b"xref\n")?;

        let mut all = entries.clone();
        all.entry(0).or_insert(XrefEntry::Free {
            next_free: 0,
            generation: crate::xref::MAX_GENERATION,
        });

        let ids: Vec<u32> = all.keys().copied().collect();
        let mut start = 0usize;
        while start < ids.len() {
            let mut end = start + 1;
            while end < ids.len() && ids[end] == ids[end - 1] + 1 {
                end += 1;
            }
            writeln!(target, "{} {}", ids[start], end - start)?;
            for id in &ids[start..end] {
                Self::write_classical_entry(target, &all[id])?;
            }
            start = end;
        }
        Ok(())
    }

    /// Cross-reference stream with `/W [1 n 2]` columns; the offset column
    /// is as wide as the largest offset demands (at least four bytes), and
    /// the stream carries the trailer keys itself.
    pub(crate) fn build_xref_stream(entries: &BTreeMap<u32, XrefEntry>, trailer: &Dictionary) -> Result<Stream> {
        let mut all = entries.clone();
        all.entry(0).or_insert(XrefEntry::Free {
            next_free: 0,
            generation: crate::xref::MAX_GENERATION,
        });

        let second_field = |entry: &XrefEntry| -> u64 {
            match entry {
                XrefEntry::Free { next_free, .. } => *next_free as u64,
                XrefEntry::UnusableFree => 0,
                XrefEntry::Normal { offset, .. } => *offset,
                XrefEntry::Compressed { container, .. } => *container as u64,
            }
        };
        let widest = all.values().map(second_field).max().unwrap_or(0);
        let offset_width = byte_width(widest).max(4);

        let ids: Vec<u32> = all.keys().copied().collect();
        let mut index = Vec::new();
        let mut data = Vec::new();
        let mut start = 0usize;
        while start < ids.len() {
            let mut end = start + 1;
            while end < ids.len() && ids[end] == ids[end - 1] + 1 {
                end += 1;
            }
            index.push(Object::Integer(ids[start] as i64));
            index.push(Object::Integer((end - start) as i64));
            for id in &ids[start..end] {
                let entry = &all[id];
                let kind = match entry {
                    XrefEntry::Free { .. } | XrefEntry::UnusableFree => 0u8,
                    XrefEntry::Normal { .. } => 1,
                    XrefEntry::Compressed { .. } => 2,
                };
                let third = match entry {
                    XrefEntry::Free { generation, .. } => *generation,
                    XrefEntry::UnusableFree => crate::xref::MAX_GENERATION,
                    XrefEntry::Normal { generation, .. } => *generation,
                    XrefEntry::Compressed { index, .. } => *index,
                };
                data.push(kind);
                data.extend_from_slice(&second_field(entry).to_be_bytes()[8 - offset_width..]);
                data.extend_from_slice(&third.to_be_bytes());
            }
            start = end;
        }

        let mut dict = trailer.clone();
        dict.set("Type", Object::name("XRef"));
        dict.set(
            "W",
            vec![
                Object::Integer(1),
                Object::Integer(offset_width as i64),
                Object::Integer(2),
            ],
        );
        dict.set("Index", Object::Array(index));
        let mut stream = Stream::new(dict, data);
        stream.compress()?;
        Ok(stream)
    }
}

/// Bytes needed for a big-endian encoding of `value`.
fn byte_width(value: u64) -> usize {
    (((64 - value.leading_zeros() as usize) + 7) / 8).max(1)
}

/// Does `object`'s serialization need a space to separate it from a
/// preceding token? Delimiter-led forms are self-separating.
fn needs_separator(object: &Object) -> bool {
    !matches!(
        object,
        Object::Name(_)
            | Object::String(..)
            | Object::Array(_)
            | Object::Dictionary(_)
            | Object::Stream(_)
    )
}

/// Reals use plain decimal notation with at most twelve fractional digits.
fn format_real(value: f64) -> String {
    let mut formatted = format!("{:.12}", value);
    if formatted.contains('.') {
        while formatted.ends_with('0') {
            formatted.pop();
        }
        if formatted.ends_with('.') {
            formatted.pop();
        }
    }
    formatted
}

pub(crate) struct CountingWriter<W: Write> {
    inner: W,
    bytes_written: u64,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        CountingWriter { inner, bytes_written: 0 }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn with_offset(inner: W, offset: u64) -> Self {
        CountingWriter {
            inner,
            bytes_written: offset,
        }
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.bytes_written += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serialized(object: &Object) -> Vec<u8> {
        let mut out = Vec::new();
        Writer::write_object(&mut out, object).unwrap();
        out
    }

    #[test]
    fn scalar_serialization() {
        assert_eq!(serialized(&Object::Null), b"null");
        assert_eq!(serialized(&Object::Boolean(true)), b"true");
        assert_eq!(serialized(&Object::Integer(-42)), b"-42");
        assert_eq!(serialized(&Object::Real(3.5)), b"3.5");
        assert_eq!(serialized(&Object::Real(-0.25)), b"-0.25");
        assert_eq!(serialized(&Object::Real(7.0)), b"7");
        assert_eq!(serialized(&Object::Reference((12, 3))), b"12 3 R");
    }

    #[test]
    fn real_has_no_scientific_notation() {
        let tiny = serialized(&Object::Real(0.000000000001));
        assert!(!tiny.contains(&b'e') && !tiny.contains(&b'E'));
        assert_eq!(tiny, b"0.000000000001");
    }

    #[test]
    fn name_escaping() {
        assert_eq!(serialized(&Object::name("Simple")), b"/Simple");
        assert_eq!(serialized(&Object::name("With Space")), b"/With#20Space");
        assert_eq!(serialized(&Object::name("A#B")), b"/A#23B");
    }

    #[test]
    fn string_escaping() {
        assert_eq!(serialized(&Object::string_literal("a(b)c")), br"(a\(b\)c)");
        assert_eq!(serialized(&Object::string_literal("line\nbreak")), br"(line\nbreak)");
        assert_eq!(
            serialized(&Object::String(vec![0xDE, 0xAD], StringFormat::Hexadecimal)),
            b"<dead>"
        );
    }

    #[test]
    fn collection_separators() {
        let array = Object::Array(vec![1.into(), 2.into(), Object::name("N"), 3.into()]);
        assert_eq!(serialized(&array), b"[1 2/N 3]");

        let mut dict = Dictionary::new();
        dict.set("Type", Object::name("Page"));
        dict.set("Count", 2);
        assert_eq!(serialized(&Object::Dictionary(dict)), b"<</Type/Page/Count 2>>");
    }

    #[test]
    fn xref_table_groups_runs() {
        let mut entries = BTreeMap::new();
        entries.insert(1, XrefEntry::Normal { offset: 10, generation: 0 });
        entries.insert(2, XrefEntry::Normal { offset: 20, generation: 0 });
        entries.insert(7, XrefEntry::Normal { offset: 70, generation: 1 });
        let mut out = Vec::new();
        Writer::write_xref_table(&mut out, &entries).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("xref\n0 3\n0000000000 65535 f \n"));
        assert!(text.contains("0000000010 00000 n \n"));
        assert!(text.contains("\n7 1\n0000000070 00001 n \n"));
    }

    #[test]
    fn xref_entries_are_twenty_bytes() {
        let mut entries = BTreeMap::new();
        entries.insert(1, XrefEntry::Normal { offset: 9, generation: 0 });
        let mut out = Vec::new();
        Writer::write_xref_table(&mut out, &entries).unwrap();
        let body = &out[b"xref\n0 2\n".len()..];
        assert_eq!(body.len(), 40);
        assert_eq!(&body[20..], b"0000000009 00000 n \n");
    }

    #[test]
    fn classical_table_rejects_offsets_beyond_ten_digits() {
        let mut entries = BTreeMap::new();
        entries.insert(
            1,
            XrefEntry::Normal {
                offset: MAX_CLASSICAL_OFFSET + 1,
                generation: 0,
            },
        );
        let mut out = Vec::new();
        assert!(Writer::write_xref_table(&mut out, &entries).is_err());
    }

    #[test]
    fn xref_stream_offset_column_widens_with_the_file() {
        let mut entries = BTreeMap::new();
        entries.insert(1, XrefEntry::Normal { offset: 100, generation: 0 });
        let narrow = Writer::build_xref_stream(&entries, &Dictionary::new()).unwrap();
        let w = narrow.dict.get(b"W").and_then(Object::as_array).unwrap().clone();
        assert_eq!(w[1].as_i64().unwrap(), 4);

        entries.insert(
            2,
            XrefEntry::Normal {
                offset: u32::MAX as u64 + 1,
                generation: 0,
            },
        );
        let wide = Writer::build_xref_stream(&entries, &Dictionary::new()).unwrap();
        let w = wide.dict.get(b"W").and_then(Object::as_array).unwrap().clone();
        assert_eq!(w[1].as_i64().unwrap(), 5);

        // Three entries (0, 1, 2) of 1 + 5 + 2 bytes each.
        let decoded = wide.decompressed_content().unwrap();
        assert_eq!(decoded.len(), 3 * 8);
    }
}
