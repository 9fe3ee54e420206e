use log::warn;
use std::collections::BTreeMap;

use crate::config::DecodeLimits;
use crate::error::ParseError;
use crate::object::{Dictionary, Object, ObjectId, Stream};
use crate::parser::{self, ParserInput};
use crate::writer::Writer;
use crate::{Error, Result};

/// Largest number of objects packed into one object stream on save.
pub const MAX_OBJECTS_PER_STREAM: usize = 100;

/// A decoded `/ObjStm` container: the objects it carries, keyed by id.
/// Compressed objects always have generation 0.
#[derive(Debug)]
pub struct ObjectStream {
    pub objects: BTreeMap<ObjectId, Object>,
}

impl ObjectStream {
    pub fn new(stream: &Stream) -> Result<ObjectStream> {
        Self::with_limits(stream, &DecodeLimits::default())
    }

    pub fn with_limits(stream: &Stream, limits: &DecodeLimits) -> Result<ObjectStream> {
        let content = stream.decompressed_content_with_limits(limits)?;

        let count = stream
            .dict
            .get(b"N")
            .and_then(Object::as_i64)
            .map_err(|_| Error::Parse(ParseError::InvalidObjectStream))?;
        let first = stream
            .dict
            .get(b"First")
            .and_then(Object::as_i64)
            .map_err(|_| Error::Parse(ParseError::InvalidObjectStream))?;
        if count < 0 || first < 0 || first as usize > content.len() {
            return Err(Error::Parse(ParseError::InvalidObjectStream));
        }

        let input = ParserInput::new_extra(&content, "object stream");
        let pairs = parser::object_stream_header(input, count as usize)?;

        let body = ParserInput::new_extra(&content[first as usize..], "object stream body");
        let mut objects = BTreeMap::new();
        for (id, offset) in pairs {
            match parser::object_stream_entry(body, offset) {
                Ok(object) => {
                    objects.insert((id, 0), object);
                }
                Err(err) => {
                    warn!("object {} in object stream could not be parsed: {}", id, err);
                }
            }
        }

        Ok(ObjectStream { objects })
    }
}

/// May `object` be packed into an object stream?
///
/// Streams cannot nest, generations other than zero cannot be expressed by a
/// compressed entry, and the document-level dictionaries (catalog, Info,
/// Encrypt, linearization parameters) must stay directly addressable.
pub fn packable(id: ObjectId, object: &Object, excluded: &[Option<ObjectId>]) -> bool {
    if id.1 != 0 {
        return false;
    }
    if excluded.iter().any(|e| *e == Some(id)) {
        return false;
    }
    match object {
        Object::Stream(_) => false,
        Object::Dictionary(dict) => !dict.has(b"Linearized") && !dict.has_type(b"Catalog"),
        _ => true,
    }
}

/// Accumulates packable objects and emits finished `/ObjStm` streams.
pub struct ObjectStreamBuilder {
    entries: Vec<(ObjectId, Vec<u8>)>,
}

impl ObjectStreamBuilder {
    pub fn new() -> ObjectStreamBuilder {
        ObjectStreamBuilder { entries: vec![] }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= MAX_OBJECTS_PER_STREAM
    }

    /// Serialize and buffer one object. The caller is responsible for only
    /// passing objects that satisfy [`packable`].
    pub fn push(&mut self, id: ObjectId, object: &Object) -> Result<u16> {
        let mut body = Vec::new();
        Writer::write_object(&mut body, object)?;
        let index = self.entries.len() as u16;
        self.entries.push((id, body));
        Ok(index)
    }

    /// Build the container stream, consuming the buffered objects.
    /// The header is `2 × N` integers: object number and body offset pairs.
    pub fn finish(&mut self) -> Result<Stream> {
        let mut header = Vec::new();
        let mut bodies = Vec::new();
        let mut itoa_buffer = itoa::Buffer::new();
        for (id, body) in &self.entries {
            header.extend_from_slice(itoa_buffer.format(id.0).as_bytes());
            header.push(b' ');
            header.extend_from_slice(itoa_buffer.format(bodies.len()).as_bytes());
            header.push(b' ');
            bodies.extend_from_slice(body);
            bodies.push(b'\n');
        }

        let mut dict = Dictionary::new();
        dict.set("Type", Object::name("ObjStm"));
        dict.set("N", self.entries.len() as i64);
        dict.set("First", header.len() as i64);
        self.entries.clear();

        let mut content = header;
        content.append(&mut bodies);
        let mut stream = Stream::new(dict, content);
        stream.compress()?;
        Ok(stream)
    }
}

impl Default for ObjectStreamBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(count: i64, first: i64, content: &[u8]) -> Stream {
        let mut dict = Dictionary::new();
        dict.set("Type", Object::name("ObjStm"));
        dict.set("N", count);
        dict.set("First", first);
        Stream::new(dict, content.to_vec())
    }

    #[test]
    fn unpack_two_objects() {
        let stream = container(2, 11, b"11 0 12 8 \n<</A 1>>\n(text)\n");
        let unpacked = ObjectStream::new(&stream).unwrap();
        assert_eq!(unpacked.objects.len(), 2);
        assert!(unpacked.objects[&(11, 0)].as_dict().is_ok());
        assert_eq!(unpacked.objects[&(12, 0)].as_str().unwrap(), b"text");
    }

    #[test]
    fn pack_then_unpack() {
        let mut builder = ObjectStreamBuilder::new();
        let mut dict = Dictionary::new();
        dict.set("Kind", Object::name("Test"));
        builder.push((7, 0), &Object::Dictionary(dict)).unwrap();
        builder.push((9, 0), &Object::Integer(42)).unwrap();
        let stream = builder.finish().unwrap();

        assert!(stream.dict.has_type(b"ObjStm"));
        assert_eq!(stream.dict.get(b"N").and_then(Object::as_i64).unwrap(), 2);

        let unpacked = ObjectStream::new(&stream).unwrap();
        assert_eq!(unpacked.objects[&(9, 0)], Object::Integer(42));
        assert!(unpacked.objects[&(7, 0)].as_dict().unwrap().has(b"Kind"));
    }

    #[test]
    fn eligibility_rules() {
        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::name("Catalog"));
        assert!(!packable((1, 0), &Object::Dictionary(catalog), &[]));

        let mut linearized = Dictionary::new();
        linearized.set("Linearized", 1);
        assert!(!packable((2, 0), &Object::Dictionary(linearized), &[]));

        let stream = Stream::new(Dictionary::new(), vec![]);
        assert!(!packable((3, 0), &Object::Stream(stream), &[]));

        assert!(!packable((4, 1), &Object::Integer(1), &[]));
        assert!(!packable((5, 0), &Object::Integer(1), &[Some((5, 0))]));
        assert!(packable((6, 0), &Object::Integer(1), &[Some((5, 0))]));
    }
}
