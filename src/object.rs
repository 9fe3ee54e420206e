use crate::config::DecodeLimits;
use crate::error::{Error, Result};
use crate::filters;
use indexmap::IndexMap;
use log::warn;
use std::fmt;

/// Object identifier consisting of object number and generation number.
pub type ObjectId = (u32, u16);

/// Dictionary object.
#[derive(Clone, Default, PartialEq)]
pub struct Dictionary(IndexMap<Vec<u8>, Object>);

/// Stream object.
///
/// `content` holds the bytes exactly as they sit between `stream` and
/// `endstream` on disk (still filtered, already decrypted). Decoded bytes are
/// produced on demand by [`Stream::decompressed_content`].
#[derive(Clone, Debug)]
pub struct Stream {
    /// Associated stream dictionary.
    pub dict: Dictionary,
    /// Contents of the stream in bytes.
    pub content: Vec<u8>,
    /// Can the stream be compressed by the `Document::compress()` function?
    /// Font streams and already-compressed payloads should not be.
    pub allows_compression: bool,
    /// Stream data's position in PDF file.
    pub start_position: Option<usize>,
}

/// String format used in PDF file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StringFormat {
    #[default]
    Literal,
    Hexadecimal,
}

/// Basic PDF object types defined in an enum.
#[derive(Clone, PartialEq, Default)]
pub enum Object {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Name(Vec<u8>),
    String(Vec<u8>, StringFormat),
    Array(Vec<Object>),
    Dictionary(Dictionary),
    Stream(Stream),
    Reference(ObjectId),
}

impl From<bool> for Object {
    fn from(value: bool) -> Self {
        Object::Boolean(value)
    }
}

impl From<i64> for Object {
    fn from(value: i64) -> Self {
        Object::Integer(value)
    }
}

impl From<i32> for Object {
    fn from(value: i32) -> Self {
        Object::Integer(value as i64)
    }
}

impl From<u32> for Object {
    fn from(value: u32) -> Self {
        Object::Integer(value as i64)
    }
}

impl From<usize> for Object {
    fn from(value: usize) -> Self {
        Object::Integer(value as i64)
    }
}

impl From<f64> for Object {
    fn from(value: f64) -> Self {
        Object::Real(value)
    }
}

impl From<f32> for Object {
    fn from(value: f32) -> Self {
        Object::Real(value as f64)
    }
}

impl From<String> for Object {
    fn from(value: String) -> Self {
        Object::String(value.into_bytes(), StringFormat::Literal)
    }
}

impl From<&str> for Object {
    fn from(value: &str) -> Self {
        Object::String(value.as_bytes().to_vec(), StringFormat::Literal)
    }
}

impl From<Vec<Object>> for Object {
    fn from(value: Vec<Object>) -> Self {
        Object::Array(value)
    }
}

impl From<Dictionary> for Object {
    fn from(value: Dictionary) -> Self {
        Object::Dictionary(value)
    }
}

impl From<Stream> for Object {
    fn from(value: Stream) -> Self {
        Object::Stream(value)
    }
}

impl From<ObjectId> for Object {
    fn from(id: ObjectId) -> Self {
        Object::Reference(id)
    }
}

impl Object {
    /// Build a name object from its decoded bytes.
    pub fn name<N: Into<Vec<u8>>>(name: N) -> Object {
        Object::Name(name.into())
    }

    /// Build a literal string object.
    pub fn string_literal<S: Into<Vec<u8>>>(s: S) -> Object {
        Object::String(s.into(), StringFormat::Literal)
    }

    pub fn is_null(&self) -> bool {
        matches!(*self, Object::Null)
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Object::Boolean(value) => Ok(*value),
            _ => Err(self.type_error("Boolean")),
        }
    }

    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Object::Integer(value) => Ok(*value),
            _ => Err(self.type_error("Integer")),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Object::Real(value) => Ok(*value),
            _ => Err(self.type_error("Real")),
        }
    }

    /// Numeric accessor accepting both integers and reals.
    pub fn as_float(&self) -> Result<f64> {
        match self {
            Object::Integer(value) => Ok(*value as f64),
            Object::Real(value) => Ok(*value),
            _ => Err(self.type_error("Number")),
        }
    }

    pub fn as_name(&self) -> Result<&[u8]> {
        match self {
            Object::Name(name) => Ok(name),
            _ => Err(self.type_error("Name")),
        }
    }

    pub fn as_str(&self) -> Result<&[u8]> {
        match self {
            Object::String(string, _) => Ok(string),
            _ => Err(self.type_error("String")),
        }
    }

    pub fn as_str_mut(&mut self) -> Result<&mut Vec<u8>> {
        match self {
            Object::String(string, _) => Ok(string),
            _ => Err(self.type_error("String")),
        }
    }

    /// Decode a text string (UTF-16BE with BOM, else PDFDocEncoding treated
    /// as Latin-1) into a Rust string.
    pub fn as_text_string(&self) -> Result<String> {
        let bytes = self.as_str()?;
        if bytes.starts_with(&[0xFE, 0xFF]) {
            let (text, _, _) = encoding_rs::UTF_16BE.decode(&bytes[2..]);
            Ok(text.into_owned())
        } else {
            // PDFDocEncoding matches Latin-1 over the printable range.
            Ok(encoding_rs::mem::decode_latin1(bytes).into_owned())
        }
    }

    pub fn as_array(&self) -> Result<&Vec<Object>> {
        match self {
            Object::Array(arr) => Ok(arr),
            _ => Err(self.type_error("Array")),
        }
    }

    pub fn as_array_mut(&mut self) -> Result<&mut Vec<Object>> {
        match self {
            Object::Array(arr) => Ok(arr),
            _ => Err(self.type_error("Array")),
        }
    }

    pub fn as_dict(&self) -> Result<&Dictionary> {
        match self {
            Object::Dictionary(dict) => Ok(dict),
            _ => Err(self.type_error("Dictionary")),
        }
    }

    pub fn as_dict_mut(&mut self) -> Result<&mut Dictionary> {
        match self {
            Object::Dictionary(dict) => Ok(dict),
            _ => Err(self.type_error("Dictionary")),
        }
    }

    pub fn as_stream(&self) -> Result<&Stream> {
        match self {
            Object::Stream(stream) => Ok(stream),
            _ => Err(self.type_error("Stream")),
        }
    }

    pub fn as_stream_mut(&mut self) -> Result<&mut Stream> {
        match self {
            Object::Stream(stream) => Ok(stream),
            _ => Err(self.type_error("Stream")),
        }
    }

    pub fn as_reference(&self) -> Result<ObjectId> {
        match self {
            Object::Reference(id) => Ok(*id),
            _ => Err(self.type_error("Reference")),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Integer(_) => "Integer",
            Object::Real(_) => "Real",
            Object::Name(_) => "Name",
            Object::String(..) => "String",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Stream(_) => "Stream",
            Object::Reference(_) => "Reference",
        }
    }

    fn type_error(&self, expected: &'static str) -> Error {
        Error::ObjectType {
            expected,
            found: self.type_name(),
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Object::Null => f.write_str("null"),
            Object::Boolean(value) => write!(f, "{}", value),
            Object::Integer(value) => write!(f, "{}", value),
            Object::Real(value) => write!(f, "{}", value),
            Object::Name(name) => write!(f, "/{}", String::from_utf8_lossy(name)),
            Object::String(bytes, _) => write!(f, "({})", String::from_utf8_lossy(bytes)),
            Object::Array(array) => {
                f.write_str("[")?;
                for (i, item) in array.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    item.fmt(f)?;
                }
                f.write_str("]")
            }
            Object::Dictionary(dict) => dict.fmt(f),
            Object::Stream(stream) => {
                stream.dict.fmt(f)?;
                write!(f, "stream({} bytes)", stream.content.len())
            }
            Object::Reference(id) => write!(f, "{} {} R", id.0, id.1),
        }
    }
}

impl Dictionary {
    pub fn new() -> Dictionary {
        Dictionary(IndexMap::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &[u8]) -> Result<&Object> {
        self.0.get(key).ok_or(Error::DictKey)
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Result<&mut Object> {
        self.0.get_mut(key).ok_or(Error::DictKey)
    }

    pub fn has(&self, key: &[u8]) -> bool {
        self.0.contains_key(key)
    }

    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<Vec<u8>>,
        V: Into<Object>,
    {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Object> {
        self.0.shift_remove(key)
    }

    /// The `/Type` entry, when present and a name.
    pub fn get_type(&self) -> Result<&[u8]> {
        self.get(b"Type").and_then(Object::as_name)
    }

    pub fn has_type(&self, type_name: &[u8]) -> bool {
        self.get_type().map(|t| t == type_name).unwrap_or(false)
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, Vec<u8>, Object> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> indexmap::map::IterMut<'_, Vec<u8>, Object> {
        self.0.iter_mut()
    }

    /// Look a value up and chase one level of indirection through `doc`.
    pub fn get_deref<'a>(&'a self, key: &[u8], doc: &'a crate::Document) -> Result<&'a Object> {
        self.get(key).and_then(|o| doc.dereference(o).map(|(_, obj)| obj))
    }
}

impl fmt::Debug for Dictionary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("<<")?;
        for (key, value) in self.iter() {
            write!(f, "/{} {:?}", String::from_utf8_lossy(key), value)?;
        }
        f.write_str(">>")
    }
}

impl<'a> IntoIterator for &'a Dictionary {
    type Item = (&'a Vec<u8>, &'a Object);
    type IntoIter = indexmap::map::Iter<'a, Vec<u8>, Object>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<(Vec<u8>, Object)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (Vec<u8>, Object)>>(iter: I) -> Self {
        Dictionary(IndexMap::from_iter(iter))
    }
}

/// Streams compare by what they mean on disk; the load-time bookkeeping
/// (`start_position`, `allows_compression`) does not affect equality.
impl PartialEq for Stream {
    fn eq(&self, other: &Self) -> bool {
        self.dict == other.dict && self.content == other.content
    }
}

impl Stream {
    pub fn new(mut dict: Dictionary, content: Vec<u8>) -> Stream {
        dict.set("Length", content.len() as i64);
        Stream {
            dict,
            content,
            allows_compression: true,
            start_position: None,
        }
    }

    /// Stream dictionary and position only; content loaded later once the
    /// `/Length` entry can be resolved.
    pub fn with_position(dict: Dictionary, position: usize) -> Stream {
        Stream {
            dict,
            content: vec![],
            allows_compression: true,
            start_position: Some(position),
        }
    }

    /// Default: the data of this stream may be compressed on save.
    pub fn with_compression(mut self, allows_compression: bool) -> Stream {
        self.allows_compression = allows_compression;
        self
    }

    /// Filter names applied to this stream, outermost first.
    pub fn filters(&self) -> Result<Vec<&[u8]>> {
        let filter = self.dict.get(b"Filter")?;
        match filter {
            Object::Name(name) => Ok(vec![name.as_slice()]),
            Object::Array(names) => names.iter().map(Object::as_name).collect(),
            _ => Err(Error::ObjectType {
                expected: "Name or Array",
                found: filter.type_name(),
            }),
        }
    }

    pub fn set_content(&mut self, content: Vec<u8>) {
        self.content = content;
        self.dict.set("Length", self.content.len() as i64);
    }

    /// Replace content with unfiltered bytes, dropping any filter entries.
    pub fn set_plain_content(&mut self, data: Vec<u8>) {
        self.dict.remove(b"DecodeParms");
        self.dict.remove(b"Filter");
        self.set_content(data);
    }

    /// Decode the stream content through its filter chain.
    pub fn decompressed_content(&self) -> Result<Vec<u8>> {
        self.decompressed_content_with_limits(&DecodeLimits::default())
    }

    pub fn decompressed_content_with_limits(&self, limits: &DecodeLimits) -> Result<Vec<u8>> {
        filters::decode_stream(&self.dict, &self.content, limits)
    }

    /// Decode in place and drop the filter entries.
    pub fn decompress(&mut self) -> Result<()> {
        let data = self.decompressed_content()?;
        self.dict.remove(b"DecodeParms");
        self.dict.remove(b"Filter");
        self.set_content(data);
        Ok(())
    }

    /// Flate-compress the content in place unless a filter is already set.
    pub fn compress(&mut self) -> Result<()> {
        if self.dict.get(b"Filter").is_err() {
            let compressed = filters::flate::encode(&self.content);
            if compressed.len() + 19 < self.content.len() {
                self.dict.set("Filter", Object::name("FlateDecode"));
                self.set_content(compressed);
            } else {
                warn!("compression skipped, no gain for {} byte stream", self.content.len());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dictionary_preserves_insertion_order() {
        let mut dict = Dictionary::new();
        dict.set("Zebra", 1);
        dict.set("Alpha", 2);
        dict.set("Mike", 3);
        let keys: Vec<_> = dict.iter().map(|(k, _)| k.as_slice()).collect();
        assert_eq!(keys, vec![&b"Zebra"[..], &b"Alpha"[..], &b"Mike"[..]]);
    }

    #[test]
    fn accessor_type_mismatch() {
        let obj = Object::Integer(42);
        assert!(obj.as_i64().is_ok());
        assert!(matches!(obj.as_dict(), Err(Error::ObjectType { .. })));
    }

    #[test]
    fn missing_key_is_not_a_type_error() {
        let dict = Dictionary::new();
        assert!(matches!(dict.get(b"Nope"), Err(Error::DictKey)));
    }

    #[test]
    fn stream_length_tracks_content() {
        let mut stream = Stream::new(Dictionary::new(), b"hello".to_vec());
        assert_eq!(stream.dict.get(b"Length").and_then(Object::as_i64).unwrap(), 5);
        stream.set_content(b"longer content".to_vec());
        assert_eq!(stream.dict.get(b"Length").and_then(Object::as_i64).unwrap(), 14);
    }

    #[test]
    fn text_string_utf16() {
        let obj = Object::String(vec![0xFE, 0xFF, 0x00, b'H', 0x00, b'i'], StringFormat::Literal);
        assert_eq!(obj.as_text_string().unwrap(), "Hi");
    }
}
