use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::{DocumentMetadata, Reader};
use crate::config::LoadOptions;
use crate::{Document, Error, IncrementalDocument, Result};

impl Document {
    /// Load a PDF document from a specified file path.
    #[inline]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Document> {
        Self::load_with(path, LoadOptions::default())
    }

    /// Load a PDF document from a file path with explicit options
    /// (tolerance, passwords, decode limits, cancellation).
    pub fn load_with<P: AsRef<Path>>(path: P, options: LoadOptions) -> Result<Document> {
        let file = File::open(path)?;
        let capacity = Some(file.metadata()?.len() as usize);
        Self::load_internal(file, capacity, options)
    }

    /// Load a PDF document from a file path with a password for encrypted
    /// documents.
    #[inline]
    pub fn load_with_password<P: AsRef<Path>>(path: P, password: &[u8]) -> Result<Document> {
        Self::load_with(path, LoadOptions::default().user_password(password))
    }

    /// Load a PDF document from an arbitrary source.
    #[inline]
    pub fn load_from<R: Read>(source: R) -> Result<Document> {
        Self::load_internal(source, None, LoadOptions::default())
    }

    /// Load a PDF document from an arbitrary source with explicit options.
    #[inline]
    pub fn load_from_with<R: Read>(source: R, options: LoadOptions) -> Result<Document> {
        Self::load_internal(source, None, options)
    }

    fn load_internal<R: Read>(mut source: R, capacity: Option<usize>, options: LoadOptions) -> Result<Document> {
        let mut buffer = capacity.map(Vec::with_capacity).unwrap_or_default();
        source.read_to_end(&mut buffer)?;

        Reader::new(&buffer, options).read()
    }

    /// Load a PDF document from a memory slice.
    pub fn load_mem(buffer: &[u8]) -> Result<Document> {
        buffer.try_into()
    }

    /// Load a PDF document from a memory slice with explicit options.
    pub fn load_mem_with(buffer: &[u8], options: LoadOptions) -> Result<Document> {
        Reader::new(buffer, options).read()
    }

    /// Load metadata (title, page count, version) without parsing the whole
    /// object graph. Much faster for large documents.
    #[inline]
    pub fn load_metadata<P: AsRef<Path>>(path: P) -> Result<DocumentMetadata> {
        Self::load_metadata_with(path, LoadOptions::default())
    }

    pub fn load_metadata_with<P: AsRef<Path>>(path: P, options: LoadOptions) -> Result<DocumentMetadata> {
        let file = File::open(path)?;
        let capacity = Some(file.metadata()?.len() as usize);
        let mut buffer = capacity.map(Vec::with_capacity).unwrap_or_default();
        let mut file = file;
        file.read_to_end(&mut buffer)?;
        Reader::new(&buffer, options).read_metadata()
    }

    /// Load metadata from a memory slice.
    #[inline]
    pub fn load_metadata_mem(buffer: &[u8]) -> Result<DocumentMetadata> {
        Reader::new(buffer, LoadOptions::default()).read_metadata()
    }

    /// Load metadata from a memory slice with explicit options.
    #[inline]
    pub fn load_metadata_mem_with(buffer: &[u8], options: LoadOptions) -> Result<DocumentMetadata> {
        Reader::new(buffer, options).read_metadata()
    }
}

impl TryInto<Document> for &[u8] {
    type Error = Error;

    fn try_into(self) -> Result<Document> {
        Reader::new(self, LoadOptions::default()).read()
    }
}

impl IncrementalDocument {
    /// Load a PDF document from a specified file path.
    #[inline]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with(path, LoadOptions::default())
    }

    pub fn load_with<P: AsRef<Path>>(path: P, options: LoadOptions) -> Result<Self> {
        let file = File::open(path)?;
        let capacity = Some(file.metadata()?.len() as usize);
        Self::load_internal(file, capacity, options)
    }

    /// Load a PDF document from an arbitrary source.
    #[inline]
    pub fn load_from<R: Read>(source: R) -> Result<Self> {
        Self::load_internal(source, None, LoadOptions::default())
    }

    fn load_internal<R: Read>(mut source: R, capacity: Option<usize>, options: LoadOptions) -> Result<Self> {
        let mut buffer = capacity.map(Vec::with_capacity).unwrap_or_default();
        source.read_to_end(&mut buffer)?;

        let document = Reader::new(&buffer, options).read()?;
        Ok(IncrementalDocument::create_from(buffer, document))
    }
}

impl TryInto<IncrementalDocument> for &[u8] {
    type Error = Error;

    fn try_into(self) -> Result<IncrementalDocument> {
        let document = Reader::new(self, LoadOptions::default()).read()?;
        Ok(IncrementalDocument::create_from(self.to_vec(), document))
    }
}
