use crate::ObjectId;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("cross-reference error: {0}")]
    Xref(#[from] XrefError),
    #[error("decryption error: {0}")]
    Decryption(#[from] DecryptionError),
    #[error("filter {name}: {reason}")]
    Filter { name: String, reason: String },
    #[error("object {} {} not found", .0.0, .0.1)]
    ObjectNotFound(ObjectId),
    #[error("cross-reference table has no matching entry")]
    MissingXrefEntry,
    #[error("byte offset {0} is outside the document")]
    InvalidOffset(usize),
    #[error("reference cycle through object {} {}", .0.0, .0.1)]
    ReferenceCycle(ObjectId),
    #[error("expected {expected}, found {found}")]
    ObjectType {
        expected: &'static str,
        found: &'static str,
    },
    #[error("a required dictionary key is missing")]
    DictKey,
    #[error("invalid stream: {0}")]
    InvalidStream(String),
    #[error("stream declares length {declared} but {actual} bytes are available")]
    StreamLength { declared: i64, actual: usize },
    #[error("numeric cast failed: {0}")]
    NumericCast(String),
    #[error("invalid password")]
    InvalidPassword,
    #[error("operation {0:?} is not permitted by the document permissions")]
    PermissionDenied(&'static str),
    #[error("unsupported PDF version {0}")]
    UnsupportedVersion(String),
    #[error("decoded stream exceeds the configured limit of {limit} bytes")]
    DecompressionLimit { limit: u64 },
    #[error("operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("page number {0} does not exist")]
    PageNumberNotFound(u32),
    #[error("not implemented: {0}")]
    Unimplemented(&'static str),
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no %PDF- marker in the first 1024 bytes")]
    InvalidFileHeader,
    #[error("invalid trailer dictionary")]
    InvalidTrailer,
    #[error("invalid cross-reference section")]
    InvalidXref,
    #[error("invalid object stream")]
    InvalidObjectStream,
    #[error("indirect object carries a different id than its cross-reference entry")]
    ObjectIdMismatch,
    #[error("malformed {context} at offset {offset}")]
    Malformed { context: &'static str, offset: usize },
}

#[derive(Debug, Error)]
pub enum XrefError {
    #[error("startxref not found or unusable")]
    Start,
    #[error("Prev entry points outside the document")]
    PrevStart,
    #[error("XRefStm entry points outside the document")]
    StreamStart,
    #[error("cross-reference section at offset {0} could not be parsed")]
    Section(usize),
    #[error("cross-reference entry for object {0} is unusable")]
    Entry(u32),
}

#[derive(Debug, Error)]
pub enum DecryptionError {
    #[error("the trailer has no Encrypt dictionary")]
    MissingEncryptDictionary,
    #[error("encryption revision is missing or not a number")]
    MissingRevision,
    #[error("owner password hash is missing or malformed")]
    MissingOwnerPassword,
    #[error("user password hash is missing or malformed")]
    MissingUserPassword,
    #[error("permissions entry is missing or malformed")]
    MissingPermissions,
    #[error("the trailer has no file identifier")]
    MissingFileId,
    #[error("unsupported security handler V={v} R={r}")]
    Unsupported { v: i64, r: i64 },
    #[error("unsupported key length")]
    KeyLength,
    #[error("ciphertext shorter than one AES block")]
    BlockLength,
    #[error("invalid padding in decrypted data")]
    Padding,
    #[error("password could not be normalized")]
    Normalization,
    #[error("the document is not encrypted")]
    NotEncrypted,
}

/// A rule violation found by [`crate::validate`].
#[derive(Debug, Error)]
pub struct ValidationError {
    pub rule: &'static str,
    pub object: Option<ObjectId>,
    pub detail: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.object {
            Some((nr, r#gen)) => write!(f, "{} (object {} {}): {}", self.rule, nr, r#gen, self.detail),
            None => write!(f, "{}: {}", self.rule, self.detail),
        }
    }
}
