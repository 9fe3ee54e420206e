//! A PDF processing engine: parse PDF 1.0–1.7 files into a fully resolved
//! object graph, mutate it, optionally optimize and validate it, and write
//! the result back as a complete rewrite or an incremental update.
//!
//! ```no_run
//! use pdfmill::{Document, SaveOptions};
//!
//! # fn main() -> pdfmill::Result<()> {
//! let mut doc = Document::load("input.pdf")?;
//! pdfmill::optimize(&mut doc)?;
//! let mut out = Vec::new();
//! doc.save_with(&mut out, SaveOptions::new().object_streams(true))?;
//! # Ok(())
//! # }
//! ```

pub mod config;
mod document;
pub mod encryption;
mod error;
pub mod filters;
mod incremental_document;
pub mod name_tree;
mod object;
mod object_stream;
pub mod optimizer;
mod parser;
mod rectangle;
mod reader;
pub mod validation;
mod writer;
mod xref;

pub use crate::config::{CancelSignal, DecodeLimits, LoadOptions, SaveOptions, ValidationMode};
pub use crate::document::Document;
pub use crate::encryption::{EncryptionSettings, EncryptionState, EncryptionVariant, Permissions};
pub use crate::error::{DecryptionError, Error, ParseError, Result, ValidationError, XrefError};
pub use crate::incremental_document::IncrementalDocument;
pub use crate::object::{Dictionary, Object, ObjectId, Stream, StringFormat};
pub use crate::object_stream::ObjectStream;
pub use crate::optimizer::{OptimizationSummary, optimize};
pub use crate::reader::{DocumentMetadata, Reader};
pub use crate::rectangle::Rectangle;
pub use crate::validation::{validate, validate_with};
pub use crate::writer::Writer;
pub use crate::xref::{Xref, XrefEntry, XrefType};

/// Build a [`Dictionary`] from key-value pairs.
///
/// ```
/// use pdfmill::{Object, dictionary};
/// let dict = dictionary! {
///     "Type" => Object::name("Page"),
///     "Count" => 2,
/// };
/// assert!(dict.has_type(b"Page"));
/// ```
#[macro_export]
macro_rules! dictionary {
    () => {
        $crate::Dictionary::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut dict = $crate::Dictionary::new();
        $(
            dict.set($key, $value);
        )+
        dict
    }};
}

#[cfg(test)]
mod tests;
