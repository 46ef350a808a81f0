//! # emx-sfx
//!
//! Self-extracting file archive: a plain-text format that packs a directory
//! tree into one line-oriented file and restores it byte for byte.
//!
//! ## Format
//!
//! ```text
//! ================================================================================
//! SELF-EXTRACTED FILE ARCHIVE
//! Source Directory: project
//! ================================================================================
//!
//! <<<FILE_START>>>
//! PATH: sub/b.bin
//! SIZE: 3
//! ENCODING: base64
//! <<<CONTENT_START>>>
//! AP8Q
//! <<<CONTENT_END>>>
//! <<<FILE_END>>>
//!
//! ================================================================================
//! TOTAL FILES PACKED: 1
//! ================================================================================
//! ```
//!
//! Content is always base64, wrapped at 76 columns. The base64 alphabet
//! cannot produce `<`, so file content can never be mistaken for a marker,
//! whatever it contains. Empty files keep both content markers and have no
//! content lines.
//!
//! ## Decoding
//!
//! The decoder makes one forward pass and hands each entry to an
//! [`EntrySink`] as soon as its `<<<FILE_END>>>` line is read. Line wrapping
//! carries no information. Malformed entries are dropped without stopping the
//! pass, a truncated archive yields every entry closed before the cut, and
//! paths that would escape the destination (`..`, absolute paths) are
//! rejected. The `TOTAL FILES PACKED` footer is only checked afterwards, by
//! [`DecodeReport::verify`].
//!
//! ```rust
//! use emx_sfx::{Archive, Decoder, Encoder, Entry};
//!
//! let mut archive = Archive::with_source_name("demo");
//! archive.add_entry(Entry::new("a.txt", "hello"))?;
//! archive.add_entry(Entry::new("empty.txt", Vec::new()))?;
//!
//! let text = Encoder::new().encode(&archive)?;
//! assert!(text.contains("TOTAL FILES PACKED: 2"));
//!
//! let decoded = Decoder::new().decode(&text)?;
//! assert_eq!(decoded.entries, archive.entries);
//! # Ok::<(), emx_sfx::Error>(())
//! ```

pub mod archive;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod pack;

pub use archive::{sanitize_path, validate_archive_path, Archive, ContentEncoding, Entry};
pub use decoder::{DecodeReport, Decoder, DirectorySink, EntrySink, ListingSink};
pub use encoder::{ArchiveWriter, Encoder, EntryOutcome};
pub use error::{Error, Result};
pub use pack::{
    extract_archive, extract_archive_with, list_archive, pack_directory, PackOptions, PackReport,
};
