//! Error types for packing and extracting archives

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// All errors produced by the archive encoder, decoder and pack/extract
/// entry points.
///
/// Only [`Error::Config`] and [`Error::Io`] abort a whole operation. The
/// per-entry kinds are collected in reports so that one bad entry never costs
/// the rest of the archive.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid source or destination argument, raised before any work
    #[error("configuration error: {0}")]
    Config(String),

    /// A source file could not be read while packing
    #[error("skipped {}: {}", .path.display(), .source)]
    EntrySkipped {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An entry in the archive could not be decoded and was dropped
    #[error(
        "malformed entry {} at line {}: {}",
        .path.as_deref().unwrap_or("<no path>"),
        .line,
        .reason
    )]
    MalformedEntry {
        path: Option<String>,
        line: usize,
        reason: String,
    },

    /// A path that cannot be written as a single `PATH:` line and read back
    /// unchanged
    #[error("cannot archive path {path:?}: {reason}")]
    UnrepresentablePath { path: String, reason: String },

    /// A relative path with a component other than a plain name
    #[error("invalid path component {} in {}", .component.display(), .entry.display())]
    InvalidPath { entry: PathBuf, component: PathBuf },

    /// A decoded entry could not be written to its destination
    #[error("failed to extract {path}: {source}")]
    ExtractFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The archive ended before its footer
    #[error("archive truncated after {entries} complete entries")]
    StreamTruncated { entries: usize },

    /// The footer count does not match what was decoded
    #[error("footer declares {declared} files but {decoded} were decoded")]
    CountMismatch { declared: usize, decoded: usize },

    /// Two entries share the same path
    #[error("duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub(crate) fn malformed(path: Option<&str>, line: usize, reason: impl Into<String>) -> Self {
        Error::MalformedEntry {
            path: path.map(str::to_string),
            line,
            reason: reason.into(),
        }
    }

    /// Whether this error only affects a single entry
    pub fn is_per_entry(&self) -> bool {
        matches!(
            self,
            Error::EntrySkipped { .. }
                | Error::MalformedEntry { .. }
                | Error::UnrepresentablePath { .. }
                | Error::InvalidPath { .. }
                | Error::ExtractFailed { .. }
        )
    }
}
