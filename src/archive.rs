//! Archive data structures and the framing grammar shared by the encoder and
//! decoder

use std::fmt;
use std::path::{Component, Path};

use crate::error::{Error, Result};

// Framing markers. None of them can be produced by the base64 alphabet.
pub const FILE_START: &str = "<<<FILE_START>>>";
pub const FILE_END: &str = "<<<FILE_END>>>";
pub const CONTENT_START: &str = "<<<CONTENT_START>>>";
pub const CONTENT_END: &str = "<<<CONTENT_END>>>";

// Header fields
pub const PATH_FIELD: &str = "PATH:";
pub const SIZE_FIELD: &str = "SIZE:";
pub const ENCODING_FIELD: &str = "ENCODING:";

// Archive header and footer
pub const RULE_WIDTH: usize = 80;
pub const TITLE: &str = "SELF-EXTRACTED FILE ARCHIVE";
pub const SOURCE_FIELD: &str = "Source Directory:";
pub const TOTAL_FIELD: &str = "TOTAL FILES PACKED:";

/// Standard base64 line length
pub const DEFAULT_LINE_WIDTH: usize = 76;

/// The `=` rule line framing the header and footer
pub fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

/// Text-safety transform applied to entry content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Base64,
}

impl ContentEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentEncoding::Base64 => "base64",
        }
    }

    /// Parse an `ENCODING:` value. Returns `None` for unsupported transforms.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "base64" => Some(ContentEncoding::Base64),
            _ => None,
        }
    }
}

impl fmt::Display for ContentEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One packed file: a forward-slash relative path and its raw bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Relative path using `/` separators
    pub path: String,
    /// Raw file content
    pub data: Vec<u8>,
}

impl Entry {
    pub fn new(path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            data: data.into(),
        }
    }

    /// Byte length of the raw content
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Convert a path relative to the source root into its archive form.
///
/// Fails when the path has a non-UTF-8 component, anything other than plain
/// names (`..`, roots, prefixes), or a name that would not read back
/// unchanged from a `PATH:` line (see [`validate_archive_path`]).
pub fn to_archive_path(relative: &Path) -> std::result::Result<String, String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(name) => match name.to_str() {
                Some(name) => parts.push(name),
                None => return Err("file name is not valid UTF-8".to_string()),
            },
            Component::CurDir => {}
            other => {
                return Err(format!(
                    "unexpected component {}",
                    Path::new(other.as_os_str()).display()
                ))
            }
        }
    }

    let path = parts.join("/");
    validate_archive_path(&path)?;
    Ok(path)
}

/// Check that `path` survives a trip through a `PATH:` line.
///
/// The line must not be split by a line break, the decoder trims the value,
/// and [`sanitize_path`] must hand back exactly the same string.
pub fn validate_archive_path(path: &str) -> std::result::Result<(), String> {
    if path.contains(['\n', '\r']) {
        return Err("path contains a line break".to_string());
    }
    if path.split('/').any(|segment| segment != segment.trim()) {
        return Err("path segment has leading or trailing whitespace".to_string());
    }

    let normalized = sanitize_path(path)?;
    if normalized != path {
        return Err(format!("path would read back as '{}'", normalized));
    }
    Ok(())
}

/// Validate a path read from an archive and return its normalized form.
///
/// `.` and empty segments are dropped. Parent references, absolute paths,
/// colons (drive and stream prefixes) and NUL bytes are rejected so that
/// extraction can never leave the destination root. Backslashes count as
/// separators here since they are one on some hosts.
pub fn sanitize_path(raw: &str) -> std::result::Result<String, String> {
    if raw.contains('\0') {
        return Err("path contains a NUL byte".to_string());
    }
    if raw.starts_with('/') || raw.starts_with('\\') {
        return Err(format!("absolute path '{}'", raw));
    }

    let mut parts = Vec::new();
    for segment in raw.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => return Err(format!("parent directory reference in '{}'", raw)),
            s if s.contains(':') => return Err(format!("colon in path segment '{}'", s)),
            s => parts.push(s),
        }
    }

    if parts.is_empty() {
        return Err("empty path".to_string());
    }
    Ok(parts.join("/"))
}

/// An ordered collection of entries plus the name of the directory they came
/// from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Archive {
    /// Written as the `Source Directory:` header line
    pub source_name: String,
    /// Entries in archive order
    pub entries: Vec<Entry>,
}

impl Archive {
    /// Create a new empty archive
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an archive recording the given source directory name
    pub fn with_source_name(name: impl Into<String>) -> Self {
        Self {
            source_name: name.into(),
            ..Default::default()
        }
    }

    /// Add an entry. Fails if an entry with the same path already exists.
    pub fn add_entry(&mut self, entry: Entry) -> Result<()> {
        if self.entries.iter().any(|e| e.path == entry.path) {
            return Err(Error::DuplicateEntry(entry.path));
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
