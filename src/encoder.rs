//! Archive encoder

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use base64::Engine;
use tracing::{debug, warn};

use crate::archive::{
    rule, validate_archive_path, Archive, ContentEncoding, Entry, CONTENT_END, CONTENT_START,
    DEFAULT_LINE_WIDTH, ENCODING_FIELD, FILE_END, FILE_START, PATH_FIELD, SIZE_FIELD, SOURCE_FIELD,
    TITLE, TOTAL_FIELD,
};
use crate::error::{Error, Result};

/// Encodes entries into the self-extracting text format
#[derive(Debug, Clone)]
pub struct Encoder {
    line_width: usize,
}

impl Encoder {
    /// Create a new encoder wrapping base64 at 76 columns
    pub fn new() -> Self {
        Self {
            line_width: DEFAULT_LINE_WIDTH,
        }
    }

    /// Set the content line width. `0` writes each content block on a
    /// single line.
    pub fn with_line_width(mut self, width: usize) -> Self {
        self.line_width = width;
        self
    }

    /// Encode a whole archive to a string
    pub fn encode(&self, archive: &Archive) -> Result<String> {
        let mut output = Vec::new();
        self.encode_to_writer(archive, &mut output)?;
        // Everything written is ASCII apart from paths and the source name,
        // which come from `String`s.
        String::from_utf8(output)
            .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
    }

    /// Encode an archive directly to a writer
    pub fn encode_to_writer<W: Write>(&self, archive: &Archive, writer: W) -> Result<()> {
        let mut out = ArchiveWriter::with_encoder(writer, &archive.source_name, self.clone())?;
        for entry in &archive.entries {
            out.add_entry(entry)?;
        }
        out.finish()?;
        Ok(())
    }

    /// Encode an archive to a file
    pub fn encode_to_file(&self, archive: &Archive, path: &Path) -> Result<()> {
        let file = fs::File::create(path)?;
        self.encode_to_writer(archive, io::BufWriter::new(file))
    }

    fn write_header<W: Write>(&self, out: &mut W, source_name: &str) -> io::Result<()> {
        let rule = rule();
        writeln!(out, "{}", rule)?;
        writeln!(out, "{}", TITLE)?;
        writeln!(out, "{} {}", SOURCE_FIELD, source_name)?;
        writeln!(out, "{}", rule)?;
        writeln!(out)
    }

    fn write_entry<W: Write>(&self, out: &mut W, entry: &Entry) -> io::Result<()> {
        writeln!(out, "{}", FILE_START)?;
        writeln!(out, "{} {}", PATH_FIELD, entry.path)?;
        writeln!(out, "{} {}", SIZE_FIELD, entry.size())?;
        writeln!(out, "{} {}", ENCODING_FIELD, ContentEncoding::Base64)?;
        writeln!(out, "{}", CONTENT_START)?;

        // Empty content produces no lines at all, but both content markers
        // are still written.
        if !entry.data.is_empty() {
            let encoded = base64::engine::general_purpose::STANDARD.encode(&entry.data);
            let width = if self.line_width == 0 { encoded.len() } else { self.line_width };
            for chunk in encoded.as_bytes().chunks(width) {
                out.write_all(chunk)?;
                out.write_all(b"\n")?;
            }
        }

        writeln!(out, "{}", CONTENT_END)?;
        writeln!(out, "{}", FILE_END)?;
        writeln!(out)
    }

    fn write_footer<W: Write>(&self, out: &mut W, total: usize) -> io::Result<()> {
        let rule = rule();
        writeln!(out, "{}", rule)?;
        writeln!(out, "{} {}", TOTAL_FIELD, total)?;
        writeln!(out, "{}", rule)
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of offering one source file to an [`ArchiveWriter`]
#[derive(Debug)]
pub enum EntryOutcome {
    /// The entry was framed into the archive
    Packed { path: String, size: usize },
    /// The source could not be read; nothing was written for it
    Skipped(Error),
}

impl EntryOutcome {
    pub fn is_packed(&self) -> bool {
        matches!(self, EntryOutcome::Packed { .. })
    }
}

/// Streaming archive writer.
///
/// The header is written on construction, each entry as it is added and the
/// footer by [`ArchiveWriter::finish`].
pub struct ArchiveWriter<W: Write> {
    out: W,
    encoder: Encoder,
    packed: usize,
}

impl<W: Write> ArchiveWriter<W> {
    /// Start an archive with the default encoder
    pub fn new(out: W, source_name: &str) -> Result<Self> {
        Self::with_encoder(out, source_name, Encoder::new())
    }

    pub fn with_encoder(mut out: W, source_name: &str, encoder: Encoder) -> Result<Self> {
        if source_name.contains(['\n', '\r']) {
            return Err(Error::config("source name contains a line break"));
        }
        encoder.write_header(&mut out, source_name)?;
        Ok(Self {
            out,
            encoder,
            packed: 0,
        })
    }

    /// Frame an in-memory entry.
    ///
    /// Fails with [`Error::UnrepresentablePath`] before writing anything if
    /// the path would not read back unchanged.
    pub fn add_entry(&mut self, entry: &Entry) -> Result<()> {
        validate_archive_path(&entry.path).map_err(|reason| Error::UnrepresentablePath {
            path: entry.path.clone(),
            reason,
        })?;
        self.encoder.write_entry(&mut self.out, entry)?;
        self.packed += 1;
        debug!(path = %entry.path, size = entry.size(), "packed entry");
        Ok(())
    }

    /// Read `source` and frame it as `archive_path`.
    ///
    /// A read failure or an unrepresentable `archive_path` is reported as
    /// [`EntryOutcome::Skipped`] and leaves the archive untouched. Only a
    /// failure writing the archive is an `Err`.
    pub fn add_file(&mut self, archive_path: &str, source: &Path) -> Result<EntryOutcome> {
        if let Err(reason) = validate_archive_path(archive_path) {
            warn!(path = ?archive_path, %reason, "skipping file with unrepresentable name");
            return Ok(EntryOutcome::Skipped(Error::EntrySkipped {
                path: source.to_path_buf(),
                source: io::Error::new(io::ErrorKind::InvalidInput, reason),
            }));
        }

        let data = match fs::read(source) {
            Ok(data) => data,
            Err(err) => {
                warn!(path = %archive_path, error = %err, "skipping unreadable file");
                return Ok(EntryOutcome::Skipped(Error::EntrySkipped {
                    path: source.to_path_buf(),
                    source: err,
                }));
            }
        };

        let entry = Entry::new(archive_path, data);
        self.add_entry(&entry)?;
        Ok(EntryOutcome::Packed {
            path: entry.path,
            size: entry.data.len(),
        })
    }

    /// Write the footer, flush, and hand back the writer with the entry count
    pub fn finish(mut self) -> Result<(W, usize)> {
        self.encoder.write_footer(&mut self.out, self.packed)?;
        self.out.flush()?;
        Ok((self.out, self.packed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_archive() -> Archive {
        let mut archive = Archive::with_source_name("project");
        archive.add_entry(Entry::new("a.txt", "hello")).unwrap();
        archive.add_entry(Entry::new("sub/b.bin", vec![0x00, 0xFF, 0x10])).unwrap();
        archive.add_entry(Entry::new("empty.txt", Vec::new())).unwrap();
        archive
    }

    #[test]
    fn test_encode_exact_layout() {
        let mut archive = Archive::with_source_name("demo");
        archive.add_entry(Entry::new("a.txt", "hello")).unwrap();

        let result = Encoder::new().encode(&archive).unwrap();
        let rule = "=".repeat(80);
        let expected = format!(
            "{rule}\nSELF-EXTRACTED FILE ARCHIVE\nSource Directory: demo\n{rule}\n\n\
             <<<FILE_START>>>\nPATH: a.txt\nSIZE: 5\nENCODING: base64\n<<<CONTENT_START>>>\n\
             aGVsbG8=\n<<<CONTENT_END>>>\n<<<FILE_END>>>\n\n\
             {rule}\nTOTAL FILES PACKED: 1\n{rule}\n"
        );
        assert_eq!(result, expected);
    }

    #[test]
    fn test_encode_empty_file_keeps_markers() {
        let mut archive = Archive::new();
        archive.add_entry(Entry::new("empty.txt", Vec::new())).unwrap();

        let result = Encoder::new().encode(&archive).unwrap();
        assert!(result.contains(
            "SIZE: 0\nENCODING: base64\n<<<CONTENT_START>>>\n<<<CONTENT_END>>>\n<<<FILE_END>>>\n"
        ));
    }

    #[test]
    fn test_encode_binary() {
        let mut archive = Archive::new();
        archive.add_entry(Entry::new("image.jpg", vec![0xFF, 0xD8, 0xFF])).unwrap();

        let result = Encoder::new().encode(&archive).unwrap();
        assert!(result.contains("PATH: image.jpg\n"));
        assert!(result.contains("SIZE: 3\n"));
        assert!(result.contains("\n/9j/\n"));
    }

    #[test]
    fn test_encode_wraps_at_76() {
        let mut archive = Archive::new();
        archive.add_entry(Entry::new("big.bin", vec![0xAB; 200])).unwrap();

        let result = Encoder::new().encode(&archive).unwrap();
        let start = result.find("<<<CONTENT_START>>>\n").unwrap() + "<<<CONTENT_START>>>\n".len();
        let end = result.find("<<<CONTENT_END>>>").unwrap();
        let lines: Vec<&str> = result[start..end].lines().collect();

        // 200 bytes -> 268 base64 characters -> 76 + 76 + 76 + 40
        assert_eq!(lines.len(), 4);
        assert!(lines[..3].iter().all(|l| l.len() == 76));
        assert_eq!(lines[3].len(), 40);
    }

    #[test]
    fn test_encode_unwrapped() {
        let mut archive = Archive::new();
        archive.add_entry(Entry::new("big.bin", vec![0x01; 200])).unwrap();

        let result = Encoder::new().with_line_width(0).encode(&archive).unwrap();
        let start = result.find("<<<CONTENT_START>>>\n").unwrap() + "<<<CONTENT_START>>>\n".len();
        let end = result.find("<<<CONTENT_END>>>").unwrap();
        assert_eq!(result[start..end].lines().count(), 1);
    }

    #[test]
    fn test_encode_zero_entries() {
        let result = Encoder::new().encode(&Archive::with_source_name("empty")).unwrap();
        assert!(result.contains("Source Directory: empty\n"));
        assert!(result.contains("TOTAL FILES PACKED: 0\n"));
        assert!(!result.contains(FILE_START));
    }

    #[test]
    fn test_encode_preserves_order_and_count() {
        let result = Encoder::new().encode(&sample_archive()).unwrap();

        let a = result.find("PATH: a.txt").unwrap();
        let b = result.find("PATH: sub/b.bin").unwrap();
        let e = result.find("PATH: empty.txt").unwrap();
        assert!(a < b && b < e);
        assert!(result.ends_with(&format!("TOTAL FILES PACKED: 3\n{}\n", "=".repeat(80))));
    }

    #[test]
    fn test_writer_skips_unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.txt");
        fs::write(&present, "here").unwrap();

        let mut writer = ArchiveWriter::new(Vec::new(), "src").unwrap();
        let missing = writer.add_file("missing.txt", &dir.path().join("missing.txt")).unwrap();
        let packed = writer.add_file("present.txt", &present).unwrap();
        let (bytes, count) = writer.finish().unwrap();

        assert!(matches!(missing, EntryOutcome::Skipped(Error::EntrySkipped { .. })));
        assert!(packed.is_packed());
        assert_eq!(count, 1);

        let text = String::from_utf8(bytes).unwrap();
        assert!(!text.contains("missing.txt"));
        assert!(text.contains("PATH: present.txt\n"));
        assert!(text.contains("TOTAL FILES PACKED: 1\n"));
    }

    #[test]
    fn test_encode_rejects_line_break_in_path() {
        let mut archive = Archive::new();
        archive.entries.push(Entry::new("ok.txt", "fine"));
        archive.entries.push(Entry::new(
            "x\n<<<CONTENT_START>>>\nZm9yZ2Vk\n<<<CONTENT_END>>>\n<<<FILE_END>>>",
            "real",
        ));

        let err = Encoder::new().encode(&archive).unwrap_err();
        assert!(matches!(err, Error::UnrepresentablePath { .. }));
        assert!(err.is_per_entry());
    }

    #[test]
    fn test_encode_rejects_whitespace_padded_path() {
        let mut archive = Archive::new();
        archive.entries.push(Entry::new("a.txt ", "padded"));

        let err = Encoder::new().encode(&archive).unwrap_err();
        assert!(matches!(err, Error::UnrepresentablePath { ref path, .. } if path == "a.txt "));
    }

    #[test]
    fn test_vec_encode_with_bad_name_writes_nothing_for_it() {
        let entries = vec![Entry::new("good.txt", "1"), Entry::new("bad\r.txt", "2")];

        let mut writer = ArchiveWriter::new(Vec::new(), "src").unwrap();
        let results: Vec<Result<()>> = entries.iter().map(|e| writer.add_entry(e)).collect();
        let (bytes, count) = writer.finish().unwrap();

        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(Error::UnrepresentablePath { .. })));
        assert_eq!(count, 1);

        let text = String::from_utf8(bytes).unwrap();
        assert!(!text.contains("bad"));
        assert!(text.contains("TOTAL FILES PACKED: 1\n"));
    }

    #[test]
    fn test_writer_skips_file_with_unrepresentable_name() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("real.txt");
        fs::write(&source, "data").unwrap();

        let mut writer = ArchiveWriter::new(Vec::new(), "src").unwrap();
        let injected = writer.add_file("x\ny.txt", &source).unwrap();
        let padded = writer.add_file(" real.txt", &source).unwrap();
        let (bytes, count) = writer.finish().unwrap();

        assert!(matches!(injected, EntryOutcome::Skipped(Error::EntrySkipped { .. })));
        assert!(matches!(padded, EntryOutcome::Skipped(Error::EntrySkipped { .. })));
        assert_eq!(count, 0);

        let text = String::from_utf8(bytes).unwrap();
        assert!(!text.contains(FILE_START));
    }

    #[test]
    fn test_writer_rejects_line_break_in_source_name() {
        let result = ArchiveWriter::new(Vec::new(), "src\n<<<FILE_START>>>");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
