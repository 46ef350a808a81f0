//! Archive decoder

use std::fs;
use std::io::{self, BufRead};
use std::mem;
use std::path::{Component, Path, PathBuf};

use base64::Engine;
use tracing::{debug, warn};

use crate::archive::{
    sanitize_path, Archive, ContentEncoding, Entry, CONTENT_END, CONTENT_START, ENCODING_FIELD,
    FILE_END, FILE_START, PATH_FIELD, SIZE_FIELD, SOURCE_FIELD, TOTAL_FIELD,
};
use crate::error::{Error, Result};

/// Receives each entry as soon as its `<<<FILE_END>>>` marker is read
pub trait EntrySink {
    fn accept(&mut self, entry: Entry) -> Result<()>;
}

impl EntrySink for Vec<Entry> {
    fn accept(&mut self, entry: Entry) -> Result<()> {
        self.push(entry);
        Ok(())
    }
}

/// Writes entries below a destination root
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl EntrySink for DirectorySink {
    fn accept(&mut self, entry: Entry) -> Result<()> {
        // Checked again here, in host terms, on top of `sanitize_path`.
        let relative = Path::new(&entry.path);
        let mut target = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(name) => target.push(name),
                other => {
                    return Err(Error::InvalidPath {
                        entry: relative.to_path_buf(),
                        component: PathBuf::from(other.as_os_str()),
                    })
                }
            }
        }

        let extract_failed = |source: io::Error| Error::ExtractFailed {
            path: entry.path.clone(),
            source,
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(extract_failed)?;
        }
        fs::write(&target, &entry.data).map_err(extract_failed)?;
        debug!(path = %entry.path, size = entry.size(), "extracted entry");
        Ok(())
    }
}

/// Keeps only path and size of each entry, for listings
#[derive(Debug, Clone, Default)]
pub struct ListingSink {
    pub items: Vec<(String, usize)>,
}

impl EntrySink for ListingSink {
    fn accept(&mut self, entry: Entry) -> Result<()> {
        let size = entry.size();
        self.items.push((entry.path, size));
        Ok(())
    }
}

/// What a decode pass saw besides the entries themselves
#[derive(Debug, Default)]
pub struct DecodeReport {
    /// Value of the `Source Directory:` header line
    pub source_name: Option<String>,
    /// Entries handed to the sink
    pub extracted: usize,
    /// Value of the `TOTAL FILES PACKED:` footer line
    pub declared_total: Option<usize>,
    /// Entries that were dropped, as [`Error::MalformedEntry`]
    pub malformed: Vec<Error>,
    /// Well-formed entries the sink refused, such as [`Error::ExtractFailed`]
    pub failed: Vec<Error>,
    /// The stream ended mid-entry or before the footer
    pub truncated: bool,
}

impl DecodeReport {
    /// Check the decoded count against the footer.
    ///
    /// The footer is never used to drive decoding; this is an after-the-fact
    /// consistency check.
    pub fn verify(&self) -> Result<()> {
        if self.truncated {
            return Err(Error::StreamTruncated {
                entries: self.extracted,
            });
        }
        match self.declared_total {
            Some(declared) if declared != self.extracted => Err(Error::CountMismatch {
                declared,
                decoded: self.extracted,
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Between entries: header, footer and separator lines
    Idle,
    /// After `<<<FILE_START>>>`, reading `PATH:`/`SIZE:`/`ENCODING:`
    Fields,
    /// Between the content markers
    Content,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    FileStart,
    FileEnd,
    ContentStart,
    ContentEnd,
}

/// Per-entry accumulator, replaced at each `<<<FILE_START>>>`
#[derive(Debug, Default)]
struct PendingEntry {
    path: Option<String>,
    encoding: Option<String>,
    size: Option<u64>,
    content: Vec<u8>,
    body: Option<Vec<u8>>,
    problem: Option<String>,
}

/// Decodes a self-extracting text archive
#[derive(Debug, Clone, Default)]
pub struct Decoder {
    strict: bool,
}

impl Decoder {
    /// Create a new decoder that drops malformed entries and keeps going
    pub fn new() -> Self {
        Self { strict: false }
    }

    /// In strict mode the first malformed entry aborts decoding with an error
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Decode an archive held in a string
    pub fn decode(&self, input: &str) -> Result<Archive> {
        self.decode_bytes(input.as_bytes()).map(|(archive, _)| archive)
    }

    /// Decode an archive held in memory, returning the report as well
    pub fn decode_bytes(&self, input: &[u8]) -> Result<(Archive, DecodeReport)> {
        let mut entries = Vec::new();
        let report = self.decode_reader(input, &mut entries)?;
        let archive = Archive {
            source_name: report.source_name.clone().unwrap_or_default(),
            entries,
        };
        Ok((archive, report))
    }

    /// Decode `reader` in a single forward pass, handing every complete entry
    /// to `sink` as soon as it is closed.
    ///
    /// Malformed entries are dropped and listed in the report. A per-entry
    /// sink failure (see [`Error::is_per_entry`]) is recorded in
    /// [`DecodeReport::failed`] and decoding moves on to the next entry. A
    /// stream that stops early still yields every entry closed before the
    /// cut. Read errors and other sink errors are returned as `Err`; entries
    /// already handed to the sink are left in place.
    pub fn decode_reader<R, S>(&self, mut reader: R, sink: &mut S) -> Result<DecodeReport>
    where
        R: BufRead,
        S: EntrySink + ?Sized,
    {
        let mut report = DecodeReport::default();
        let mut state = ParseState::Idle;
        let mut pending = PendingEntry::default();
        let mut buf = Vec::new();
        let mut line_no = 0usize;

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            line_no += 1;
            let line = strip_terminator(&buf);

            match parse_marker(line) {
                Some(Marker::FileStart) => {
                    if state != ParseState::Idle {
                        let err = Error::malformed(
                            pending.path.as_deref(),
                            line_no,
                            "entry not closed before the next FILE_START",
                        );
                        self.reject(&mut report, err)?;
                    }
                    pending = PendingEntry::default();
                    state = ParseState::Fields;
                }
                Some(Marker::ContentStart) if state == ParseState::Fields => {
                    pending.content.clear();
                    state = ParseState::Content;
                }
                Some(Marker::ContentEnd) if state == ParseState::Content => {
                    pending.body = Some(mem::take(&mut pending.content));
                    state = ParseState::Fields;
                }
                Some(Marker::FileEnd) => {
                    let unclosed = state == ParseState::Content;
                    let finished = mem::take(&mut pending);
                    state = ParseState::Idle;

                    match self.finish_entry(finished, unclosed, line_no) {
                        Ok(entry) => match sink.accept(entry) {
                            Ok(()) => report.extracted += 1,
                            Err(err) if err.is_per_entry() && !self.strict => {
                                warn!(error = %err, "sink rejected entry");
                                report.failed.push(err);
                            }
                            Err(err) => return Err(err),
                        },
                        Err(err) => self.reject(&mut report, err)?,
                    }
                }
                Some(marker) => {
                    debug!(line = line_no, ?marker, "ignoring out-of-place marker");
                }
                None => match state {
                    ParseState::Content => pending.content.extend_from_slice(line),
                    ParseState::Fields => read_field(&mut pending, line, line_no),
                    ParseState::Idle => read_archive_line(&mut report, line),
                },
            }
        }

        if state != ParseState::Idle {
            warn!(
                path = pending.path.as_deref().unwrap_or("<no path>"),
                "archive ends in the middle of an entry"
            );
            report.truncated = true;
        } else if report.declared_total.is_none() {
            warn!("archive has no TOTAL FILES PACKED footer");
            report.truncated = true;
        }

        Ok(report)
    }

    fn finish_entry(&self, pending: PendingEntry, unclosed: bool, line: usize) -> Result<Entry> {
        let raw_path = match pending.path {
            Some(path) => path,
            None => return Err(Error::malformed(None, line, "FILE_END without a PATH")),
        };
        let fail = |reason: String| Error::malformed(Some(raw_path.as_str()), line, reason);

        if let Some(problem) = pending.problem {
            return Err(fail(problem));
        }
        if unclosed {
            return Err(fail("content block not closed".to_string()));
        }

        // Archives without an ENCODING line predate the field; base64 is the
        // only transform there has ever been.
        let encoding = match pending.encoding.as_deref() {
            None => ContentEncoding::Base64,
            Some(value) => ContentEncoding::parse(value)
                .ok_or_else(|| fail(format!("unsupported encoding '{}'", value)))?,
        };

        let body = pending
            .body
            .ok_or_else(|| fail("missing content block".to_string()))?;

        let path = sanitize_path(&raw_path).map_err(&fail)?;

        let data = if body.is_empty() {
            Vec::new()
        } else {
            match encoding {
                ContentEncoding::Base64 => base64::engine::general_purpose::STANDARD
                    .decode(&body)
                    .map_err(|e| fail(format!("invalid base64 content: {}", e)))?,
            }
        };

        if let Some(size) = pending.size {
            if size != data.len() as u64 {
                warn!(
                    path = %path,
                    declared = size,
                    decoded = data.len(),
                    "SIZE field disagrees with decoded content, keeping decoded bytes"
                );
            }
        }

        Ok(Entry::new(path, data))
    }

    fn reject(&self, report: &mut DecodeReport, err: Error) -> Result<()> {
        if self.strict {
            return Err(err);
        }
        warn!(error = %err, "dropping malformed entry");
        report.malformed.push(err);
        Ok(())
    }
}

/// Remove `\n` and a preceding `\r`. Nothing else is touched.
fn strip_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |i| i + 1);
    &bytes[start..end]
}

fn parse_marker(line: &[u8]) -> Option<Marker> {
    let trimmed = trim_ascii(line);
    if trimmed == FILE_START.as_bytes() {
        Some(Marker::FileStart)
    } else if trimmed == FILE_END.as_bytes() {
        Some(Marker::FileEnd)
    } else if trimmed == CONTENT_START.as_bytes() {
        Some(Marker::ContentStart)
    } else if trimmed == CONTENT_END.as_bytes() {
        Some(Marker::ContentEnd)
    } else {
        None
    }
}

/// Text after the first colon of `field`, trimmed
fn field_value<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    line.strip_prefix(field).map(str::trim)
}

fn read_field(pending: &mut PendingEntry, line: &[u8], line_no: usize) {
    let text = match std::str::from_utf8(line) {
        Ok(text) => text.trim(),
        Err(_) => {
            if pending.problem.is_none() {
                pending.problem = Some(format!("header line {} is not valid UTF-8", line_no));
            }
            return;
        }
    };

    if let Some(path) = field_value(text, PATH_FIELD) {
        pending.path = Some(path.to_string());
    } else if let Some(encoding) = field_value(text, ENCODING_FIELD) {
        pending.encoding = Some(encoding.to_string());
    } else if let Some(size) = field_value(text, SIZE_FIELD) {
        match size.parse() {
            Ok(size) => pending.size = Some(size),
            Err(_) => debug!(line = line_no, value = size, "ignoring unparseable SIZE"),
        }
    } else if !text.is_empty() {
        debug!(line = line_no, "ignoring unknown header line");
    }
}

fn read_archive_line(report: &mut DecodeReport, line: &[u8]) {
    let Ok(text) = std::str::from_utf8(line) else {
        return;
    };
    let text = text.trim();

    if let Some(name) = field_value(text, SOURCE_FIELD) {
        report.source_name = Some(name.to_string());
    } else if let Some(total) = field_value(text, TOTAL_FIELD) {
        report.declared_total = total.parse().ok();
    }
}
