//! Directory-level entry points: pack a directory tree into an archive file
//! and extract an archive file into a directory.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::archive::{to_archive_path, DEFAULT_LINE_WIDTH};
use crate::decoder::{DecodeReport, Decoder, DirectorySink, ListingSink};
use crate::encoder::{ArchiveWriter, Encoder, EntryOutcome};
use crate::error::{Error, Result};

/// Options for [`pack_directory`]
#[derive(Debug, Clone)]
pub struct PackOptions {
    /// Base64 line width, `0` for unwrapped content blocks
    pub line_width: usize,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            line_width: DEFAULT_LINE_WIDTH,
        }
    }
}

/// Outcome of packing a directory
#[derive(Debug, Default)]
pub struct PackReport {
    /// Entries written to the archive
    pub packed: usize,
    /// Files that could not be read, as [`Error::EntrySkipped`]
    pub skipped: Vec<Error>,
    /// Symbolic links left out of the archive
    pub symlinks: Vec<PathBuf>,
    /// The output file was found inside the source tree and left out
    pub output_excluded: bool,
}

/// Pack every regular file below `source` into the archive at `output`.
///
/// Symlinks are not followed and not packed. When `output` lies inside
/// `source` it is left out of the archive. Unreadable files are skipped and
/// listed in the report; the rest of the tree is still packed.
pub fn pack_directory(source: &Path, output: &Path, options: &PackOptions) -> Result<PackReport> {
    if !source.exists() {
        return Err(Error::config(format!(
            "source directory does not exist: {}",
            source.display()
        )));
    }
    if !source.is_dir() {
        return Err(Error::config(format!(
            "source path is not a directory: {}",
            source.display()
        )));
    }

    let source_root = source.canonicalize()?;
    let source_name = source_root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let file = File::create(output)?;
    let output_path = output.canonicalize()?;
    if output_path.starts_with(&source_root) {
        warn!(
            output = %output.display(),
            "output file is inside the source directory and will be excluded"
        );
    }

    let encoder = Encoder::new().with_line_width(options.line_width);
    let mut writer = ArchiveWriter::with_encoder(BufWriter::new(file), &source_name, encoder)?;
    let mut report = PackReport::default();

    for item in WalkDir::new(&source_root).follow_links(false) {
        let item = match item {
            Ok(item) => item,
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| source_root.clone());
                warn!(path = %path.display(), error = %err, "skipping unreadable path");
                report.skipped.push(Error::EntrySkipped {
                    path,
                    source: io::Error::from(err),
                });
                continue;
            }
        };

        let path = item.path();
        if item.path_is_symlink() {
            info!(path = %path.display(), "skipping symlink");
            report.symlinks.push(path.to_path_buf());
            continue;
        }
        if !item.file_type().is_file() {
            continue;
        }
        if path == output_path {
            report.output_excluded = true;
            continue;
        }

        // Names that would not read back unchanged are skipped, never mangled
        let relative = path.strip_prefix(&source_root).unwrap_or(path);
        let archive_path = match to_archive_path(relative) {
            Ok(archive_path) => archive_path,
            Err(reason) => {
                warn!(path = %path.display(), %reason, "skipping file with unrepresentable name");
                report.skipped.push(Error::EntrySkipped {
                    path: path.to_path_buf(),
                    source: io::Error::new(io::ErrorKind::InvalidData, reason),
                });
                continue;
            }
        };

        match writer.add_file(&archive_path, path)? {
            EntryOutcome::Packed { path, size } => info!(path = %path, size, "packed"),
            EntryOutcome::Skipped(err) => report.skipped.push(err),
        }
    }

    let (_, packed) = writer.finish()?;
    report.packed = packed;
    info!(
        packed,
        skipped = report.skipped.len(),
        output = %output.display(),
        "archive written"
    );
    Ok(report)
}

/// Extract the archive at `archive` below `dest` with the default decoder
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<DecodeReport> {
    extract_archive_with(&Decoder::new(), archive, dest)
}

/// Extract the archive at `archive` below `dest`, creating directories as
/// needed. The report's `extracted` field is the number of files written.
pub fn extract_archive_with(
    decoder: &Decoder,
    archive: &Path,
    dest: &Path,
) -> Result<DecodeReport> {
    let reader = open_archive(archive)?;
    fs::create_dir_all(dest)?;

    let mut sink = DirectorySink::new(dest);
    let report = decoder.decode_reader(reader, &mut sink)?;

    info!(
        extracted = report.extracted,
        malformed = report.malformed.len(),
        failed = report.failed.len(),
        dest = %dest.display(),
        "archive extracted"
    );
    if let Some(declared) = report.declared_total {
        if declared != report.extracted {
            warn!(
                declared,
                extracted = report.extracted,
                "file count differs from archive footer"
            );
        }
    }
    Ok(report)
}

/// Read the archive at `archive` and return the path and size of every entry
pub fn list_archive(archive: &Path) -> Result<(ListingSink, DecodeReport)> {
    let reader = open_archive(archive)?;
    let mut listing = ListingSink::default();
    let report = Decoder::new().decode_reader(reader, &mut listing)?;
    Ok((listing, report))
}

fn open_archive(archive: &Path) -> Result<BufReader<File>> {
    if !archive.is_file() {
        return Err(Error::config(format!(
            "archive file does not exist: {}",
            archive.display()
        )));
    }
    Ok(BufReader::new(File::open(archive)?))
}
