//! emx-sfx CLI
//!
//! Pack a directory into a self-extracting text archive, extract it, or list
//! its contents.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use emx_sfx::{extract_archive_with, list_archive, pack_directory, Decoder, PackOptions};
use std::path::PathBuf;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "emx-sfx")]
#[command(author = "nzinfo <li.monan@gmail.com>")]
#[command(version)]
#[command(about = "Self-extracting text archive tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pack a directory into an archive
    Create {
        /// Directory to pack
        source: PathBuf,

        /// Output archive file
        #[arg(short = 'o', long)]
        output: PathBuf,

        /// Base64 line width (0 writes each file on one line)
        #[arg(long, default_value_t = 76)]
        width: usize,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Extract an archive
    #[command(name = "x")]
    Extract {
        /// Archive file to extract
        #[arg(short = 'i', long)]
        input: PathBuf,

        /// Directory to extract to (default: current directory)
        #[arg(short = 'C', long, default_value = ".")]
        directory: PathBuf,

        /// Fail if the footer count does not match or the archive is truncated
        #[arg(long)]
        verify: bool,

        /// Stop at the first malformed entry instead of skipping it
        #[arg(long)]
        strict: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// List contents of an archive
    #[command(name = "t")]
    List {
        /// Archive file to list
        #[arg(short = 'i', long)]
        input: PathBuf,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Create { source, output, width, verbose } => {
            init_logging(verbose);
            create_archive(source, output, width)?;
        }
        Commands::Extract { input, directory, verify, strict, verbose } => {
            init_logging(verbose);
            extract(input, directory, verify, strict)?;
        }
        Commands::List { input, verbose } => {
            init_logging(false);
            list(input, verbose)?;
        }
    }

    Ok(())
}

fn create_archive(source: PathBuf, output: PathBuf, width: usize) -> Result<()> {
    let options = PackOptions { line_width: width };
    let report = pack_directory(&source, &output, &options)
        .with_context(|| format!("Failed to pack {}", source.display()))?;

    println!("Packed {} files into {}", report.packed, output.display());
    if !report.skipped.is_empty() {
        println!("Skipped {} files", report.skipped.len());
    }
    Ok(())
}

fn extract(input: PathBuf, directory: PathBuf, verify: bool, strict: bool) -> Result<()> {
    let decoder = Decoder::new().with_strict(strict);
    let report = extract_archive_with(&decoder, &input, &directory)
        .with_context(|| format!("Failed to extract {}", input.display()))?;

    println!("Extracted {} files to {}", report.extracted, directory.display());
    if !report.malformed.is_empty() {
        println!("Dropped {} malformed entries", report.malformed.len());
    }
    for err in &report.failed {
        eprintln!("Failed: {}", err);
    }

    if verify {
        report
            .verify()
            .with_context(|| format!("Verification failed for {}", input.display()))?;
    }
    Ok(())
}

fn list(input: PathBuf, verbose: bool) -> Result<()> {
    let (listing, report) = list_archive(&input)
        .with_context(|| format!("Failed to read {}", input.display()))?;

    for (path, size) in &listing.items {
        if verbose {
            println!("{}  {}", path, size);
        } else {
            println!("{}", path);
        }
    }

    if verbose {
        if let Some(name) = &report.source_name {
            println!("Source: {}", name);
        }
        println!("Files: {}", report.extracted);
    }
    Ok(())
}
