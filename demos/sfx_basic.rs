//! Example of encoding and decoding a self-extracting archive in memory

use emx_sfx::{Archive, Decoder, Encoder, Entry};

fn main() -> anyhow::Result<()> {
    println!("=== Self-Extracting Archive Example ===\n");

    let mut archive = Archive::with_source_name("example");

    // Text, binary, empty, and a file whose content looks like the format
    archive.add_entry(Entry::new("README.md", "# Example Archive\n\nThis is a sample file."))?;
    let jpeg_magic = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46];
    archive.add_entry(Entry::new("img/header.jpg", jpeg_magic))?;
    archive.add_entry(Entry::new("empty.txt", Vec::new()))?;
    archive.add_entry(Entry::new(
        "format.txt",
        "<<<FILE_START>>>\nPATH: not-a-file\n<<<FILE_END>>>\n",
    ))?;

    let encoded = Encoder::new().encode(&archive)?;

    println!("Encoded archive:");
    println!("---");
    println!("{}", encoded);
    println!("---");

    let (decoded, report) = Decoder::new().decode_bytes(encoded.as_bytes())?;
    report.verify()?;

    println!("\nDecoded {} files from '{}':", decoded.len(), decoded.source_name);
    for entry in &decoded.entries {
        println!("  - {} ({} bytes)", entry.path, entry.size());
    }

    assert_eq!(archive.entries, decoded.entries);
    println!("\nRound-trip verification passed!");

    Ok(())
}
