use oxiseal_archive::zip::{EntryOptions, ZipReader, ZipWriter, read_zip, write_zip};
use oxiseal_core::{CompressionMethod, Crc32, DosDateTime, ErrorKind};
use proptest::prelude::*;
use std::io::{Cursor, Write};

#[test]
fn test_mixed_entries_preserve_order() -> Result<(), Box<dyn std::error::Error>> {
    let modified = DosDateTime::new(0x7A21, 0x5A4C);
    let class = b"\xCA\xFE\xBA\xBE class bytes ".repeat(40);
    let resource = b"key=value\n".repeat(10);

    let mut writer = write_zip(Vec::new());
    writer.add_directory("a/", modified)?;
    writer.add_entry("a/Main.class", modified, CompressionMethod::Deflate, &class)?;
    {
        let mut entry = writer.start_entry(EntryOptions::stored(
            "a/app.properties",
            modified,
            Crc32::compute(&resource),
            resource.len() as u64,
        ))?;
        entry.write_all(&resource)?;
        entry.finish()?;
    }
    {
        let mut entry = writer.start_entry(EntryOptions::deflated("a/Other.class", modified))?;
        entry.write_all(&class)?;
        entry.finish()?;
    }
    let output = writer.into_inner()?;

    let mut reader = read_zip(Cursor::new(output))?;
    let names: Vec<_> = reader.entries().iter().map(|e| e.name.clone()).collect();
    assert_eq!(
        names,
        ["a/", "a/Main.class", "a/app.properties", "a/Other.class"]
    );

    for entry in reader.entries().to_vec() {
        assert_eq!(entry.modified, modified, "{}", entry.name);
        let data = reader.extract(&entry)?;
        match entry.name.as_str() {
            "a/" => assert!(data.is_empty()),
            "a/app.properties" => assert_eq!(data, resource),
            _ => assert_eq!(data, class),
        }
    }
    Ok(())
}

#[test]
fn test_corrupted_payload_fails_crc() -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = ZipWriter::new(Vec::new());
    writer.add_entry(
        "data.bin",
        DosDateTime::MIN,
        CompressionMethod::Stored,
        b"0123456789",
    )?;
    let mut output = writer.into_inner()?;
    // Payload starts after the 30-byte header and the 8-byte name.
    output[38] ^= 0xFF;

    let mut reader = ZipReader::new(Cursor::new(output))?;
    let entry = reader.entries()[0].clone();
    let err = reader.extract(&entry).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FormatError);
    Ok(())
}

#[test]
fn test_truncated_container_is_format_error() -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = ZipWriter::new(Vec::new());
    writer.add_entry("x.txt", DosDateTime::MIN, CompressionMethod::Deflate, b"xyz")?;
    let output = writer.into_inner()?;

    let truncated = output[..output.len() - 10].to_vec();
    let err = ZipReader::new(Cursor::new(truncated)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FormatError);
    Ok(())
}

#[test]
fn test_raw_payload_matches_compressed_size() -> Result<(), Box<dyn std::error::Error>> {
    let text = "compress me please ".repeat(100);
    let mut writer = ZipWriter::with_level(Vec::new(), 9)?;
    writer.add_entry(
        "t.txt",
        DosDateTime::MIN,
        CompressionMethod::Deflate,
        text.as_bytes(),
    )?;
    let output = writer.into_inner()?;

    let mut reader = ZipReader::new(Cursor::new(output))?;
    let entry = reader.entries()[0].clone();
    let raw = reader.read_raw(&entry)?;
    assert_eq!(raw.len() as u64, entry.compressed_size);
    assert!(entry.compressed_size < entry.size);
    assert_eq!(oxiseal_deflate::inflate(&raw)?, text.as_bytes());
    Ok(())
}

proptest! {
    #[test]
    fn prop_streamed_entries_read_back(
        payloads in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..2048), 1..6),
        stored in any::<bool>(),
    ) {
        let mut writer = ZipWriter::new(Vec::new());
        for (i, payload) in payloads.iter().enumerate() {
            let name = format!("e{}.bin", i);
            let options = if stored {
                EntryOptions::stored(name, DosDateTime::MIN, Crc32::compute(payload), payload.len() as u64)
            } else {
                EntryOptions::deflated(name, DosDateTime::MIN)
            };
            let mut entry = writer.start_entry(options).unwrap();
            entry.write_all(payload).unwrap();
            entry.finish().unwrap();
        }
        let output = writer.into_inner().unwrap();

        let mut reader = ZipReader::new(Cursor::new(output)).unwrap();
        prop_assert_eq!(reader.len(), payloads.len());
        for (entry, payload) in reader.entries().to_vec().iter().zip(&payloads) {
            prop_assert_eq!(&reader.extract(entry).unwrap(), payload);
        }
    }
}
