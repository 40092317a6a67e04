// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Persisted object graph files.
//!
//! # Layout
//!
//! ```text
//! +---------------------------------------------------------+
//! | Magic (8) "IRMETA\0\0"                                  |
//! | format version: len (u16 LE) | UTF-8                    |
//! | producer:       len (u16 LE) | UTF-8                    |
//! +---------------------------------------------------------+
//! | registry section: len (u64 LE) | stream                 |
//! |   lowered registry object, close                        |
//! +---------------------------------------------------------+
//! | payload section:  len (u64 LE) | stream                 |
//! |   root count | roots, close                             |
//! +---------------------------------------------------------+
//! ```
//!
//! The header is checked before any stream byte is looked at, and its
//! failures are ordinary [`PersistError`]s. The sections are trusted once
//! the header passed; corrupt streams are kernel faults.

use crate::config::{
    StreamOptions, FORMAT_VERSION, MAGIC, PRODUCER_VERSION, SUPPORTED_FORMAT_VERSIONS,
};
use crate::heap::{Handle, Heap};
use crate::registry::Registry;
use crate::stream::{BinaryReader, BinaryWriter, ObjectInput, ObjectOutput};
use crate::sync::{synchronize, SyncReport};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Errors surfaced while opening a persisted graph.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Not an irmeta file (magic {0:02x?})")]
    BadMagic([u8; 8]),

    #[error("Unsupported format version {found} (supported: {supported})")]
    UnsupportedVersion { found: String, supported: String },

    #[error("File truncated in {0}")]
    Truncated(&'static str),

    #[error("Invalid UTF-8 in {0}")]
    Utf8(&'static str),
}

// EOF while reading `what` means the file was cut short.
fn truncated(what: &'static str) -> impl FnOnce(io::Error) -> PersistError {
    move |e| match e.kind() {
        io::ErrorKind::UnexpectedEof => PersistError::Truncated(what),
        _ => PersistError::Io(e),
    }
}

fn write_string<W: Write>(w: &mut W, value: &str) -> io::Result<()> {
    let len = u16::try_from(value.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "header string too long"))?;
    w.write_u16::<LittleEndian>(len)?;
    w.write_all(value.as_bytes())
}

fn read_string<R: Read>(r: &mut R, what: &'static str) -> Result<String, PersistError> {
    let len = r.read_u16::<LittleEndian>().map_err(truncated(what))?;
    let mut buf = vec![0u8; usize::from(len)];
    r.read_exact(&mut buf).map_err(truncated(what))?;
    String::from_utf8(buf).map_err(|_| PersistError::Utf8(what))
}

fn write_section<W: Write>(w: &mut W, bytes: &[u8]) -> io::Result<()> {
    w.write_u64::<LittleEndian>(bytes.len() as u64)?;
    w.write_all(bytes)
}

fn read_section<R: Read>(r: &mut R, what: &'static str) -> Result<Vec<u8>, PersistError> {
    let len = r.read_u64::<LittleEndian>().map_err(truncated(what))?;
    let mut buf = Vec::new();
    r.take(len).read_to_end(&mut buf)?;
    if buf.len() as u64 != len {
        return Err(PersistError::Truncated(what));
    }
    Ok(buf)
}

/// Versions recorded at the start of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileHeader {
    /// Format version of the file.
    pub format_version: String,
    /// Build that wrote the file.
    pub producer: String,
}

impl FileHeader {
    /// Header of files written by this build.
    pub fn current() -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            producer: PRODUCER_VERSION.to_string(),
        }
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&MAGIC)?;
        write_string(w, &self.format_version)?;
        write_string(w, &self.producer)
    }

    /// Read and validate a header.
    pub fn read<R: Read>(r: &mut R) -> Result<Self, PersistError> {
        let mut magic = [0u8; 8];
        r.read_exact(&mut magic).map_err(truncated("magic"))?;
        if magic != MAGIC {
            return Err(PersistError::BadMagic(magic));
        }
        let format_version = read_string(r, "format version")?;
        if !SUPPORTED_FORMAT_VERSIONS.contains(&format_version.as_str()) {
            return Err(PersistError::UnsupportedVersion {
                found: format_version,
                supported: SUPPORTED_FORMAT_VERSIONS.join(", "),
            });
        }
        let producer = read_string(r, "producer version")?;
        Ok(Self {
            format_version,
            producer,
        })
    }
}

/// Result of [`load`].
#[derive(Debug, Clone)]
pub struct Loaded {
    /// Header of the file.
    pub header: FileHeader,
    /// Payload roots, in the order they were saved.
    pub roots: Vec<Handle>,
    /// How the persisted registry was merged into the live one.
    pub report: SyncReport,
}

/// Write `roots` and the registry describing them.
pub fn save<W: Write>(
    registry: &Registry,
    heap: &Heap,
    roots: &[Handle],
    options: StreamOptions,
    w: &mut W,
) -> Result<(), PersistError> {
    FileHeader::current().write(w)?;

    let mut scratch = Heap::new();
    let lowered = registry.lower(&mut scratch);
    let mut writer = BinaryWriter::new(options);
    writer.write_object(registry, &scratch, lowered);
    let registry_bytes = writer.write_close();
    write_section(w, &registry_bytes)?;

    let mut writer = BinaryWriter::new(options);
    writer.write_int(roots.len() as i128);
    for root in roots {
        writer.write_object(registry, heap, *root);
    }
    let payload = writer.write_close();
    write_section(w, &payload)?;
    w.flush()?;

    info!(
        roots = roots.len(),
        registry_bytes = registry_bytes.len(),
        payload_bytes = payload.len(),
        "saved object graph"
    );
    Ok(())
}

/// Read a file written by [`save`]: validate the header, merge its
/// registry into `registry`, then read the roots into `heap`.
pub fn load<R: Read>(
    registry: &mut Registry,
    heap: &mut Heap,
    r: &mut R,
) -> Result<Loaded, PersistError> {
    let header = FileHeader::read(r)?;
    debug!(version = %header.format_version, producer = %header.producer, "header accepted");
    let registry_bytes = read_section(r, "registry section")?;
    let payload = read_section(r, "payload section")?;

    let mut scratch = Heap::new();
    let mut reader = BinaryReader::new(&registry_bytes, registry);
    let Some(lowered) = reader.read_object(registry, &mut scratch) else {
        kernel_fatal!("registry section holds a null registry");
    };
    reader.read_close(registry, &mut scratch);
    let report = synchronize(registry, &mut scratch, lowered);

    let mut reader = BinaryReader::with_remap(&payload, registry, &report.remap);
    let count = reader.read_int();
    kernel_assert!(count >= 0, "negative root count {}", count);
    let mut roots = Vec::new();
    for _ in 0..count {
        if let Some(root) = reader.read_object(registry, heap) {
            roots.push(root);
        }
    }
    reader.read_close(registry, heap);

    info!(
        roots = roots.len(),
        cloned = report.cloned.len(),
        adjusted = report.adjusted.len(),
        "loaded object graph"
    );
    Ok(Loaded {
        header,
        roots,
        report,
    })
}

/// [`save`] into a new file at `path`.
pub fn save_file<P: AsRef<Path>>(
    registry: &Registry,
    heap: &Heap,
    roots: &[Handle],
    options: StreamOptions,
    path: P,
) -> Result<(), PersistError> {
    let mut writer = BufWriter::new(File::create(path)?);
    save(registry, heap, roots, options, &mut writer)
}

/// [`load`] from the file at `path`.
pub fn load_file<P: AsRef<Path>>(
    registry: &mut Registry,
    heap: &mut Heap,
    path: P,
) -> Result<Loaded, PersistError> {
    let mut reader = BufReader::new(File::open(path)?);
    load(registry, heap, &mut reader)
}

/// Validate and return the header of the file at `path`.
pub fn read_header<P: AsRef<Path>>(path: P) -> Result<FileHeader, PersistError> {
    let mut reader = BufReader::new(File::open(path)?);
    FileHeader::read(&mut reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use std::io::Cursor;
    use tempfile::tempdir;

    #[test]
    fn test_header_roundtrip() {
        let mut buf = Vec::new();
        FileHeader::current().write(&mut buf).expect("write header");
        assert_eq!(&buf[..8], &MAGIC);
        let header = FileHeader::read(&mut Cursor::new(buf)).expect("read header");
        assert_eq!(header, FileHeader::current());
    }

    #[test]
    fn test_bad_magic() {
        let err = FileHeader::read(&mut Cursor::new(b"NOTMAGIC-and-more".to_vec()))
            .expect_err("bad magic");
        assert!(matches!(err, PersistError::BadMagic(m) if &m == b"NOTMAGIC"));
    }

    #[test]
    fn test_unsupported_version() {
        let header = FileHeader {
            format_version: "9.0".into(),
            producer: "elsewhere".into(),
        };
        let mut buf = Vec::new();
        header.write(&mut buf).expect("write header");
        let err = FileHeader::read(&mut Cursor::new(buf)).expect_err("version");
        match err {
            PersistError::UnsupportedVersion { found, supported } => {
                assert_eq!(found, "9.0");
                assert_eq!(supported, "1.0, 1.1");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_truncated_header_and_section() {
        let mut buf = Vec::new();
        FileHeader::current().write(&mut buf).expect("write header");
        let short = buf[..buf.len() - 2].to_vec();
        let err = FileHeader::read(&mut Cursor::new(short)).expect_err("short");
        assert!(matches!(err, PersistError::Truncated("producer version")));

        write_section(&mut buf, &[1, 2, 3, 4]).expect("section");
        buf.truncate(buf.len() - 1);
        let mut cursor = Cursor::new(buf);
        FileHeader::read(&mut cursor).expect("header");
        let err = read_section(&mut cursor, "registry section").expect_err("short section");
        assert!(matches!(err, PersistError::Truncated("registry section")));
    }

    #[test]
    fn test_invalid_utf8_version() {
        let mut buf = MAGIC.to_vec();
        buf.extend_from_slice(&[2, 0, 0xFF, 0xFE]);
        let err = FileHeader::read(&mut Cursor::new(buf)).expect_err("utf8");
        assert!(matches!(err, PersistError::Utf8("format version")));
    }

    #[test]
    fn test_save_load_file() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("graph.irm");

        let mut registry = Registry::new();
        let b = registry.builtins().clone();
        let point = registry.aggregate("Point").field("x", b.i32).field("y", b.i32).build();
        let mut heap = Heap::new();
        let a = heap.alloc(point, Value::Aggregate(vec![Value::Int(1), Value::Int(2)]));
        let c = heap.alloc(point, Value::Aggregate(vec![Value::Int(-3), Value::Int(4)]));
        save_file(&registry, &heap, &[a, c], StreamOptions::default(), &path).expect("save");

        assert_eq!(read_header(&path).expect("header"), FileHeader::current());

        let mut out = Heap::new();
        let loaded = load_file(&mut registry, &mut out, &path).expect("load");
        assert!(loaded.report.cloned.is_empty());
        assert!(loaded.report.is_identity());
        assert_eq!(loaded.roots.len(), 2);
        assert_eq!(out.value(loaded.roots[0]), heap.value(a));
        assert_eq!(out.value(loaded.roots[1]), heap.value(c));
    }
}
