use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use csv::{ByteRecord, ReaderBuilder, WriterBuilder};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use crate::error::PersistError;

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// State of the destination before an append.
enum Existing {
    /// Absent or empty: start fresh with a header.
    Fresh,
    /// Header equals the expected field order.
    Matching,
    /// Header differs or is not UTF-8; every line as raw bytes, stale header
    /// first.
    Mismatched(Vec<ByteRecord>),
    /// Could not be opened or read; append a header and the records after
    /// whatever is there.
    Unreadable,
}

/// Appends `records` to the CSV file at `path`, columns in `field_order`.
///
/// A missing or empty file gets a header first. A file whose first line
/// differs from `field_order` is rewritten: new header, then every old line
/// (its old header included) as data, then the new records.
pub fn append_records<T: Serialize>(
    records: &[T],
    path: &Path,
    field_order: &[&str],
) -> Result<(), PersistError> {
    if records.is_empty() || field_order.is_empty() {
        log::warn!("No data provided to append_records for {}", path.display());
        return Ok(());
    }
    log::info!("Saving {} record(s) to CSV file: {}", records.len(), path.display());

    let result = write_records(records, path, field_order);
    match &result {
        Ok(()) => log::debug!("Successfully saved data to {}", path.display()),
        Err(e) => log::error!("Failed to save CSV file {}: {e}", path.display()),
    }
    result
}

fn write_records<T: Serialize>(
    records: &[T],
    path: &Path,
    field_order: &[&str],
) -> Result<(), PersistError> {
    let io_err = |source| PersistError::Io {
        path: path.display().to_string(),
        source,
    };
    let csv_err = |source| PersistError::Csv {
        path: path.display().to_string(),
        source,
    };

    ensure_parent(path).map_err(io_err)?;

    let existing = inspect(path, field_order);
    let (file, bom, header, carried) = match existing {
        Existing::Fresh => (File::create(path), true, true, Vec::new()),
        Existing::Matching => (
            OpenOptions::new().append(true).open(path),
            false,
            false,
            Vec::new(),
        ),
        Existing::Mismatched(rows) => {
            log::warn!(
                "Header of {} differs from {:?}; rewriting with {} existing line(s) kept as data",
                path.display(),
                field_order,
                rows.len()
            );
            (File::create(path), true, true, rows)
        }
        Existing::Unreadable => (
            OpenOptions::new().create(true).append(true).open(path),
            false,
            true,
            Vec::new(),
        ),
    };

    let mut out = BufWriter::new(file.map_err(io_err)?);
    if bom {
        out.write_all(BOM).map_err(io_err)?;
    }

    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_writer(out);
    if header {
        writer.write_record(field_order).map_err(csv_err)?;
    }
    for row in &carried {
        writer.write_byte_record(row).map_err(csv_err)?;
    }
    for record in records {
        writer.serialize(record).map_err(csv_err)?;
    }
    writer.flush().map_err(io_err)?;
    Ok(())
}

fn inspect(path: &Path, field_order: &[&str]) -> Existing {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Existing::Fresh,
        Err(e) => {
            log::warn!("Error checking existing CSV header of {}: {e}", path.display());
            return Existing::Unreadable;
        }
    };

    match read_existing(file, field_order) {
        Ok(existing) => existing,
        Err(e) => {
            log::warn!("Error checking existing CSV header of {}: {e}", path.display());
            Existing::Unreadable
        }
    }
}

fn read_existing(file: File, field_order: &[&str]) -> Result<Existing, csv::Error> {
    let mut input = BufReader::new(file);
    if input.fill_buf()?.starts_with(BOM) {
        input.consume(BOM.len());
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(input);

    // Bytes, not strings: a header in another encoding is a mismatch to
    // rewrite, not an unreadable file.
    let mut rows = reader.byte_records();
    let first = match rows.next() {
        None => return Ok(Existing::Fresh),
        Some(first) => first?,
    };
    if first.iter().eq(field_order.iter().map(|f| f.as_bytes())) {
        return Ok(Existing::Matching);
    }

    let mut kept = vec![first];
    for row in rows {
        kept.push(row?);
    }
    Ok(Existing::Mismatched(kept))
}

/// Serializes `data` to `path` as one JSON document, replacing the file.
pub fn append_json<T: Serialize + ?Sized>(
    data: &T,
    path: &Path,
    indent: usize,
) -> Result<(), PersistError> {
    log::info!("Saving data to JSON file: {}", path.display());

    let result = write_json(data, path, indent);
    match &result {
        Ok(()) => log::debug!("Successfully saved data to {}", path.display()),
        Err(e) => log::error!("Failed to save JSON file {}: {e}", path.display()),
    }
    result
}

fn write_json<T: Serialize + ?Sized>(
    data: &T,
    path: &Path,
    indent: usize,
) -> Result<(), PersistError> {
    let io_err = |source| PersistError::Io {
        path: path.display().to_string(),
        source,
    };

    ensure_parent(path).map_err(io_err)?;
    let mut out = BufWriter::new(File::create(path).map_err(io_err)?);

    let indent = " ".repeat(indent);
    let formatter = PrettyFormatter::with_indent(indent.as_bytes());
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    data.serialize(&mut ser).map_err(|source| PersistError::Json {
        path: path.display().to_string(),
        source,
    })?;
    out.write_all(b"\n").map_err(io_err)?;
    out.flush().map_err(io_err)?;
    Ok(())
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
