//! Import and export of log contents.
//!
//! Export streams a tar (optionally gzipped) of the segment files whose hour
//! intersects the requested range, together with each hour's manifest, so the
//! archive can be unpacked straight into another log root or re-imported
//! through [`import_archive`]. Import accepts either that archive form or a
//! plain `{"events": [...]}` JSON document (optionally gzipped).

use std::io::{BufReader, Read, Write};

use flate2::{bufread::GzDecoder, write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};
use spectre_core::{Error, Event, Result, Timestamp};
use tracing::info;

use crate::{log::EventLog, segment};

/// Options for [`export`]
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Start of the hour range (inclusive)
    pub start: Timestamp,
    /// End of the hour range (inclusive)
    pub end: Timestamp,
    /// Wrap the tar stream in gzip
    pub gzip: bool,
}

/// Options for the import paths
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// When an imported event id already exists in its hour, replace the
    /// stored copy instead of keeping it
    pub overwrite_existing: bool,
}

/// Outcome of an import
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    /// Events accepted into the log
    pub imported: usize,
    /// Hours the events landed in
    pub hours: usize,
}

#[derive(Deserialize)]
struct EventsDocument {
    events: Vec<Event>,
}

/// Stream a tar of segment files intersecting `[opts.start, opts.end]`
///
/// Returns the number of files written into the archive.
pub fn export<W: Write>(log: &EventLog, writer: W, opts: &ExportOptions) -> Result<usize> {
    if opts.start > opts.end {
        return Err(Error::Validation(format!(
            "export start {} is after end {}",
            opts.start, opts.end
        )));
    }
    log.flush()?;
    if opts.gzip {
        let encoder = GzEncoder::new(writer, Compression::default());
        let (encoder, files) = export_tar(log, encoder, opts)?;
        encoder.finish()?;
        Ok(files)
    } else {
        let (_, files) = export_tar(log, writer, opts)?;
        Ok(files)
    }
}

fn export_tar<W: Write>(log: &EventLog, writer: W, opts: &ExportOptions) -> Result<(W, usize)> {
    let start_key = opts.start.hour_key();
    let end_key = opts.end.hour_key();
    let mut builder = tar::Builder::new(writer);
    let mut files = 0usize;
    for hour in log.hour_keys() {
        if hour < start_key || hour > end_key {
            continue;
        }
        let Some((segments, manifest_path)) = log.hour_files(&hour) else {
            continue;
        };
        for meta in segments {
            let mut bytes = std::fs::read(&meta.path)?;
            bytes.truncate(meta.len as usize);
            let mut header = tar::Header::new_gnu();
            header.set_size(bytes.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            let name = format!(
                "hours/{hour}/{}",
                meta.path.file_name().unwrap_or_default().to_string_lossy()
            );
            builder.append_data(&mut header, name, bytes.as_slice())?;
            files += 1;
        }
        if manifest_path.exists() {
            let bytes = std::fs::read(&manifest_path)?;
            let mut header = tar::Header::new_gnu();
            header.set_size(bytes.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, format!("hours/{hour}/.manifest"), bytes.as_slice())?;
            files += 1;
        }
    }
    let inner = builder.into_inner()?;
    info!(files, "exported archive");
    Ok((inner, files))
}

/// Import a `{"events": [...]}` document, optionally gzipped
pub fn import<R: Read>(log: &EventLog, reader: R, opts: &ImportOptions) -> Result<ImportReport> {
    let reader = maybe_gunzip(reader)?;
    let doc: EventsDocument = serde_json::from_reader(reader)?;
    batch_into(log, doc.events, opts)
}

/// Import a tar archive produced by [`export`], optionally gzipped
///
/// Segment files are decoded block by block and their events re-appended, so
/// the archive can come from a log with different rotation settings.
pub fn import_archive<R: Read>(
    log: &EventLog,
    reader: R,
    opts: &ImportOptions,
) -> Result<ImportReport> {
    let reader = maybe_gunzip(reader)?;
    let mut tar = tar::Archive::new(reader);
    let mut events = Vec::new();
    for entry in tar.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_string_lossy().to_string();
        if !path.ends_with(".blk") {
            continue;
        }
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        let reader = segment::SegmentReader::from_bytes(bytes);
        let mut blocks = reader.blocks();
        for raw in blocks.by_ref() {
            events.extend(segment::decode_block_events(&raw)?);
        }
        if blocks.corrupt {
            return Err(Error::Corruption(format!("corrupt segment {path} in archive")));
        }
    }
    batch_into(log, events, opts)
}

fn batch_into(log: &EventLog, events: Vec<Event>, opts: &ImportOptions) -> Result<ImportReport> {
    let mut hours: Vec<String> = events.iter().map(|e| e.timestamp.hour_key()).collect();
    hours.sort();
    hours.dedup();
    let imported = log.add_batch(events, opts)?;
    info!(imported, hours = hours.len(), "imported events");
    Ok(ImportReport {
        imported,
        hours: hours.len(),
    })
}

/// A reader that transparently gunzips when the stream starts with the gzip
/// magic bytes
enum MaybeGz<R: Read> {
    Plain(BufReader<R>),
    Gz(GzDecoder<BufReader<R>>),
}

impl<R: Read> Read for MaybeGz<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            MaybeGz::Plain(r) => r.read(buf),
            MaybeGz::Gz(r) => r.read(buf),
        }
    }
}

fn maybe_gunzip<R: Read>(reader: R) -> Result<MaybeGz<R>> {
    let mut buffered = BufReader::new(reader);
    let magic = {
        let buf = std::io::BufRead::fill_buf(&mut buffered)?;
        buf.get(..2).map(<[u8]>::to_vec)
    };
    match magic.as_deref() {
        Some([0x1f, 0x8b]) => Ok(MaybeGz::Gz(GzDecoder::new(buffered))),
        _ => Ok(MaybeGz::Plain(buffered)),
    }
}
