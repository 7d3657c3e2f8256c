//! Partial index segments.
//!
//! A segment is one flushed batch of the posting store: a bincode
//! [`SegmentHeader`] followed by `term_count` `(term, postings)` records in
//! ascending term order. Segments are written to a temp file, synced and
//! renamed into place, and never modified afterwards.

use crate::error::{Error, Result};
use crate::index::Posting;
use crate::persist::{sync_dir, FORMAT_VERSION};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const SEGMENT_MAGIC: u32 = 0x5345_4731; // "SEG1"

#[derive(Debug, Serialize, Deserialize)]
struct SegmentHeader {
    magic: u32,
    version: u32,
    term_count: u64,
}

pub fn segment_file_name(seq: u32) -> String { format!("segment-{seq:06}.seg") }

/// Write a sorted batch as a segment at `path`.
///
/// On failure nothing is left at `path` and the temp file is removed.
pub fn write_segment(path: &Path, entries: &[(String, Vec<Posting>)]) -> Result<()> {
    debug_assert!(entries.windows(2).all(|w| w[0].0 < w[1].0));
    let tmp = path.with_extension("seg.tmp");
    let res = write_segment_file(&tmp, entries).and_then(|_| {
        fs::rename(&tmp, path)?;
        if let Some(parent) = path.parent() {
            sync_dir(parent)?;
        }
        Ok(())
    });
    if let Err(e) = res {
        let _ = fs::remove_file(&tmp);
        return Err(Error::Flush { path: path.to_path_buf(), reason: e.to_string() });
    }
    Ok(())
}

fn write_segment_file(tmp: &Path, entries: &[(String, Vec<Posting>)]) -> Result<()> {
    let mut w = BufWriter::new(File::create(tmp)?);
    let header = SegmentHeader { magic: SEGMENT_MAGIC, version: FORMAT_VERSION, term_count: entries.len() as u64 };
    bincode::serialize_into(&mut w, &header)?;
    for entry in entries {
        bincode::serialize_into(&mut w, entry)?;
    }
    w.flush()?;
    let f = w.into_inner().map_err(|e| e.into_error())?;
    f.sync_all()?;
    Ok(())
}

/// Streaming reader over one segment; holds a single record at a time.
pub struct SegmentReader {
    path: PathBuf,
    reader: BufReader<File>,
    remaining: u64,
}

impl SegmentReader {
    pub fn open(path: &Path) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        let header: SegmentHeader = bincode::deserialize_from(&mut reader)?;
        if header.magic != SEGMENT_MAGIC {
            return Err(Error::Merge(format!("{} is not a segment file", path.display())));
        }
        if header.version != FORMAT_VERSION {
            return Err(Error::Merge(format!("{} has segment version {}", path.display(), header.version)));
        }
        Ok(Self { path: path.to_path_buf(), reader, remaining: header.term_count })
    }

    pub fn path(&self) -> &Path { &self.path }

    /// Next `(term, postings)` record, or `None` once the segment is exhausted.
    pub fn next_entry(&mut self) -> Result<Option<(String, Vec<Posting>)>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let entry: (String, Vec<Posting>) = bincode::deserialize_from(&mut self.reader)?;
        self.remaining -= 1;
        Ok(Some(entry))
    }
}
