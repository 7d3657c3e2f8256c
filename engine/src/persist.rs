//! On-disk layout of an index root.
//!
//! ```text
//! <root>/CURRENT                  name of the published generation
//! <root>/gen-000001/meta.json
//! <root>/gen-000001/directory.bin term -> (bucket, offset, len, df)
//! <root>/gen-000001/doc_ids.jsonl docID -> URL, one record per line
//! <root>/gen-000001/buckets/*.bin posting lists, one file per term range
//! <root>/work/segments/*.seg      partial segments of an unfinished build
//! <root>/work/doc_ids.jsonl       doc map of an unfinished build
//! <root>/work/config.json         config of an unfinished build
//! ```

use crate::config::IndexConfig;
use crate::error::{Error, Result};
use crate::index::DocRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMeta {
    pub version: u32,
    pub num_docs: u32,
    pub num_terms: u64,
    pub created_at: String,
    pub config: IndexConfig,
}

/// Location of one term's posting list inside its bucket file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermEntry {
    pub bucket: u16,
    pub offset: u64,
    pub len: u32,
    /// Number of documents containing the term.
    pub df: u32,
}

pub type Directory = BTreeMap<String, TermEntry>;

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn current(&self) -> PathBuf { self.root.join("CURRENT") }
    pub fn work_dir(&self) -> PathBuf { self.root.join("work") }
    pub fn segments_dir(&self) -> PathBuf { self.work_dir().join("segments") }
    pub fn pending_doc_map(&self) -> PathBuf { self.work_dir().join("doc_ids.jsonl") }
    pub fn pending_config(&self) -> PathBuf { self.work_dir().join("config.json") }
    pub fn generation(&self, name: &str) -> GenerationPaths {
        GenerationPaths { dir: self.root.join(name) }
    }

    /// Name of the published generation, if the root has one.
    pub fn current_generation(&self) -> Result<Option<String>> {
        match fs::read_to_string(self.current()) {
            Ok(s) => {
                let name = s.trim().to_string();
                if parse_generation(&name).is_none() {
                    return Err(Error::CorruptIndex(format!("CURRENT names an invalid generation '{name}'")));
                }
                Ok(Some(name))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Segment files left in the work directory, in creation order.
    pub fn list_segments(&self) -> Result<Vec<PathBuf>> {
        let dir = self.segments_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut segs: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("seg"))
            .collect();
        segs.sort();
        Ok(segs)
    }
}

pub struct GenerationPaths {
    pub dir: PathBuf,
}

impl GenerationPaths {
    pub fn meta(&self) -> PathBuf { self.dir.join("meta.json") }
    pub fn directory(&self) -> PathBuf { self.dir.join("directory.bin") }
    pub fn doc_map(&self) -> PathBuf { self.dir.join("doc_ids.jsonl") }
    pub fn buckets_dir(&self) -> PathBuf { self.dir.join("buckets") }
    pub fn bucket(&self, name: &str) -> PathBuf { self.buckets_dir().join(format!("{name}.bin")) }
}

pub fn generation_name(n: u64) -> String { format!("gen-{n:06}") }

pub fn parse_generation(name: &str) -> Option<u64> {
    name.strip_prefix("gen-")?.parse().ok()
}

/// Alphabetical partition of the term space. Bucket 0 (`other`) takes terms
/// that do not start with `a`-`z`; the remaining buckets split the alphabet
/// into contiguous, near-equal letter ranges.
#[derive(Debug, Clone)]
pub struct BucketLayout {
    /// Half-open letter index ranges for buckets 1..count.
    ranges: Vec<(u8, u8)>,
}

impl BucketLayout {
    pub fn new(count: usize) -> Self {
        let m = count.clamp(2, 27) - 1;
        let ranges = (0..m).map(|i| ((i * 26 / m) as u8, ((i + 1) * 26 / m) as u8)).collect();
        Self { ranges }
    }

    pub fn count(&self) -> usize { self.ranges.len() + 1 }

    pub fn bucket_for(&self, term: &str) -> usize {
        match term.as_bytes().first() {
            Some(&c) if c.is_ascii_lowercase() => {
                let idx = c - b'a';
                self.ranges
                    .iter()
                    .position(|&(lo, hi)| lo <= idx && idx < hi)
                    .map_or(0, |i| i + 1)
            }
            _ => 0,
        }
    }

    pub fn name(&self, bucket: usize) -> String {
        if bucket == 0 {
            return "other".to_string();
        }
        let (lo, hi) = self.ranges[bucket - 1];
        let first = (b'a' + lo) as char;
        let last = (b'a' + hi - 1) as char;
        if first == last { first.to_string() } else { format!("{first}-{last}") }
    }
}

/// Write `bytes` to `path` through a synced temp file and a rename, so the
/// path holds either the old content or the complete new content.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut f = File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    if let Some(parent) = path.parent() {
        sync_dir(parent)?;
    }
    Ok(())
}

pub fn sync_dir(dir: &Path) -> Result<()> {
    #[cfg(unix)]
    File::open(dir)?.sync_all()?;
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}

pub fn save_meta(path: &Path, meta: &IndexMeta) -> Result<()> {
    let mut f = File::create(path)?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    f.sync_all()?;
    Ok(())
}

pub fn load_meta(path: &Path) -> Result<IndexMeta> {
    let mut f = File::open(path)?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: IndexMeta = serde_json::from_str(&buf)
        .map_err(|e| Error::CorruptIndex(format!("unreadable meta {}: {e}", path.display())))?;
    Ok(meta)
}

pub fn save_directory(path: &Path, dir: &Directory) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    bincode::serialize_into(&mut w, dir)?;
    let f = w.into_inner().map_err(|e| e.into_error())?;
    f.sync_all()?;
    Ok(())
}

pub fn load_directory(path: &Path) -> Result<Directory> {
    let reader = BufReader::new(File::open(path)?);
    bincode::deserialize_from(reader)
        .map_err(|e| Error::CorruptIndex(format!("unreadable directory {}: {e}", path.display())))
}

/// Append-only writer for the doc-ID map.
pub struct DocMapWriter {
    out: BufWriter<File>,
}

impl DocMapWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let f = OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
        Ok(Self { out: BufWriter::new(f) })
    }

    pub fn append(&mut self, rec: &DocRecord) -> Result<()> {
        serde_json::to_writer(&mut self.out, rec)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.out.flush()?;
        self.out.get_ref().sync_all()?;
        Ok(())
    }
}

/// Load the doc-ID map. Line `i` must hold doc id `i`.
pub fn load_doc_map(path: &Path) -> Result<Vec<DocRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let mut docs = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let rec: DocRecord = serde_json::from_str(&line)
            .map_err(|e| Error::CorruptIndex(format!("doc map line {}: {e}", i + 1)))?;
        if rec.doc_id as usize != docs.len() {
            return Err(Error::CorruptIndex(format!(
                "doc map is not dense: expected doc id {}, found {}",
                docs.len(),
                rec.doc_id
            )));
        }
        docs.push(rec);
    }
    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_layout_is_one_bucket_per_letter() {
        let layout = BucketLayout::new(27);
        assert_eq!(layout.count(), 27);
        assert_eq!(layout.bucket_for("apple"), 1);
        assert_eq!(layout.bucket_for("zebra"), 26);
        assert_eq!(layout.bucket_for("2024"), 0);
        assert_eq!(layout.bucket_for("élan"), 0);
        assert_eq!(layout.name(0), "other");
        assert_eq!(layout.name(3), "c");
    }

    #[test]
    fn coarse_layout_covers_alphabet_in_order() {
        let layout = BucketLayout::new(4);
        assert_eq!(layout.count(), 4);
        let mut last = 0;
        for c in b'a'..=b'z' {
            let term = (c as char).to_string();
            let b = layout.bucket_for(&term);
            assert!(b >= 1 && b >= last, "letter {term} went to bucket {b}");
            last = b;
        }
        assert_eq!(last, 3);
        assert_eq!(layout.name(1), "a-h");
        assert_eq!(layout.name(3), "r-z");
    }

    #[test]
    fn doc_map_roundtrip_and_density() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc_ids.jsonl");
        let mut w = DocMapWriter::create(&path).unwrap();
        w.append(&DocRecord { doc_id: 0, url: "https://a".into(), duplicate_of: None }).unwrap();
        w.append(&DocRecord { doc_id: 1, url: "https://b".into(), duplicate_of: Some(0) }).unwrap();
        w.sync().unwrap();
        let docs = load_doc_map(&path).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].duplicate_of, Some(0));

        fs::write(&path, "{\"doc_id\":1,\"url\":\"https://x\"}\n").unwrap();
        assert!(matches!(load_doc_map(&path), Err(Error::CorruptIndex(_))));
    }

    #[test]
    fn current_generation_parsing() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        assert_eq!(paths.current_generation().unwrap(), None);
        atomic_write(&paths.current(), generation_name(7).as_bytes()).unwrap();
        assert_eq!(paths.current_generation().unwrap().as_deref(), Some("gen-000007"));
        fs::write(paths.current(), "garbage").unwrap();
        assert!(paths.current_generation().is_err());
    }
}
