//! Merge of partial segments into a published split index.
//!
//! Segments are read one record at a time and combined with a min-heap keyed
//! by `(term, segment)`, so memory stays bounded by one posting list per
//! segment plus the term directory. Output goes to a staging generation that
//! only becomes visible when `CURRENT` is swapped to point at it.

use crate::config::IndexConfig;
use crate::error::{Error, Result};
use crate::index::{normalize_postings, Posting};
use crate::persist::{
    atomic_write, generation_name, load_doc_map, parse_generation, save_directory, save_meta, sync_dir,
    BucketLayout, Directory, GenerationPaths, IndexMeta, IndexPaths, TermEntry, FORMAT_VERSION,
};
use crate::segment::SegmentReader;
use std::cmp::Ordering;
use std::collections::binary_heap::PeekMut;
use std::collections::BinaryHeap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct MergeSummary {
    pub generation: String,
    pub segments: usize,
    pub num_terms: u64,
    pub num_docs: u32,
}

/// Head record of one segment in the merge heap.
struct HeapEntry {
    term: String,
    segment: usize,
    postings: Vec<Posting>,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.term == other.term && self.segment == other.segment
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap.
        other.term.cmp(&self.term).then_with(|| other.segment.cmp(&self.segment))
    }
}

struct SegmentCursor {
    reader: SegmentReader,
    last_term: Option<String>,
}

impl SegmentCursor {
    fn advance(&mut self, segment: usize, heap: &mut BinaryHeap<HeapEntry>) -> Result<()> {
        if let Some((term, postings)) = self.reader.next_entry()? {
            if self.last_term.as_ref().map_or(false, |last| *last >= term) {
                return Err(Error::Merge(format!(
                    "segment {} is not sorted at term '{term}'",
                    self.reader.path().display()
                )));
            }
            self.last_term = Some(term.clone());
            heap.push(HeapEntry { term, segment, postings });
        }
        Ok(())
    }
}

/// Append-only writer for one bucket file, tracking the next offset.
struct BucketWriter {
    out: BufWriter<File>,
    offset: u64,
}

/// Merge every segment in `segments` and write bucket files plus the term
/// directory under `gen`. Posting lists for a term that appears in several
/// segments are concatenated, sorted by doc id and summed per doc id.
pub fn merge_segments(
    segments: &[PathBuf],
    gen: &GenerationPaths,
    layout: &BucketLayout,
    num_docs: u32,
) -> Result<Directory> {
    fs::create_dir_all(gen.buckets_dir())?;
    let mut writers = Vec::with_capacity(layout.count());
    for b in 0..layout.count() {
        let f = File::create(gen.bucket(&layout.name(b)))?;
        writers.push(BucketWriter { out: BufWriter::new(f), offset: 0 });
    }

    let mut cursors = Vec::with_capacity(segments.len());
    let mut heap = BinaryHeap::with_capacity(segments.len());
    for (i, path) in segments.iter().enumerate() {
        let mut cursor = SegmentCursor { reader: SegmentReader::open(path)?, last_term: None };
        cursor.advance(i, &mut heap)?;
        cursors.push(cursor);
    }

    let mut directory = Directory::new();
    while let Some(head) = heap.pop() {
        let term = head.term;
        let mut postings = head.postings;
        cursors[head.segment].advance(head.segment, &mut heap)?;
        loop {
            let next = match heap.peek_mut() {
                Some(n) if n.term == term => PeekMut::pop(n),
                _ => break,
            };
            postings.extend(next.postings);
            cursors[next.segment].advance(next.segment, &mut heap)?;
        }
        normalize_postings(&mut postings);
        if let Some(p) = postings.iter().find(|p| p.doc_id >= num_docs) {
            return Err(Error::Merge(format!(
                "term '{term}' references doc {} but only {num_docs} documents exist",
                p.doc_id
            )));
        }

        let bucket = layout.bucket_for(&term);
        let bytes = bincode::serialize(&postings)?;
        let w = &mut writers[bucket];
        w.out.write_all(&bytes)?;
        directory.insert(
            term,
            TermEntry { bucket: bucket as u16, offset: w.offset, len: bytes.len() as u32, df: postings.len() as u32 },
        );
        w.offset += bytes.len() as u64;
    }

    for w in writers {
        let f = w.out.into_inner().map_err(|e| e.into_error())?;
        f.sync_all()?;
    }
    sync_dir(&gen.buckets_dir())?;
    Ok(directory)
}

fn next_generation(paths: &IndexPaths) -> Result<u64> {
    let mut max = 0;
    for entry in fs::read_dir(&paths.root)? {
        let name = entry?.file_name();
        if let Some(n) = name.to_str().and_then(|s| parse_generation(s.trim_end_matches(".tmp"))) {
            max = max.max(n);
        }
    }
    Ok(max + 1)
}

/// Merge the segments left in the work directory of `paths` into a new
/// generation and publish it.
///
/// Segments and the pending doc map are removed only after `CURRENT` points
/// at the new generation. On failure the staging directory is removed and the
/// previously published generation is left as it was.
pub fn merge(paths: &IndexPaths, config: &IndexConfig) -> Result<MergeSummary> {
    let segments = paths.list_segments()?;
    let previous = paths.current_generation()?;
    let n = next_generation(paths)?;
    let name = generation_name(n);
    let staging = paths.root.join(format!("{name}.tmp"));
    info!(segments = segments.len(), generation = %name, "merging partial segments");

    let built = build_generation(paths, config, &segments, &staging);
    let (num_docs, num_terms) = match built {
        Ok(counts) => counts,
        Err(e) => {
            let _ = fs::remove_dir_all(&staging);
            return Err(match e {
                Error::Merge(msg) => Error::Merge(msg),
                other => Error::Merge(other.to_string()),
            });
        }
    };

    let published = publish(paths, &staging, &name);
    if let Err(e) = published {
        let _ = fs::remove_dir_all(&staging);
        return Err(Error::Merge(format!("publishing {name}: {e}")));
    }
    info!(generation = %name, num_docs, num_terms, "published index generation");

    if let Err(e) = fs::remove_dir_all(paths.work_dir()) {
        warn!(error = %e, "could not remove work directory after merge");
    }
    remove_stale_generations(paths, n, previous.as_deref().and_then(parse_generation));

    Ok(MergeSummary { generation: name, segments: segments.len(), num_terms, num_docs })
}

fn build_generation(
    paths: &IndexPaths,
    config: &IndexConfig,
    segments: &[PathBuf],
    staging: &Path,
) -> Result<(u32, u64)> {
    if staging.exists() {
        fs::remove_dir_all(staging)?;
    }
    fs::create_dir_all(staging)?;
    let gen = GenerationPaths { dir: staging.to_path_buf() };

    let pending = paths.pending_doc_map();
    if !pending.exists() {
        return Err(Error::Merge(format!("no doc map at {}", pending.display())));
    }
    let docs = load_doc_map(&pending).map_err(|e| Error::Merge(e.to_string()))?;
    let num_docs = docs.len() as u32;

    let layout = BucketLayout::new(config.bucket_count);
    let directory = merge_segments(segments, &gen, &layout, num_docs)?;
    let num_terms = directory.len() as u64;

    fs::copy(&pending, gen.doc_map())?;
    File::open(gen.doc_map())?.sync_all()?;
    save_directory(&gen.directory(), &directory)?;
    let meta = IndexMeta {
        version: FORMAT_VERSION,
        num_docs,
        num_terms,
        created_at: time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        config: config.clone(),
    };
    save_meta(&gen.meta(), &meta)?;
    sync_dir(staging)?;
    Ok((num_docs, num_terms))
}

fn publish(paths: &IndexPaths, staging: &Path, name: &str) -> Result<()> {
    let final_dir = paths.root.join(name);
    fs::rename(staging, &final_dir)?;
    sync_dir(&paths.root)?;
    atomic_write(&paths.current(), name.as_bytes())
}

/// Remove every generation other than `current` and the one it replaced.
fn remove_stale_generations(paths: &IndexPaths, current: u64, previous: Option<u64>) {
    let entries = match fs::read_dir(&paths.root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "could not list index root for cleanup");
            return;
        }
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(n) = parse_generation(name.trim_end_matches(".tmp")) else { continue };
        let keep = !name.ends_with(".tmp") && (n == current || Some(n) == previous);
        if !keep {
            if let Err(e) = fs::remove_dir_all(entry.path()) {
                warn!(generation = name, error = %e, "could not remove stale generation");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::DocRecord;
    use crate::persist::{load_directory, DocMapWriter};
    use crate::segment::{segment_file_name, write_segment};
    use tempfile::tempdir;

    fn p(doc_id: u32, tf: u32) -> Posting {
        Posting { doc_id, tf, field_weight_sum: tf as f32 }
    }

    fn seed(paths: &IndexPaths, segments: &[Vec<(&str, Vec<Posting>)>], num_docs: u32) {
        fs::create_dir_all(paths.segments_dir()).unwrap();
        for (i, seg) in segments.iter().enumerate() {
            let entries: Vec<(String, Vec<Posting>)> =
                seg.iter().map(|(t, v)| (t.to_string(), v.clone())).collect();
            write_segment(&paths.segments_dir().join(segment_file_name(i as u32)), &entries).unwrap();
        }
        let mut w = DocMapWriter::create(&paths.pending_doc_map()).unwrap();
        for d in 0..num_docs {
            w.append(&DocRecord { doc_id: d, url: format!("https://example.com/{d}"), duplicate_of: None }).unwrap();
        }
        w.sync().unwrap();
    }

    fn read_list(gen: &GenerationPaths, layout: &BucketLayout, e: &TermEntry) -> Vec<Posting> {
        let bytes = fs::read(gen.bucket(&layout.name(e.bucket as usize))).unwrap();
        bincode::deserialize(&bytes[e.offset as usize..(e.offset + e.len as u64) as usize]).unwrap()
    }

    #[test]
    fn union_of_segments_is_sorted_and_summed() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        seed(
            &paths,
            &[
                vec![("apple", vec![p(0, 1), p(2, 1)]), ("cherry", vec![p(1, 3)])],
                vec![("apple", vec![p(3, 2)]), ("banana", vec![p(3, 1)])],
                vec![("42", vec![p(4, 1)]), ("apple", vec![p(2, 4)])],
            ],
            5,
        );
        let summary = merge(&paths, &IndexConfig::default()).unwrap();
        assert_eq!(summary.num_terms, 4);
        assert_eq!(summary.segments, 3);

        let gen = paths.generation(&summary.generation);
        let directory = load_directory(&gen.directory()).unwrap();
        let layout = BucketLayout::new(27);
        let apple = directory["apple"];
        assert_eq!(apple.df, 3);
        assert_eq!(read_list(&gen, &layout, &apple), vec![p(0, 1), p(2, 5), p(3, 2)]);
        assert_eq!(directory["42"].bucket, 0);
        assert_eq!(read_list(&gen, &layout, &directory["cherry"]), vec![p(1, 3)]);

        assert!(!paths.work_dir().exists());
        assert_eq!(paths.current_generation().unwrap(), Some(summary.generation));
    }

    #[test]
    fn failed_merge_keeps_previous_generation() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        seed(&paths, &[vec![("apple", vec![p(0, 1)])]], 1);
        let first = merge(&paths, &IndexConfig::default()).unwrap();

        // posting for a document missing from the doc map
        seed(&paths, &[vec![("apple", vec![p(9, 1)])]], 1);
        let err = merge(&paths, &IndexConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Merge(_)));
        assert_eq!(paths.current_generation().unwrap(), Some(first.generation.clone()));
        assert!(paths.generation(&first.generation).directory().exists());
        assert!(!dir.path().join("gen-000002.tmp").exists());
        // segments stay for a retry
        assert_eq!(paths.list_segments().unwrap().len(), 1);
    }

    #[test]
    fn second_publish_keeps_one_previous_generation() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        for round in 0..3 {
            seed(&paths, &[vec![("apple", vec![p(0, round + 1)])]], 1);
            merge(&paths, &IndexConfig::default()).unwrap();
        }
        assert!(!dir.path().join("gen-000001").exists());
        assert!(dir.path().join("gen-000002").exists());
        assert!(dir.path().join("gen-000003").exists());
    }
}
