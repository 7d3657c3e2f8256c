//! Read-only access to a published split index.
//!
//! Only the term directory and the doc map are resident. Posting lists are
//! read from their bucket file with one positioned read per lookup, so any
//! number of threads can share a `SplitIndex` without locking.

use crate::error::{Error, Result};
use crate::index::{DocId, DocRecord, Posting};
use crate::persist::{
    load_directory, load_doc_map, load_meta, BucketLayout, IndexMeta, IndexPaths, TermEntry, FORMAT_VERSION,
};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::info;

pub struct SplitIndex {
    generation: String,
    meta: IndexMeta,
    layout: BucketLayout,
    directory: HashMap<String, TermEntry>,
    docs: Vec<DocRecord>,
    buckets: Vec<PathBuf>,
}

impl SplitIndex {
    /// Open the generation named by `CURRENT` under `root` and check that the
    /// directory is consistent with the bucket files on disk.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let paths = IndexPaths::new(root);
        let generation = paths
            .current_generation()?
            .ok_or_else(|| Error::CorruptIndex(format!("no published index under {}", paths.root.display())))?;
        let gen = paths.generation(&generation);

        let meta = load_meta(&gen.meta())?;
        if meta.version != FORMAT_VERSION {
            return Err(Error::CorruptIndex(format!("unsupported index version {}", meta.version)));
        }
        meta.config.validate().map_err(|e| Error::CorruptIndex(e.to_string()))?;
        let layout = BucketLayout::new(meta.config.bucket_count);
        let buckets: Vec<PathBuf> = (0..layout.count()).map(|b| gen.bucket(&layout.name(b))).collect();

        let directory = load_directory(&gen.directory())?;
        let docs = load_doc_map(&gen.doc_map())?;
        if docs.len() != meta.num_docs as usize {
            return Err(Error::CorruptIndex(format!(
                "meta lists {} documents, doc map has {}",
                meta.num_docs,
                docs.len()
            )));
        }

        let mut per_bucket: Vec<Vec<(u64, u64, &str)>> = vec![Vec::new(); layout.count()];
        for (term, e) in &directory {
            let b = e.bucket as usize;
            if b >= layout.count() {
                return Err(Error::CorruptIndex(format!("term '{term}' points at unknown bucket {b}")));
            }
            if layout.bucket_for(term) != b {
                return Err(Error::CorruptIndex(format!("term '{term}' is stored outside its bucket range")));
            }
            if e.df == 0 || e.df > meta.num_docs {
                return Err(Error::CorruptIndex(format!("term '{term}' has document frequency {}", e.df)));
            }
            per_bucket[b].push((e.offset, e.len as u64, term));
        }
        for (b, entries) in per_bucket.iter_mut().enumerate() {
            let size = fs::metadata(&buckets[b])
                .map_err(|e| Error::CorruptIndex(format!("bucket {}: {e}", buckets[b].display())))?
                .len();
            entries.sort_unstable();
            let mut expected = 0u64;
            for &(offset, len, term) in entries.iter() {
                if offset != expected {
                    return Err(Error::CorruptIndex(format!(
                        "bucket {} entry for '{term}' starts at {offset}, expected {expected}",
                        layout.name(b)
                    )));
                }
                expected = offset + len;
            }
            if expected != size {
                return Err(Error::CorruptIndex(format!(
                    "bucket {} is {size} bytes but its entries cover {expected}",
                    layout.name(b)
                )));
            }
        }

        let index = Self { generation, meta, layout, directory: directory.into_iter().collect(), docs, buckets };
        index.check_postings()?;
        info!(
            generation = %index.generation,
            num_docs = index.meta.num_docs,
            num_terms = index.directory.len(),
            "opened index"
        );
        Ok(index)
    }

    pub fn generation(&self) -> &str { &self.generation }

    pub fn meta(&self) -> &IndexMeta { &self.meta }

    pub fn num_docs(&self) -> u32 { self.docs.len() as u32 }

    pub fn num_terms(&self) -> usize { self.directory.len() }

    pub fn entry(&self, term: &str) -> Option<&TermEntry> { self.directory.get(term) }

    /// Posting list of `term`, or `None` if the term is not indexed.
    pub fn lookup(&self, term: &str) -> Result<Option<Vec<Posting>>> {
        match self.directory.get(term) {
            Some(e) => self.read_entry(e).map(Some),
            None => Ok(None),
        }
    }

    fn read_entry(&self, e: &TermEntry) -> Result<Vec<Posting>> {
        let mut f = File::open(&self.buckets[e.bucket as usize])?;
        f.seek(SeekFrom::Start(e.offset))?;
        let mut buf = vec![0u8; e.len as usize];
        f.read_exact(&mut buf)?;
        Ok(bincode::deserialize(&buf)?)
    }

    pub fn document(&self, doc_id: DocId) -> Option<&DocRecord> { self.docs.get(doc_id as usize) }

    pub fn document_url(&self, doc_id: DocId) -> Option<&str> {
        self.document(doc_id).map(|d| d.url.as_str())
    }

    /// Decode every posting list and check doc id order, doc map coverage and
    /// document frequencies. Reads the whole index; `open` already runs it.
    pub fn verify(&self) -> Result<()> {
        self.check_postings()?;
        info!(
            generation = %self.generation,
            terms = self.directory.len(),
            bucket_count = self.layout.count(),
            "index verified"
        );
        Ok(())
    }

    /// Lists are decoded one at a time in file order and dropped after checking.
    fn check_postings(&self) -> Result<()> {
        let mut terms: Vec<(&String, &TermEntry)> = self.directory.iter().collect();
        terms.sort_unstable_by_key(|(_, e)| (e.bucket, e.offset));
        for (term, e) in terms {
            let postings = self
                .read_entry(e)
                .map_err(|err| Error::CorruptIndex(format!("posting list of '{term}' is unreadable: {err}")))?;
            if bincode::serialized_size(&postings)? != e.len as u64 {
                return Err(Error::CorruptIndex(format!("posting list of '{term}' does not fill its entry")));
            }
            if postings.len() != e.df as usize {
                return Err(Error::CorruptIndex(format!(
                    "'{term}' has {} postings, directory says {}",
                    postings.len(),
                    e.df
                )));
            }
            if !postings.windows(2).all(|w| w[0].doc_id < w[1].doc_id) {
                return Err(Error::CorruptIndex(format!("postings of '{term}' are not strictly ordered")));
            }
            if let Some(p) = postings.iter().find(|p| p.doc_id >= self.num_docs() || p.tf == 0) {
                return Err(Error::CorruptIndex(format!("'{term}' has an invalid posting for doc {}", p.doc_id)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IndexBuilder;
    use crate::config::IndexConfig;
    use crate::index::Document;
    use crate::persist::save_directory;
    use tempfile::tempdir;

    fn build(root: &Path) {
        let mut b = IndexBuilder::create(root, IndexConfig::default()).unwrap();
        for (url, body) in [("https://a", "apple banana"), ("https://b", "banana cherry 2024")] {
            b.add_document(&Document { url: url.into(), body: body.into(), ..Default::default() }).unwrap();
        }
        b.finish().unwrap();
    }

    #[test]
    fn lookup_and_urls() {
        let dir = tempdir().unwrap();
        build(dir.path());
        let idx = SplitIndex::open(dir.path()).unwrap();
        assert_eq!(idx.num_docs(), 2);
        let banana = idx.lookup("banana").unwrap().unwrap();
        assert_eq!(banana.iter().map(|p| p.doc_id).collect::<Vec<_>>(), vec![0, 1]);
        assert!(idx.lookup("2024").unwrap().is_some());
        assert!(idx.lookup("durian").unwrap().is_none());
        assert_eq!(idx.document_url(1), Some("https://b"));
        assert_eq!(idx.document_url(2), None);
        idx.verify().unwrap();
    }

    #[test]
    fn missing_index_refuses_to_open() {
        let dir = tempdir().unwrap();
        assert!(matches!(SplitIndex::open(dir.path()), Err(Error::CorruptIndex(_))));
    }

    #[test]
    fn truncated_bucket_is_corrupt() {
        let dir = tempdir().unwrap();
        build(dir.path());
        let paths = IndexPaths::new(dir.path());
        let gen = paths.generation(&paths.current_generation().unwrap().unwrap());
        let bucket = gen.bucket("b");
        let bytes = fs::read(&bucket).unwrap();
        fs::write(&bucket, &bytes[..bytes.len() - 1]).unwrap();
        assert!(matches!(SplitIndex::open(dir.path()), Err(Error::CorruptIndex(_))));
    }

    #[test]
    fn garbled_bucket_of_same_length_is_corrupt() {
        let dir = tempdir().unwrap();
        build(dir.path());
        let paths = IndexPaths::new(dir.path());
        let gen = paths.generation(&paths.current_generation().unwrap().unwrap());
        let bucket = gen.bucket("a");
        let len = fs::metadata(&bucket).unwrap().len() as usize;
        fs::write(&bucket, vec![0u8; len]).unwrap();
        assert!(matches!(SplitIndex::open(dir.path()), Err(Error::CorruptIndex(_))));
    }

    #[test]
    fn posting_for_unknown_doc_is_corrupt() {
        let dir = tempdir().unwrap();
        build(dir.path());
        let paths = IndexPaths::new(dir.path());
        let gen = paths.generation(&paths.current_generation().unwrap().unwrap());
        let directory = load_directory(&gen.directory()).unwrap();
        let entry = directory["appl"];
        let bucket = gen.bucket("a");
        let mut bytes = fs::read(&bucket).unwrap();
        let forged = bincode::serialize(&vec![Posting { doc_id: 7, tf: 1, field_weight_sum: 1.0 }]).unwrap();
        assert_eq!(forged.len(), entry.len as usize);
        bytes[entry.offset as usize..entry.offset as usize + forged.len()].copy_from_slice(&forged);
        fs::write(&bucket, bytes).unwrap();
        assert!(matches!(SplitIndex::open(dir.path()), Err(Error::CorruptIndex(_))));
    }

    #[test]
    fn overlapping_entries_are_corrupt() {
        let dir = tempdir().unwrap();
        build(dir.path());
        let paths = IndexPaths::new(dir.path());
        let gen = paths.generation(&paths.current_generation().unwrap().unwrap());
        let mut directory = load_directory(&gen.directory()).unwrap();
        let appl = directory["appl"];
        directory.insert("avocado".into(), appl);
        save_directory(&gen.directory(), &directory).unwrap();
        assert!(matches!(SplitIndex::open(dir.path()), Err(Error::CorruptIndex(_))));
    }
}
