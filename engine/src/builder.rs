//! Single-owner ingestion pipeline.
//!
//! An [`IndexBuilder`] owns everything one indexing run accumulates: the
//! posting store, the accepted fingerprints, the doc map writer and the
//! sequence of flushed segments. Documents go through the normalizer and
//! fingerprinter into the store; the store is flushed to a segment whenever
//! its estimated size passes the configured threshold; [`IndexBuilder::finish`]
//! flushes the tail and merges everything into a published generation.

use crate::config::{DuplicatePolicy, IndexConfig};
use crate::error::{Error, IngestError, Result};
use crate::fingerprint::{simhash, Fingerprinter};
use crate::index::{DocId, DocRecord, Document, Field};
use crate::merge::{merge, MergeSummary};
use crate::persist::{atomic_write, DocMapWriter, IndexPaths};
use crate::posting::PostingStore;
use crate::segment::{segment_file_name, write_segment};
use crate::tokenizer::Normalizer;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// What happened to a document passed to [`IndexBuilder::add_document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Indexed(DocId),
    /// Indexed, but flagged as a near-duplicate of an earlier document.
    Flagged { doc_id: DocId, duplicate_of: DocId },
    /// Dropped as a near-duplicate of an earlier document.
    Dropped { duplicate_of: DocId },
}

#[derive(Debug, Clone, Default)]
pub struct BuildStats {
    pub indexed: u32,
    pub flagged: u32,
    pub dropped: u32,
    pub segments: u32,
}

pub struct IndexBuilder {
    paths: IndexPaths,
    config: IndexConfig,
    normalizer: Normalizer,
    fingerprints: Fingerprinter,
    /// Accepted signature -> first document that carried it.
    owners: HashMap<u64, DocId>,
    store: PostingStore,
    doc_map: DocMapWriter,
    next_doc_id: DocId,
    stats: BuildStats,
    /// Set once a flush has failed; the batch it held is lost.
    failed: bool,
}

impl IndexBuilder {
    /// Start a build under `root`. Leftovers of an earlier unfinished build
    /// in the work directory are discarded; published generations are kept.
    pub fn create<P: AsRef<Path>>(root: P, config: IndexConfig) -> Result<Self> {
        config.validate()?;
        let paths = IndexPaths::new(root);
        let work = paths.work_dir();
        if work.exists() {
            info!(path = %work.display(), "discarding unfinished build");
            fs::remove_dir_all(&work)?;
        }
        fs::create_dir_all(paths.segments_dir())?;
        atomic_write(&paths.pending_config(), serde_json::to_string_pretty(&config)?.as_bytes())?;
        let doc_map = DocMapWriter::create(&paths.pending_doc_map())?;
        Ok(Self {
            normalizer: Normalizer::new(config.min_token_len),
            fingerprints: Fingerprinter::new(config.near_duplicate_distance),
            owners: HashMap::new(),
            store: PostingStore::new(config.field_weights),
            doc_map,
            next_doc_id: 0,
            stats: BuildStats::default(),
            failed: false,
            paths,
            config,
        })
    }

    pub fn stats(&self) -> &BuildStats { &self.stats }

    /// Normalize, fingerprint and accumulate one document.
    ///
    /// `Error::Ingest` rejects only this document; the builder stays usable.
    /// `Error::Flush` and other I/O errors end the run.
    pub fn add_document(&mut self, doc: &Document) -> Result<AddOutcome> {
        self.check_usable()?;
        let url = doc.url.trim();
        if url.is_empty() {
            return Err(IngestError::MissingUrl.into());
        }
        let mut terms: Vec<(String, Field)> = Vec::new();
        for field in Field::ALL {
            terms.extend(self.normalizer.field_terms(field, doc.field(field)));
        }
        if terms.is_empty() {
            return Err(IngestError::Empty { url: url.to_string() }.into());
        }

        let mut counts: HashMap<String, u32> = HashMap::new();
        for (term, _) in &terms {
            *counts.entry(term.clone()).or_insert(0) += 1;
        }
        let sig = simhash(&counts);
        let duplicate_of = self
            .fingerprints
            .is_duplicate(sig)
            .and_then(|matched| self.owners.get(&matched).copied());

        if let (Some(original), DuplicatePolicy::Drop) = (duplicate_of, self.config.duplicate_policy) {
            debug!(url, duplicate_of = original, "dropping near-duplicate");
            self.stats.dropped += 1;
            return Ok(AddOutcome::Dropped { duplicate_of: original });
        }

        let doc_id = self.next_doc_id;
        self.next_doc_id += 1;
        self.doc_map.append(&DocRecord { doc_id, url: url.to_string(), duplicate_of })?;
        self.store.add_document(doc_id, &terms);
        self.fingerprints.accept(sig);
        self.owners.entry(sig).or_insert(doc_id);

        if self.store.approx_bytes() > self.config.flush_threshold_bytes {
            self.flush()?;
        }
        match duplicate_of {
            Some(original) => {
                self.stats.flagged += 1;
                Ok(AddOutcome::Flagged { doc_id, duplicate_of: original })
            }
            None => {
                self.stats.indexed += 1;
                Ok(AddOutcome::Indexed(doc_id))
            }
        }
    }

    /// Write the current batch as a new segment and clear the store.
    pub fn flush(&mut self) -> Result<()> {
        self.check_usable()?;
        let res = self.write_batch();
        if res.is_err() {
            self.failed = true;
        }
        res
    }

    fn check_usable(&self) -> Result<()> {
        if self.failed {
            return Err(Error::Flush {
                path: self.paths.segments_dir(),
                reason: "an earlier flush failed; the build must be restarted".to_string(),
            });
        }
        Ok(())
    }

    fn write_batch(&mut self) -> Result<()> {
        if self.store.is_empty() {
            return Ok(());
        }
        let bytes = self.store.approx_bytes();
        let docs = self.store.num_docs();
        let entries = self.store.drain_sorted();
        let path = self.paths.segments_dir().join(segment_file_name(self.stats.segments));
        write_segment(&path, &entries)?;
        // The doc map must cover every doc id a durable segment mentions.
        self.doc_map.sync().map_err(|e| Error::Flush { path: path.clone(), reason: e.to_string() })?;
        self.stats.segments += 1;
        info!(segment = %path.display(), terms = entries.len(), docs, approx_bytes = bytes, "flushed partial segment");
        Ok(())
    }

    /// Flush the remaining batch and merge all segments into a published index.
    pub fn finish(mut self) -> Result<MergeSummary> {
        self.flush()?;
        self.doc_map.sync()?;
        let stats = self.stats.clone();
        info!(
            indexed = stats.indexed,
            flagged = stats.flagged,
            dropped = stats.dropped,
            segments = stats.segments,
            "ingestion complete"
        );
        let IndexBuilder { paths, config, doc_map, .. } = self;
        drop(doc_map);
        merge(&paths, &config)
    }
}
