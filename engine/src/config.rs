//! Build-time configuration, persisted alongside the index so the query side
//! normalizes and buckets terms exactly as the build did.

use crate::error::{Error, Result};
use crate::index::Field;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

/// Default flush threshold for the in-memory posting store (20 MiB).
pub const DEFAULT_FLUSH_THRESHOLD: usize = 20 * 1024 * 1024;

/// One bucket per letter plus `other`.
pub const MAX_BUCKETS: usize = 27;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldWeights {
    pub title: f32,
    pub heading: f32,
    pub bold: f32,
    pub body: f32,
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self { title: 3.0, heading: 2.0, bold: 1.5, body: 1.0 }
    }
}

impl FieldWeights {
    pub fn weight(&self, field: Field) -> f32 {
        match field {
            Field::Title => self.title,
            Field::Heading => self.heading,
            Field::Bold => self.bold,
            Field::Body => self.body,
        }
    }
}

/// What happens to a document whose fingerprint matches an accepted one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Skip the document entirely; it gets no docID.
    #[default]
    Drop,
    /// Index it and record which document it duplicates.
    Flag,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drop" => Ok(DuplicatePolicy::Drop),
            "flag" => Ok(DuplicatePolicy::Flag),
            other => Err(format!("unknown duplicate policy '{other}' (expected drop or flag)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Approximate posting-store size in bytes that triggers a segment flush.
    pub flush_threshold_bytes: usize,
    pub field_weights: FieldWeights,
    /// Tokens shorter than this (in chars) are discarded.
    pub min_token_len: usize,
    /// Maximum SimHash Hamming distance still considered a near-duplicate.
    pub near_duplicate_distance: u32,
    pub duplicate_policy: DuplicatePolicy,
    /// Number of alphabetical bucket files, `other` included.
    pub bucket_count: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            flush_threshold_bytes: DEFAULT_FLUSH_THRESHOLD,
            field_weights: FieldWeights::default(),
            min_token_len: 2,
            near_duplicate_distance: 3,
            duplicate_policy: DuplicatePolicy::Drop,
            bucket_count: MAX_BUCKETS,
        }
    }
}

impl IndexConfig {
    /// Load a JSON config file. Missing keys take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let cfg: IndexConfig = serde_json::from_reader(reader)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_token_len == 0 {
            return Err(Error::Config("min_token_len must be at least 1".into()));
        }
        if !(2..=MAX_BUCKETS).contains(&self.bucket_count) {
            return Err(Error::Config(format!(
                "bucket_count must be between 2 and {MAX_BUCKETS}, got {}",
                self.bucket_count
            )));
        }
        if self.near_duplicate_distance > 64 {
            return Err(Error::Config("near_duplicate_distance cannot exceed 64".into()));
        }
        let w = &self.field_weights;
        for (name, value) in [("title", w.title), ("heading", w.heading), ("bold", w.bold), ("body", w.body)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::Config(format!("field weight {name} must be positive, got {value}")));
            }
        }
        Ok(())
    }
}
