//! Field-weighted TF-IDF search over a split, alphabetically bucketed index.
//!
//! Building: [`IndexBuilder`] normalizes documents, drops or flags
//! near-duplicates, flushes bounded batches as partial segments and merges
//! them into a published generation. Serving: [`SplitIndex`] loads the term
//! directory and doc map, and [`SearchEngine`] answers boolean-AND queries.

pub mod builder;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod index;
pub mod merge;
pub mod persist;
pub mod posting;
pub mod query;
pub mod segment;
pub mod store;
pub mod tokenizer;

pub use builder::{AddOutcome, BuildStats, IndexBuilder};
pub use config::{DuplicatePolicy, FieldWeights, IndexConfig};
pub use error::{Error, IngestError, Result};
pub use index::{DocId, DocRecord, Document, Field, Posting};
pub use merge::MergeSummary;
pub use query::{SearchEngine, SearchHit};
pub use store::SplitIndex;
