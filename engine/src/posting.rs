//! In-memory posting accumulation for the current batch of documents.

use crate::config::FieldWeights;
use crate::index::{DocId, Field, Posting};
use std::collections::HashMap;
use std::mem::size_of;

/// Rough per-entry cost of a hash map slot beyond key and value.
const MAP_ENTRY_OVERHEAD: usize = 16;

/// Term → postings for one batch. Documents must be added in ascending
/// doc id order, which keeps every list sorted without re-sorting.
pub struct PostingStore {
    weights: FieldWeights,
    postings: HashMap<String, Vec<Posting>>,
    approx_bytes: usize,
    num_docs: usize,
}

impl PostingStore {
    pub fn new(weights: FieldWeights) -> Self {
        Self { weights, postings: HashMap::new(), approx_bytes: 0, num_docs: 0 }
    }

    /// Fold one document's `(term, field)` occurrences into the store.
    /// Repeated occurrences collapse into a single posting per term.
    pub fn add_document(&mut self, doc_id: DocId, terms: &[(String, Field)]) {
        let mut local: HashMap<&str, Posting> = HashMap::new();
        for (term, field) in terms {
            let p = local
                .entry(term.as_str())
                .or_insert(Posting { doc_id, tf: 0, field_weight_sum: 0.0 });
            p.tf += 1;
            p.field_weight_sum += self.weights.weight(*field);
        }
        for (term, posting) in local {
            match self.postings.get_mut(term) {
                Some(list) => {
                    debug_assert!(list.last().map_or(true, |last| last.doc_id < doc_id));
                    list.push(posting);
                }
                None => {
                    self.approx_bytes +=
                        term.len() + size_of::<String>() + size_of::<Vec<Posting>>() + MAP_ENTRY_OVERHEAD;
                    self.postings.insert(term.to_string(), vec![posting]);
                }
            }
            self.approx_bytes += size_of::<Posting>();
        }
        self.num_docs += 1;
    }

    pub fn approx_bytes(&self) -> usize { self.approx_bytes }

    pub fn num_terms(&self) -> usize { self.postings.len() }

    pub fn num_docs(&self) -> usize { self.num_docs }

    pub fn is_empty(&self) -> bool { self.postings.is_empty() }

    pub fn get(&self, term: &str) -> Option<&[Posting]> {
        self.postings.get(term).map(|v| v.as_slice())
    }

    /// Empty the store, returning its lists in ascending term order.
    pub fn drain_sorted(&mut self) -> Vec<(String, Vec<Posting>)> {
        let mut entries: Vec<(String, Vec<Posting>)> = self.postings.drain().collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        self.approx_bytes = 0;
        self.num_docs = 0;
        entries
    }
}
