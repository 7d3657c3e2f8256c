//! Boolean-AND ranked retrieval over a [`SplitIndex`].
//!
//! A query runs PARSE → LOOKUP → INTERSECT → SCORE → RANK. Term lookups and
//! per-document scoring fan out on the rayon pool and are joined before the
//! intersection and before ranking respectively.

use crate::error::{Error, Result};
use crate::index::{DocId, Posting};
use crate::store::SplitIndex;
use crate::tokenizer::Normalizer;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub url: String,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<DocId>,
}

/// Weight of one term in one document:
/// `(1 + ln tf) * mean field weight * ln(N / df)`.
pub fn term_weight(p: &Posting, idf: f32) -> f32 {
    let tf = if p.tf > 0 { 1.0 + (p.tf as f32).ln() } else { 0.0 };
    tf * p.boost() * idf
}

pub fn idf(num_docs: u32, df: u32) -> f32 {
    ((num_docs.max(1) as f32) / (df.max(1) as f32)).ln()
}

/// Doc ids present in every list. Lists must be sorted by doc id; the
/// shortest list drives the merge.
pub fn intersect(lists: &[&[Posting]]) -> Vec<DocId> {
    let mut order: Vec<&[Posting]> = lists.to_vec();
    order.sort_by_key(|l| l.len());
    let Some((first, rest)) = order.split_first() else { return Vec::new() };
    let mut result: Vec<DocId> = first.iter().map(|p| p.doc_id).collect();
    for list in rest {
        let mut out = Vec::with_capacity(result.len());
        let (mut i, mut j) = (0, 0);
        while i < result.len() && j < list.len() {
            let (a, b) = (result[i], list[j].doc_id);
            if a == b {
                out.push(a);
                i += 1;
                j += 1;
            } else if a < b {
                i += 1;
            } else {
                j += 1;
            }
        }
        result = out;
        if result.is_empty() {
            break;
        }
    }
    result
}

#[derive(Clone)]
pub struct SearchEngine {
    index: Arc<SplitIndex>,
    normalizer: Normalizer,
}

impl SearchEngine {
    pub fn new(index: Arc<SplitIndex>) -> Self {
        let normalizer = Normalizer::new(index.meta().config.min_token_len);
        Self { index, normalizer }
    }

    pub fn index(&self) -> &SplitIndex { &self.index }

    /// Ranked documents containing every query term, best first; equal scores
    /// are ordered by doc id. A query with no usable terms, or with a term
    /// that is not indexed, yields an empty list.
    pub fn search(&self, text: &str) -> Result<Vec<SearchHit>> {
        let terms = self.normalizer.query_terms(text);
        debug!(query = text, ?terms, "parsed query");
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let fetched: Vec<Option<Vec<Posting>>> = terms
            .par_iter()
            .map(|t| self.index.lookup(t))
            .collect::<Result<Vec<_>>>()?;
        let Some(lists) = fetched.into_iter().collect::<Option<Vec<Vec<Posting>>>>() else {
            debug!(query = text, "query term missing from index");
            return Ok(Vec::new());
        };

        let slices: Vec<&[Posting]> = lists.iter().map(|l| l.as_slice()).collect();
        let docs = intersect(&slices);
        debug!(query = text, matches = docs.len(), "intersected postings");
        if docs.is_empty() {
            return Ok(Vec::new());
        }

        // Query vector: idf of each distinct term, unit length.
        let n = self.index.num_docs();
        let idfs: Vec<f32> = lists.iter().map(|l| idf(n, l.len() as u32)).collect();
        let mut norm = idfs.iter().map(|w| w * w).sum::<f32>().sqrt();
        if norm == 0.0 { norm = 1.0; }
        let q_weights: Vec<f32> = idfs.iter().map(|w| w / norm).collect();

        let mut hits: Vec<SearchHit> = docs
            .par_iter()
            .map(|&doc_id| {
                let mut score = 0.0f32;
                for ((list, &idf_t), &q_w) in lists.iter().zip(&idfs).zip(&q_weights) {
                    let i = list
                        .binary_search_by_key(&doc_id, |p| p.doc_id)
                        .map_err(|_| Error::CorruptIndex(format!("doc {doc_id} vanished from a posting list")))?;
                    score += term_weight(&list[i], idf_t) * q_w;
                }
                let rec = self
                    .index
                    .document(doc_id)
                    .ok_or_else(|| Error::CorruptIndex(format!("posting references unknown doc {doc_id}")))?;
                Ok(SearchHit { doc_id, url: rec.url.clone(), score, duplicate_of: rec.duplicate_of })
            })
            .collect::<Result<Vec<_>>>()?;

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.doc_id.cmp(&b.doc_id)));
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(ids: &[DocId]) -> Vec<Posting> {
        ids.iter().map(|&doc_id| Posting { doc_id, tf: 1, field_weight_sum: 1.0 }).collect()
    }

    #[test]
    fn intersect_sorted_lists() {
        let a = list(&[1, 3, 5, 7, 9]);
        let b = list(&[3, 4, 5, 9]);
        let c = list(&[0, 5, 9, 12]);
        assert_eq!(intersect(&[a.as_slice(), b.as_slice(), c.as_slice()]), vec![5, 9]);
        assert_eq!(intersect(&[a.as_slice()]), vec![1, 3, 5, 7, 9]);
        let d = list(&[2, 4]);
        assert!(intersect(&[a.as_slice(), d.as_slice()]).is_empty());
        assert!(intersect(&[]).is_empty());
    }

    #[test]
    fn weight_formula() {
        let p = Posting { doc_id: 0, tf: 1, field_weight_sum: 3.0 };
        let w = term_weight(&p, idf(10, 1));
        assert!((w - 3.0 * 10f32.ln()).abs() < 1e-5);
        let p = Posting { doc_id: 0, tf: 4, field_weight_sum: 4.0 };
        assert!((term_weight(&p, 1.0) - (1.0 + 4f32.ln())).abs() < 1e-5);
    }

    #[test]
    fn term_in_every_document_has_zero_idf() {
        assert_eq!(idf(5, 5), 0.0);
        assert!(idf(5, 1) > idf(5, 2));
    }
}
