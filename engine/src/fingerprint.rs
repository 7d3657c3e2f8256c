//! Near-duplicate detection with 64-bit SimHash.
//!
//! Every distinct term contributes `+count` or `-count` to each of 64 bit
//! accumulators depending on the bits of its hash; bit i of the signature is
//! set iff accumulator i ends up positive. Documents with the same term
//! multiset get the same signature, and documents that share most of their
//! terms land a small Hamming distance apart.

use sha1::{Digest, Sha1};
use std::collections::{HashMap, HashSet};

/// Bands used for candidate lookup. A signature within Hamming distance
/// `BANDS - 1` of another agrees with it exactly on at least one band.
const BANDS: usize = 4;
const BAND_BITS: u32 = 64 / BANDS as u32;

fn term_hash(term: &str) -> u64 {
    let digest = Sha1::digest(term.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// SimHash of a term multiset.
pub fn simhash(terms: &HashMap<String, u32>) -> u64 {
    let mut acc = [0i64; 64];
    for (term, &count) in terms {
        let h = term_hash(term);
        let w = count as i64;
        for (bit, slot) in acc.iter_mut().enumerate() {
            if h >> bit & 1 == 1 { *slot += w } else { *slot -= w }
        }
    }
    let mut sig = 0u64;
    for (bit, &a) in acc.iter().enumerate() {
        if a > 0 {
            sig |= 1u64 << bit;
        }
    }
    sig
}

#[inline]
pub fn hamming(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

#[inline]
fn band(sig: u64, i: usize) -> u16 {
    (sig >> (i as u32 * BAND_BITS)) as u16
}

/// Signatures of the documents accepted so far in one indexing run.
pub struct Fingerprinter {
    max_distance: u32,
    accepted: HashSet<u64>,
    bands: [HashMap<u16, Vec<u64>>; BANDS],
    order: Vec<u64>,
}

impl Fingerprinter {
    pub fn new(max_distance: u32) -> Self {
        Self {
            max_distance,
            accepted: HashSet::new(),
            bands: Default::default(),
            order: Vec::new(),
        }
    }

    pub fn len(&self) -> usize { self.accepted.len() }

    pub fn is_empty(&self) -> bool { self.accepted.is_empty() }

    /// The accepted signature `sig` is a near-duplicate of, if any.
    pub fn is_duplicate(&self, sig: u64) -> Option<u64> {
        if self.accepted.contains(&sig) {
            return Some(sig);
        }
        if self.max_distance == 0 {
            return None;
        }
        if (self.max_distance as usize) < BANDS {
            for i in 0..BANDS {
                if let Some(candidates) = self.bands[i].get(&band(sig, i)) {
                    if let Some(&hit) = candidates.iter().find(|&&c| hamming(c, sig) <= self.max_distance) {
                        return Some(hit);
                    }
                }
            }
            None
        } else {
            self.order.iter().copied().find(|&c| hamming(c, sig) <= self.max_distance)
        }
    }

    /// Record the signature of a document that made it into the index.
    pub fn accept(&mut self, sig: u64) {
        if !self.accepted.insert(sig) {
            return;
        }
        for i in 0..BANDS {
            self.bands[i].entry(band(sig, i)).or_default().push(sig);
        }
        self.order.push(sig);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn multiset(words: &[&str]) -> HashMap<String, u32> {
        let mut m = HashMap::new();
        for w in words {
            *m.entry(w.to_string()).or_insert(0) += 1;
        }
        m
    }

    #[test]
    fn same_multiset_same_signature() {
        let a = simhash(&multiset(&["uci", "research", "lab", "lab"]));
        let b = simhash(&multiset(&["lab", "research", "lab", "uci"]));
        assert_eq!(a, b);
    }

    #[test]
    fn exact_duplicate_detected_after_accept() {
        let mut fp = Fingerprinter::new(0);
        let sig = simhash(&multiset(&["alpha", "beta", "gamma"]));
        assert_eq!(fp.is_duplicate(sig), None);
        fp.accept(sig);
        assert_eq!(fp.is_duplicate(sig), Some(sig));
        assert_eq!(fp.len(), 1);
    }

    #[test]
    fn banded_lookup_finds_close_signatures() {
        let mut fp = Fingerprinter::new(3);
        let base = 0xDEAD_BEEF_0123_4567u64;
        fp.accept(base);
        // three bits flipped across three different bands
        let near = base ^ (1 << 1) ^ (1 << 20) ^ (1 << 40);
        assert_eq!(fp.is_duplicate(near), Some(base));
        let far = base ^ 0xFF;
        assert_eq!(fp.is_duplicate(far), None);
    }

    #[test]
    fn linear_scan_for_wide_thresholds() {
        let mut fp = Fingerprinter::new(10);
        fp.accept(0);
        assert_eq!(fp.is_duplicate(0x3FF), Some(0));
        assert_eq!(fp.is_duplicate(0x7FF), None);
    }

    #[test]
    fn unrelated_documents_are_far_apart() {
        let a = simhash(&multiset(&["uci", "comput", "scienc", "research", "lab"]));
        let b = simhash(&multiset(&["weather", "forecast", "rain", "tomorrow", "cloud"]));
        assert!(hamming(a, b) > 3);
    }
}
