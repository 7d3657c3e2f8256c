use crate::index::Field;
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use unicode_normalization::UnicodeNormalization;
use std::collections::HashSet;

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)[\p{L}\p{N}]+").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","cannot","could",
            "did","do","does","doing","down","during",
            "each","few","for","from","further",
            "had","has","have","having","he","her","here","hers","herself","him","himself","his","how",
            "i","if","in","into","is","it","its","itself",
            "me","more","most","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought",
            "our","ours","ourselves","out","over","own",
            "same","she","should","so","some","such",
            "than","that","the","their","theirs","them","themselves","then","there","these","they",
            "this","those","through","to","too",
            "under","until","up","very",
            "was","we","were","what","when","where","which","while","who","whom","why","with","would",
            "you","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

pub fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// Turns field or query text into stemmed terms.
///
/// Indexing and querying run the same pipeline (NFKC, lowercase, alphanumeric
/// runs, minimum length, English stemming). Only the query side drops stop
/// words, so common words stay searchable in the index but never empty an
/// AND query.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    min_token_len: usize,
}

impl Normalizer {
    pub fn new(min_token_len: usize) -> Self {
        Self { min_token_len: min_token_len.max(1) }
    }

    fn for_each_token<F: FnMut(&str)>(&self, text: &str, mut f: F) {
        let normalized = text.nfkc().collect::<String>().to_lowercase();
        for mat in RE.find_iter(&normalized) {
            let token = mat.as_str();
            if token.chars().count() < self.min_token_len { continue; }
            f(token);
        }
    }

    /// Terms of `text` in order, stop words retained.
    pub fn index_terms(&self, text: &str) -> Vec<String> {
        let mut terms = Vec::new();
        self.for_each_token(text, |token| terms.push(STEMMER.stem(token).into_owned()));
        terms
    }

    /// `(term, field)` pairs for one field's text.
    pub fn field_terms(&self, field: Field, text: &str) -> Vec<(String, Field)> {
        self.index_terms(text).into_iter().map(|t| (t, field)).collect()
    }

    /// Distinct query terms in first-seen order, stop words removed.
    pub fn query_terms(&self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut terms = Vec::new();
        self.for_each_token(text, |token| {
            if is_stopword(token) { return; }
            let stem = STEMMER.stem(token).into_owned();
            if seen.insert(stem.clone()) {
                terms.push(stem);
            }
        });
        terms
    }
}

impl Default for Normalizer {
    fn default() -> Self { Self::new(2) }
}
