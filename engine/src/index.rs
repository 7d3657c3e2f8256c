use serde::{Deserialize, Serialize};

pub type DocId = u32;

/// Structural field a term occurrence was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Title,
    Heading,
    Bold,
    Body,
}

impl Field {
    pub const ALL: [Field; 4] = [Field::Title, Field::Heading, Field::Bold, Field::Body];
}

/// A document handed to the index builder, already split into field text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Document {
    pub url: String,
    pub title: String,
    pub heading: String,
    pub bold: String,
    pub body: String,
}

impl Document {
    pub fn field(&self, field: Field) -> &str {
        match field {
            Field::Title => &self.title,
            Field::Heading => &self.heading,
            Field::Bold => &self.bold,
            Field::Body => &self.body,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    /// Raw occurrences of the term in the document, all fields together.
    pub tf: u32,
    /// Sum of the field weight of every occurrence.
    pub field_weight_sum: f32,
}

impl Posting {
    /// Mean field weight per occurrence.
    pub fn boost(&self) -> f32 {
        if self.tf == 0 { 0.0 } else { self.field_weight_sum / self.tf as f32 }
    }
}

/// One line of the doc-ID map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocRecord {
    pub doc_id: DocId,
    pub url: String,
    /// Set when the document was kept under the flag policy despite matching
    /// an earlier document's fingerprint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<DocId>,
}

/// Sort postings by doc id and fold entries that share one into a single posting.
pub fn normalize_postings(postings: &mut Vec<Posting>) {
    postings.sort_by_key(|p| p.doc_id);
    postings.dedup_by(|next, kept| {
        if next.doc_id == kept.doc_id {
            kept.tf += next.tf;
            kept.field_weight_sum += next.field_weight_sum;
            true
        } else {
            false
        }
    });
}
