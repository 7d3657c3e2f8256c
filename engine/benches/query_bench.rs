use criterion::{criterion_group, criterion_main, Criterion};
use engine::{Document, IndexBuilder, IndexConfig, SearchEngine, SplitIndex};
use std::sync::Arc;

const WORDS: &[&str] = &[
    "research", "student", "campus", "library", "computer", "science", "biology", "lab", "course",
    "faculty", "graduate", "network", "database", "learning", "machine", "security", "systems",
    "health", "engineering", "design", "history", "music", "physics", "chemistry", "anteater",
];

fn synthetic_doc(i: usize) -> Document {
    let pick = |k: usize| WORDS[(i * 7 + k * 13) % WORDS.len()];
    let body: Vec<&str> = (0..40).map(|k| WORDS[(i * 31 + k * k) % WORDS.len()]).collect();
    Document {
        url: format!("https://bench.example/{i}"),
        title: format!("{} {} {i}", pick(0), pick(1)),
        heading: pick(2).to_string(),
        bold: pick(3).to_string(),
        body: format!("{} page{i}", body.join(" ")),
    }
}

fn bench_search(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = IndexConfig { flush_threshold_bytes: 256 * 1024, ..IndexConfig::default() };
    let mut builder = IndexBuilder::create(dir.path(), config).expect("builder");
    for i in 0..5_000 {
        builder.add_document(&synthetic_doc(i)).expect("add");
    }
    builder.finish().expect("merge");
    let engine = SearchEngine::new(Arc::new(SplitIndex::open(dir.path()).expect("open")));

    c.bench_function("search_single_term", |b| b.iter(|| engine.search("research").unwrap()));
    c.bench_function("search_three_terms", |b| b.iter(|| engine.search("machine learning systems").unwrap()));
    c.bench_function("search_missing_term", |b| b.iter(|| engine.search("platypus research").unwrap()));
}

criterion_group!(benches, bench_search);
criterion_main!(benches);
