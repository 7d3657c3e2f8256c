use criterion::{criterion_group, criterion_main, Criterion};
use engine::tokenizer::Normalizer;

fn sample_text() -> String {
    let para = "The Donald Bren School of Information and Computer Sciences offers research \
                opportunities in machine learning, databases, networking and software engineering. ";
    para.repeat(200)
}

fn bench_tokenize(c: &mut Criterion) {
    let text = sample_text();
    let n = Normalizer::default();
    c.bench_function("index_terms", |b| b.iter(|| n.index_terms(&text)));
    c.bench_function("query_terms", |b| b.iter(|| n.query_terms("machine learning research at uci")));
}

criterion_group!(benches, bench_tokenize);
criterion_main!(benches);
