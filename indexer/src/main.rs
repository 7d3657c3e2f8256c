mod extract;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use engine::persist::IndexPaths;
use engine::{AddOutcome, DuplicatePolicy, Error, IndexBuilder, IndexConfig, SearchEngine, SplitIndex};
use extract::InputRecord;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build, verify and query a split inverted index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from input JSON/JSONL files or a directory
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Output index directory
        #[arg(long)]
        output: String,
        /// JSON config file; flags below override its values
        #[arg(long)]
        config: Option<PathBuf>,
        /// Flush the in-memory batch once its estimated size exceeds this many bytes
        #[arg(long)]
        flush_threshold: Option<usize>,
        #[arg(long)]
        bucket_count: Option<usize>,
        #[arg(long)]
        min_token_len: Option<usize>,
        /// drop | flag
        #[arg(long)]
        duplicate_policy: Option<DuplicatePolicy>,
        #[arg(long)]
        near_duplicate_distance: Option<u32>,
    },
    /// Merge the partial segments left by an interrupted build
    Merge {
        #[arg(long)]
        index: String,
    },
    /// Check the published index for structural corruption
    Verify {
        #[arg(long)]
        index: String,
    },
    /// Query the index; reads queries from stdin when none is given
    Search {
        #[arg(long)]
        index: String,
        #[arg(long)]
        query: Option<String>,
        #[arg(short, long, default_value_t = 5)]
        k: usize,
        /// Append each query's results to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            output,
            config,
            flush_threshold,
            bucket_count,
            min_token_len,
            duplicate_policy,
            near_duplicate_distance,
        } => {
            let mut cfg = match config {
                Some(path) => IndexConfig::load(&path).with_context(|| format!("loading config {}", path.display()))?,
                None => IndexConfig::default(),
            };
            if let Some(v) = flush_threshold { cfg.flush_threshold_bytes = v; }
            if let Some(v) = bucket_count { cfg.bucket_count = v; }
            if let Some(v) = min_token_len { cfg.min_token_len = v; }
            if let Some(v) = duplicate_policy { cfg.duplicate_policy = v; }
            if let Some(v) = near_duplicate_distance { cfg.near_duplicate_distance = v; }
            build_index(Path::new(&input), Path::new(&output), cfg)
        }
        Commands::Merge { index } => {
            let paths = IndexPaths::new(&index);
            let cfg = IndexConfig::load(paths.pending_config())
                .with_context(|| format!("no unfinished build under {index}"))?;
            let summary = engine::merge::merge(&paths, &cfg)?;
            info!(
                generation = %summary.generation,
                segments = summary.segments,
                num_terms = summary.num_terms,
                num_docs = summary.num_docs,
                "merge complete"
            );
            Ok(())
        }
        Commands::Verify { index } => {
            let idx = SplitIndex::open(&index)?;
            idx.verify()?;
            println!("{}: ok ({} docs, {} terms, {})", index, idx.num_docs(), idx.num_terms(), idx.generation());
            Ok(())
        }
        Commands::Search { index, query, k, report } => {
            let engine = SearchEngine::new(Arc::new(SplitIndex::open(&index)?));
            match query {
                Some(q) => run_query(&engine, &q, k, report.as_deref()),
                None => interactive(&engine, k, report.as_deref()),
            }
        }
    }
}

fn collect_inputs(input: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    } else {
        bail!("input {} does not exist", input.display());
    }
    Ok(files)
}

fn build_index(input: &Path, output: &Path, config: IndexConfig) -> Result<()> {
    let files = collect_inputs(input)?;
    info!(files = files.len(), input = %input.display(), "starting build");
    let started = Instant::now();
    let mut builder = IndexBuilder::create(output, config)?;
    for file in &files {
        ingest_file(&mut builder, file)?;
    }
    let summary = builder.finish()?;
    info!(
        generation = %summary.generation,
        num_docs = summary.num_docs,
        num_terms = summary.num_terms,
        segments = summary.segments,
        elapsed_s = started.elapsed().as_secs_f64(),
        "index build complete"
    );
    Ok(())
}

/// Feed every record of one input file to the builder. Records that do not
/// parse and documents the builder rejects are logged and skipped; anything
/// else aborts the build.
fn ingest_file(builder: &mut IndexBuilder, file: &Path) -> Result<()> {
    let records: Vec<serde_json::Result<InputRecord>> =
        if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            let reader = BufReader::new(File::open(file)?);
            let mut out = Vec::new();
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() { continue; }
                out.push(serde_json::from_str(&line));
            }
            out
        } else {
            let json: serde_json::Value = match serde_json::from_reader(BufReader::new(File::open(file)?)) {
                Ok(v) => v,
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "skipping unreadable input file");
                    return Ok(());
                }
            };
            match json {
                serde_json::Value::Array(arr) => arr.into_iter().map(serde_json::from_value).collect(),
                obj @ serde_json::Value::Object(_) => vec![serde_json::from_value(obj)],
                _ => Vec::new(),
            }
        };

    for (i, rec) in records.into_iter().enumerate() {
        let rec = match rec {
            Ok(r) => r,
            Err(e) => {
                warn!(file = %file.display(), record = i, error = %e, "skipping malformed record");
                continue;
            }
        };
        let doc = rec.into_document();
        match builder.add_document(&doc) {
            Ok(AddOutcome::Indexed(doc_id)) | Ok(AddOutcome::Flagged { doc_id, .. }) => {
                if (doc_id + 1) % 1000 == 0 {
                    info!(docs = doc_id + 1, "indexed");
                }
            }
            Ok(AddOutcome::Dropped { .. }) => {}
            Err(Error::Ingest(e)) => warn!(file = %file.display(), record = i, error = %e, "document rejected"),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn run_query(engine: &SearchEngine, q: &str, k: usize, report: Option<&Path>) -> Result<()> {
    let started = Instant::now();
    let hits = engine.search(q)?;
    let elapsed = started.elapsed();

    let mut out = format!("Query: {q}\nFound {} results (showing top {}):\n", hits.len(), k.min(hits.len()));
    for (i, hit) in hits.iter().take(k).enumerate() {
        out.push_str(&format!("{}. {} (Score: {:.2})\n", i + 1, hit.url, hit.score));
    }
    out.push_str(&format!("Search time: {:.2} ms\n", elapsed.as_secs_f64() * 1000.0));
    print!("{out}");

    if let Some(path) = report {
        let mut f = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(f, "{out}")?;
    }
    Ok(())
}

fn interactive(engine: &SearchEngine, k: usize, report: Option<&Path>) -> Result<()> {
    let stdin = io::stdin();
    loop {
        print!("search> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let q = line.trim();
        if q.eq_ignore_ascii_case("quit") || q.eq_ignore_ascii_case("exit") {
            break;
        }
        if q.is_empty() {
            continue;
        }
        run_query(engine, q, k, report)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn builds_from_mixed_inputs_and_skips_bad_records() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        fs::write(
            input.path().join("a.jsonl"),
            concat!(
                "{\"url\": \"https://uci.edu/cs\", \"title\": \"UCI Computer Science\", \"body\": \"research lab\"}\n",
                "not json at all\n",
                "{\"url\": \"\", \"body\": \"no url here\"}\n",
                "{\"url\": \"https://uci.edu/bio#x\", \"content\": \"<title>UCI Biology</title><p>research</p>\"}\n",
            ),
        )
        .unwrap();
        fs::write(input.path().join("b.json"), r#"[{"url": "https://uci.edu/ics", "title": "Informatics"}]"#).unwrap();
        fs::write(input.path().join("notes.txt"), "ignored").unwrap();

        build_index(input.path(), output.path(), IndexConfig::default()).unwrap();

        let idx = SplitIndex::open(output.path()).unwrap();
        idx.verify().unwrap();
        assert_eq!(idx.num_docs(), 3);
        assert_eq!(idx.document_url(1), Some("https://uci.edu/bio"));
        let engine = SearchEngine::new(Arc::new(idx));
        let urls: Vec<String> = engine.search("research").unwrap().into_iter().map(|h| h.url).collect();
        assert_eq!(urls, vec!["https://uci.edu/cs", "https://uci.edu/bio"]);
    }

    #[test]
    fn missing_input_is_an_error() {
        let out = tempdir().unwrap();
        assert!(build_index(&out.path().join("nope"), out.path(), IndexConfig::default()).is_err());
    }

    #[test]
    fn report_file_collects_queries() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        fs::write(input.path().join("d.jsonl"), "{\"url\": \"https://a.edu/\", \"title\": \"Anteater\"}\n").unwrap();
        build_index(input.path(), output.path(), IndexConfig::default()).unwrap();
        let engine = SearchEngine::new(Arc::new(SplitIndex::open(output.path()).unwrap()));
        let report = input.path().join("report.txt");
        run_query(&engine, "anteater", 5, Some(&report)).unwrap();
        run_query(&engine, "platypus", 5, Some(&report)).unwrap();
        let text = fs::read_to_string(report).unwrap();
        assert!(text.contains("1. https://a.edu/ (Score:"));
        assert!(text.contains("Found 0 results"));
    }
}
