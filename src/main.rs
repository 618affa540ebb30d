use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use phish_features::config::{FailurePolicy, PipelineConfig};
use phish_features::dataset::Dataset;
use phish_features::db;
use phish_features::features::{extract_html_features, extract_tag_sequence, extract_url_features};
use phish_features::pipeline::{FailureKind, FsDocumentSource, Pipeline};

#[derive(Parser)]
#[command(name = "phish_features", about = "URL, HTML and tag-embedding features for phishing detection")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the combined feature table for a labelled dataset
    Extract {
        /// Dataset CSV with url, html and label columns
        #[arg(short, long)]
        input: PathBuf,
        /// Directory the html column is resolved against
        #[arg(short, long)]
        docs: PathBuf,
        /// Output CSV
        #[arg(short, long)]
        output: PathBuf,
        /// Also store the run in this SQLite database
        #[arg(long)]
        sqlite: Option<PathBuf>,
        /// TOML or JSON config file (PHISH_* env vars override it)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Concurrent extraction tasks
        #[arg(short = 'w', long)]
        workers: Option<usize>,
        /// Embedding width
        #[arg(long)]
        dim: Option<usize>,
        /// Embedding training passes
        #[arg(long)]
        epochs: Option<usize>,
        /// Minimum token frequency for the tag vocabulary
        #[arg(long)]
        min_count: Option<usize>,
        /// What to do with rows whose HTML failed: sentinel or drop
        #[arg(long)]
        policy: Option<FailurePolicy>,
    },
    /// Print URL features as JSON
    Url { url: String },
    /// Print HTML features of a saved page as JSON
    Html { file: PathBuf },
    /// Print the tag sequence of a saved page
    Tags { file: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Extract {
            input,
            docs,
            output,
            sqlite,
            config,
            workers,
            dim,
            epochs,
            min_count,
            policy,
        } => {
            let mut cfg = PipelineConfig::load(config.as_deref())?;
            if let Some(n) = workers {
                cfg.worker_count = n;
            }
            if let Some(n) = dim {
                cfg.embedding_dim = n;
            }
            if let Some(n) = epochs {
                cfg.epochs = n;
            }
            if let Some(n) = min_count {
                cfg.min_token_frequency = n;
            }
            if let Some(p) = policy {
                cfg.failure_policy = p;
            }
            cfg.validate()?;

            let dataset = Dataset::load(&input, &cfg.html_column)
                .with_context(|| format!("loading dataset {:?}", input))?;
            if dataset.is_empty() {
                println!("Dataset is empty, nothing to extract.");
                return Ok(());
            }

            println!(
                "Extracting {} samples with {} workers (dim {}, {} epochs, policy {})...",
                dataset.len(),
                cfg.worker_count,
                cfg.embedding_dim,
                cfg.epochs,
                cfg.failure_policy
            );
            let started_at = chrono::Utc::now();
            let pipeline = Pipeline::new(cfg).with_progress(true);
            let out = pipeline.run(&dataset, FsDocumentSource::new(docs)).await?;

            let file = File::create(&output).with_context(|| format!("creating {:?}", output))?;
            out.table.write_csv(&mut BufWriter::new(file))?;

            if let Some(path) = sqlite {
                let conn = db::connect(&path)?;
                db::init_schema(&conn)?;
                let run = db::RunRow {
                    started_at,
                    config: pipeline.config(),
                    report: &out.report,
                };
                let run_id = db::save_run(&conn, &run, &out.table)?;
                println!("Saved run {} to {:?}", run_id, path);
            }

            let r = &out.report;
            println!(
                "Done: {} samples, {} failed ({} io, {} parse), {} rows written to {:?} (policy {}).",
                r.total,
                r.failed(),
                r.count(FailureKind::Io),
                r.count(FailureKind::Parse),
                r.rows_written,
                output,
                r.policy
            );
            for f in r.failures.iter().take(10) {
                println!("  row {:>5} | {:<5} | {}", f.index, f.kind, f.message);
            }
            if r.failed() > 10 {
                println!("  ... and {} more", r.failed() - 10);
            }
            Ok(())
        }
        Commands::Url { url } => {
            let features = extract_url_features(&url);
            println!("{}", serde_json::to_string_pretty(&features)?);
            Ok(())
        }
        Commands::Html { file } => {
            let html = read_page(&file)?;
            let features = extract_html_features(&html)?;
            println!("{}", serde_json::to_string_pretty(&features)?);
            Ok(())
        }
        Commands::Tags { file } => {
            let html = read_page(&file)?;
            let tags = extract_tag_sequence(&html)?;
            println!("{}", tags.tokens().join(" "));
            println!("\n{} tokens, {} elements", tags.len(), tags.element_count());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn read_page(path: &std::path::Path) -> anyhow::Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {:?}", path))?;
    Ok(phish_features::pipeline::decode_document(&bytes))
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
