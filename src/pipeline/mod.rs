//! End-to-end run: extract, train, infer, merge.
//!
//! Phases are strictly sequential. Training finishes (and the model is frozen)
//! before any inference is scheduled.

pub mod orchestrator;
pub mod report;
pub mod source;

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::config::PipelineConfig;
use crate::dataset::Dataset;
use crate::embedding::{self, EmbeddingConfig, EmbeddingModel, TaggedSequence};
use crate::error::PipelineError;
use crate::features::HtmlFeatures;
use crate::merge::{self, FeatureTable};

pub use self::orchestrator::{Extraction, Extractor, ExtractorOptions, RowExtraction};
pub use self::report::{ExtractionReport, FailureKind, RowFailure};
pub use self::source::{decode_document, DocumentSource, FsDocumentSource, MemoryDocumentSource};

#[derive(Debug)]
pub struct PipelineOutput {
    pub table: FeatureTable,
    pub report: ExtractionReport,
    pub model: EmbeddingModel,
}

pub struct Pipeline {
    config: PipelineConfig,
    progress: bool,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            progress: false,
        }
    }

    /// Draw progress bars on stderr.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run<S: DocumentSource>(
        &self,
        dataset: &Dataset,
        source: S,
    ) -> Result<PipelineOutput, PipelineError> {
        self.config.validate()?;
        let cfg = &self.config;
        let samples = dataset.samples();

        // Phase 1: extraction over the worker pool
        let t_extract = Instant::now();
        let pb = self.bar(samples.len() as u64);
        let extractor = Extractor::new(
            source,
            ExtractorOptions {
                workers: cfg.worker_count,
                read_timeout: cfg.read_timeout(),
            },
        );
        let Extraction { rows, mut report } = extractor.run(samples, &pb).await?;
        pb.finish_and_clear();
        report.policy = cfg.failure_policy;
        info!(
            samples = samples.len(),
            failed = report.failed(),
            elapsed_s = t_extract.elapsed().as_secs_f64(),
            "Extraction done"
        );

        let mut url_feats = Vec::with_capacity(rows.len());
        let mut html_feats: Vec<Option<HtmlFeatures>> = Vec::with_capacity(rows.len());
        let mut corpus = Vec::new();
        for (index, row) in rows.into_iter().enumerate() {
            url_feats.push(row.url);
            match row.document {
                Ok(doc) => {
                    html_feats.push(Some(doc.html));
                    corpus.push(TaggedSequence::new(doc.tags.into_tokens(), format!("doc_{}", index)));
                }
                Err(_) => html_feats.push(None),
            }
        }

        // Phase 2: train on every successfully parsed document
        let spinner = self.spinner("Training embedding model");
        let embed_cfg = EmbeddingConfig::from(cfg);
        let (model, corpus) = tokio::task::spawn_blocking(move || {
            embedding::train(&corpus, embed_cfg).map(|model| (model, corpus))
        })
        .await??;
        spinner.finish_and_clear();

        // Phase 3: infer against the frozen model
        let spinner = self.spinner("Inferring document vectors");
        let t_infer = Instant::now();
        let (model, vectors) = tokio::task::spawn_blocking(move || {
            let tokens: Vec<&[String]> = corpus.iter().map(|s| s.tokens.as_slice()).collect();
            let vectors = model.infer_batch(&tokens);
            (model, vectors)
        })
        .await?;
        spinner.finish_and_clear();
        info!(
            documents = vectors.len(),
            elapsed_s = t_infer.elapsed().as_secs_f64(),
            "Inference done"
        );

        let mut vectors = vectors.into_iter();
        let embeddings: Vec<Option<Vec<f32>>> = html_feats
            .iter()
            .map(|h| h.as_ref().and_then(|_| vectors.next()))
            .collect();

        // Phase 4: positional merge
        let table = merge::merge(
            samples,
            &url_feats,
            &html_feats,
            &embeddings,
            cfg.failure_policy,
            model.dim(),
            &cfg.embedding_prefix,
        )?;
        report.rows_written = table.len();
        info!("{}", report);

        Ok(PipelineOutput {
            table,
            report,
            model,
        })
    }

    fn bar(&self, len: u64) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
        {
            pb.set_style(style.progress_chars("=> "));
        }
        pb
    }

    fn spinner(&self, message: &'static str) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new_spinner();
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    }
}
