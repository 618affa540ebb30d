use std::sync::Arc;
use std::time::Duration;

use indicatif::ProgressBar;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::dataset::Sample;
use crate::error::{ExtractionError, PipelineError};
use crate::features::{extract_document, extract_url_features, DocumentFeatures, UrlFeatures};

use super::report::{ExtractionReport, RowFailure};
use super::source::{decode_document, DocumentSource};

/// Everything extracted for one sample. URL features are always present.
#[derive(Debug)]
pub struct RowExtraction {
    pub url: UrlFeatures,
    pub document: Result<DocumentFeatures, ExtractionError>,
}

/// Per-sample results in sample order, plus the failures seen along the way.
#[derive(Debug)]
pub struct Extraction {
    pub rows: Vec<RowExtraction>,
    pub report: ExtractionReport,
}

#[derive(Debug, Clone)]
pub struct ExtractorOptions {
    pub workers: usize,
    pub read_timeout: Duration,
}

/// Bounded worker pool over a [`DocumentSource`].
pub struct Extractor<S> {
    source: Arc<S>,
    options: ExtractorOptions,
}

impl<S: DocumentSource> Extractor<S> {
    pub fn new(source: S, options: ExtractorOptions) -> Self {
        Self {
            source: Arc::new(source),
            options,
        }
    }

    /// Extract every sample. Tasks are submitted in index order with at most
    /// `workers` in flight; results are re-keyed by the index captured at
    /// submission. Per-row failures are recorded, a panicking task aborts the batch.
    pub async fn run(
        &self,
        samples: &[Sample],
        pb: &ProgressBar,
    ) -> Result<Extraction, PipelineError> {
        let workers = self.options.workers.max(1);
        let semaphore = Arc::new(Semaphore::new(workers));

        // Workers send (index, result); only this task assembles the output.
        let (tx, mut rx) = mpsc::channel::<(usize, RowExtraction)>(workers * 2);

        let submitter: JoinHandle<Vec<JoinHandle<()>>> = {
            let samples = samples.to_vec();
            let source = Arc::clone(&self.source);
            let read_timeout = self.options.read_timeout;
            tokio::spawn(async move {
                let mut handles = Vec::with_capacity(samples.len());
                for (index, sample) in samples.into_iter().enumerate() {
                    let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                        break;
                    };
                    let source = Arc::clone(&source);
                    let tx = tx.clone();
                    handles.push(tokio::spawn(async move {
                        let row = extract_sample(source.as_ref(), &sample, read_timeout).await;
                        drop(permit);
                        let _ = tx.send((index, row)).await;
                    }));
                }
                handles
            })
        };

        let mut slots: Vec<Option<RowExtraction>> =
            std::iter::repeat_with(|| None).take(samples.len()).collect();
        let mut report = ExtractionReport::new(samples.len(), Default::default());

        while let Some((index, row)) = rx.recv().await {
            if let Err(err) = &row.document {
                let html_ref = &samples[index].html_ref;
                warn!(index, html_ref = %html_ref, "HTML extraction failed: {}", err);
                report.record(RowFailure::new(index, html_ref, err));
            }
            slots[index] = Some(row);
            pb.inc(1);
        }

        let handles = submitter.await?;
        for handle in handles {
            handle.await?;
        }

        report.sort();
        let rows: Vec<RowExtraction> = slots.into_iter().flatten().collect();
        if rows.len() != samples.len() {
            return Err(PipelineError::LengthMismatch {
                group: "extraction",
                expected: samples.len(),
                found: rows.len(),
            });
        }
        debug!(rows = rows.len(), failed = report.failed(), "Extraction collected");
        Ok(Extraction { rows, report })
    }
}

/// Read, decode and analyse one sample. Never panics on bad input.
pub async fn extract_sample<S: DocumentSource>(
    source: &S,
    sample: &Sample,
    read_timeout: Duration,
) -> RowExtraction {
    let url = extract_url_features(&sample.url);
    let document = read_and_parse(source, &sample.html_ref, read_timeout).await;
    RowExtraction { url, document }
}

async fn read_and_parse<S: DocumentSource>(
    source: &S,
    reference: &str,
    read_timeout: Duration,
) -> Result<DocumentFeatures, ExtractionError> {
    let io_err = |source: std::io::Error| ExtractionError::Io {
        reference: reference.to_string(),
        source,
    };

    let bytes = match tokio::time::timeout(read_timeout, source.read(reference)).await {
        Ok(read) => read.map_err(io_err)?,
        Err(_) => {
            return Err(io_err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("read timed out after {:?}", read_timeout),
            )))
        }
    };

    let html = decode_document(&bytes);
    // Parsing is CPU-bound; keep it off the async workers. A parser panic is
    // re-raised so the batch aborts instead of recording a row failure.
    let parsed = match tokio::task::spawn_blocking(move || extract_document(&html)).await {
        Ok(parsed) => parsed,
        Err(e) => std::panic::resume_unwind(e.into_panic()),
    };

    parsed.map_err(|source| ExtractionError::Parse {
        reference: reference.to_string(),
        source,
    })
}
