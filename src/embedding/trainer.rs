use std::collections::HashMap;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::TrainingError;

use super::model::EmbeddingModel;
use super::vocab::Vocabulary;
use super::{random_vector, train_document_dm, EmbeddingConfig, TaggedSequence, Weights};

/// Untrained model: holds only configuration.
#[derive(Debug, Clone)]
pub struct EmbeddingTrainer {
    config: EmbeddingConfig,
}

/// Vocabulary is fixed; ready for the training passes.
#[derive(Debug, Clone)]
pub struct PreparedTrainer {
    config: EmbeddingConfig,
    vocab: Vocabulary,
}

/// Documents trained sequentially by one worker between weight merges.
const CHUNK_DOCS: usize = 16;
/// Chunks trained in parallel from one weight snapshot.
const ROUND_CHUNKS: usize = 8;

/// Shared weights while they are still being learned.
#[derive(Clone)]
pub(crate) struct LearnedWeights {
    pub(crate) dim: usize,
    pub(crate) words: Vec<f32>,
    pub(crate) output: Vec<f32>,
}

impl Weights for LearnedWeights {
    fn word(&self, w: usize) -> &[f32] {
        &self.words[w * self.dim..(w + 1) * self.dim]
    }

    fn output(&self, w: usize) -> &[f32] {
        &self.output[w * self.dim..(w + 1) * self.dim]
    }

    fn add_to_output(&mut self, w: usize, g: f32, hidden: &[f32]) {
        let row = &mut self.output[w * self.dim..(w + 1) * self.dim];
        super::axpy(row, g, hidden);
    }

    fn add_to_word(&mut self, w: usize, delta: &[f32]) {
        let row = &mut self.words[w * self.dim..(w + 1) * self.dim];
        super::axpy(row, 1.0, delta);
    }
}

impl LearnedWeights {
    /// Turn `self` into its change relative to `base`.
    fn subtract(&mut self, base: &LearnedWeights) {
        super::axpy(&mut self.words, -1.0, &base.words);
        super::axpy(&mut self.output, -1.0, &base.output);
    }

    fn add(&mut self, delta: &LearnedWeights) {
        super::axpy(&mut self.words, 1.0, &delta.words);
        super::axpy(&mut self.output, 1.0, &delta.output);
    }
}

/// Seed for one chunk of one epoch, keyed by its first document.
fn chunk_seed(seed: u64, epoch: usize, first_doc: usize) -> u64 {
    seed ^ ((epoch as u64) << 40 | first_doc as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

impl EmbeddingTrainer {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    pub fn build_vocabulary(
        self,
        corpus: &[TaggedSequence],
    ) -> Result<PreparedTrainer, TrainingError> {
        validate(&self.config, corpus)?;
        let vocab = Vocabulary::build(
            corpus.iter().map(|s| s.tokens.as_slice()),
            self.config.min_count,
            self.config.sample,
        )?;
        info!(
            documents = corpus.len(),
            vocabulary = vocab.len(),
            min_count = self.config.min_count,
            "Built tag vocabulary"
        );
        Ok(PreparedTrainer {
            config: self.config,
            vocab,
        })
    }
}

impl PreparedTrainer {
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Run every epoch over `corpus` and freeze the result.
    pub fn train(self, corpus: &[TaggedSequence]) -> Result<EmbeddingModel, TrainingError> {
        validate(&self.config, corpus)?;
        let t0 = Instant::now();
        let cfg = self.config;
        let dim = cfg.dim;
        let vocab = self.vocab;
        let mut rng = StdRng::seed_from_u64(cfg.seed);

        let mut weights = LearnedWeights {
            dim,
            words: (0..vocab.len())
                .flat_map(|_| random_vector(dim, &mut rng))
                .collect(),
            output: vec![0.0; vocab.len() * dim],
        };
        let mut docs: Vec<f32> = (0..corpus.len())
            .flat_map(|_| random_vector(dim, &mut rng))
            .collect();
        let tags: HashMap<String, usize> = corpus
            .iter()
            .enumerate()
            .map(|(i, s)| (s.tag.clone(), i))
            .collect();

        let known: Vec<usize> = corpus.iter().map(|s| vocab.encode(&s.tokens).len()).collect();
        // prefix[d]: known tokens in the documents before d.
        let prefix: Vec<usize> = known
            .iter()
            .scan(0usize, |acc, &k| {
                let before = *acc;
                *acc += k;
                Some(before)
            })
            .collect();
        let epoch_tokens: usize = known.iter().sum();
        let total = (epoch_tokens * cfg.epochs).max(1) as f64;
        let round_docs = CHUNK_DOCS * ROUND_CHUNKS;

        for epoch in 0..cfg.epochs {
            let base = epoch * epoch_tokens;
            for start in (0..corpus.len()).step_by(round_docs) {
                let end = (start + round_docs).min(corpus.len());
                let snapshot = &weights;

                // Chunks of a round train in parallel from the same snapshot;
                // their weight deltas are summed in chunk order afterwards.
                let deltas: Vec<LearnedWeights> = corpus[start..end]
                    .par_chunks(CHUNK_DOCS)
                    .zip(docs[start * dim..end * dim].par_chunks_mut(CHUNK_DOCS * dim))
                    .enumerate()
                    .map(|(c, (seqs, doc_rows))| {
                        let first = start + c * CHUNK_DOCS;
                        let mut local = snapshot.clone();
                        let mut rng = StdRng::seed_from_u64(chunk_seed(cfg.seed, epoch, first));
                        for (i, (seq, doc)) in seqs.iter().zip(doc_rows.chunks_mut(dim)).enumerate() {
                            let alpha = cfg.alpha_at((base + prefix[first + i]) as f64 / total);
                            let words = vocab.encode_sampled(&seq.tokens, &mut rng);
                            train_document_dm(&mut local, &vocab, &cfg, doc, &words, alpha, &mut rng);
                        }
                        local.subtract(snapshot);
                        local
                    })
                    .collect();

                for delta in &deltas {
                    weights.add(delta);
                }
            }
            debug!(epoch = epoch + 1, epochs = cfg.epochs, "Embedding epoch done");
        }

        info!(
            documents = corpus.len(),
            epochs = cfg.epochs,
            dim,
            elapsed_s = t0.elapsed().as_secs_f64(),
            "Embedding model trained"
        );
        Ok(EmbeddingModel::freeze(cfg, vocab, weights, docs, tags))
    }
}

/// Build the vocabulary and train in one go.
pub fn train(
    corpus: &[TaggedSequence],
    config: EmbeddingConfig,
) -> Result<EmbeddingModel, TrainingError> {
    EmbeddingTrainer::new(config)
        .build_vocabulary(corpus)?
        .train(corpus)
}

fn validate(cfg: &EmbeddingConfig, corpus: &[TaggedSequence]) -> Result<(), TrainingError> {
    if cfg.dim == 0 {
        return Err(TrainingError::InvalidDimension);
    }
    if cfg.epochs == 0 {
        return Err(TrainingError::InvalidEpochs);
    }
    if corpus.is_empty() {
        return Err(TrainingError::EmptyCorpus);
    }
    let mut seen = std::collections::HashSet::with_capacity(corpus.len());
    for seq in corpus {
        if !seen.insert(seq.tag.as_str()) {
            return Err(TrainingError::DuplicateTag(seq.tag.clone()));
        }
    }
    Ok(())
}
