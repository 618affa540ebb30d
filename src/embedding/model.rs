use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use super::trainer::LearnedWeights;
use super::vocab::Vocabulary;
use super::{random_vector, sequence_seed, train_document_dm, EmbeddingConfig, Weights};

/// Trained, immutable embedding model. Shareable across threads for inference.
#[derive(Debug, Clone)]
pub struct EmbeddingModel {
    config: EmbeddingConfig,
    vocab: Vocabulary,
    words: Vec<f32>,
    output: Vec<f32>,
    docs: Vec<f32>,
    tags: HashMap<String, usize>,
}

/// Borrowed view of the frozen weights; updates are dropped.
struct FrozenWeights<'a> {
    dim: usize,
    words: &'a [f32],
    output: &'a [f32],
}

impl Weights for FrozenWeights<'_> {
    fn word(&self, w: usize) -> &[f32] {
        &self.words[w * self.dim..(w + 1) * self.dim]
    }

    fn output(&self, w: usize) -> &[f32] {
        &self.output[w * self.dim..(w + 1) * self.dim]
    }

    fn add_to_output(&mut self, _w: usize, _g: f32, _hidden: &[f32]) {}

    fn add_to_word(&mut self, _w: usize, _delta: &[f32]) {}
}

impl EmbeddingModel {
    pub(crate) fn freeze(
        config: EmbeddingConfig,
        vocab: Vocabulary,
        weights: LearnedWeights,
        docs: Vec<f32>,
        tags: HashMap<String, usize>,
    ) -> Self {
        Self {
            config,
            vocab,
            words: weights.words,
            output: weights.output,
            docs,
            tags,
        }
    }

    pub fn dim(&self) -> usize {
        self.config.dim
    }

    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Vector learned for a training document during training.
    pub fn document_vector(&self, tag: &str) -> Option<&[f32]> {
        let d = *self.tags.get(tag)?;
        let dim = self.dim();
        Some(&self.docs[d * dim..(d + 1) * dim])
    }

    pub fn word_vector(&self, token: &str) -> Option<&[f32]> {
        let w = self.vocab.index_of(token)?;
        let dim = self.dim();
        Some(&self.words[w * dim..(w + 1) * dim])
    }

    /// Embed any token sequence, seen or not, by fitting a fresh document vector
    /// against the frozen weights. Unknown tokens are ignored; a sequence with no
    /// known tokens keeps its seeded starting vector.
    pub fn infer(&self, tokens: &[String]) -> Vec<f32> {
        let cfg = &self.config;
        let dim = cfg.dim;
        let mut rng = StdRng::seed_from_u64(sequence_seed(cfg.seed, tokens));
        let mut doc = random_vector(dim, &mut rng);
        let mut weights = FrozenWeights {
            dim,
            words: &self.words,
            output: &self.output,
        };

        for epoch in 0..cfg.epochs {
            let alpha = cfg.alpha_at(epoch as f64 / cfg.epochs as f64);
            let words = self.vocab.encode_sampled(tokens, &mut rng);
            train_document_dm(&mut weights, &self.vocab, cfg, &mut doc, &words, alpha, &mut rng);
        }

        if doc.iter().any(|v| !v.is_finite()) {
            doc.fill(0.0);
        }
        doc
    }

    /// Parallel inference; output order matches input order.
    pub fn infer_batch<S>(&self, sequences: &[S]) -> Vec<Vec<f32>>
    where
        S: AsRef<[String]> + Sync,
    {
        sequences.par_iter().map(|s| self.infer(s.as_ref())).collect()
    }
}
