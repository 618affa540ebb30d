//! Document embeddings for tag sequences (paragraph vectors, distributed-memory
//! variant, negative sampling).
//!
//! Lifecycle is encoded in the types: [`EmbeddingTrainer`] builds a vocabulary
//! and becomes a [`PreparedTrainer`], whose `train` consumes it and returns a
//! frozen [`EmbeddingModel`] that only supports inference.

pub mod model;
pub mod trainer;
pub mod vocab;

use rand::Rng;

use crate::config::PipelineConfig;

pub use self::model::EmbeddingModel;
pub use self::trainer::{train, EmbeddingTrainer, PreparedTrainer};
pub use self::vocab::Vocabulary;

/// A token sequence with the unique tag its trained document vector is stored under.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedSequence {
    pub tokens: Vec<String>,
    pub tag: String,
}

impl TaggedSequence {
    pub fn new(tokens: Vec<String>, tag: impl Into<String>) -> Self {
        Self {
            tokens,
            tag: tag.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingConfig {
    pub dim: usize,
    pub epochs: usize,
    pub min_count: usize,
    pub window: usize,
    pub negative: usize,
    pub alpha: f32,
    pub min_alpha: f32,
    pub sample: f64,
    pub seed: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for EmbeddingConfig {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            dim: cfg.embedding_dim,
            epochs: cfg.epochs,
            min_count: cfg.min_token_frequency,
            window: cfg.window.max(1),
            negative: cfg.negative,
            alpha: cfg.alpha,
            min_alpha: cfg.min_alpha,
            sample: cfg.sample,
            seed: cfg.seed,
        }
    }
}

impl EmbeddingConfig {
    /// Learning rate after `progress` (0..=1) of the schedule.
    fn alpha_at(&self, progress: f64) -> f32 {
        let p = progress.clamp(0.0, 1.0) as f32;
        self.alpha - (self.alpha - self.min_alpha) * p
    }
}

/// Read/update access to the shared (word + output) weights. Inference uses a
/// read-only implementation whose updates are no-ops.
pub(crate) trait Weights {
    fn word(&self, w: usize) -> &[f32];
    fn output(&self, w: usize) -> &[f32];
    fn add_to_output(&mut self, w: usize, g: f32, hidden: &[f32]);
    fn add_to_word(&mut self, w: usize, delta: &[f32]);
}

/// Fresh vector in `(-0.5, 0.5) / dim`.
pub(crate) fn random_vector<R: Rng>(dim: usize, rng: &mut R) -> Vec<f32> {
    (0..dim).map(|_| (rng.gen::<f32>() - 0.5) / dim as f32).collect()
}

/// One PV-DM pass over a document: for every position, average the document
/// vector with the surrounding token vectors and train that hidden layer to
/// predict the centre token against `negative` noise tokens.
pub(crate) fn train_document_dm<W: Weights, R: Rng>(
    weights: &mut W,
    vocab: &Vocabulary,
    cfg: &EmbeddingConfig,
    doc: &mut [f32],
    words: &[usize],
    alpha: f32,
    rng: &mut R,
) {
    let dim = doc.len();
    let mut hidden = vec![0.0f32; dim];
    let mut work = vec![0.0f32; dim];
    let window = cfg.window.max(1);

    for (pos, &target) in words.iter().enumerate() {
        let span = window - rng.gen_range(0..window);
        let start = pos.saturating_sub(span);
        let end = (pos + span + 1).min(words.len());

        hidden.copy_from_slice(doc);
        let mut count = 1usize;
        for (offset, &ctx) in words[start..end].iter().enumerate() {
            if start + offset != pos {
                add_assign(&mut hidden, weights.word(ctx));
                count += 1;
            }
        }
        let inv = 1.0 / count as f32;
        hidden.iter_mut().for_each(|h| *h *= inv);

        work.fill(0.0);
        for d in 0..=cfg.negative {
            let (t, label) = if d == 0 {
                (target, 1.0)
            } else {
                let noise = vocab.sample_noise(rng);
                if noise == target {
                    continue;
                }
                (noise, 0.0)
            };
            let f = dot(&hidden, weights.output(t));
            let g = (label - sigmoid(f)) * alpha;
            axpy(&mut work, g, weights.output(t));
            weights.add_to_output(t, g, &hidden);
        }

        add_assign(doc, &work);
        for (offset, &ctx) in words[start..end].iter().enumerate() {
            if start + offset != pos {
                weights.add_to_word(ctx, &work);
            }
        }
    }
}

fn sigmoid(x: f32) -> f32 {
    let x = x.clamp(-30.0, 30.0);
    1.0 / (1.0 + (-x).exp())
}

pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn add_assign(dst: &mut [f32], src: &[f32]) {
    dst.iter_mut().zip(src).for_each(|(d, s)| *d += s);
}

pub(crate) fn axpy(dst: &mut [f32], a: f32, x: &[f32]) {
    dst.iter_mut().zip(x).for_each(|(d, v)| *d += a * v);
}

/// FNV-1a over the tokens; seeds per-document inference so it is reproducible.
pub(crate) fn sequence_seed(seed: u64, tokens: &[String]) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325 ^ seed;
    for t in tokens {
        for b in t.as_bytes().iter().chain(std::iter::once(&0u8)) {
            h ^= *b as u64;
            h = h.wrapping_mul(0x0000_0100_0000_01b3);
        }
    }
    h
}
