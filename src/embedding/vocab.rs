use std::collections::HashMap;

use rand::Rng;

use crate::error::TrainingError;

/// Noise distribution exponent for negative sampling.
const NOISE_POWER: f64 = 0.75;

/// Token vocabulary with frequency-derived sampling tables.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    tokens: Vec<String>,
    counts: Vec<u64>,
    index: HashMap<String, usize>,
    /// Cumulative unigram^0.75 distribution, last entry == 1.0.
    noise_cdf: Vec<f64>,
    /// Probability that an occurrence survives frequent-token downsampling.
    keep_prob: Vec<f32>,
}

impl Vocabulary {
    /// Count every token, drop those seen fewer than `min_count` times, order by
    /// descending count (ties by token so the layout is reproducible).
    pub fn build<'a, I>(sequences: I, min_count: usize, sample: f64) -> Result<Self, TrainingError>
    where
        I: IntoIterator<Item = &'a [String]>,
    {
        let mut raw: HashMap<&'a str, u64> = HashMap::new();
        for seq in sequences {
            for token in seq {
                *raw.entry(token.as_str()).or_default() += 1;
            }
        }

        let mut kept: Vec<(&str, u64)> = raw
            .into_iter()
            .filter(|(_, c)| *c >= min_count as u64)
            .collect();
        if kept.is_empty() {
            return Err(TrainingError::EmptyVocabulary { min_count });
        }
        kept.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let tokens: Vec<String> = kept.iter().map(|(t, _)| t.to_string()).collect();
        let counts: Vec<u64> = kept.iter().map(|(_, c)| *c).collect();
        let index = tokens
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();

        let noise_cdf = noise_cdf(&counts);
        let keep_prob = keep_probabilities(&counts, sample);

        Ok(Vocabulary {
            tokens,
            counts,
            index,
            noise_cdf,
            keep_prob,
        })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn index_of(&self, token: &str) -> Option<usize> {
        self.index.get(token).copied()
    }

    pub fn token(&self, index: usize) -> &str {
        &self.tokens[index]
    }

    pub fn count(&self, index: usize) -> u64 {
        self.counts[index]
    }

    pub fn contains(&self, token: &str) -> bool {
        self.index.contains_key(token)
    }

    /// Map tokens to vocabulary indices, skipping unknown ones.
    pub fn encode(&self, tokens: &[String]) -> Vec<usize> {
        tokens.iter().filter_map(|t| self.index_of(t)).collect()
    }

    /// Known tokens that survive downsampling for one pass.
    pub(crate) fn encode_sampled<R: Rng>(&self, tokens: &[String], rng: &mut R) -> Vec<usize> {
        tokens
            .iter()
            .filter_map(|t| self.index_of(t))
            .filter(|&i| {
                let p = self.keep_prob[i];
                p >= 1.0 || rng.gen::<f32>() < p
            })
            .collect()
    }

    pub(crate) fn sample_noise<R: Rng>(&self, rng: &mut R) -> usize {
        let r: f64 = rng.gen();
        self.noise_cdf
            .partition_point(|&c| c < r)
            .min(self.tokens.len() - 1)
    }
}

fn noise_cdf(counts: &[u64]) -> Vec<f64> {
    let weights: Vec<f64> = counts.iter().map(|&c| (c as f64).powf(NOISE_POWER)).collect();
    let total: f64 = weights.iter().sum();
    let mut acc = 0.0;
    let mut cdf: Vec<f64> = weights
        .iter()
        .map(|w| {
            acc += w / total;
            acc
        })
        .collect();
    if let Some(last) = cdf.last_mut() {
        *last = 1.0;
    }
    cdf
}

/// word2vec-style downsampling: tokens much more frequent than `sample * total`
/// are randomly skipped. `sample == 0` disables it.
fn keep_probabilities(counts: &[u64], sample: f64) -> Vec<f32> {
    if sample <= 0.0 {
        return vec![1.0; counts.len()];
    }
    let total: u64 = counts.iter().sum();
    let threshold = sample * total as f64;
    counts
        .iter()
        .map(|&c| {
            let c = c as f64;
            (((c / threshold).sqrt() + 1.0) * threshold / c).min(1.0) as f32
        })
        .collect()
}
