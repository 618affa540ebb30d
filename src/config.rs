use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// What happens to a row whose HTML could not be read or parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Keep the row; HTML and embedding columns are zero and `html_failed` is 1.
    #[default]
    Sentinel,
    /// Omit the row from the output table.
    Drop,
}

impl std::str::FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sentinel" => Ok(Self::Sentinel),
            "drop" => Ok(Self::Drop),
            other => Err(format!("unknown failure policy {:?} (expected sentinel|drop)", other)),
        }
    }
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sentinel => f.write_str("sentinel"),
            Self::Drop => f.write_str("drop"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub worker_count: usize,
    pub embedding_dim: usize,
    pub epochs: usize,
    pub min_token_frequency: usize,
    pub window: usize,
    pub negative: usize,
    pub alpha: f32,
    pub min_alpha: f32,
    pub sample: f64,
    pub seed: u64,
    pub read_timeout_secs: u64,
    pub failure_policy: FailurePolicy,
    pub html_column: String,
    pub embedding_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: 50,
            embedding_dim: 300,
            epochs: 40,
            min_token_frequency: 2,
            window: 5,
            negative: 5,
            alpha: 0.025,
            min_alpha: 0.0001,
            sample: 1e-3,
            seed: 1,
            read_timeout_secs: 30,
            failure_policy: FailurePolicy::Sentinel,
            html_column: "html".to_string(),
            embedding_prefix: "dom_feat_".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Defaults, overlaid by an optional config file, overlaid by `PHISH_*` env vars.
    pub fn load(file: Option<&Path>) -> Result<Self, PipelineError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix("PHISH").try_parsing(true))
            .build()
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        let cfg: PipelineConfig = settings
            .try_deserialize()
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let fail = |msg: &str| Err(PipelineError::Config(msg.to_string()));
        if self.worker_count == 0 {
            return fail("worker_count must be at least 1");
        }
        if self.embedding_dim == 0 {
            return fail("embedding_dim must be at least 1");
        }
        if self.epochs == 0 {
            return fail("epochs must be at least 1");
        }
        if self.min_token_frequency == 0 {
            return fail("min_token_frequency must be at least 1");
        }
        if self.window == 0 {
            return fail("window must be at least 1");
        }
        if !(self.alpha > 0.0) || self.min_alpha < 0.0 || self.alpha < self.min_alpha {
            return fail("learning rate must satisfy 0 <= min_alpha <= alpha, alpha > 0");
        }
        if self.html_column.trim().is_empty() {
            return fail("html_column must not be empty");
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_settings() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.embedding_dim, 300);
        assert_eq!(cfg.epochs, 40);
        assert_eq!(cfg.min_token_frequency, 2);
        assert_eq!(cfg.failure_policy, FailurePolicy::Sentinel);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_zero_workers() {
        let cfg = PipelineConfig {
            worker_count: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn rejects_inverted_learning_rate() {
        let cfg = PipelineConfig {
            alpha: 0.0001,
            min_alpha: 0.01,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(&path, "worker_count = 8\nembedding_dim = 16\nfailure_policy = \"drop\"\n")
            .unwrap();
        let cfg = PipelineConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.worker_count, 8);
        assert_eq!(cfg.embedding_dim, 16);
        assert_eq!(cfg.failure_policy, FailurePolicy::Drop);
        assert_eq!(cfg.epochs, 40);
    }

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("DROP".parse::<FailurePolicy>(), Ok(FailurePolicy::Drop));
        assert!("keep".parse::<FailurePolicy>().is_err());
    }
}
