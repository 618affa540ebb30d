use std::path::Path;

use tracing::info;

use crate::csv;
use crate::error::{PipelineError, SchemaError};

/// One corpus row. Its position in the [`Dataset`] is its identity for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub url: String,
    /// Document reference, resolved against the documents root.
    pub html_ref: String,
    pub label: u8,
}

impl Sample {
    pub fn new(url: impl Into<String>, html_ref: impl Into<String>, label: u8) -> Self {
        Self {
            url: url.into(),
            html_ref: html_ref.into(),
            label,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    samples: Vec<Sample>,
}

impl Dataset {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    pub fn load(path: &Path, html_column: &str) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path)?;
        let dataset = Self::from_csv_str(&text, html_column)?;
        info!("Loaded {} samples from {:?}", dataset.len(), path);
        Ok(dataset)
    }

    /// Parse a headed CSV. Requires `url`, `<html_column>` and `label`; other
    /// columns are ignored. Labels must be 0 or 1.
    pub fn from_csv_str(text: &str, html_column: &str) -> Result<Self, SchemaError> {
        let mut rows = csv::parse_rows(text).into_iter();
        let header = rows.next().ok_or(SchemaError::EmptyHeader)?;
        let header: Vec<String> = header
            .iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
            .collect();

        let position = |name: &str| header.iter().position(|h| h == name);
        let (url_col, html_col, label_col) =
            match (position("url"), position(html_column), position("label")) {
                (Some(u), Some(h), Some(l)) => (u, h, l),
                _ => {
                    let missing = ["url", html_column, "label"]
                        .into_iter()
                        .filter(|c| position(*c).is_none())
                        .map(str::to_string)
                        .collect();
                    return Err(SchemaError::MissingColumns(missing));
                }
            };

        let mut samples = Vec::new();
        for (row, fields) in rows.enumerate() {
            if fields.len() != header.len() {
                return Err(SchemaError::RaggedRow {
                    row,
                    expected: header.len(),
                    found: fields.len(),
                });
            }
            let label = match fields[label_col].trim() {
                "0" => 0,
                "1" => 1,
                other => {
                    return Err(SchemaError::InvalidLabel {
                        row,
                        value: other.to_string(),
                    })
                }
            };
            samples.push(Sample {
                url: fields[url_col].trim().to_string(),
                html_ref: fields[html_col].trim().to_string(),
                label,
            });
        }

        Ok(Self { samples })
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Sample> {
        self.samples.get(index)
    }
}
