//! Positional join of the four column groups into the output table.
//!
//! Rows are matched by index only. URLs are not unique in real corpora, so
//! they are carried as data and never used as a key.

use std::io::{self, Write};

use crate::config::FailurePolicy;
use crate::csv;
use crate::dataset::Sample;
use crate::error::PipelineError;
use crate::features::{FeatureColumns, FeatureValue, HtmlFeatures, UrlFeatures};

pub const FAILURE_COLUMN: &str = "html_failed";

/// One output row; `index` is the originating sample's position.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub index: usize,
    pub cells: Vec<FeatureValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    pub columns: Vec<String>,
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&FeatureValue> {
        let col = self.column(column)?;
        self.rows.get(row)?.cells.get(col)
    }

    pub fn write_csv<W: Write>(&self, w: &mut W) -> io::Result<()> {
        csv::write_row(w, &self.columns)?;
        let mut line = Vec::with_capacity(self.columns.len());
        for row in &self.rows {
            line.clear();
            line.extend(row.cells.iter().map(ToString::to_string));
            csv::write_row(w, &line)?;
        }
        w.flush()
    }
}

/// Header of the combined table for a given embedding width.
pub fn column_names(dim: usize, prefix: &str) -> Vec<String> {
    let mut columns = vec!["url".to_string(), "label".to_string()];
    columns.extend(UrlFeatures::column_names().iter().map(|c| c.to_string()));
    columns.push(FAILURE_COLUMN.to_string());
    columns.extend(HtmlFeatures::column_names().iter().map(|c| c.to_string()));
    columns.extend((0..dim).map(|i| format!("{}{}", prefix, i)));
    columns
}

/// Join the column groups by position. `None` in `html_feats` marks a sample
/// whose HTML could not be read or parsed; it is kept with zeroed HTML and
/// embedding columns or omitted, according to `policy`.
pub fn merge(
    samples: &[Sample],
    url_feats: &[UrlFeatures],
    html_feats: &[Option<HtmlFeatures>],
    embeddings: &[Option<Vec<f32>>],
    policy: FailurePolicy,
    dim: usize,
    prefix: &str,
) -> Result<FeatureTable, PipelineError> {
    let expected = samples.len();
    check_len("url", expected, url_feats.len())?;
    check_len("html", expected, html_feats.len())?;
    check_len("embedding", expected, embeddings.len())?;

    let columns = column_names(dim, prefix);
    let html_zeros: Vec<FeatureValue> = HtmlFeatures::default().values();
    let mut rows = Vec::with_capacity(expected);

    for (index, sample) in samples.iter().enumerate() {
        let failed = html_feats[index].is_none() || embeddings[index].is_none();
        if failed && policy == FailurePolicy::Drop {
            continue;
        }

        let mut cells = Vec::with_capacity(columns.len());
        cells.push(FeatureValue::Text(sample.url.clone()));
        cells.push(FeatureValue::from(sample.label));
        cells.extend(url_feats[index].values());
        cells.push(FeatureValue::from(failed as u8));

        match (&html_feats[index], &embeddings[index]) {
            (Some(html), Some(vector)) => {
                check_len("embedding", dim, vector.len())?;
                cells.extend(html.values());
                cells.extend(vector.iter().map(|&v| FeatureValue::from(v)));
            }
            _ => {
                cells.extend(html_zeros.iter().cloned());
                cells.extend(std::iter::repeat(FeatureValue::Float(0.0)).take(dim));
            }
        }

        rows.push(FeatureRow { index, cells });
    }

    Ok(FeatureTable { columns, rows })
}

fn check_len(group: &'static str, expected: usize, found: usize) -> Result<(), PipelineError> {
    if expected == found {
        Ok(())
    } else {
        Err(PipelineError::LengthMismatch {
            group,
            expected,
            found,
        })
    }
}
