use std::fmt;

use serde::Serialize;

use crate::config::FailurePolicy;
use crate::error::ExtractionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Io,
    Parse,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Io => f.write_str("io"),
            FailureKind::Parse => f.write_str("parse"),
        }
    }
}

/// A sample whose HTML-derived features could not be produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowFailure {
    pub index: usize,
    pub html_ref: String,
    pub kind: FailureKind,
    pub message: String,
}

impl RowFailure {
    pub fn new(index: usize, html_ref: &str, err: &ExtractionError) -> Self {
        let kind = match err {
            ExtractionError::Io { .. } => FailureKind::Io,
            ExtractionError::Parse { .. } => FailureKind::Parse,
        };
        Self {
            index,
            html_ref: html_ref.to_string(),
            kind,
            message: err.to_string(),
        }
    }
}

/// Per-run accounting of extraction failures, in sample order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionReport {
    pub total: usize,
    pub failures: Vec<RowFailure>,
    pub policy: FailurePolicy,
    pub rows_written: usize,
}

impl ExtractionReport {
    pub fn new(total: usize, policy: FailurePolicy) -> Self {
        Self {
            total,
            policy,
            ..Default::default()
        }
    }

    pub fn record(&mut self, failure: RowFailure) {
        self.failures.push(failure);
    }

    /// Puts failures back in sample order after out-of-order collection.
    pub fn sort(&mut self) {
        self.failures.sort_by_key(|f| f.index);
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn succeeded(&self) -> usize {
        self.total - self.failures.len()
    }

    pub fn count(&self, kind: FailureKind) -> usize {
        self.failures.iter().filter(|f| f.kind == kind).count()
    }

    pub fn is_failed(&self, index: usize) -> bool {
        self.failures
            .binary_search_by_key(&index, |f| f.index)
            .is_ok()
    }
}

impl fmt::Display for ExtractionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} samples: {} extracted, {} failed ({} io, {} parse); policy {}, {} rows written",
            self.total,
            self.succeeded(),
            self.failed(),
            self.count(FailureKind::Io),
            self.count(FailureKind::Parse),
            self.policy,
            self.rows_written,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;

    #[test]
    fn counts_by_kind_in_sample_order() {
        let mut report = ExtractionReport::new(5, FailurePolicy::Drop);
        let parse = ExtractionError::Parse {
            reference: "b.html".into(),
            source: ParseError::Empty,
        };
        let io = ExtractionError::Io {
            reference: "a.html".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        report.record(RowFailure::new(3, "b.html", &parse));
        report.record(RowFailure::new(1, "a.html", &io));
        report.sort();

        assert_eq!(report.failures[0].index, 1);
        assert_eq!(report.count(FailureKind::Io), 1);
        assert_eq!(report.count(FailureKind::Parse), 1);
        assert_eq!(report.succeeded(), 3);
        assert!(report.is_failed(3));
        assert!(!report.is_failed(2));
        assert!(report.to_string().contains("2 failed (1 io, 1 parse)"));
    }
}
