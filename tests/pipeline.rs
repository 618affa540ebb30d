use std::future::Future;
use std::io;
use std::time::Duration;

use phish_features::config::{FailurePolicy, PipelineConfig};
use phish_features::dataset::{Dataset, Sample};
use phish_features::error::{PipelineError, SchemaError, TrainingError};
use phish_features::features::FeatureValue;
use phish_features::pipeline::{DocumentSource, FailureKind, FsDocumentSource, MemoryDocumentSource, Pipeline};
use rand::Rng;

/// Wraps a source and delays every read by a random amount, so completion
/// order differs from submission order.
struct JitterSource(MemoryDocumentSource);

impl DocumentSource for JitterSource {
    fn read(&self, reference: &str) -> impl Future<Output = io::Result<Vec<u8>>> + Send {
        let delay = Duration::from_millis(rand::thread_rng().gen_range(0..15));
        let read = self.0.read(reference);
        async move {
            tokio::time::sleep(delay).await;
            read.await
        }
    }
}

fn small_config(workers: usize) -> PipelineConfig {
    PipelineConfig {
        worker_count: workers,
        embedding_dim: 8,
        epochs: 3,
        min_token_frequency: 1,
        ..Default::default()
    }
}

/// Sample `i` has exactly `i` list items, so its row can be recognised.
fn marked_corpus(n: usize) -> (Dataset, MemoryDocumentSource) {
    let mut source = MemoryDocumentSource::new();
    let samples = (0..n)
        .map(|i| {
            let reference = format!("page_{}.html", i);
            let body = format!(
                "<html><head><title>p{}</title></head><body><ul>{}</ul></body></html>",
                i,
                "<li>x</li>".repeat(i)
            );
            source.insert(reference.clone(), body);
            Sample::new(format!("http://host{}.example.com/index.html", i), reference, (i % 2) as u8)
        })
        .collect();
    (Dataset::new(samples), source)
}

#[tokio::test]
async fn rows_come_back_in_sample_order_under_random_latency() {
    let (dataset, source) = marked_corpus(60);
    let out = Pipeline::new(small_config(8))
        .run(&dataset, JitterSource(source))
        .await
        .unwrap();

    assert_eq!(out.table.len(), 60);
    assert_eq!(out.report.failed(), 0);
    for (i, row) in out.table.rows.iter().enumerate() {
        assert_eq!(row.index, i);
        assert_eq!(out.table.value(i, "li_count"), Some(&FeatureValue::Int(i as i64)));
        assert_eq!(
            out.table.value(i, "url"),
            Some(&FeatureValue::Text(format!("http://host{}.example.com/index.html", i)))
        );
    }
}

#[tokio::test]
async fn worker_count_does_not_change_the_table() {
    let (dataset, source) = marked_corpus(25);
    let single = Pipeline::new(small_config(1))
        .run(&dataset, source.clone())
        .await
        .unwrap();
    let wide = Pipeline::new(small_config(100))
        .run(&dataset, JitterSource(source))
        .await
        .unwrap();
    assert_eq!(single.table, wide.table);
}

#[tokio::test]
async fn embedding_columns_are_finite_and_sized() {
    let (dataset, source) = marked_corpus(10);
    let out = Pipeline::new(small_config(4)).run(&dataset, source).await.unwrap();
    for i in 0..out.table.len() {
        for d in 0..8 {
            let cell = out.table.value(i, &format!("dom_feat_{}", d)).unwrap();
            assert!(cell.as_f64().is_some_and(f64::is_finite));
        }
    }
    assert!(out.table.column("dom_feat_8").is_none());
}

fn three_samples_with_second_missing() -> (tempfile::TempDir, Dataset) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("one.html"),
        "<html><body><form><input type='password'></form></body></html>",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("three.html"),
        std::fs::read("tests/fixtures/benign_article.html").unwrap(),
    )
    .unwrap();
    let dataset = Dataset::from_csv_str(
        "url,html,label\n\
         http://192.168.0.1/login.php?verify=1,one.html,1\n\
         https://bank-secure.example.com/update,missing.html,1\n\
         https://gardening.example.org/tomatoes,three.html,0\n",
        "html",
    )
    .unwrap();
    (dir, dataset)
}

#[tokio::test]
async fn missing_document_is_kept_as_sentinel_row() {
    let (dir, dataset) = three_samples_with_second_missing();
    let out = Pipeline::new(small_config(4))
        .run(&dataset, FsDocumentSource::new(dir.path()))
        .await
        .unwrap();

    assert_eq!(out.table.len(), 3);
    assert_eq!(out.report.failed(), 1);
    let failure = &out.report.failures[0];
    assert_eq!(failure.index, 1);
    assert_eq!(failure.html_ref, "missing.html");
    assert_eq!(failure.kind, FailureKind::Io);

    assert_eq!(out.table.value(1, "html_failed"), Some(&FeatureValue::Int(1)));
    assert_eq!(out.table.value(1, "form_count"), Some(&FeatureValue::Int(0)));
    assert_eq!(out.table.value(1, "dom_feat_0"), Some(&FeatureValue::Float(0.0)));
    // URL features survive the failed read.
    assert_eq!(out.table.value(1, "has_sensitive_keywords"), Some(&FeatureValue::Int(1)));
    assert_eq!(out.table.value(0, "has_ip"), Some(&FeatureValue::Int(1)));
    assert_eq!(out.table.value(0, "password_input_count"), Some(&FeatureValue::Int(1)));
    assert_eq!(out.report.rows_written, 3);
}

#[tokio::test]
async fn missing_document_is_dropped_under_drop_policy() {
    let (dir, dataset) = three_samples_with_second_missing();
    let cfg = PipelineConfig {
        failure_policy: FailurePolicy::Drop,
        ..small_config(4)
    };
    let out = Pipeline::new(cfg)
        .run(&dataset, FsDocumentSource::new(dir.path()))
        .await
        .unwrap();

    let indices: Vec<usize> = out.table.rows.iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![0, 2]);
    assert_eq!(out.report.failures.len(), 1);
    assert_eq!(out.report.failures[0].index, 1);
    assert!(out.report.to_string().contains("policy drop, 2 rows written"));
}

#[tokio::test]
async fn unparsable_documents_are_parse_failures() {
    let mut source = MemoryDocumentSource::new();
    source.insert("ok.html", "<html><body><p>fine</p></body></html>");
    source.insert("text.html", "plain text, no markup at all");
    let dataset = Dataset::new(vec![
        Sample::new("http://a.com", "ok.html", 0),
        Sample::new("http://b.com", "text.html", 1),
    ]);
    let out = Pipeline::new(small_config(2)).run(&dataset, source).await.unwrap();
    assert_eq!(out.report.count(FailureKind::Parse), 1);
    assert_eq!(out.report.failures[0].index, 1);
}

#[tokio::test]
async fn all_rows_failing_is_a_training_error() {
    let dataset = Dataset::new(vec![
        Sample::new("http://a.com", "a.html", 0),
        Sample::new("http://b.com", "b.html", 1),
    ]);
    let err = Pipeline::new(small_config(2))
        .run(&dataset, MemoryDocumentSource::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Training(TrainingError::EmptyCorpus)));
}

#[test]
fn schema_errors_abort_before_extraction() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dataset.csv");
    std::fs::write(&path, "url,website\nhttp://a.com,a.com\n").unwrap();
    let err = Dataset::load(&path, "html").unwrap_err();
    match err {
        PipelineError::Schema(SchemaError::MissingColumns(cols)) => {
            assert_eq!(cols, vec!["html".to_string(), "label".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let (dataset, source) = marked_corpus(2);
    let cfg = PipelineConfig {
        worker_count: 0,
        ..small_config(1)
    };
    assert!(matches!(
        Pipeline::new(cfg).run(&dataset, source).await,
        Err(PipelineError::Config(_))
    ));
}
