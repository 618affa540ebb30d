use std::path::Path;

use anyhow::Result;
use rusqlite::Connection;
use serde_json::{Map, Value};

use crate::config::PipelineConfig;
use crate::features::FeatureValue;
use crate::merge::FeatureTable;
use crate::pipeline::report::ExtractionReport;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS runs (
            id            INTEGER PRIMARY KEY,
            started_at    TEXT NOT NULL,
            finished_at   TEXT NOT NULL,
            sample_count  INTEGER NOT NULL,
            failed_count  INTEGER NOT NULL,
            row_count     INTEGER NOT NULL,
            policy        TEXT NOT NULL CHECK(policy IN ('sentinel','drop')),
            config        TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS features (
            id            INTEGER PRIMARY KEY,
            run_id        INTEGER NOT NULL REFERENCES runs(id),
            row_index     INTEGER NOT NULL,
            url           TEXT NOT NULL,
            label         INTEGER NOT NULL CHECK(label IN (0,1)),
            html_failed   BOOLEAN NOT NULL,
            features      TEXT NOT NULL,
            UNIQUE(run_id, row_index)
        );
        CREATE INDEX IF NOT EXISTS idx_features_run ON features(run_id);

        CREATE TABLE IF NOT EXISTS extraction_failures (
            id            INTEGER PRIMARY KEY,
            run_id        INTEGER NOT NULL REFERENCES runs(id),
            row_index     INTEGER NOT NULL,
            html_ref      TEXT NOT NULL,
            kind          TEXT NOT NULL CHECK(kind IN ('io','parse')),
            message       TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_failures_run ON extraction_failures(run_id);
        ",
    )?;
    Ok(())
}

pub struct RunRow<'a> {
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub config: &'a PipelineConfig,
    pub report: &'a ExtractionReport,
}

/// Store one run: its summary, every output row and every failure, in one
/// transaction. Feature cells other than url/label/html_failed go into a JSON
/// object keyed by column name. Returns the run id.
pub fn save_run(conn: &Connection, run: &RunRow, table: &FeatureTable) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;

    tx.execute(
        "INSERT INTO runs (started_at, finished_at, sample_count, failed_count, row_count, policy, config)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            run.started_at.to_rfc3339(),
            chrono::Utc::now().to_rfc3339(),
            run.report.total as i64,
            run.report.failed() as i64,
            table.len() as i64,
            run.report.policy.to_string(),
            serde_json::to_string(run.config)?,
        ],
    )?;
    let run_id = tx.last_insert_rowid();

    let url_col = table.column("url");
    let label_col = table.column("label");
    let failed_col = table.column(crate::merge::FAILURE_COLUMN);
    {
        let mut stmt = tx.prepare(
            "INSERT INTO features (run_id, row_index, url, label, html_failed, features)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for row in &table.rows {
            let cell = |col: Option<usize>| col.and_then(|c| row.cells.get(c));
            let url = cell(url_col).map(ToString::to_string).unwrap_or_default();
            let label = cell(label_col).and_then(FeatureValue::as_f64).unwrap_or(0.0) as i64;
            let failed = cell(failed_col).and_then(FeatureValue::as_f64).unwrap_or(0.0) != 0.0;

            let mut features = Map::with_capacity(row.cells.len());
            for (i, (name, value)) in table.columns.iter().zip(&row.cells).enumerate() {
                if Some(i) == url_col || Some(i) == label_col || Some(i) == failed_col {
                    continue;
                }
                features.insert(name.clone(), to_json(value));
            }

            stmt.execute(rusqlite::params![
                run_id,
                row.index as i64,
                url,
                label,
                failed,
                Value::Object(features).to_string(),
            ])?;
        }
    }
    {
        let mut stmt = tx.prepare(
            "INSERT INTO extraction_failures (run_id, row_index, html_ref, kind, message)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for f in &run.report.failures {
            stmt.execute(rusqlite::params![
                run_id,
                f.index as i64,
                f.html_ref,
                f.kind.to_string(),
                f.message,
            ])?;
        }
    }

    tx.commit()?;
    Ok(run_id)
}

fn to_json(value: &FeatureValue) -> Value {
    match value {
        FeatureValue::Int(v) => Value::from(*v),
        FeatureValue::Float(v) => Value::from(*v),
        FeatureValue::Text(s) => Value::from(s.as_str()),
    }
}

pub struct RunStats {
    pub rows: i64,
    pub failed_rows: i64,
    pub failures: i64,
}

pub fn get_run_stats(conn: &Connection, run_id: i64) -> Result<RunStats> {
    let count = |sql: &str| -> Result<i64> {
        Ok(conn.query_row(sql, [run_id], |r| r.get(0))?)
    };
    Ok(RunStats {
        rows: count("SELECT COUNT(*) FROM features WHERE run_id = ?1")?,
        failed_rows: count("SELECT COUNT(*) FROM features WHERE run_id = ?1 AND html_failed = 1")?,
        failures: count("SELECT COUNT(*) FROM extraction_failures WHERE run_id = ?1")?,
    })
}
