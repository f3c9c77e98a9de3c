// Error types for the covercheck pipeline
// Load and export problems abort a run; coercion problems never do,
// they land in the cleaning log instead.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CovercheckError>;

/// Top-level error for a pipeline run.
#[derive(Error, Debug)]
pub enum CovercheckError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Clean(#[from] CleanError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Ingestion failures. Any of these means the month cannot be audited.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("no {table} file found in {} (expected a *.csv whose name contains one of: {hints})", .dir.display())]
    MissingTable {
        table: &'static str,
        dir: PathBuf,
        hints: String,
    },

    #[error("{file}: missing required column(s): {columns}")]
    MissingColumns { file: String, columns: String },

    #[error("{file}: record {record}: {source}")]
    MalformedRecord {
        file: String,
        record: usize,
        source: csv::Error,
    },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: io::Error,
    },

    #[error("failed to scan input directory {}: {source}", .dir.display())]
    Scan {
        dir: PathBuf,
        source: io::Error,
    },
}

/// Normalization failures. Individual bad values never raise this (they
/// become missing markers plus a log entry); only a broken table-level
/// invariant does.
#[derive(Error, Debug)]
pub enum CleanError {
    #[error("{table}: row count changed during cleaning ({before} in, {after} out)")]
    RowCountDrift {
        table: &'static str,
        before: usize,
        after: usize,
    },
}

/// Export failures. The output directory may hold temp files but never a
/// half-written artifact under its final name.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("failed to write artifact {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: io::Error,
    },

    #[error("failed to finalize artifact {}: {source}", .path.display())]
    Rename {
        path: PathBuf,
        source: io::Error,
    },

    #[error("failed to read back {}: {source}", .path.display())]
    ReadBack {
        path: PathBuf,
        source: io::Error,
    },

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("csv serialization error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected column layout in {}: {detail}", .path.display())]
    Schema { path: PathBuf, detail: String },
}
