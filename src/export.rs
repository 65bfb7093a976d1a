// src/export.rs
// =============================================================================
// Writes the two datasets to disk.
//
//   csv (default)   <dir>/posts.csv    <dir>/comments.csv
//   jsonl           <dir>/posts.jsonl  <dir>/comments.jsonl
//
// Every record of a dataset has the same flat shape, so either format loads
// straight into a dataframe or spreadsheet tool. The csv writer quotes text
// containing commas, quotes or newlines, so post bodies survive intact.
// =============================================================================

use crate::aggregate::Datasets;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Csv,
    Jsonl,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Jsonl => "jsonl",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFiles {
    pub posts: PathBuf,
    pub comments: PathBuf,
}

pub fn write_datasets(dir: &Path, data: &Datasets, format: ExportFormat) -> Result<ExportedFiles> {
    fs::create_dir_all(dir).with_context(|| format!("create output directory {}", dir.display()))?;

    let posts = dir.join(format!("posts.{}", format.extension()));
    let comments = dir.join(format!("comments.{}", format.extension()));
    match format {
        ExportFormat::Csv => {
            write_csv(&posts, &data.posts)?;
            write_csv(&comments, &data.comments)?;
        }
        ExportFormat::Jsonl => {
            write_jsonl(&posts, &data.posts)?;
            write_jsonl(&comments, &data.comments)?;
        }
    }

    Ok(ExportedFiles { posts, comments })
}

// The header row comes from the record's field names
fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut out = csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    for row in rows {
        out.serialize(row).with_context(|| format!("encode row for {}", path.display()))?;
    }
    out.flush().with_context(|| format!("flush {}", path.display()))?;
    Ok(())
}

fn write_jsonl<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for row in rows {
        serde_json::to_writer(&mut out, row).with_context(|| format!("encode row for {}", path.display()))?;
        out.write_all(b"\n")?;
    }
    out.flush().with_context(|| format!("flush {}", path.display()))?;
    Ok(())
}
