// src/benchmark.rs
//
//! Batch size selection from a historical benchmark table.
//!
//! The table is comma-separated text with a header row. Columns are mapped
//! by name (case-insensitive), so extra columns and any column order are
//! fine. Required columns: `batch_size`, `throughput_samples_per_sec`,
//! `p95_latency_total_ms`. Rows with a batch size above
//! [`MAX_BENCHMARK_BATCH_SIZE`] count as malformed.
//!
//! Selection maximizes `(throughput, -p95)` lexicographically. Comparison is
//! strict, so among rows with an identical key the first one wins.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::mem;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::constants::MAX_BENCHMARK_BATCH_SIZE;

pub const COL_BATCH_SIZE: &str = "batch_size";
pub const COL_THROUGHPUT: &str = "throughput_samples_per_sec";
pub const COL_P95_TOTAL: &str = "p95_latency_total_ms";

/// Reasons the table could not produce a batch size.
#[derive(Error, Debug)]
pub enum BenchmarkError {
    #[error("no benchmark table configured")]
    NotConfigured,

    #[error("benchmark table not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read benchmark table {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("benchmark table header is missing column '{0}'")]
    MissingColumn(&'static str),

    #[error("benchmark table has no usable rows")]
    NoUsableRows,
}

/// One parsed row of the benchmark table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BenchmarkRow {
    pub batch_size: usize,
    pub throughput_samples_per_sec: f64,
    pub p95_latency_total_ms: f64,
}

impl BenchmarkRow {
    /// `true` if `self` ranks strictly above `other`.
    fn beats(&self, other: &BenchmarkRow) -> bool {
        match self
            .throughput_samples_per_sec
            .total_cmp(&other.throughput_samples_per_sec)
        {
            Ordering::Greater => true,
            Ordering::Less => false,
            // lower p95 wins, i.e. higher -p95
            Ordering::Equal => self.p95_latency_total_ms < other.p95_latency_total_ms,
        }
    }
}

/// Parsed benchmark table (only the rows that parsed cleanly).
#[derive(Debug, Clone, Default)]
pub struct BenchmarkTable {
    rows: Vec<BenchmarkRow>,
    skipped: usize,
}

struct Columns {
    batch_size: usize,
    throughput: usize,
    p95: usize,
}

impl Columns {
    fn from_header(header: &[String]) -> Result<Self, BenchmarkError> {
        let mapping: HashMap<String, usize> = header
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.trim_start_matches('\u{feff}').to_lowercase(), idx))
            .collect();

        let find = |name: &'static str| {
            mapping
                .get(name)
                .copied()
                .ok_or(BenchmarkError::MissingColumn(name))
        };

        Ok(Self {
            batch_size: find(COL_BATCH_SIZE)?,
            throughput: find(COL_THROUGHPUT)?,
            p95: find(COL_P95_TOTAL)?,
        })
    }

    fn parse_row(&self, fields: &[String]) -> Option<BenchmarkRow> {
        let get = |idx: usize| -> Option<f64> {
            let v = fields.get(idx)?.parse::<f64>().ok()?;
            v.is_finite().then_some(v)
        };

        let batch = get(self.batch_size)?;
        let throughput = get(self.throughput)?;
        let p95 = get(self.p95)?;
        if batch > MAX_BENCHMARK_BATCH_SIZE as f64 {
            return None;
        }

        Some(BenchmarkRow {
            // "4.0" style cells are truncated; negatives clamp to 0 and are lifted later
            batch_size: batch.max(0.0) as usize,
            throughput_samples_per_sec: throughput,
            p95_latency_total_ms: p95,
        })
    }
}

/// Splits comma-separated text into records of trimmed cells. Quoted cells
/// follow RFC 4180: they may contain commas, line breaks and `""` escapes.
fn split_records(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => record.push(mem::take(&mut field).trim().to_string()),
            '\r' => {}
            '\n' => {
                record.push(mem::take(&mut field).trim().to_string());
                records.push(mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field.trim().to_string());
        records.push(record);
    }
    records
}

impl BenchmarkTable {
    /// Parse a table from any reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, BenchmarkError> {
        Self::parse(reader, Path::new("<reader>"))
    }

    /// Load a table from disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, BenchmarkError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(BenchmarkError::NotFound(path.to_path_buf()));
        }
        let file = File::open(path).map_err(|source| BenchmarkError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(file, path)
    }

    fn parse<R: Read>(mut reader: R, path: &Path) -> Result<Self, BenchmarkError> {
        let mut text = String::new();
        reader
            .read_to_string(&mut text)
            .map_err(|source| BenchmarkError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let mut records = split_records(&text)
            .into_iter()
            .filter(|r| r.iter().any(|cell| !cell.is_empty()));

        let header = records.next().ok_or(BenchmarkError::NoUsableRows)?;
        let columns = Columns::from_header(&header)?;

        let mut table = BenchmarkTable::default();
        for (row_num, record) in records.enumerate() {
            match columns.parse_row(&record) {
                Some(row) => table.rows.push(row),
                None => {
                    debug!("Skipping malformed benchmark row {}: {:?}", row_num + 1, record);
                    table.skipped += 1;
                }
            }
        }

        if table.skipped > 0 {
            info!("Skipped {} malformed benchmark rows", table.skipped);
        }
        Ok(table)
    }

    pub fn rows(&self) -> &[BenchmarkRow] {
        &self.rows
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Row with the best `(throughput, -p95)` key; first one wins on ties.
    pub fn best(&self) -> Option<&BenchmarkRow> {
        let mut best: Option<&BenchmarkRow> = None;
        for row in &self.rows {
            match best {
                Some(current) if !row.beats(current) => {}
                _ => best = Some(row),
            }
        }
        best
    }
}

/// Pick the batch size from the table at `path`. Never clamps; see
/// [`resolve_batch_size`] for the fallback-applying entry point.
pub fn select_batch_size(path: Option<&Path>) -> Result<usize, BenchmarkError> {
    let path = path.ok_or(BenchmarkError::NotConfigured)?;
    let table = BenchmarkTable::from_file(path)?;
    table
        .best()
        .map(|row| row.batch_size)
        .ok_or(BenchmarkError::NoUsableRows)
}

/// Effective batch size: the table's pick, or `max(1, fallback)` on any failure.
pub fn resolve_batch_size(path: Option<&Path>, fallback: usize) -> usize {
    match select_batch_size(path) {
        Ok(batch_size) => {
            info!("Selected batch size {} from benchmark table", batch_size);
            batch_size.max(1)
        }
        Err(BenchmarkError::NotConfigured) => fallback.max(1),
        Err(e) => {
            warn!("{}; using fallback batch size {}", e, fallback.max(1));
            fallback.max(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    fn table(text: &str) -> BenchmarkTable {
        BenchmarkTable::from_reader(Cursor::new(text.to_string())).unwrap()
    }

    fn write_csv(text: &str) -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn highest_throughput_wins() {
        let t = table(
            "batch_size,throughput_samples_per_sec,p95_latency_total_ms\n\
             1,100.0,10\n\
             8,450.5,80\n\
             4,300,40\n",
        );
        assert_eq!(t.best().unwrap().batch_size, 8);
    }

    #[test]
    fn equal_throughput_prefers_lower_p95() {
        let t = table(
            "batch_size,throughput_samples_per_sec,p95_latency_total_ms\n\
             16,500,120\n\
             8,500,60\n",
        );
        assert_eq!(t.best().unwrap().batch_size, 8);
    }

    #[test]
    fn identical_keys_keep_first_row() {
        let t = table(
            "batch_size,throughput_samples_per_sec,p95_latency_total_ms\n\
             2,500,60\n\
             32,500,60\n",
        );
        assert_eq!(t.best().unwrap().batch_size, 2);
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let t = table(
            "model,batch_size,p95_latency_total_ms,throughput_samples_per_sec\n\
             a,abc,10,999\n\
             b,4,nan,900\n\
             c,2,20,100\n\
             d,3\n",
        );
        assert_eq!(t.rows().len(), 1);
        assert_eq!(t.skipped(), 3);
        assert_eq!(t.best().unwrap().batch_size, 2);
    }

    #[test]
    fn float_batch_size_is_truncated() {
        let t = table(
            "batch_size,throughput_samples_per_sec,p95_latency_total_ms\n4.0,10,1\n",
        );
        assert_eq!(t.best().unwrap().batch_size, 4);
    }

    #[test]
    fn missing_column_is_an_error() {
        let err = BenchmarkTable::from_reader(Cursor::new("batch_size,throughput\n1,2\n"))
            .unwrap_err();
        assert!(matches!(err, BenchmarkError::MissingColumn(COL_THROUGHPUT)));
    }

    #[test]
    fn resolve_uses_table() {
        let file = write_csv(
            "batch_size,throughput_samples_per_sec,p95_latency_total_ms\n\
             4,200,30\n\
             8,250,70\n",
        );
        assert_eq!(resolve_batch_size(Some(file.path()), 1), 8);
    }

    #[test]
    fn resolve_falls_back_on_missing_file() {
        let path = Path::new("/definitely/not/here/results.csv");
        assert_eq!(resolve_batch_size(Some(path), 6), 6);
        assert_eq!(resolve_batch_size(None, 0), 1);
    }

    #[test]
    fn resolve_falls_back_on_empty_or_garbage_table() {
        let header_only =
            write_csv("batch_size,throughput_samples_per_sec,p95_latency_total_ms\n");
        assert_eq!(resolve_batch_size(Some(header_only.path()), 3), 3);

        let garbage = write_csv("batch_size,throughput_samples_per_sec,p95_latency_total_ms\nx,y,z\n");
        assert_eq!(resolve_batch_size(Some(garbage.path()), 5), 5);

        let empty = write_csv("");
        assert_eq!(resolve_batch_size(Some(empty.path()), 2), 2);
    }

    #[test]
    fn quoted_cells_keep_their_commas() {
        let t = table(
            "model,batch_size,throughput_samples_per_sec,p95_latency_total_ms\n\
             plain,4,400,35\n\
             \"resnet, fp16\",16,900,40\n\
             \"say \"\"hi\"\"\",8,500,30\n",
        );
        assert_eq!(t.skipped(), 0);
        assert_eq!(t.rows().len(), 3);
        assert_eq!(t.best().unwrap().batch_size, 16);
    }

    #[test]
    fn quoted_cell_may_span_lines() {
        let t = table(
            "model,batch_size,throughput_samples_per_sec,p95_latency_total_ms\r\n\
             \"two\nlines\",2,100,10\r\n\
             \"quoted numbers\",\"32\",\"800\",\"50\"\r\n",
        );
        assert_eq!(t.rows().len(), 2);
        assert_eq!(t.best().unwrap().batch_size, 32);
    }

    #[test]
    fn absurd_batch_size_is_malformed() {
        let t = table(
            "batch_size,throughput_samples_per_sec,p95_latency_total_ms\n\
             1e30,9999,1\n\
             70000,9000,1\n\
             4,100,10\n",
        );
        assert_eq!(t.skipped(), 2);
        assert_eq!(t.best().unwrap().batch_size, 4);
    }

    #[test]
    fn zero_batch_size_is_lifted_to_one() {
        let file = write_csv(
            "batch_size,throughput_samples_per_sec,p95_latency_total_ms\n0,999,1\n",
        );
        assert_eq!(resolve_batch_size(Some(file.path()), 7), 1);
    }
}
