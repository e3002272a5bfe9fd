//! Buffered, batch-flushed spreadsheet output.
//!
//! Every flush rewrites the whole sheet: rows are written to a sibling
//! temporary file which is then renamed over the target, so an interrupted
//! flush leaves the previous sheet intact.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use csv::Writer;
use log::{error, info, warn};
use rust_xlsxwriter::Workbook;

use crate::error::ScrapeError;
use crate::record::MetadataRecord;

/// Columns that always come first, in this order. Other fields follow sorted.
pub const FIXED_COLUMNS: [&str; 14] = [
    "shot_id",
    "grid_title_raw",
    "titleyear",
    "title_year_raw",
    "shot_status",
    "title_content_status",
    "thumb_src",
    "data_filename",
    "image_url",
    "image_path",
    "image_width",
    "image_height",
    "image_aspect_ratio_fraction",
    "image_aspect_ratio_cinema",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Xlsx,
    Csv,
}

impl SheetFormat {
    /// `.csv` writes CSV; anything else is a workbook.
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => SheetFormat::Csv,
            _ => SheetFormat::Xlsx,
        }
    }
}

pub struct ProgressStore {
    path: PathBuf,
    backup_path: Option<PathBuf>,
    format: SheetFormat,
    batch_size: usize,
    buffer: Vec<MetadataRecord>,
    persisted: Vec<MetadataRecord>,
    extra_columns: BTreeSet<String>,
    flushes: usize,
}

impl ProgressStore {
    pub fn new(path: impl Into<PathBuf>, batch_size: usize) -> Self {
        let path = path.into();
        Self {
            format: SheetFormat::for_path(&path),
            path,
            backup_path: None,
            batch_size: batch_size.max(1),
            buffer: Vec::new(),
            persisted: Vec::new(),
            extra_columns: BTreeSet::new(),
            flushes: 0,
        }
    }

    /// Where to put the rows if the main sheet cannot be written.
    pub fn with_backup(mut self, backup_path: impl Into<PathBuf>) -> Self {
        self.backup_path = Some(backup_path.into());
        self
    }

    /// Buffer a record, flushing once the batch is full.
    ///
    /// Returns the number of rows flushed by this call.
    pub fn append(&mut self, record: MetadataRecord) -> Result<usize, ScrapeError> {
        for name in record.field_names() {
            if !FIXED_COLUMNS.contains(&name) && !self.extra_columns.contains(name) {
                self.extra_columns.insert(name.to_string());
            }
        }
        self.buffer.push(record);

        if self.buffer.len() >= self.batch_size {
            info!(
                "Collected {} shots, saving intermediate progress...",
                self.total_rows()
            );
            return self.flush();
        }
        Ok(0)
    }

    /// Write everything buffered so far. A no-op when the buffer is empty.
    ///
    /// Returns the number of new rows. On failure the buffer is kept so a later
    /// flush can try again.
    pub fn flush(&mut self) -> Result<usize, ScrapeError> {
        if self.buffer.is_empty() {
            return Ok(0);
        }

        let columns = self.columns();
        let rows: Vec<&MetadataRecord> = self.persisted.iter().chain(&self.buffer).collect();

        if let Err(e) = write_sheet(&self.path, self.format, &columns, &rows) {
            error!("Could not save progress to {}: {e}", self.path.display());
            if let Some(backup) = &self.backup_path {
                match write_sheet(backup, SheetFormat::for_path(backup), &columns, &rows) {
                    Ok(()) => warn!("Error backup saved to: {}", backup.display()),
                    Err(backup_err) => error!("Error backup failed too: {backup_err}"),
                }
            }
            return Err(e);
        }

        let written = self.buffer.len();
        self.persisted.append(&mut self.buffer);
        self.flushes += 1;
        info!(
            "Progress saved: {} rows to {}",
            self.persisted.len(),
            self.path.display()
        );
        Ok(written)
    }

    /// Final flush at the end of a run.
    pub fn finish(&mut self) -> Result<usize, ScrapeError> {
        self.flush()
    }

    /// Header row: fixed schema, then unknown fields in sorted order.
    pub fn columns(&self) -> Vec<String> {
        FIXED_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(self.extra_columns.iter().cloned())
            .collect()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn persisted_rows(&self) -> usize {
        self.persisted.len()
    }

    pub fn total_rows(&self) -> usize {
        self.persisted.len() + self.buffer.len()
    }

    /// Successful writes so far.
    pub fn flush_count(&self) -> usize {
        self.flushes
    }
}

/// Newlines become single spaces; surrounding whitespace goes.
fn clean_cell(value: &str) -> String {
    value
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn row_values(record: &MetadataRecord, columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .map(|column| record.get(column).map(clean_cell).unwrap_or_default())
        .collect()
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sheet".to_string());
    path.with_file_name(format!(".{name}.partial"))
}

fn write_sheet(
    path: &Path,
    format: SheetFormat,
    columns: &[String],
    rows: &[&MetadataRecord],
) -> Result<(), ScrapeError> {
    let fail = |reason: String| ScrapeError::Spreadsheet {
        path: path.to_path_buf(),
        reason,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let temp = temp_path(path);

    let written = match format {
        SheetFormat::Csv => write_csv(&temp, columns, rows),
        SheetFormat::Xlsx => write_xlsx(&temp, columns, rows),
    };
    if let Err(reason) = written {
        let _ = fs::remove_file(&temp);
        return Err(fail(reason));
    }

    fs::rename(&temp, path).map_err(|e| fail(format!("could not replace file: {e}")))
}

fn write_csv(path: &Path, columns: &[String], rows: &[&MetadataRecord]) -> Result<(), String> {
    let mut writer = Writer::from_path(path).map_err(|e| e.to_string())?;
    writer.write_record(columns).map_err(|e| e.to_string())?;
    for record in rows {
        writer
            .write_record(row_values(record, columns))
            .map_err(|e| e.to_string())?;
    }
    writer.flush().map_err(|e| e.to_string())
}

fn write_xlsx(path: &Path, columns: &[String], rows: &[&MetadataRecord]) -> Result<(), String> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();

    for (col, name) in columns.iter().enumerate() {
        let col = u16::try_from(col).map_err(|_| "too many columns".to_string())?;
        sheet
            .write_string(0, col, name)
            .map_err(|e| e.to_string())?;
    }
    for (index, record) in rows.iter().enumerate() {
        let row = u32::try_from(index + 1).map_err(|_| "too many rows".to_string())?;
        for (col, value) in row_values(record, columns).iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            let col = u16::try_from(col).map_err(|_| "too many columns".to_string())?;
            sheet
                .write_string(row, col, value)
                .map_err(|e| e.to_string())?;
        }
    }

    workbook.save(path).map_err(|e| e.to_string())
}
