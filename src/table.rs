use std::fs;
use std::path::Path;

use csv::{ReaderBuilder, Writer};
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};

/// Text encoding a table was decoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Latin1,
}

/// A delimited text table held entirely as strings.
#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub encoding: Encoding,
    /// Lines skipped because they carried more fields than the header.
    pub malformed_rows: usize,
}

impl Table {
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            headers,
            rows,
            encoding: Encoding::Utf8,
            malformed_rows: 0,
        }
    }

    /// Builds a table from string literals; handy for tests and fixtures.
    pub fn from_strs(name: &str, headers: &[&str], rows: &[&[&str]]) -> Self {
        Self::new(
            name,
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|v| v.to_string()).collect())
                .collect(),
        )
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::MissingFile(path.to_path_buf()));
        }
        let bytes = fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let (text, encoding) = decode(&bytes);
        if encoding == Encoding::Latin1 {
            warn!("{}: not valid UTF-8, decoded as Latin-1", name);
        }
        let mut table = Self::parse(&name, &text)?;
        table.encoding = encoding;
        debug!(
            "loaded {}: {} rows x {} columns",
            table.name,
            table.rows.len(),
            table.headers.len()
        );
        Ok(table)
    }

    pub fn parse(name: &str, text: &str) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .from_reader(text.as_bytes());
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        let mut malformed_rows = 0;
        for record in reader.records() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    debug!("{}: skipping unreadable line: {}", name, e);
                    malformed_rows += 1;
                    continue;
                }
            };
            if record.len() > headers.len() {
                malformed_rows += 1;
                continue;
            }
            let mut row: Vec<String> = record.iter().map(|v| v.to_string()).collect();
            // Short lines are padded the way spreadsheet exports expect.
            row.resize(headers.len(), String::new());
            rows.push(row);
        }
        if malformed_rows > 0 {
            warn!("{}: skipped {} malformed line(s)", name, malformed_rows);
        }

        Ok(Self {
            name: name.to_string(),
            headers,
            rows,
            encoding: Encoding::Utf8,
            malformed_rows,
        })
    }

    pub fn find_column(&self, candidates: &[String]) -> Option<usize> {
        candidates
            .iter()
            .find_map(|c| self.headers.iter().position(|h| h == c))
    }

    /// First candidate present in the header, or `MissingColumn`.
    pub fn require_column(&self, candidates: &[String]) -> Result<usize> {
        self.find_column(candidates)
            .ok_or_else(|| PipelineError::MissingColumn {
                table: self.name.clone(),
                candidates: candidates.to_vec(),
            })
    }

    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &str> {
        self.rows.iter().map(move |row| row[index].as_str())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn decode(bytes: &[u8]) -> (String, Encoding) {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => (text.to_string(), Encoding::Utf8),
        // Latin-1 maps every byte straight to the code point of the same value.
        Err(_) => (bytes.iter().map(|&b| b as char).collect(), Encoding::Latin1),
    }
}

/// Parses a numeric cell, tolerating currency symbols and thousands separators.
/// Blank cells are `Ok(None)`; anything else unreadable is `Err(())`.
pub fn parse_number(raw: &str) -> std::result::Result<Option<f64>, ()> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    if cleaned.is_empty() {
        return Ok(None);
    }
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(Some)
        .ok_or(())
}

/// Integral values print without a fractional part.
pub fn format_metric(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}

pub fn write_csv(path: &Path, headers: &[String], rows: &[Vec<String>]) -> Result<()> {
    let mut writer = Writer::from_path(path)?;
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}
