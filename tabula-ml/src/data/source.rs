//! Delimited text input.

use std::path::{Path, PathBuf};

use crate::data::dataset::{Dataset, Value, unquote};
use crate::error::PipelineError;

/// Delimited text file (CSV, TSV, ...) with a header row.
#[derive(Debug, Clone)]
pub struct DelimitedSource {
    pub path: PathBuf,
    pub delimiter: char,
}

impl DelimitedSource {
    pub fn new(path: impl Into<PathBuf>, delimiter: char) -> Self {
        Self {
            path: path.into(),
            delimiter,
        }
    }

    pub fn csv(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ',')
    }

    pub fn load(&self) -> Result<Dataset, PipelineError> {
        load_delimited(&self.path, self.delimiter)
    }
}

/// Read and parse a delimited file.
pub fn load_delimited(path: &Path, delimiter: char) -> Result<Dataset, PipelineError> {
    let content = std::fs::read_to_string(path)?;
    let dataset = parse_delimited(&content, delimiter)?;
    tracing::info!(
        path = %path.display(),
        rows = dataset.len(),
        columns = dataset.columns().len(),
        "loaded dataset"
    );
    Ok(dataset)
}

/// Parse delimited text: a header row, then one record per non-blank line.
pub fn parse_delimited(content: &str, delimiter: char) -> Result<Dataset, PipelineError> {
    let mut lines = content.lines().enumerate();

    let columns: Vec<String> = loop {
        match lines.next() {
            Some((_, line)) if line.trim().is_empty() => continue,
            Some((_, line)) => {
                break split_fields(line, delimiter)
                    .into_iter()
                    .map(|s| unquote(s).into_owned())
                    .collect();
            }
            None => return Err(PipelineError::dataset("empty input: no header row")),
        }
    };

    let mut rows = Vec::new();
    for (line_no, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let row: Vec<Value> = split_fields(line, delimiter)
            .into_iter()
            .map(Value::parse)
            .collect();
        if row.len() != columns.len() {
            return Err(PipelineError::schema(format!(
                "line {}: expected {} fields, found {}",
                line_no + 1,
                columns.len(),
                row.len()
            )));
        }
        rows.push(row);
    }

    Dataset::new(columns, rows)
}

/// Split one line on `delimiter`, ignoring delimiters inside double quotes.
fn split_fields(line: &str, delimiter: char) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, ch) in line.char_indices() {
        if ch == '"' {
            in_quotes = !in_quotes;
        } else if ch == delimiter && !in_quotes {
            fields.push(&line[start..i]);
            start = i + ch.len_utf8();
        }
    }
    fields.push(&line[start..]);
    fields
}
