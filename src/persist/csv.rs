//! Flat CSV export of the merged dataset.

use std::path::{Path, PathBuf};

use tracing::error;

use crate::{
    core::store::RecordStore,
    types::{FREE_TEXT_FIELDS, Revision, Source},
};

use super::{PersistError, PersistResult, atomic_write};

/// Cell text written in place of a missing field.
pub const MISSING_MARKER: &str = "ERROR";

/// A field absent from an authoritative record at export time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingField {
    pub field: String,
    pub source: Source,
    pub timestamp: String,
    pub revision: Revision,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub rows: usize,
    pub missing: Vec<MissingField>,
}

/// Writes `data.csv` with a fixed column order.
#[derive(Debug, Clone)]
pub struct CsvExporter {
    path: PathBuf,
    columns: Vec<String>,
}

impl CsvExporter {
    pub fn new(path: impl Into<PathBuf>, columns: Vec<String>) -> Self {
        Self {
            path: path.into(),
            columns,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Builds the whole document from scratch.
    pub fn render(&self, store: &RecordStore) -> (String, ExportSummary) {
        let header: Vec<String> = self.columns.iter().map(|c| escape_csv(c)).collect();
        let mut out = header.join(",");
        out.push('\n');
        let mut summary = ExportSummary::default();

        for row in store.authoritative() {
            let cells: Vec<String> = self
                .columns
                .iter()
                .map(|field| match row.record.rendered(field) {
                    Some(value) if is_free_text(field) => quote(&value),
                    Some(value) => escape_csv(&value),
                    None => {
                        error!(
                            source = %row.source,
                            "missing field {} from data entry {}.{}",
                            field,
                            row.timestamp,
                            row.revision
                        );
                        summary.missing.push(MissingField {
                            field: field.clone(),
                            source: row.source.clone(),
                            timestamp: row.timestamp.to_string(),
                            revision: row.revision,
                        });
                        MISSING_MARKER.to_string()
                    }
                })
                .collect();
            out.push_str(&cells.join(","));
            out.push('\n');
            summary.rows += 1;
        }

        (out, summary)
    }

    /// Rebuilds and atomically replaces the export file.
    pub fn write(&self, store: &RecordStore) -> PersistResult<ExportSummary> {
        let (text, summary) = self.render(store);
        atomic_write(&self.path, text.as_bytes()).map_err(|err| PersistError::io(&self.path, err))?;
        Ok(summary)
    }
}

fn is_free_text(field: &str) -> bool {
    FREE_TEXT_FIELDS.contains(&field)
}

/// Always quotes, doubling embedded quotes.
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Quotes only when the cell would otherwise split or break the row.
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        quote(s)
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_text_is_always_quoted() {
        assert_eq!(quote("fast"), "\"fast\"");
        assert_eq!(quote(""), "\"\"");
        assert_eq!(quote("said \"hi\", left"), "\"said \"\"hi\"\", left\"");
    }

    #[test]
    fn plain_cells_are_quoted_only_when_needed() {
        assert_eq!(escape_csv("118"), "118");
        assert_eq!(escape_csv("[1,2,3]"), "\"[1,2,3]\"");
        assert_eq!(escape_csv("a \"b\""), "\"a \"\"b\"\"\"");
        assert_eq!(escape_csv("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn only_comments_and_recorder_are_free_text() {
        assert!(is_free_text("comments"));
        assert!(is_free_text("recorderName"));
        assert!(!is_free_text("team"));
    }
}
