//! Per-run metadata logging for strategy effectiveness analysis.
//!
//! After each run a single wide row is appended to a tabular log. The row
//! carries identity, the query, per-provider and per-strategy metrics,
//! date-extraction and relevance statistics, phase timings, and success
//! status. Strategy-level detail is embedded as a JSON blob column.

pub mod analysis;
mod record;
mod recorder;

pub use record::RunRecord;
pub use recorder::RunRecorder;

/// Quote a field for the tabular log. Rows are single-line: embedded
/// newlines are flattened to spaces before quoting.
pub(crate) fn csv_escape(field: &str) -> String {
    let flat = field.replace(['\n', '\r'], " ");
    if flat.contains(',') || flat.contains('"') {
        format!("\"{}\"", flat.replace('"', "\"\""))
    } else {
        flat
    }
}

/// Split one log line into fields, honoring quoted commas.
pub(crate) fn csv_split(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}
