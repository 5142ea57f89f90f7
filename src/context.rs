//! Marked source excerpts around a diagnostic line.

use std::fs;
use std::path::Path;

pub const MARKER: &str = ">>";

/// Lines around `error_line` (1-based) of the file at `path`.
///
/// Never fails: an unreadable file yields a one-line placeholder so a single
/// bad file cannot abort report building.
pub fn extract(path: &Path, error_line: usize, window: usize) -> String {
    match fs::read_to_string(path) {
        Ok(source) => render_window(&source, error_line, window),
        Err(err) => format!("<could not read {}: {}>", path.display(), err),
    }
}

/// Renders at most `2 * window + 1` lines, marking `error_line` with [`MARKER`].
pub fn render_window(source: &str, error_line: usize, window: usize) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let start = error_line.saturating_sub(window + 1);
    let end = lines.len().min(error_line + window);
    if start >= end {
        return String::new();
    }

    let width = end.to_string().len();
    let blank = " ".repeat(MARKER.len());

    lines[start..end]
        .iter()
        .enumerate()
        .map(|(offset, text)| {
            let number = start + offset + 1;
            let marker = if number == error_line { MARKER } else { blank.as_str() };
            format!("{} {:>width$} | {}", marker, number, text, width = width)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
