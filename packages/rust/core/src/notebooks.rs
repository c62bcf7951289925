//! Clear outputs and execution counts from numbered notebooks.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use serde_json::ser::{PrettyFormatter, Serializer};
use tracing::{debug, info, warn};

use docfleet_shared::{DocfleetError, Result};

/// Notebooks whose file name starts with a digit (`1_intro.ipynb`, ...).
static NUMBERED_NOTEBOOK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9].*\.ipynb$").expect("valid regex"));

/// Outcome of [`strip_outputs`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StripReport {
    /// Files that matched the pattern.
    pub scanned: usize,
    /// Files rewritten because they held outputs or counts.
    pub cleared: Vec<PathBuf>,
    /// Files skipped because they could not be read or parsed.
    pub skipped: Vec<PathBuf>,
}

/// Strip every numbered notebook directly under `dir`.
pub fn strip_outputs(dir: &Path) -> Result<StripReport> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| DocfleetError::io(dir, e))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| NUMBERED_NOTEBOOK.is_match(name))
        })
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    let mut report = StripReport {
        scanned: paths.len(),
        ..StripReport::default()
    };

    for path in paths {
        let mut notebook = match read_notebook(&path) {
            Ok(nb) => nb,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping notebook");
                report.skipped.push(path);
                continue;
            }
        };

        if clear_outputs(&mut notebook) {
            write_notebook(&path, &notebook)?;
            debug!(path = %path.display(), "cleared outputs");
            report.cleared.push(path);
        }
    }

    info!(cleared = report.cleared.len(), scanned = report.scanned, "cleared notebook outputs");
    Ok(report)
}

/// Empty code-cell outputs and null their execution counts. Returns whether
/// anything changed.
pub fn clear_outputs(notebook: &mut Value) -> bool {
    let Some(cells) = notebook.get_mut("cells").and_then(Value::as_array_mut) else {
        return false;
    };

    let mut changed = false;
    for cell in cells {
        if cell.get("cell_type").and_then(Value::as_str) != Some("code") {
            continue;
        }
        let Some(cell) = cell.as_object_mut() else {
            continue;
        };

        if let Some(outputs) = cell.get_mut("outputs") {
            if outputs.as_array().is_some_and(|o| !o.is_empty()) {
                *outputs = Value::Array(Vec::new());
                changed = true;
            }
        }
        if let Some(count) = cell.get_mut("execution_count") {
            if !count.is_null() {
                *count = Value::Null;
                changed = true;
            }
        }
    }
    changed
}

fn read_notebook(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path).map_err(|e| DocfleetError::io(path, e))?;
    serde_json::from_str(&text)
        .map_err(|e| DocfleetError::validation(format!("{}: {e}", path.display())))
}

/// One-space indent and a trailing newline, matching the notebook on-disk convention.
fn write_notebook(path: &Path, notebook: &Value) -> Result<()> {
    let mut buf = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b" "));
    notebook
        .serialize(&mut serializer)
        .map_err(|e| DocfleetError::validation(format!("{}: {e}", path.display())))?;
    buf.push(b'\n');
    std::fs::write(path, buf).map_err(|e| DocfleetError::io(path, e))
}
