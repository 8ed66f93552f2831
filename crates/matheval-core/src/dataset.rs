//! Dataset records and work units
//!
//! A problem directory holds one `<n>.json` per problem, numeric stems only,
//! processed in ascending numeric order. Field shapes follow the dataset as
//! it exists in the wild: ordered lists of single-key maps, with a few legacy
//! plain-string and plain-map variants still around.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{EvalError, EvalResult};

/// Task variant: keyed per-sub-problem answers vs one composite answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskMode {
    Separated,
    Synthesised,
}

impl TaskMode {
    /// Normalized label used in output type strings
    pub fn label(&self) -> &'static str {
        match self {
            TaskMode::Separated => "Separated",
            TaskMode::Synthesised => "Synthesised",
        }
    }
}

impl std::fmt::Display for TaskMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A parsed task string such as `MP2_Seperated` or `MP3_Synthesised`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    /// Problem-class tag, e.g. `MP2`
    pub class_tag: String,
    pub mode: TaskMode,
}

/// Parse a `<class>_<mode>` task string. The dataset historically spells
/// the separated mode "Seperated"; both spellings are accepted.
pub fn parse_task(task: &str) -> EvalResult<TaskSpec> {
    let (class_tag, mode) = task
        .split_once('_')
        .ok_or_else(|| EvalError::invalid_input(format!("invalid task format: {}", task)))?;
    let mode = match mode.to_ascii_lowercase().as_str() {
        "seperated" | "separated" => TaskMode::Separated,
        "synthesised" => TaskMode::Synthesised,
        _ => {
            return Err(EvalError::invalid_input(format!(
                "unknown task mode: {}",
                task
            )));
        }
    };
    Ok(TaskSpec {
        class_tag: class_tag.to_ascii_uppercase(),
        mode,
    })
}

/// One dataset record as stored on disk
#[derive(Debug, Clone, Deserialize)]
pub struct ProblemRecord {
    #[serde(rename = "Problem_ID")]
    pub problem_id: u64,
    /// Composite statement used in synthesised mode
    #[serde(rename = "Math_Problem", default)]
    pub math_problem: String,
    /// Ordered sub-problems; order matches `Ground_Truth`
    #[serde(rename = "Synthesised_By", default)]
    pub synthesised_by: Value,
    #[serde(rename = "Ground_Truth", default)]
    pub ground_truth: Vec<Value>,
    /// Intermediate checkpoints substituted into the truth in separated mode
    #[serde(rename = "Connecting_Point", default)]
    pub connecting_point: Vec<Value>,
    /// Taxonomy tags, e.g. `[{"A2743": ["Mathematics -> Algebra -> ..."]}]`
    #[serde(rename = "Problem_Type", default)]
    pub problem_type: Value,
}

impl ProblemRecord {
    /// Sub-problem statements in stable order. Supports both the current
    /// list-of-single-key-maps shape and the legacy plain-map shape.
    pub fn parts_in_order(&self) -> Vec<String> {
        match &self.synthesised_by {
            Value::Array(items) => {
                let mut parts = Vec::new();
                for item in items {
                    match item {
                        Value::Object(map) => {
                            parts.extend(map.values().map(value_to_text));
                        }
                        other => parts.push(value_to_text(other)),
                    }
                }
                parts
            }
            Value::Object(map) => map.values().map(value_to_text).collect(),
            _ => Vec::new(),
        }
    }

    /// Raw ground-truth strings in order
    pub fn truth_values(&self) -> Vec<String> {
        self.ground_truth
            .iter()
            .map(|item| match item {
                Value::Object(map) => map.values().next().map(value_to_text).unwrap_or_default(),
                other => value_to_text(other),
            })
            .collect()
    }

    /// Connecting-point keys in order, from the
    /// `[{outer: {key: ...}}]` shape
    fn connecting_keys(&self) -> Vec<String> {
        let Some(Value::Object(outer)) = self.connecting_point.first() else {
            return Vec::new();
        };
        let mut keys = Vec::new();
        for inner in outer.values() {
            if let Value::Object(map) = inner {
                keys.extend(map.keys().cloned());
            }
        }
        keys
    }

    /// Ground truth as passed to the judge: in separated mode each
    /// connecting-point key replaces the truth entry at its index.
    pub fn effective_truth(&self, mode: TaskMode) -> Vec<String> {
        let mut truth = self.truth_values();
        if mode == TaskMode::Separated {
            for (index, key) in self.connecting_keys().into_iter().enumerate() {
                if index < truth.len() {
                    truth[index] = key;
                }
            }
        }
        truth
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One math problem bound to its task variant
#[derive(Debug, Clone)]
pub struct WorkUnit {
    pub problem_id: u64,
    pub task: TaskSpec,
    pub record: ProblemRecord,
}

impl WorkUnit {
    pub fn new(record: ProblemRecord, task: TaskSpec) -> Self {
        Self {
            problem_id: record.problem_id,
            task,
            record,
        }
    }
}

/// Problem files with numeric stems, ascending
pub fn iter_problem_files(data_dir: &Path) -> EvalResult<Vec<PathBuf>> {
    if !data_dir.is_dir() {
        return Err(EvalError::dataset(format!(
            "data path must be a directory: {}",
            data_dir.display()
        )));
    }
    let entries = std::fs::read_dir(data_dir)
        .map_err(|e| EvalError::dataset(format!("cannot list {}: {}", data_dir.display(), e)))?;

    let mut files: Vec<(u64, PathBuf)> = Vec::new();
    for entry in entries {
        let entry = entry
            .map_err(|e| EvalError::dataset(format!("cannot list {}: {}", data_dir.display(), e)))?;
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Ok(id) = stem.parse::<u64>() {
            files.push((id, path));
        }
    }
    files.sort_by_key(|(id, _)| *id);
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

/// Load all work units for one task, optionally restricted to a subset of
/// problem ids. Records that fail to parse are skipped with a warning.
pub fn load_work_units(
    data_dir: &Path,
    task: &TaskSpec,
    subset: Option<&HashSet<u64>>,
) -> EvalResult<Vec<WorkUnit>> {
    let mut units = Vec::new();
    for path in iter_problem_files(data_dir)? {
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable problem file");
                continue;
            }
        };
        let record: ProblemRecord = match serde_json::from_str(&text) {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unparsable problem file");
                continue;
            }
        };
        if let Some(subset) = subset {
            if !subset.contains(&record.problem_id) {
                continue;
            }
        }
        units.push(WorkUnit::new(record, task.clone()));
    }
    Ok(units)
}
