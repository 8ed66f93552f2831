//! Per-problem result records and the aggregated summary
//!
//! One JSON file per problem keyed by problem id. Replace-on-write is
//! atomic (temp file then rename) so a crashed run never leaves a
//! half-written record behind, and finished ids are skipped on restart.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{EvalError, EvalResult};

/// One finished evaluation, as persisted to `<problem_id>.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRecord {
    /// RFC 3339 UTC timestamp of record creation
    pub timestamp: String,
    pub model: String,
    #[serde(rename = "type")]
    pub type_label: String,
    #[serde(rename = "Problem_ID")]
    pub problem_id: u64,
    /// The problem as posed: the sub-problem list in separated mode, the
    /// composite statement in synthesised mode
    pub math_problem: Value,
    #[serde(default)]
    pub reasoning_content: String,
    #[serde(default)]
    pub problem_type: Value,
    pub output_answer: Vec<String>,
    pub ground_truth: Vec<String>,
    pub correctness: Vec<bool>,
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub reasoning_tokens: u64,
    #[serde(default)]
    pub cost: f64,
}

impl EvaluationRecord {
    /// A problem counts as correct when every verdict entry is true and the
    /// verdict is non-empty.
    pub fn is_correct(&self) -> bool {
        !self.correctness.is_empty() && self.correctness.iter().all(|c| *c)
    }
}

/// Record store rooted at one output directory
pub struct ResultStore {
    output_dir: PathBuf,
}

impl ResultStore {
    /// Open the store, creating the output directory if needed
    pub fn open(output_dir: impl Into<PathBuf>) -> EvalResult<Self> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir).map_err(|e| {
            EvalError::persistence(format!(
                "cannot create output directory {}: {}",
                output_dir.display(),
                e
            ))
        })?;
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn record_path(&self, problem_id: u64) -> PathBuf {
        self.output_dir.join(format!("{problem_id}.json"))
    }

    /// Load every persisted record, keyed by problem id. Aggregate files and
    /// unparsable records are skipped with a warning.
    pub fn load_existing(&self) -> BTreeMap<u64, EvaluationRecord> {
        let mut existing = BTreeMap::new();
        let Ok(entries) = std::fs::read_dir(&self.output_dir) else {
            return existing;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.ends_with(".json") || name == "eval.json" || name == "summary.json" {
                continue;
            }
            match std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|text| {
                    serde_json::from_str::<EvaluationRecord>(&text).map_err(|e| e.to_string())
                }) {
                Ok(record) => {
                    existing.insert(record.problem_id, record);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping cached record");
                }
            }
        }
        existing
    }

    /// Ids that already have a persisted record
    pub fn completed_ids(&self) -> std::collections::HashSet<u64> {
        self.load_existing().into_keys().collect()
    }

    /// Persist one record atomically: write a sibling temp file, then rename
    /// it over the final path.
    pub fn write_record(&self, record: &EvaluationRecord) -> EvalResult<()> {
        let final_path = self.record_path(record.problem_id);
        let tmp_path = self.output_dir.join(format!(".{}.json.tmp", record.problem_id));

        let body = serde_json::to_string_pretty(record)?;
        std::fs::write(&tmp_path, body).map_err(|e| {
            EvalError::persistence(format!("cannot write {}: {}", tmp_path.display(), e))
        })?;
        std::fs::rename(&tmp_path, &final_path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            EvalError::persistence(format!("cannot finalize {}: {}", final_path.display(), e))
        })?;
        Ok(())
    }

    /// Aggregate every persisted record into `summary.json`
    pub fn write_summary(&self, model: &str, type_label: &str) -> EvalResult<RunSummary> {
        let records: Vec<EvaluationRecord> = self.load_existing().into_values().collect();
        let summary = RunSummary::from_records(model, type_label, &records);

        let path = self.output_dir.join("summary.json");
        let body = serde_json::to_string_pretty(&summary)?;
        std::fs::write(&path, body).map_err(|e| {
            EvalError::persistence(format!("cannot write {}: {}", path.display(), e))
        })?;
        info!(
            path = %path.display(),
            accuracy = summary.evaluation_summary.overall_accuracy.value,
            "summary written"
        );
        Ok(summary)
    }
}

/// `summary.json` top-level layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub evaluation_metadata: EvaluationMetadata,
    pub evaluation_summary: EvaluationSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationMetadata {
    /// Unix seconds
    pub timestamp: i64,
    pub model_name: String,
    #[serde(rename = "type")]
    pub type_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub overall_accuracy: AccuracyBucket,
    pub category_accuracies: Vec<CategoryAccuracy>,
    pub total_token_usage: TokenTotals,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccuracyBucket {
    /// Percentage, rounded to two decimals
    pub value: f64,
    pub correct_count: u64,
    pub total_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryAccuracy {
    pub category: String,
    pub value: f64,
    pub correct_count: u64,
    pub total_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenTotals {
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub total_reasoning_tokens: u64,
    /// CNY, rounded to four decimals
    pub total_cost: f64,
}

impl RunSummary {
    pub fn from_records(model: &str, type_label: &str, records: &[EvaluationRecord]) -> Self {
        let mut correct_count = 0u64;
        let mut totals = TokenTotals {
            total_prompt_tokens: 0,
            total_completion_tokens: 0,
            total_reasoning_tokens: 0,
            total_cost: 0.0,
        };
        let mut categories: BTreeMap<String, (u64, u64)> = BTreeMap::new();

        for record in records {
            let is_correct = record.is_correct();
            if is_correct {
                correct_count += 1;
            }
            totals.total_prompt_tokens += record.prompt_tokens;
            totals.total_completion_tokens += record.completion_tokens;
            totals.total_reasoning_tokens += record.reasoning_tokens;
            totals.total_cost += record.cost;

            let bucket = categories
                .entry(category_of(&record.problem_type))
                .or_default();
            bucket.1 += 1;
            if is_correct {
                bucket.0 += 1;
            }
        }

        let total_count = records.len() as u64;
        let overall = if total_count > 0 {
            correct_count as f64 / total_count as f64 * 100.0
        } else {
            0.0
        };
        totals.total_cost = round_to(totals.total_cost, 4);

        let category_accuracies = categories
            .into_iter()
            .map(|(category, (correct, total))| CategoryAccuracy {
                category,
                value: if total > 0 {
                    round_to(correct as f64 / total as f64 * 100.0, 2)
                } else {
                    0.0
                },
                correct_count: correct,
                total_count: total,
            })
            .collect();

        Self {
            evaluation_metadata: EvaluationMetadata {
                timestamp: Utc::now().timestamp(),
                model_name: model.to_string(),
                type_label: type_label.to_string(),
            },
            evaluation_summary: EvaluationSummary {
                overall_accuracy: AccuracyBucket {
                    value: round_to(overall, 2),
                    correct_count,
                    total_count,
                },
                category_accuracies,
                total_token_usage: totals,
            },
        }
    }
}

/// Category from a taxonomy path such as
/// `Mathematics -> Applied Mathematics -> Math Word Problems`: the second
/// segment with spaces dashed, or `Unknown`.
fn category_of(problem_type: &Value) -> String {
    let Value::Array(items) = problem_type else {
        return "Unknown".to_string();
    };
    for item in items {
        let Value::Object(map) = item else { continue };
        for paths in map.values() {
            let Some(first) = paths.as_array().and_then(|p| p.first()) else {
                continue;
            };
            let Some(path) = first.as_str() else { continue };
            let parts: Vec<&str> = path.split("->").map(str::trim).collect();
            if parts.len() >= 2 {
                return parts[1].replace(' ', "-");
            }
        }
    }
    "Unknown".to_string()
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
