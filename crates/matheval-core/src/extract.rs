//! Structured-answer extraction from free-text model output
//!
//! Model output is not guaranteed valid JSON, so extraction is regex-first
//! with a JSON fallback for the judge verdict. Parse failure on the judge
//! side is an explicit "undetermined" outcome, never "all false".

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::dataset::TaskMode;

static KEYED_ANSWER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""answer_(\d+)"\s*:\s*"([^"]*)""#).expect("valid regex"));

static SINGLE_ANSWER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""answer"\s*:\s*"([^"]*)""#).expect("valid regex"));

static CORRECTNESS_ARRAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""correctness"\s*:\s*\[([^\]]+)\]"#).expect("valid regex"));

static BOOL_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)true|false").expect("valid regex"));

static CORRECTNESS_OBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)\{[^{}]*"correctness"[^{}]*\}"#).expect("valid regex"));

/// Extract the answer sequence from canonical content.
///
/// Separated mode scans for `"answer_<N>": "<value>"` pairs anywhere in the
/// content and materializes the sequence `1..=max(N)`, filling skipped
/// numbers with empty strings. Synthesised mode scans for a single
/// `"answer": "<value>"` pair; absence yields `[""]`.
pub fn extract_answers(content: &str, mode: TaskMode) -> Vec<String> {
    match mode {
        TaskMode::Separated => {
            let mut keyed: BTreeMap<usize, String> = BTreeMap::new();
            for captures in KEYED_ANSWER_RE.captures_iter(content) {
                if let Ok(index) = captures[1].parse::<usize>() {
                    if index > 0 {
                        // a repeated key keeps the last occurrence
                        keyed.insert(index, captures[2].to_string());
                    }
                }
            }
            let Some(&max_index) = keyed.keys().next_back() else {
                return Vec::new();
            };
            (1..=max_index)
                .map(|i| keyed.get(&i).cloned().unwrap_or_default())
                .collect()
        }
        TaskMode::Synthesised => {
            let answer = SINGLE_ANSWER_RE
                .captures(content)
                .map(|c| c[1].to_string())
                .unwrap_or_default();
            vec![answer]
        }
    }
}

/// Whether an extracted answer sequence is worth judging: non-empty and not
/// a lone empty string.
pub fn is_usable(answers: &[String]) -> bool {
    !(answers.is_empty() || (answers.len() == 1 && answers[0].is_empty()))
}

/// Extract the judge's boolean verdict from its response content.
///
/// Primary strategy: regex capture of the `correctness: [...]` array body,
/// tokenizing `true`/`false` literals in order. Fallback: parse the smallest
/// JSON object substring containing the key. An empty return means the
/// verdict is undetermined.
pub fn extract_correctness(content: &str) -> Vec<bool> {
    if let Some(captures) = CORRECTNESS_ARRAY_RE.captures(content) {
        let verdict: Vec<bool> = BOOL_TOKEN_RE
            .find_iter(&captures[1])
            .map(|m| m.as_str().eq_ignore_ascii_case("true"))
            .collect();
        if !verdict.is_empty() {
            return verdict;
        }
    }

    if let Some(found) = CORRECTNESS_OBJECT_RE.find(content) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(found.as_str()) {
            if let Some(items) = value.get("correctness").and_then(|c| c.as_array()) {
                return items
                    .iter()
                    .map(|item| match item {
                        serde_json::Value::Bool(b) => *b,
                        serde_json::Value::Number(n) => n.as_i64().is_some_and(|v| v != 0),
                        _ => false,
                    })
                    .collect();
            }
        }
    }

    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separated_contiguous_answers_in_order() {
        let content = r#"
            Step-by-step reasoning here.
            {
                "reasoning": "...",
                "answer_1": "42",
                "answer_2": "Monday",
                "answer_3": "x^2 + 1"
            }
        "#;
        assert_eq!(
            extract_answers(content, TaskMode::Separated),
            vec!["42", "Monday", "x^2 + 1"]
        );
    }

    #[test]
    fn separated_gap_is_filled_with_empty_string() {
        let content = r#""answer_1": "v1" and later "answer_3": "v3""#;
        assert_eq!(
            extract_answers(content, TaskMode::Separated),
            vec!["v1", "", "v3"]
        );
    }

    #[test]
    fn separated_without_answers_is_empty() {
        let extracted = extract_answers("no structured block at all", TaskMode::Separated);
        assert!(extracted.is_empty());
        assert!(!is_usable(&extracted));
    }

    #[test]
    fn separated_scan_is_position_agnostic() {
        let content = "\"answer_1\": \"early\"\nlots of trailing prose afterwards";
        assert_eq!(extract_answers(content, TaskMode::Separated), vec!["early"]);
    }

    #[test]
    fn synthesised_answer_present() {
        let content = r#"{"reasoning": "...", "answer": "Monday"}"#;
        let extracted = extract_answers(content, TaskMode::Synthesised);
        assert_eq!(extracted, vec!["Monday"]);
        assert!(is_usable(&extracted));
    }

    #[test]
    fn synthesised_answer_absent_is_single_empty_and_unusable() {
        let extracted = extract_answers("no keyed block", TaskMode::Synthesised);
        assert_eq!(extracted, vec![""]);
        assert!(!is_usable(&extracted));
    }

    #[test]
    fn usable_allows_partially_empty_sequences() {
        let answers = vec!["".to_string(), "7".to_string()];
        assert!(is_usable(&answers));
    }

    #[test]
    fn correctness_regex_primary_path() {
        let content = r#"Analysis... {"correctness": [true, false, TRUE]}"#;
        assert_eq!(extract_correctness(content), vec![true, false, true]);
    }

    #[test]
    fn correctness_json_fallback() {
        // the array body regex requires literals; numbers go through the
        // JSON fallback
        let content = r#"verdict {"correctness": [1, 0]} end"#;
        assert_eq!(extract_correctness(content), vec![true, false]);
    }

    #[test]
    fn correctness_unparsable_is_undetermined() {
        assert!(extract_correctness("no verdict here").is_empty());
        assert!(extract_correctness(r#""correctness": "yes""#).is_empty());
    }
}
