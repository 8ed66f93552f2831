//! Prompt construction for the solve and judge calls
//!
//! The structured-answer contract lives here: solve prompts require the
//! trailing JSON block the extractor scans for, and the judge prompt encodes
//! the equivalence rules the verdict must apply.

use crate::dataset::{TaskMode, WorkUnit};
use crate::error::{EvalError, EvalResult};
use crate::llm::messages::LlmMessage;

const SOLVER_SYSTEM: &str = "You are an expert in Mathematical Problem Solving. \
Your task is to solve mathematical problems step by step and provide accurate answers.";

const JUDGE_SYSTEM: &str = "You are an expert in Mathematical Problem Evaluation. \
Your task is to carefully compare the given answers with the correct answers and \
determine if they are equivalent.";

/// Solve prompt for separated mode: enumerated sub-problems, keyed answers
pub fn separated_solve_prompt(parts: &[String]) -> Vec<LlmMessage> {
    let mut problems = String::new();
    for (index, part) in parts.iter().enumerate() {
        problems.push_str(&format!("Problem {}: {}\n", index + 1, part));
    }

    let user = format!(
        r#"Please solve the following problems step by step. After your reasoning, provide your final answers in the exact JSON format specified below.

{problems}

IMPORTANT: After completing your step-by-step reasoning, you MUST provide your final answers in the following JSON format (no additional text before or after the JSON):

{{
    "reasoning": "...",
    "answer_1": "your answer to Problem 1",
    "answer_2": "your answer to Problem 2",
    ...
}}

Rules for the final answer:
1. The JSON must be valid and properly formatted
2. Put ONLY the answer value in the quotes (no explanations, no units unless part of the answer, no LaTeX formatting)
3. For numerical answers, provide the exact value
4. For text answers, provide the exact text
5. Do not include any reasoning or explanation inside the answer fields
6. The JSON block should be the last part of your response

Example format:
{{
    "reasoning": "...",
    "answer_1": "42",
    "answer_2": "Monday"
}}"#
    );

    vec![LlmMessage::system(SOLVER_SYSTEM), LlmMessage::user(user)]
}

/// Solve prompt for synthesised mode: one composite problem, one answer
pub fn synthesised_solve_prompt(problem: &str) -> Vec<LlmMessage> {
    let user = format!(
        r#"Please solve the following problem step by step. After your reasoning, provide your final answer in the exact JSON format specified below.

Problem: {problem}

IMPORTANT: After completing your step-by-step reasoning, you MUST provide your final answer in the following JSON format (no additional text before or after the JSON):

{{
    "reasoning": "...",
    "answer": "your final answer"
}}

Rules for the final answer:
1. The JSON must be valid and properly formatted
2. Put ONLY the answer value in the quotes (no explanations, no units unless part of the answer, no LaTeX formatting)
3. For numerical answers, provide the exact value
4. For text answers, provide the exact text
5. Do not include any reasoning or explanation inside the answer field
6. The JSON block should be the last part of your response
7. Do not include intermediate answers in the final answer. Only provide the final answer.

Example format:
{{
    "reasoning": "...",
    "answer": "42"
}}

or

{{
    "reasoning": "...",
    "answer": "Monday"
}}"#
    );

    vec![LlmMessage::system(SOLVER_SYSTEM), LlmMessage::user(user)]
}

/// Build the solve messages for a work unit according to its task mode
pub fn solve_messages(unit: &WorkUnit) -> EvalResult<Vec<LlmMessage>> {
    match unit.task.mode {
        TaskMode::Separated => {
            let parts = unit.record.parts_in_order();
            if parts.is_empty() {
                return Err(EvalError::dataset(format!(
                    "problem {} has no sub-problems for separated mode",
                    unit.problem_id
                )));
            }
            Ok(separated_solve_prompt(&parts))
        }
        TaskMode::Synthesised => {
            if unit.record.math_problem.is_empty() {
                return Err(EvalError::dataset(format!(
                    "problem {} has no composite statement for synthesised mode",
                    unit.problem_id
                )));
            }
            Ok(synthesised_solve_prompt(&unit.record.math_problem))
        }
    }
}

/// Judge prompt comparing each (answer, truth) pair in input order
pub fn judge_prompt(answers: &[String], truths: &[String]) -> Vec<LlmMessage> {
    let combination: Vec<serde_json::Value> = answers
        .iter()
        .zip(truths.iter())
        .map(|(answer, truth)| serde_json::json!({"answer": answer, "truth": truth}))
        .collect();
    let combination = serde_json::Value::Array(combination).to_string();

    let user = format!(
        r#"Please compare the following answers with the correct answers and determine if each answer is correct (equivalent).

{combination}

Rules for judgment:
1. The JSON must be valid and properly formatted
2. Compare each answer pair carefully - they should be considered correct if they are mathematically or logically equivalent
3. Ignore minor formatting differences (spaces, capitalization, etc.) unless they affect the meaning
4. For numerical answers, consider them equivalent if they represent the same value (e.g., "42" and "42.0" are equivalent)
5. For text answers, consider them equivalent if they convey the same meaning
6. Return true only if the answers are truly equivalent, false otherwise
7. The correctness list should have the same length as the number of answer pairs
8. The JSON block should be the last part of your response
9. Compare the answers and truths in the order of the combination list and return the correctness list in the same order
10. Be very careful when you judge the correctness, as there are many ways to express an answer; consider all possible equivalent expressions.

Special Cases:
1. Some answers may include units and some may not. For example, "7200" is equivalent to "7200\mathrm{{MB}}", "60" is equivalent to "60 \%" and so on.
2. Be careful with the unit sign "%": the ground truth "18%" may be expressed as "18" without the "%" or in other equivalent forms, 18%=0.18=18:100=18/100=9/50, any of which should be judged as "true".
3. Only pay attention to the key part of the answer; as long as the key part is equivalent, the answer is correct. For example, "2019, 1010" is equivalent to "(j,k) = (2019, 1010)".
4. If an answer is only approximately equal to the ground truth, for example "3/4" versus "\frac{{3-3^{{-999}}}}{{4}}", it must be judged as false.

IMPORTANT: After your analysis, you MUST provide your judgment in the following JSON format (no additional text before or after the JSON):

{{
    "correctness": [true/false for Answer 1, true/false for Answer 2, ...]
}}

Example format (for 1 answer):
{{
    "correctness": [true]
}}

or (for 2 answers):
{{
    "correctness": [true, false]
}}"#
    );

    vec![LlmMessage::system(JUDGE_SYSTEM), LlmMessage::user(user)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{ProblemRecord, parse_task};

    #[test]
    fn separated_prompt_enumerates_parts() {
        let parts = vec!["first problem".to_string(), "second problem".to_string()];
        let messages = separated_solve_prompt(&parts);
        assert_eq!(messages.len(), 2);
        assert!(messages[1].content.contains("Problem 1: first problem"));
        assert!(messages[1].content.contains("Problem 2: second problem"));
        assert!(messages[1].content.contains("\"answer_1\""));
    }

    #[test]
    fn synthesised_prompt_embeds_problem() {
        let messages = synthesised_solve_prompt("What day is it?");
        assert!(messages[1].content.contains("Problem: What day is it?"));
        assert!(messages[1].content.contains("\"answer\""));
    }

    #[test]
    fn judge_prompt_pairs_in_order() {
        let answers = vec!["42".to_string(), "blue".to_string()];
        let truths = vec!["42.0".to_string(), "red".to_string()];
        let messages = judge_prompt(&answers, &truths);
        let user = &messages[1].content;
        let first = user.find("42").expect("first answer present");
        let second = user.find("blue").expect("second answer present");
        assert!(first < second);
        assert!(user.contains("\"truth\":\"42.0\""));
        assert!(user.contains("\"correctness\""));
    }

    #[test]
    fn solve_messages_require_payload() {
        let record: ProblemRecord =
            serde_json::from_value(serde_json::json!({"Problem_ID": 9})).unwrap();
        let task = parse_task("MP2_Synthesised").unwrap();
        let unit = WorkUnit::new(record, task);
        assert!(solve_messages(&unit).is_err());
    }
}
