//! Per-model token pricing and cost computation

use serde::{Deserialize, Serialize};

/// Price of a model in ¥ per one million tokens
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    /// Input (prompt) price, ¥ / 1M tokens
    pub input_per_million: f64,
    /// Output (completion) price, ¥ / 1M tokens
    pub output_per_million: f64,
}

impl ModelPrice {
    pub fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }
}

/// Compute the monetary cost (¥) of one call.
///
/// Reasoning tokens are reported separately on the wire but are already
/// included in the completion count, so they are not billed on their own.
/// A model without a price entry costs 0.
pub fn compute_cost(price: Option<&ModelPrice>, prompt_tokens: u64, completion_tokens: u64) -> f64 {
    let Some(price) = price else {
        return 0.0;
    };
    (prompt_tokens as f64 / 1_000_000.0) * price.input_per_million
        + (completion_tokens as f64 / 1_000_000.0) * price.output_per_million
}
