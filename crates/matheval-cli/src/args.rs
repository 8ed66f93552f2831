//! CLI argument definitions using clap

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "matheval")]
#[command(about = "Evaluate LLM answers on multi-part math benchmarks")]
#[command(
    long_about = r#"Evaluate LLM answers on multi-part math benchmarks.

USAGE:
  matheval <model> <reasoning> <level> <class_name> <task> <data_dir> <output_dir>

EXAMPLES:
  matheval gpt-5 medium L5 MP2 MP2_Seperated data/mp2 out/gpt5-mp2
  matheval qwen-plus high L5 MP3 MP3_Synthesised data/mp3 out/qwen-mp3 --ids 12,15 --summary

Each problem writes <problem_id>.json under the output directory; finished
problems are skipped on restart. --summary additionally aggregates all
records into summary.json."#
)]
#[command(version)]
pub struct Cli {
    /// Model under evaluation, e.g. gpt-5
    pub model: String,

    /// Reasoning effort: minimal, low, medium or high
    pub reasoning: String,

    /// Difficulty level tag used in the output type string, e.g. L5
    pub level: String,

    /// Problem-class name used in the output type string, e.g. MP2
    pub class_name: String,

    /// Task string, e.g. MP2_Seperated or MP3_Synthesised
    pub task: String,

    /// Directory of per-problem dataset files (<problem_id>.json)
    pub data_dir: PathBuf,

    /// Directory for per-problem result records
    pub output_dir: PathBuf,

    /// Sampling seed forwarded to both the solver and the judge
    #[arg(long)]
    pub seed: Option<u64>,

    /// Restrict the run to these problem ids
    #[arg(long, value_delimiter = ',')]
    pub ids: Vec<u64>,

    /// Maximum problems in flight at once
    #[arg(long, default_value_t = 5)]
    pub concurrency: usize,

    /// Model registry TOML; built-in defaults when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Stream solver completions instead of waiting for the full body
    #[arg(long)]
    pub stream: bool,

    /// Write summary.json aggregating every record in the output directory
    #[arg(long)]
    pub summary: bool,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,
}
