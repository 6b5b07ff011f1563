//! Context assembly
//!
//! Turns ranked retrieval hits into the bounded, ordered context a model
//! sees, and renders the prompts for every model-backed task.

mod assembler;
mod prompt;

pub use assembler::{AssemblerConfig, BudgetUnit, ContextAssembler, ContextEntry, PromptContext};
pub use prompt::{
    render_analysis_prompt, render_drafting_prompt, render_prompt, render_summary_prompt, ANALYSIS_EXCERPT_CHARS,
};
