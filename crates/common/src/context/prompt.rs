//! Prompt rendering for the Counsel legal assistant

use super::assembler::PromptContext;
use crate::errors::Result;
use crate::models::DocumentKind;
use serde_json::{Map, Value};
use std::fmt::Write;

/// Characters of a document shown to the model for analysis
pub const ANALYSIS_EXCERPT_CHARS: usize = 2000;

const ASSISTANT_PREAMBLE: &str = "You are Counsel, a specialized AI legal assistant for Kenyan jurisdiction.";

/// Render the model prompt with numbered sources `[1]..[n]` in context order
pub fn render_prompt(query: &str, context: &PromptContext) -> String {
    let mut prompt = String::from(ASSISTANT_PREAMBLE);
    prompt.push_str(
        " Answer the query using ONLY the legal context below. \
        Cite every source you rely on by its bracketed marker, such as [1]. \
        If the context does not cover the query, say so plainly rather than guessing.\n\n",
    );

    let _ = writeln!(prompt, "User Query: {}\n", query.trim());

    if context.is_empty() {
        prompt.push_str("Relevant Legal Context:\n(no relevant sources were found)\n");
    } else {
        prompt.push_str("Relevant Legal Context:\n");
        for (i, entry) in context.entries().iter().enumerate() {
            let fragment = &entry.fragment;
            let _ = writeln!(
                prompt,
                "\n[{}] {} ({}) - {}\n{}",
                i + 1,
                fragment.source_title,
                fragment.jurisdiction,
                fragment.source_url,
                fragment.text
            );
        }
    }

    prompt.push_str(
        "\nPlease provide:\n\
        1. A direct answer to the query\n\
        2. The relevant laws and regulations\n\
        3. Case law precedents, if the context contains any\n\
        4. Practical next steps\n\
        \nAnswer:",
    );
    prompt
}

/// Summary of `text`: issues, applicable law, implications and next steps.
/// `context` names the body of law to read it against, e.g. "kenyan_law".
pub fn render_summary_prompt(text: &str, context: &str) -> String {
    let mut prompt = String::from(ASSISTANT_PREAMBLE);
    prompt.push_str(" Generate a comprehensive legal summary of the following text.\n\n");

    let _ = writeln!(prompt, "Context: {}", context.trim());
    let _ = writeln!(prompt, "Text:\n{}", text.trim());

    prompt.push_str(
        "\nPlease provide:\n\
        1. Key legal issues identified\n\
        2. Relevant Kenyan laws and precedents\n\
        3. Legal implications\n\
        4. Recommended actions\n\
        \nSummary:",
    );
    prompt
}

/// Analysis of a legal document, shown to the model as a bounded excerpt
pub fn render_analysis_prompt(content: &str) -> String {
    let content = content.trim();
    let mut excerpt: String = content.chars().take(ANALYSIS_EXCERPT_CHARS).collect();
    if excerpt.len() < content.len() {
        excerpt.push_str("...");
    }

    let mut prompt = String::from(ASSISTANT_PREAMBLE);
    prompt.push_str(" Analyze the following legal document.\n\n");
    let _ = writeln!(prompt, "Document:\n{}", excerpt);

    prompt.push_str(
        "\nProvide analysis including:\n\
        1. Document type and purpose\n\
        2. Key legal concepts identified\n\
        3. Relevant areas of law\n\
        4. Potential legal issues\n\
        5. Suggested keywords for indexing\n\
        \nAnalysis:",
    );
    prompt
}

/// Drafting instructions for `kind`, with the caller's parameters as JSON
pub fn render_drafting_prompt(kind: DocumentKind, parameters: &Map<String, Value>) -> Result<String> {
    let parameters = serde_json::to_string_pretty(parameters)?;

    let mut prompt = String::from(ASSISTANT_PREAMBLE);
    let _ = writeln!(
        prompt,
        " Generate a {} document for Kenyan jurisdiction with the following parameters:\n{}",
        kind.label(),
        parameters
    );

    prompt.push_str(
        "\nEnsure the document:\n\
        1. Complies with Kenyan law\n\
        2. Includes all necessary legal clauses\n\
        3. Uses appropriate legal language\n\
        4. Has proper formatting\n\
        5. Includes relevant statutory references\n\
        \nDocument:",
    );
    Ok(prompt)
}
