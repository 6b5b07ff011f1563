//! Context Assembler - Greedy, budget-bounded fragment selection
//!
//! Provides:
//! - Similarity floor filtering
//! - Budget accounting in characters or estimated tokens
//! - Skip-not-truncate packing in descending similarity

use crate::config::RetrievalConfig;
use crate::models::{DocumentFragment, QueryResult, SourceCitation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Unit the context budget is measured in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetUnit {
    #[default]
    Characters,
    /// Estimated as ceil(chars / 4)
    Tokens,
}

impl BudgetUnit {
    /// Cost of a text in this unit
    pub fn cost(self, text: &str) -> usize {
        let chars = text.chars().count();
        match self {
            BudgetUnit::Characters => chars,
            BudgetUnit::Tokens => chars.div_ceil(4),
        }
    }
}

/// Assembler configuration
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Hits scoring below this are never included
    pub similarity_floor: f32,

    /// Default budget when none is passed explicitly
    pub budget: usize,

    pub unit: BudgetUnit,

    /// Optional cap on the number of included fragments
    pub max_fragments: Option<usize>,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            similarity_floor: 0.35,
            budget: 6000,
            unit: BudgetUnit::Characters,
            max_fragments: Some(5),
        }
    }
}

impl From<&RetrievalConfig> for AssemblerConfig {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            similarity_floor: config.similarity_floor,
            budget: config.context_budget,
            unit: config.budget_unit,
            max_fragments: config.max_fragments,
        }
    }
}

/// One fragment selected for the prompt
#[derive(Debug, Clone)]
pub struct ContextEntry {
    pub fragment: Arc<DocumentFragment>,
    pub score: f32,
    /// Budget consumed by this entry
    pub cost: usize,
}

/// Ordered fragments selected for a prompt, plus the budget they consumed
#[derive(Debug, Clone)]
pub struct PromptContext {
    entries: Vec<ContextEntry>,
    budget: usize,
    used: usize,
    unit: BudgetUnit,
}

impl PromptContext {
    /// A context with no fragments
    pub fn empty(budget: usize, unit: BudgetUnit) -> Self {
        Self {
            entries: Vec::new(),
            budget,
            used: 0,
            unit,
        }
    }

    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn remaining(&self) -> usize {
        self.budget - self.used
    }

    pub fn unit(&self) -> BudgetUnit {
        self.unit
    }

    /// Best included similarity, 0 when empty
    pub fn top_score(&self) -> f32 {
        self.entries.iter().map(|e| e.score).fold(0.0, f32::max)
    }

    /// Entry referenced by a 1-based `[n]` marker
    pub fn by_marker(&self, marker: usize) -> Option<&ContextEntry> {
        marker.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    /// All included fragments as citations, in prompt order
    pub fn sources(&self) -> Vec<SourceCitation> {
        self.entries
            .iter()
            .map(|e| SourceCitation::from_fragment(&e.fragment, e.score))
            .collect()
    }
}

/// Greedy context assembler
pub struct ContextAssembler {
    config: AssemblerConfig,
}

impl ContextAssembler {
    pub fn new(config: AssemblerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Assemble with the configured budget
    pub fn assemble(&self, results: &[QueryResult]) -> PromptContext {
        self.build(results, self.config.budget)
    }

    /// Select fragments in descending similarity while they fit `budget`.
    ///
    /// A fragment that does not fit is skipped, never truncated, and later
    /// (smaller) fragments may still be taken.
    pub fn build(&self, results: &[QueryResult], budget: usize) -> PromptContext {
        let mut ranked: Vec<&QueryResult> = results
            .iter()
            .filter(|r| r.score >= self.config.similarity_floor)
            .collect();
        // Stable, so equal scores keep retrieval order
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

        let max_fragments = self.config.max_fragments.unwrap_or(usize::MAX);
        let mut context = PromptContext::empty(budget, self.config.unit);

        for result in ranked {
            if context.entries.len() >= max_fragments {
                break;
            }

            let cost = self.config.unit.cost(&result.fragment.text);
            if cost > context.remaining() {
                tracing::debug!(
                    fragment_id = %result.fragment.id,
                    cost = cost,
                    remaining = context.remaining(),
                    "Fragment skipped, over budget"
                );
                continue;
            }

            context.used += cost;
            context.entries.push(ContextEntry {
                fragment: Arc::clone(&result.fragment),
                score: result.score,
                cost,
            });
        }

        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn hit(title: &str, text: &str, score: f32) -> QueryResult {
        QueryResult {
            fragment: Arc::new(DocumentFragment::new(title, format!("https://kenyalaw.org/{}", title), "kenya", text)),
            score,
        }
    }

    fn assembler(floor: f32, unit: BudgetUnit, max_fragments: Option<usize>) -> ContextAssembler {
        ContextAssembler::new(AssemblerConfig {
            similarity_floor: floor,
            budget: 100,
            unit,
            max_fragments,
        })
    }

    #[test]
    fn test_budget_unit_cost() {
        assert_eq!(BudgetUnit::Characters.cost("abcde"), 5);
        assert_eq!(BudgetUnit::Tokens.cost("abcde"), 2);
        assert_eq!(BudgetUnit::Tokens.cost("abcd"), 1);
        assert_eq!(BudgetUnit::Tokens.cost(""), 0);
        assert_eq!(BudgetUnit::Characters.cost("ñandú"), 5);
    }

    #[test]
    fn test_empty_results_yield_empty_context() {
        let ctx = assembler(0.0, BudgetUnit::Characters, None).build(&[], 100);
        assert!(ctx.is_empty());
        assert_eq!(ctx.used(), 0);
        assert_eq!(ctx.top_score(), 0.0);
    }

    #[test]
    fn test_floor_excludes_low_scores() {
        let results = vec![hit("a", "aaaa", 0.9), hit("b", "bbbb", 0.49), hit("c", "cccc", 0.5)];
        let ctx = assembler(0.5, BudgetUnit::Characters, None).build(&results, 100);

        let titles: Vec<&str> = ctx.entries().iter().map(|e| e.fragment.source_title.as_str()).collect();
        assert_eq!(titles, vec!["a", "c"]);
    }

    #[test]
    fn test_skips_rather_than_truncates() {
        let results = vec![
            hit("big", &"x".repeat(60), 0.9),
            hit("huge", &"y".repeat(50), 0.8),
            hit("small", &"z".repeat(30), 0.7),
        ];
        let ctx = assembler(0.0, BudgetUnit::Characters, None).build(&results, 100);

        let titles: Vec<&str> = ctx.entries().iter().map(|e| e.fragment.source_title.as_str()).collect();
        assert_eq!(titles, vec!["big", "small"]);
        assert_eq!(ctx.used(), 90);
        for entry in ctx.entries() {
            assert_eq!(entry.cost, entry.fragment.text.chars().count());
        }
    }

    #[test]
    fn test_max_fragments_cap() {
        let results: Vec<QueryResult> = (0..8).map(|i| hit(&format!("f{}", i), "short", 0.9)).collect();
        let ctx = assembler(0.0, BudgetUnit::Characters, Some(5)).build(&results, 1000);
        assert_eq!(ctx.len(), 5);
    }

    #[test]
    fn test_orders_by_descending_similarity() {
        let results = vec![hit("low", "l", 0.6), hit("high", "h", 0.95), hit("mid", "m", 0.8)];
        let ctx = assembler(0.0, BudgetUnit::Characters, None).build(&results, 100);

        let titles: Vec<&str> = ctx.entries().iter().map(|e| e.fragment.source_title.as_str()).collect();
        assert_eq!(titles, vec!["high", "mid", "low"]);
        assert_eq!(ctx.top_score(), 0.95);
        assert_eq!(ctx.by_marker(1).map(|e| e.score), Some(0.95));
        assert!(ctx.by_marker(0).is_none());
        assert!(ctx.by_marker(4).is_none());
    }

    #[test]
    fn test_budget_never_exceeded_randomised() {
        let mut rng = StdRng::seed_from_u64(42);

        for unit in [BudgetUnit::Characters, BudgetUnit::Tokens] {
            for _ in 0..200 {
                let n = rng.gen_range(0..20);
                let results: Vec<QueryResult> = (0..n)
                    .map(|i| {
                        let len = rng.gen_range(1..400);
                        hit(&format!("f{}", i), &"w".repeat(len), rng.gen_range(0.0..1.0))
                    })
                    .collect();
                let budget = rng.gen_range(0..1500);
                let floor = rng.gen_range(0.0..0.6);

                let ctx = assembler(floor, unit, None).build(&results, budget);

                let total: usize = ctx.entries().iter().map(|e| unit.cost(&e.fragment.text)).sum();
                assert_eq!(total, ctx.used());
                assert!(ctx.used() <= budget);
                assert!(ctx.entries().iter().all(|e| e.score >= floor));
                for pair in ctx.entries().windows(2) {
                    assert!(pair[0].score >= pair[1].score);
                }
            }
        }
    }

    #[test]
    fn test_tokens_fit_more_than_characters() {
        let results = vec![hit("a", &"a".repeat(80), 0.9), hit("b", &"b".repeat(80), 0.8)];

        let chars = assembler(0.0, BudgetUnit::Characters, None).build(&results, 100);
        let tokens = assembler(0.0, BudgetUnit::Tokens, None).build(&results, 100);

        assert_eq!(chars.len(), 1);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens.used(), 40);
    }
}
