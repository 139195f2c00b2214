//! # Assistente Padrão
//!
//! Pontuação exata: suporte, corpo padrão e corpo PCA contados até o fim.

use crate::core::{Rule, Scores};
use crate::store::StoreResult;

use super::{operators, scoring, Approximation, AssistantContext, MiningAssistant, Verdict};

pub struct StandardAssistant {
    context: AssistantContext,
}

impl StandardAssistant {
    pub fn new(context: AssistantContext) -> Self {
        Self { context }
    }
}

impl MiningAssistant for StandardAssistant {
    fn name(&self) -> &'static str {
        "standard"
    }

    fn context(&self) -> &AssistantContext {
        &self.context
    }

    fn seed_atoms(&self, min_support: u64) -> Vec<Rule> {
        operators::seed_atoms(&self.context.store, &self.context.bias, min_support)
    }

    fn dangling(&self, rule: &Rule, threshold: u64) -> StoreResult<Vec<Rule>> {
        operators::dangling(&self.context.store, &self.context.bias, rule, threshold)
    }

    fn closing(&self, rule: &Rule, threshold: u64) -> StoreResult<Vec<Rule>> {
        operators::closing(&self.context.store, &self.context.bias, rule, threshold)
    }

    fn instantiated(&self, rule: &Rule, threshold: u64) -> StoreResult<Vec<Rule>> {
        operators::instantiated(&self.context.store, &self.context.bias, rule, threshold)
    }

    fn prefilter(&self, rule: &Rule) -> StoreResult<Verdict> {
        self.context.prefilter(rule)
    }

    fn score_annotated(&self, rule: &Rule, approximation: Approximation) -> StoreResult<Scores> {
        if let Some(scores) = rule.scores() {
            return Ok(scores.clone());
        }
        let ctx = &self.context;
        let mut scores = ctx.timed(rule, || {
            scoring::exact_scores(&ctx.store, &ctx.bias, &ctx.registry, rule, approximation.denominators)
        })?;
        approximation.annotate(&mut scores);
        Ok(rule.record_scores(scores).clone())
    }

    fn passes_thresholds(&self, rule: &Rule) -> StoreResult<bool> {
        let scores = self.score(rule)?;
        self.context.acceptance(rule, &scores)
    }

    fn is_perfect(&self, rule: &Rule) -> bool {
        self.context.is_perfect(rule)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::{Atom, Term};
    use crate::inference::bias::{LanguageBias, PruningMetric};
    use crate::metrics::RunMetrics;
    use crate::store::FactStore;

    /// `r` prevê `h` em 3 de 5 sujeitos; `s` só em 1 de 2.
    fn skyline_store() -> FactStore {
        FactStore::from_triples([
            ("a1", "r", "b1"),
            ("a2", "r", "b2"),
            ("a3", "r", "b3"),
            ("a4", "r", "b4"),
            ("a5", "r", "b5"),
            ("a1", "h", "b1"),
            ("a2", "h", "b2"),
            ("a3", "h", "b3"),
            ("a4", "h", "c4"),
            ("a5", "h", "c5"),
            ("a1", "s", "b1"),
            ("a4", "s", "b4"),
        ])
    }

    fn assistant(store: FactStore, bias: LanguageBias) -> StandardAssistant {
        let context = AssistantContext::new(Arc::new(store), bias, Arc::new(RunMetrics::new()));
        StandardAssistant::new(context)
    }

    fn bias() -> LanguageBias {
        LanguageBias {
            pruning: PruningMetric::Support(1),
            min_pca_confidence: 0.1,
            ..LanguageBias::default()
        }
    }

    fn rule_of(store: &FactStore, head: &str, body: &[&str]) -> Rule {
        let v = Term::Var;
        let mut atoms = vec![Atom::new(v(0), store.lookup(head).unwrap(), v(1))];
        for rel in body {
            atoms.push(Atom::new(v(0), store.lookup(rel).unwrap(), v(1)));
        }
        Rule::new(atoms, v(0))
    }

    #[test]
    fn skyline_rejects_a_specialization_that_does_not_improve() {
        let store = skyline_store();
        let parent = rule_of(&store, "h", &["r"]);
        let child = rule_of(&store, "h", &["r", "s"]);
        let assistant = assistant(store, bias());

        let parent_scores = assistant.score(&parent).unwrap();
        assert!((parent_scores.pca_confidence - 0.6).abs() < 1e-9);
        assert!(assistant.passes_thresholds(&parent).unwrap());

        let child_scores = assistant.score(&child).unwrap();
        assert!((child_scores.pca_confidence - 0.5).abs() < 1e-9);
        assert!(child_scores.pca_confidence >= assistant.context().bias.min_pca_confidence);
        assert!(!assistant.passes_thresholds(&child).unwrap());
    }

    #[test]
    fn skyline_can_be_disabled() {
        let store = skyline_store();
        let child = rule_of(&store, "h", &["r", "s"]);
        let mut no_skyline = bias();
        no_skyline.optimizations.skyline = false;
        let assistant = assistant(store, no_skyline);
        assert!(assistant.passes_thresholds(&child).unwrap());
    }

    #[test]
    fn minimum_confidence_is_enforced() {
        let store = skyline_store();
        let parent = rule_of(&store, "h", &["r"]);
        let strict = LanguageBias {
            min_pca_confidence: 0.7,
            ..bias()
        };
        let assistant = assistant(store, strict);
        assert!(!assistant.passes_thresholds(&parent).unwrap());
    }

    #[test]
    fn refinement_never_increases_support() {
        let store = skyline_store();
        let assistant = assistant(store, bias());
        for seed in assistant.seed_atoms(0) {
            let parent_support = seed.support().unwrap();
            for child in assistant.refine(&seed).unwrap() {
                let child_support = scoring::support(&assistant.context().store, &child).unwrap();
                assert!(child_support <= parent_support);
                let recounted = assistant
                    .context()
                    .store
                    .count_distinct(child.functional(), child.atoms())
                    .unwrap();
                assert_eq!(recounted, child_support);
            }
        }
    }

    #[test]
    fn scored_rules_have_pca_at_least_standard() {
        let store = skyline_store();
        let assistant = assistant(store, bias());
        for seed in assistant.seed_atoms(0) {
            for child in assistant.refine(&seed).unwrap() {
                if !child.is_closed() {
                    continue;
                }
                let scores = assistant.score(&child).unwrap();
                assert!(scores.pca_body_size <= scores.body_size);
                assert!(scores.pca_confidence >= scores.std_confidence);
            }
        }
    }

    #[test]
    fn perfect_rules_are_flagged() {
        let store = FactStore::from_triples([("a", "p", "b"), ("a", "q", "b"), ("c", "p", "d"), ("c", "q", "d")]);
        let rule = rule_of(&store, "p", &["q"]);
        let assistant = assistant(store, bias());
        assistant.score(&rule).unwrap();
        assert!(assistant.is_perfect(&rule));
    }
}
