//! # Assistente Preguiçoso
//!
//! Mesmos operadores e mesmo teste de aceitação do [`StandardAssistant`],
//! mas a contagem do corpo PCA para assim que o denominador passa de
//! `suporte ÷ confiança mínima`. Regras truncadas são sempre rejeitadas.
//!
//! [`StandardAssistant`]: super::StandardAssistant

use crate::core::{Rule, Scores};
use crate::store::StoreResult;

use super::{operators, scoring, Approximation, AssistantContext, MiningAssistant, Verdict};

pub struct LazyAssistant {
    context: AssistantContext,
}

impl LazyAssistant {
    pub fn new(context: AssistantContext) -> Self {
        Self { context }
    }
}

impl MiningAssistant for LazyAssistant {
    fn name(&self) -> &'static str {
        "lazy"
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
            scoring::lazy_scores(&ctx.store, &ctx.bias, &ctx.registry, rule, approximation.denominators)
        })?;
        approximation.annotate(&mut scores);
        if scores.truncated {
            tracing::debug!(
                rule = %rule.display(ctx.store.interner()),
                "Contagem PCA interrompida"
            );
        }
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
    use crate::inference::StandardAssistant;
    use crate::metrics::RunMetrics;
    use crate::store::FactStore;

    fn store() -> FactStore {
        FactStore::from_triples([
            ("ann", "livesIn", "paris"),
            ("bob", "livesIn", "paris"),
            ("carl", "livesIn", "rome"),
            ("dave", "livesIn", "rome"),
            ("ann", "citizenOf", "paris"),
            ("bob", "citizenOf", "lyon"),
            ("carl", "citizenOf", "rome"),
        ])
    }

    fn context(store: FactStore, min_pca: f64) -> AssistantContext {
        let bias = LanguageBias {
            pruning: PruningMetric::Support(1),
            min_pca_confidence: min_pca,
            ..LanguageBias::default()
        };
        AssistantContext::new(Arc::new(store), bias, Arc::new(RunMetrics::new()))
    }

    fn citizen_from_residence(store: &FactStore) -> Rule {
        let v = Term::Var;
        Rule::new(
            vec![
                Atom::new(v(0), store.lookup("citizenOf").unwrap(), v(1)),
                Atom::new(v(0), store.lookup("livesIn").unwrap(), v(1)),
            ],
            v(0),
        )
    }

    #[test]
    fn truncated_rules_are_rejected() {
        let store = store();
        let rule = citizen_from_residence(&store);
        let lazy = LazyAssistant::new(context(store, 0.9));
        let scores = lazy.score(&rule).unwrap();
        assert!(scores.truncated);
        assert!(!lazy.passes_thresholds(&rule).unwrap());
    }

    #[test]
    fn agrees_with_standard_when_above_threshold() {
        let (lazy_store, std_store) = (store(), store());
        let rule_lazy = citizen_from_residence(&lazy_store);
        let rule_std = citizen_from_residence(&std_store);
        let lazy = LazyAssistant::new(context(lazy_store, 0.5));
        let standard = StandardAssistant::new(context(std_store, 0.5));
        let a = lazy.score(&rule_lazy).unwrap();
        let b = standard.score(&rule_std).unwrap();
        assert_eq!(a.support, b.support);
        assert_eq!(a.body_size, b.body_size);
        assert_eq!(a.pca_body_size, b.pca_body_size);
        assert_eq!(
            lazy.passes_thresholds(&rule_lazy).unwrap(),
            standard.passes_thresholds(&rule_std).unwrap()
        );
    }

    #[test]
    fn scores_are_cached_on_the_rule() {
        let store = store();
        let rule = citizen_from_residence(&store);
        let lazy = LazyAssistant::new(context(store, 0.5));
        let first = lazy.score(&rule).unwrap();
        assert_eq!(rule.scores(), Some(&first));
        assert_eq!(lazy.score(&rule).unwrap(), first);
    }
}
