//! # Módulo Inference — Assistente de Refinamento e Pontuação
//!
//! O assistente é a ponte entre o orquestrador e a base de fatos: gera os
//! refinamentos de uma regra, pontua regras fechadas e decide a aceitação.
//!
//! ## Estratégias
//!
//! As estratégias são implementações alternativas do trait
//! [`MiningAssistant`], escolhidas por configuração ([`AssistantKind`]).
//! Nenhuma herda da outra: ambas compõem o mesmo [`AssistantContext`] e as
//! funções livres de [`operators`] e [`scoring`].
//!
//! | Estratégia | Pontuação |
//! |------------|-----------|
//! | [`StandardAssistant`] | exata, todos os denominadores |
//! | [`LazyAssistant`] | PCA com parada antecipada, padrão só se passar |
//!
//! ## Fluxo por Candidato
//!
//! ```text
//! regra fechada?
//!   ├── prefilter()         limite superior → estimativa (só descartam)
//!   ├── score()             suporte, cobertura, confianças
//!   └── passes_thresholds() mínimos, forma proibida, skyline
//! refine()                  dangling + closing + instantiated
//! ```

pub mod bias;
pub mod lazy;
pub mod operators;
pub mod registry;
pub mod scoring;
pub mod standard;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::core::{CanonicalKey, Rule, Scores};
use crate::metrics::{Event, RunMetrics};
use crate::store::{FactStore, StoreResult};

pub use bias::{ConstantPolicy, LanguageBias, Optimizations, PruningMetric};
pub use lazy::LazyAssistant;
pub use registry::RelationRegistry;
pub use standard::StandardAssistant;

/// Estratégia de assistente selecionada na configuração.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum AssistantKind {
    Standard,
    Lazy,
}

/// Valores calculados pelas camadas de aproximação de um candidato mantido.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Approximation {
    /// Limites superiores `(padrão, PCA)`.
    pub upper_bound: Option<(f64, f64)>,
    pub estimate: Option<f64>,
    /// Denominadores exatos contados pelo limite superior.
    pub denominators: Option<scoring::Denominators>,
}

impl Approximation {
    /// Copia os valores para as colunas de diagnóstico.
    pub fn annotate(self, scores: &mut Scores) {
        if let Some((std_bound, pca_bound)) = self.upper_bound {
            scores.std_upper_bound = Some(std_bound);
            scores.pca_upper_bound = Some(pca_bound);
        }
        scores.pca_estimate = self.estimate;
    }
}

/// Resultado das camadas de aproximação.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Verdict {
    Keep(Approximation),
    /// O limite superior já está abaixo do mínimo.
    BelowUpperBound(f64),
    /// A estimativa por funcionalidade está abaixo do mínimo.
    BelowEstimate(f64),
}

/// Capacidades de um assistente de mineração.
pub trait MiningAssistant: Send + Sync {
    fn name(&self) -> &'static str;

    fn context(&self) -> &AssistantContext;

    /// Regras de um átomo para as relações com ao menos `min_support` fatos.
    fn seed_atoms(&self, min_support: u64) -> Vec<Rule>;

    fn dangling(&self, rule: &Rule, threshold: u64) -> StoreResult<Vec<Rule>>;

    fn closing(&self, rule: &Rule, threshold: u64) -> StoreResult<Vec<Rule>>;

    fn instantiated(&self, rule: &Rule, threshold: u64) -> StoreResult<Vec<Rule>>;

    /// Camadas de aproximação, aplicadas a candidatos fechados antes da pontuação.
    fn prefilter(&self, rule: &Rule) -> StoreResult<Verdict>;

    /// Preenche suporte, cobertura e confianças (o resultado fica em cache na
    /// regra), anotando os valores das camadas de aproximação.
    fn score_annotated(&self, rule: &Rule, approximation: Approximation) -> StoreResult<Scores>;

    fn score(&self, rule: &Rule) -> StoreResult<Scores> {
        self.score_annotated(rule, Approximation::default())
    }

    fn passes_thresholds(&self, rule: &Rule) -> StoreResult<bool>;

    /// Confiança PCA saturada: a regra não é mais refinada.
    fn is_perfect(&self, rule: &Rule) -> bool;

    /// Os três operadores, com o limiar de suporte da cabeça da regra.
    fn refine(&self, rule: &Rule) -> StoreResult<Vec<Rule>> {
        let threshold = self.context().support_threshold(rule);
        let mut children = self.dangling(rule, threshold)?;
        children.extend(self.closing(rule, threshold)?);
        children.extend(self.instantiated(rule, threshold)?);
        Ok(children)
    }
}

/// Estado compartilhado pelas estratégias: base, viés, registro e caches.
pub struct AssistantContext {
    pub store: Arc<FactStore>,
    pub bias: LanguageBias,
    pub registry: RelationRegistry,
    pub metrics: Arc<RunMetrics>,
    /// Confiança exata de ancestrais, por chave canônica.
    ancestor_confidence: RwLock<HashMap<CanonicalKey, f64>>,
}

impl AssistantContext {
    pub fn new(store: Arc<FactStore>, bias: LanguageBias, metrics: Arc<RunMetrics>) -> Self {
        let registry = RelationRegistry::populate(&store, |r| bias.allows_head(r));
        Self {
            store,
            bias,
            registry,
            metrics,
            ancestor_confidence: RwLock::new(HashMap::new()),
        }
    }

    pub fn support_threshold(&self, rule: &Rule) -> u64 {
        let size = self
            .registry
            .relation_size(&self.store, rule.head().predicate());
        self.bias.support_threshold(size)
    }

    /// Limite superior e, se ativa, a estimativa por funcionalidade.
    pub fn prefilter(&self, rule: &Rule) -> StoreResult<Verdict> {
        let mut approximation = Approximation::default();
        if !rule.is_closed() {
            return Ok(Verdict::Keep(approximation));
        }
        let bias = &self.bias;
        if bias.optimizations.confidence_bounds && rule.contains_hard_shape() {
            if let Some(bound) = scoring::confidence_upper_bound(&self.store, bias, rule)? {
                if bound.std_bound < bias.min_std_confidence {
                    return Ok(Verdict::BelowUpperBound(bound.std_bound));
                }
                if bound.pca_bound < bias.min_pca_confidence {
                    return Ok(Verdict::BelowUpperBound(bound.pca_bound));
                }
                approximation.upper_bound = Some((bound.std_bound, bound.pca_bound));
                approximation.denominators = Some(bound.denominators);
            }
        }
        if bias.optimizations.functionality_heuristic && bias.min_pca_confidence > 0.0 && rule.is_single_path() {
            let support = scoring::support(&self.store, rule)?;
            if let Some(estimate) = scoring::functionality_estimate(&self.store, bias, rule, support) {
                if estimate < bias.min_pca_confidence {
                    return Ok(Verdict::BelowEstimate(estimate));
                }
                approximation.estimate = Some(estimate);
            }
        }
        Ok(Verdict::Keep(approximation))
    }

    /// Executa `f` e avisa se passou do limiar de consulta lenta.
    pub fn timed<T>(&self, rule: &Rule, f: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let out = f();
        let elapsed = started.elapsed();
        if elapsed > self.bias.slow_query {
            self.metrics.record(Event::SlowQuery);
            tracing::warn!(
                rule = %rule.display(self.store.interner()),
                elapsed_ms = elapsed.as_millis() as u64,
                "Consulta lenta"
            );
        }
        out
    }

    /// Confiança exata (na métrica configurada) de um ancestral, memorizada.
    pub fn ancestor_confidence(&self, ancestor: &Rule) -> StoreResult<f64> {
        let key = ancestor.canonical_key();
        if let Some(conf) = self.ancestor_confidence.read().get(key) {
            return Ok(*conf);
        }
        let scores = scoring::exact_scores(&self.store, &self.bias, &self.registry, ancestor, None)?;
        let conf = scores.confidence(self.bias.confidence_metric);
        self.ancestor_confidence.write().insert(key.clone(), conf);
        Ok(conf)
    }

    /// Teste de aceitação comum às estratégias.
    pub fn acceptance(&self, rule: &Rule, scores: &Scores) -> StoreResult<bool> {
        let bias = &self.bias;
        if scores.truncated
            || scores.pca_confidence < bias.min_pca_confidence
            || scores.std_confidence < bias.min_std_confidence
        {
            return Ok(false);
        }
        if rule.has_duplicated_relation_shape() {
            return Ok(false);
        }
        if bias.constants == ConstantPolicy::Require && !rule.has_constants() {
            return Ok(false);
        }
        if !bias.optimizations.skyline {
            return Ok(true);
        }
        let confidence = scores.confidence(bias.confidence_metric);
        let mut ancestors = Vec::new();
        for ancestor in rule.all_ancestors().iter().filter(|a| a.is_closed()) {
            ancestors.push(self.ancestor_confidence(ancestor)?);
        }
        Ok(scoring::improves_on_ancestors(confidence, ancestors))
    }

    pub fn is_perfect(&self, rule: &Rule) -> bool {
        self.bias.optimizations.perfect_pruning
            && rule.scores().is_some_and(|s| s.pca_confidence >= 1.0)
    }
}

/// Constrói a estratégia escolhida.
pub fn build_assistant(kind: AssistantKind, context: AssistantContext) -> Arc<dyn MiningAssistant> {
    match kind {
        AssistantKind::Standard => Arc::new(StandardAssistant::new(context)),
        AssistantKind::Lazy => Arc::new(LazyAssistant::new(context)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Atom, Term};

    fn context(store: FactStore, bias: LanguageBias) -> AssistantContext {
        AssistantContext::new(Arc::new(store), bias, Arc::new(RunMetrics::new()))
    }

    /// `sameCity(?a,?b) <= livesIn(?a,?c), livesIn(?b,?c)`: corpo tipo I.
    fn same_city() -> (FactStore, Rule) {
        let store = FactStore::from_triples([
            ("ann", "livesIn", "paris"),
            ("bob", "livesIn", "paris"),
            ("carl", "livesIn", "rome"),
            ("dan", "livesIn", "rome"),
            ("eve", "livesIn", "oslo"),
            ("ann", "sameCity", "bob"),
            ("carl", "sameCity", "eve"),
            ("dan", "sameCity", "zed"),
        ]);
        let v = Term::Var;
        let lives = store.lookup("livesIn").unwrap();
        let rule = Rule::new(
            vec![
                Atom::new(v(0), store.lookup("sameCity").unwrap(), v(1)),
                Atom::new(v(0), lives, v(2)),
                Atom::new(v(1), lives, v(2)),
            ],
            v(0),
        );
        (store, rule)
    }

    /// `citizenOf(?a,?b) <= livesIn(?a,?c), locatedIn(?c,?b)`: caminho simples
    /// com estimativa 0.375 e confiança PCA real 0.25.
    fn path_store() -> FactStore {
        FactStore::from_triples([
            ("ann", "livesIn", "paris"),
            ("bob", "livesIn", "paris"),
            ("carl", "livesIn", "rome"),
            ("dave", "livesIn", "oslo"),
            ("fay", "livesIn", "rome"),
            ("paris", "locatedIn", "france"),
            ("rome", "locatedIn", "italy"),
            ("ann", "citizenOf", "spain"),
            ("bob", "citizenOf", "spain"),
            ("carl", "citizenOf", "italy"),
            ("fay", "citizenOf", "spain"),
            ("eve", "citizenOf", "greece"),
        ])
    }

    fn path_rule(store: &FactStore) -> Rule {
        let v = Term::Var;
        Rule::new(
            vec![
                Atom::new(v(0), store.lookup("citizenOf").unwrap(), v(1)),
                Atom::new(v(0), store.lookup("livesIn").unwrap(), v(2)),
                Atom::new(v(2), store.lookup("locatedIn").unwrap(), v(1)),
            ],
            v(0),
        )
    }

    #[test]
    fn upper_bound_discards_below_min_std_confidence() {
        let (store, rule) = same_city();
        let bias = LanguageBias {
            pruning: PruningMetric::Support(1),
            min_std_confidence: 0.5,
            ..LanguageBias::default()
        };
        let ctx = context(store, bias);
        match ctx.prefilter(&rule).unwrap() {
            Verdict::BelowUpperBound(bound) => assert!((bound - 0.4).abs() < 1e-9),
            other => panic!("esperava descarte pelo limite, veio {other:?}"),
        }
    }

    #[test]
    fn kept_candidates_carry_bounds_and_denominators() {
        let (store, rule) = same_city();
        let bias = LanguageBias {
            pruning: PruningMetric::Support(1),
            min_std_confidence: 0.1,
            ..LanguageBias::default()
        };
        let ctx = context(store, bias);
        let Verdict::Keep(approximation) = ctx.prefilter(&rule).unwrap() else {
            panic!("regra deveria ser mantida");
        };
        let (std_bound, pca_bound) = approximation.upper_bound.unwrap();
        assert!((std_bound - 0.4).abs() < 1e-9);
        assert!((pca_bound - 2.0 / 3.0).abs() < 1e-9);
        let denominators = approximation.denominators.unwrap();
        assert_eq!(denominators.body_size, 5);
        assert_eq!(denominators.pca_body_size, 3);

        let assistant = StandardAssistant::new(ctx);
        let scores = assistant.score_annotated(&rule, approximation).unwrap();
        assert_eq!(scores.support, 1);
        assert_eq!(scores.body_size, 5);
        assert_eq!(scores.std_upper_bound, Some(std_bound));
        assert!(scores.std_confidence <= std_bound);
    }

    #[test]
    fn estimate_discards_below_min_pca_confidence() {
        let store = path_store();
        let rule = path_rule(&store);
        let mut bias = LanguageBias {
            pruning: PruningMetric::Support(1),
            min_pca_confidence: 0.5,
            ..LanguageBias::default()
        };
        bias.optimizations.functionality_heuristic = true;
        let ctx = context(store, bias.clone());
        match ctx.prefilter(&rule).unwrap() {
            Verdict::BelowEstimate(estimate) => assert!((estimate - 0.375).abs() < 1e-9),
            other => panic!("esperava descarte pela estimativa, veio {other:?}"),
        }

        bias.min_pca_confidence = 0.3;
        let ctx = context(path_store(), bias);
        let Verdict::Keep(approximation) = ctx.prefilter(&path_rule(&ctx.store)).unwrap() else {
            panic!("estimativa acima do mínimo deveria manter a regra");
        };
        assert!((approximation.estimate.unwrap() - 0.375).abs() < 1e-9);
    }
}
