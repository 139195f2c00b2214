//! # Pontuação de Regras
//!
//! Todas as métricas contam **ligações distintas da variável funcional**.
//!
//! | Métrica | Fórmula |
//! |---------|---------|
//! | suporte | ligações que satisfazem cabeça + corpo |
//! | cobertura de cabeça | suporte ÷ fatos da relação da cabeça |
//! | confiança padrão | suporte ÷ ligações que satisfazem o corpo |
//! | confiança PCA | suporte ÷ ligações do corpo + cópia existencial da cabeça |
//!
//! A cópia existencial da cabeça troca o argumento não funcional por uma
//! variável nova: `r(?a, ?b)` vira `r(?a, ?z)`.
//!
//! Os denominadores passam pela reescrita de formas difíceis
//! ([`rewrite_for_counting`]) quando ela está ativa.
//!
//! ## Aproximações
//!
//! Duas camadas, só para regras fechadas, só para **descartar**:
//!
//! 1. [`confidence_upper_bound`] — limite superior algébrico (sólido).
//! 2. [`functionality_estimate`] — estimativa por funcionalidade e
//!    sobreposição ao longo de um caminho simples (heurística).

use std::borrow::Cow;
use std::time::Instant;

use crate::core::{Atom, Position, Rule, Scores, Term};
use crate::store::{detect_hard_shape, rewrite_for_counting, FactStore, StoreResult};

use super::bias::LanguageBias;
use super::registry::RelationRegistry;

pub fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Consulta de contagem, reescrita se a camada estiver ativa.
pub fn counting_query<'a>(atoms: &'a [Atom], counted: Term, bias: &LanguageBias) -> Cow<'a, [Atom]> {
    if bias.optimizations.rewriting {
        rewrite_for_counting(atoms, counted)
    } else {
        Cow::Borrowed(atoms)
    }
}

fn count_functional(
    store: &FactStore,
    bias: &LanguageBias,
    functional: Term,
    atoms: &[Atom],
    limit: Option<u64>,
) -> StoreResult<u64> {
    if !atoms.iter().any(|a| a.contains(functional)) {
        return Ok(0);
    }
    let query = counting_query(atoms, functional, bias);
    store.count_distinct_bounded(functional, &query, limit)
}

/// Suporte da regra (em cache se o operador já o calculou).
pub fn support(store: &FactStore, rule: &Rule) -> StoreResult<u64> {
    if let Some(support) = rule.support() {
        return Ok(support);
    }
    let support = store.count_distinct(rule.functional(), rule.atoms())?;
    Ok(rule.record_support(support))
}

/// Cabeça com o argumento não funcional trocado por uma variável nova.
pub fn existential_head(rule: &Rule) -> Atom {
    let mut head = *rule.head();
    let fresh = rule.fresh_variable();
    for position in [Position::Subject, Position::Object] {
        if head.get(position) != rule.functional() {
            head.set(position, fresh);
        }
    }
    head
}

pub fn body_size(store: &FactStore, bias: &LanguageBias, rule: &Rule) -> StoreResult<u64> {
    count_functional(store, bias, rule.functional(), rule.body(), None)
}

pub fn pca_body_size(store: &FactStore, bias: &LanguageBias, rule: &Rule, limit: Option<u64>) -> StoreResult<u64> {
    let mut query = rule.body().to_vec();
    if query.is_empty() {
        return Ok(0);
    }
    query.push(existential_head(rule));
    count_functional(store, bias, rule.functional(), &query, limit)
}

/// Métricas comuns às duas estratégias: suporte, cobertura e razão de suporte.
fn base_scores(store: &FactStore, registry: &RelationRegistry, rule: &Rule) -> StoreResult<Scores> {
    let support = support(store, rule)?;
    let head_size = registry.relation_size(store, rule.head().predicate());
    let head_values = store.count_distinct(rule.functional(), std::slice::from_ref(rule.head()))?;
    Ok(Scores {
        support,
        support_ratio: ratio(support, head_values),
        head_coverage: ratio(support, head_size),
        ..Scores::default()
    })
}

/// Denominadores exatos já contados por uma camada anterior.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Denominators {
    pub body_size: u64,
    pub pca_body_size: u64,
}

/// Pontuação exata: todos os denominadores contados até o fim, salvo os
/// que vierem em `known`.
pub fn exact_scores(
    store: &FactStore,
    bias: &LanguageBias,
    registry: &RelationRegistry,
    rule: &Rule,
    known: Option<Denominators>,
) -> StoreResult<Scores> {
    let started = Instant::now();
    let mut scores = base_scores(store, registry, rule)?;
    let denominators = match known {
        Some(known) => known,
        None => Denominators {
            body_size: body_size(store, bias, rule)?,
            pca_body_size: pca_body_size(store, bias, rule, None)?,
        },
    };
    scores.body_size = denominators.body_size;
    scores.pca_body_size = denominators.pca_body_size;
    scores.std_confidence = ratio(scores.support, scores.body_size);
    scores.pca_confidence = ratio(scores.support, scores.pca_body_size);
    scores.elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    Ok(scores)
}

/// Pontuação preguiçosa: a contagem PCA para assim que o denominador
/// garante confiança abaixo do mínimo; a confiança padrão só é calculada
/// para regras que passam no limiar PCA.
pub fn lazy_scores(
    store: &FactStore,
    bias: &LanguageBias,
    registry: &RelationRegistry,
    rule: &Rule,
    known: Option<Denominators>,
) -> StoreResult<Scores> {
    let started = Instant::now();
    let mut scores = base_scores(store, registry, rule)?;
    let limit = (bias.min_pca_confidence > 0.0)
        .then(|| (scores.support as f64 / bias.min_pca_confidence).floor() as u64);
    scores.pca_body_size = match known {
        Some(known) => known.pca_body_size,
        None => pca_body_size(store, bias, rule, limit)?,
    };
    scores.pca_confidence = ratio(scores.support, scores.pca_body_size);
    if limit.is_some_and(|l| scores.pca_body_size > l) {
        scores.truncated = true;
    } else {
        scores.body_size = match known {
            Some(known) => known.body_size,
            None => body_size(store, bias, rule)?,
        };
        scores.std_confidence = ratio(scores.support, scores.body_size);
    }
    scores.elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    Ok(scores)
}

/// Limites superiores das confianças e os denominadores exatos usados.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UpperBound {
    pub std_bound: f64,
    pub pca_bound: f64,
    pub denominators: Denominators,
}

/// Limite superior das confianças `(padrão, PCA)` para regras fechadas de
/// três átomos com corpo tipo I.
///
/// O numerador é o suporte da regra sem o átomo colidente que contém a
/// variável funcional (remover átomos só aumenta a contagem); os
/// denominadores são exatos e seguem para a pontuação, que não os recalcula.
/// Logo o limite nunca fica abaixo da confiança real.
pub fn confidence_upper_bound(
    store: &FactStore,
    bias: &LanguageBias,
    rule: &Rule,
) -> StoreResult<Option<UpperBound>> {
    if rule.len() != 3 || !rule.is_closed() {
        return Ok(None);
    }
    let body = rule.body();
    let Some(shape) = detect_hard_shape(body) else {
        return Ok(None);
    };
    let functional = rule.functional();
    let Some(colliding) = [shape.first, shape.second]
        .into_iter()
        .find(|&i| body[i].contains(functional))
    else {
        return Ok(None);
    };
    let reduced: Vec<Atom> = rule
        .atoms()
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != colliding + 1)
        .map(|(_, a)| *a)
        .collect();
    let numerator = store.count_distinct(functional, &reduced)?;
    let denominators = Denominators {
        body_size: body_size(store, bias, rule)?,
        pca_body_size: pca_body_size(store, bias, rule, None)?,
    };
    Ok(Some(UpperBound {
        std_bound: ratio(numerator, denominators.body_size),
        pca_bound: ratio(numerator, denominators.pca_body_size),
        denominators,
    }))
}

fn traversal_fanout(store: &FactStore, relation: Term, entry: Position) -> f64 {
    let ratio = match entry {
        Position::Subject => store.functionality(relation),
        _ => store.inverse_functionality(relation),
    };
    if ratio > 0.0 {
        1.0 / ratio
    } else {
        0.0
    }
}

/// Estimativa da confiança PCA de uma regra de caminho simples, sem a junção.
///
/// ```text
/// corpo ≈ overlap(cabeça.funcional, e0.entrada)
///       × Π min(1, overlap(e_i.saída, e_{i+1}.entrada) / |e_i.saída| × fanout_i)
/// estimativa = min(1, suporte / corpo)
/// ```
///
/// `None` quando não se aplica (sem tabelas, sem caminho, relação pequena).
pub fn functionality_estimate(
    store: &FactStore,
    bias: &LanguageBias,
    rule: &Rule,
    support: u64,
) -> Option<f64> {
    if !store.has_overlaps() || rule.len() < 3 {
        return None;
    }
    let head = rule.head();
    if store.relation_size(head.predicate()) < bias.approximation_min_relation_size {
        return None;
    }
    let path = rule.canonical_path()?;
    let first = path.first()?;
    let head_column = if head.subject() == rule.functional() {
        Position::Subject
    } else {
        Position::Object
    };
    let mut body = store.column_overlap(head.predicate(), head_column, first.relation, first.entry)? as f64;
    for pair in path.windows(2) {
        let (current, next) = (&pair[0], &pair[1]);
        let exit_size = store.relation_column_size(current.relation, current.exit);
        if exit_size == 0 {
            return Some(0.0);
        }
        let overlap = store.column_overlap(current.relation, current.exit, next.relation, next.entry)? as f64;
        let fanout = traversal_fanout(store, current.relation, current.entry);
        body *= (overlap / exit_size as f64 * fanout).min(1.0);
    }
    if body <= 0.0 {
        return Some(0.0);
    }
    Some((support as f64 / body).min(1.0))
}

/// Filtro skyline: a confiança precisa superar estritamente a de todos os
/// ancestrais fechados.
pub fn improves_on_ancestors(confidence: f64, ancestors: impl IntoIterator<Item = f64>) -> bool {
    ancestors.into_iter().all(|ancestor| confidence > ancestor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::bias::PruningMetric;

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

    fn bias() -> LanguageBias {
        LanguageBias {
            pruning: PruningMetric::Support(1),
            ..LanguageBias::default()
        }
    }

    fn rule(store: &FactStore, head: &str, body: &str) -> Rule {
        let v = Term::Var;
        let h = store.lookup(head).unwrap();
        let b = store.lookup(body).unwrap();
        Rule::new(
            vec![Atom::new(v(0), h, v(1)), Atom::new(v(0), b, v(1))],
            v(0),
        )
    }

    #[test]
    fn standard_and_pca_confidence() {
        let store = store();
        let registry = RelationRegistry::default();
        // citizenOf(?a,?b) <= livesIn(?a,?b)
        let r = rule(&store, "citizenOf", "livesIn");
        let scores = exact_scores(&store, &bias(), &registry, &r, None).unwrap();
        assert_eq!(scores.support, 2);
        assert_eq!(scores.body_size, 4);
        // dave não tem cidadania conhecida: fora do denominador PCA
        assert_eq!(scores.pca_body_size, 3);
        assert!((scores.std_confidence - 0.5).abs() < 1e-9);
        assert!((scores.pca_confidence - 2.0 / 3.0).abs() < 1e-9);
        assert!((scores.head_coverage - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn pca_body_never_exceeds_standard_body() {
        let store = store();
        let registry = RelationRegistry::default();
        for (head, body) in [("citizenOf", "livesIn"), ("livesIn", "citizenOf")] {
            let r = rule(&store, head, body);
            let scores = exact_scores(&store, &bias(), &registry, &r, None).unwrap();
            assert!(scores.pca_body_size <= scores.body_size);
            assert!(scores.pca_confidence >= scores.std_confidence);
        }
    }

    #[test]
    fn lazy_scoring_stops_early_on_hopeless_rules() {
        let store = store();
        let registry = RelationRegistry::default();
        let r = rule(&store, "citizenOf", "livesIn");
        let strict = LanguageBias {
            min_pca_confidence: 0.9,
            ..bias()
        };
        let scores = lazy_scores(&store, &strict, &registry, &r, None).unwrap();
        assert!(scores.truncated);
        assert!(scores.pca_confidence < 0.9);
        let loose = LanguageBias {
            min_pca_confidence: 0.5,
            ..bias()
        };
        let full = lazy_scores(&store, &loose, &registry, &r, None).unwrap();
        assert!(!full.truncated);
        assert_eq!(full.body_size, 4);
    }

    #[test]
    fn upper_bound_is_never_below_the_exact_confidence() {
        // sameCity(?a,?b) <= livesIn(?a,?c), livesIn(?b,?c)
        let store = FactStore::from_triples([
            ("ann", "livesIn", "paris"),
            ("bob", "livesIn", "paris"),
            ("carl", "livesIn", "rome"),
            ("ann", "sameCity", "bob"),
            ("carl", "sameCity", "ann"),
        ]);
        let v = Term::Var;
        let lives = store.lookup("livesIn").unwrap();
        let same = store.lookup("sameCity").unwrap();
        let r = Rule::new(
            vec![
                Atom::new(v(0), same, v(1)),
                Atom::new(v(0), lives, v(2)),
                Atom::new(v(1), lives, v(2)),
            ],
            v(0),
        );
        let registry = RelationRegistry::default();
        let bound = confidence_upper_bound(&store, &bias(), &r).unwrap().unwrap();
        let exact = exact_scores(&store, &bias(), &registry, &r, None).unwrap();
        assert!(bound.std_bound >= exact.std_confidence);
        assert!(bound.pca_bound >= exact.pca_confidence);
        assert_eq!(bound.denominators.body_size, exact.body_size);
        assert_eq!(bound.denominators.pca_body_size, exact.pca_body_size);
        // com os denominadores reaproveitados, a pontuação não muda
        let reused = exact_scores(&store, &bias(), &registry, &r, Some(bound.denominators)).unwrap();
        assert_eq!(reused.std_confidence, exact.std_confidence);
        assert_eq!(reused.pca_confidence, exact.pca_confidence);
    }

    #[test]
    fn rewriting_does_not_change_counts() {
        let store = FactStore::from_triples([
            ("ann", "livesIn", "paris"),
            ("bob", "livesIn", "paris"),
            ("carl", "livesIn", "rome"),
            ("ann", "sameCity", "bob"),
        ]);
        let v = Term::Var;
        let lives = store.lookup("livesIn").unwrap();
        let same = store.lookup("sameCity").unwrap();
        let r = Rule::new(
            vec![
                Atom::new(v(0), same, v(1)),
                Atom::new(v(0), lives, v(2)),
                Atom::new(v(1), lives, v(2)),
            ],
            v(0),
        );
        let with = bias();
        let mut without = bias();
        without.optimizations.rewriting = false;
        assert_eq!(
            body_size(&store, &with, &r).unwrap(),
            body_size(&store, &without, &r).unwrap()
        );
        assert_eq!(
            pca_body_size(&store, &with, &r, None).unwrap(),
            pca_body_size(&store, &without, &r, None).unwrap()
        );
    }

    #[test]
    fn skyline_requires_strict_improvement() {
        assert!(!improves_on_ancestors(0.5, [0.6]));
        assert!(!improves_on_ancestors(0.5, [0.5]));
        assert!(improves_on_ancestors(0.7, [0.6, 0.2]));
        assert!(improves_on_ancestors(0.1, []));
    }

    /// `citizenOf(?a,?b) <= livesIn(?a,?c), locatedIn(?c,?b)` sobre uma base
    /// em que só `carl` tem a cidadania prevista.
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
    fn estimate_follows_overlaps_along_the_path() {
        let store = path_store();
        let r = path_rule(&store);
        let support = support(&store, &r).unwrap();
        assert_eq!(support, 1);
        // corpo ≈ 4 sujeitos em comum × (2 de 3 cidades localizadas × fanout 1)
        let estimate = functionality_estimate(&store, &bias(), &r, support).unwrap();
        assert!((estimate - 0.375).abs() < 1e-9);
        let exact = exact_scores(&store, &bias(), &RelationRegistry::default(), &r, None).unwrap();
        assert!((exact.pca_confidence - 0.25).abs() < 1e-9);

        let small = LanguageBias {
            approximation_min_relation_size: 10,
            ..bias()
        };
        assert_eq!(functionality_estimate(&store, &small, &r, support), None);
    }

    #[test]
    fn estimate_requires_a_single_path() {
        let store = store();
        let r = rule(&store, "citizenOf", "livesIn");
        assert_eq!(functionality_estimate(&store, &bias(), &r, 2), None);
    }
}
