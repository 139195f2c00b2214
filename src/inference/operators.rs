//! # Operadores de Refinamento
//!
//! Três operadores geram os filhos de uma regra. Todos aplicam o viés de
//! linguagem **antes** de despachar a contagem e descartam filhos cujo
//! átomo mais recente é redundante.
//!
//! ```text
//! dangling      r(?a,?b)  +  s(?a, ?f)       nova variável ?f
//! closing       r(?a,?b)  +  s(?b, ?a)       só variáveis existentes
//! instantiated  r(?a,?b)  s(?a,?f)  →  s(?a, Paris)
//! ```
//!
//! A descoberta de relações candidatas é uma única consulta de projeção:
//! o predicado do átomo novo é uma variável (`?p`) e
//! [`frequent_bindings_of`](FactStore::frequent_bindings_of) devolve, para
//! cada relação, o suporte do filho correspondente.

use crate::core::{Atom, Position, Rule, Term};
use crate::store::{FactStore, StoreResult};

use super::bias::LanguageBias;

/// Variável contada de uma cabeça: o lado mais funcional da relação.
pub fn functional_variable(store: &FactStore, head: &Atom) -> Term {
    let (s, o) = (head.subject(), head.object());
    match (s.is_variable(), o.is_variable()) {
        (false, true) => o,
        (true, true) if !store.is_functional(head.predicate()) => o,
        _ => s,
    }
}

/// Regras de um átomo para cada relação de cabeça permitida com ao menos
/// `min_support` fatos.
pub fn seed_atoms(store: &FactStore, bias: &LanguageBias, min_support: u64) -> Vec<Rule> {
    let mut seeds = Vec::new();
    for relation in store.relations() {
        let size = store.relation_size(relation);
        if !bias.allows_head(relation) || size < min_support {
            continue;
        }
        let head = Atom::new(Term::Var(0), relation, Term::Var(1));
        let functional = functional_variable(store, &head);
        let column = if functional == head.subject() {
            Position::Subject
        } else {
            Position::Object
        };
        let support = store.relation_column_size(relation, column);
        if support < bias.support_threshold(size) {
            continue;
        }
        seeds.push(Rule::seed(head, functional, support));
    }
    tracing::info!(seeds = seeds.len(), "Sementes geradas");
    seeds
}

/// Variável logo após `term` (usada como predicado livre `?p`).
fn next_variable(term: Term) -> Term {
    match term {
        Term::Var(i) => Term::Var(i + 1),
        other => other,
    }
}

fn with_atom(rule: &Rule, atom: Atom) -> Vec<Atom> {
    let mut query = rule.atoms().to_vec();
    query.push(atom);
    query
}

/// Relações com suporte ≥ `threshold`, em ordem decrescente de suporte
/// (desempate pelo id da relação, para ordem determinística).
fn ranked(counts: impl IntoIterator<Item = (Term, u64)>, threshold: u64) -> Vec<(Term, u64)> {
    let mut ranked: Vec<(Term, u64)> = counts
        .into_iter()
        .filter(|(_, support)| *support >= threshold)
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked
}

fn accepts_body_relation(bias: &LanguageBias, rule: &Rule, relation: Term) -> bool {
    bias.allows_body(relation) && rule.relation_count(relation) < bias.recursion_limit
}

/// Ainda cabe um átomo com variável nova? No último espaço só se ele puder
/// ser instanciado depois.
pub fn can_add_dangling(bias: &LanguageBias, rule: &Rule) -> bool {
    let last = bias.max_len.saturating_sub(1);
    rule.len() < last || (rule.len() == last && bias.allows_constants())
}

pub fn dangling(store: &FactStore, bias: &LanguageBias, rule: &Rule, threshold: u64) -> StoreResult<Vec<Rule>> {
    if !can_add_dangling(bias, rule) {
        return Ok(Vec::new());
    }
    let fresh = rule.fresh_variable();
    let relation_var = next_variable(fresh);
    let accept = |r: Term| accepts_body_relation(bias, rule, r);
    let mut children = Vec::new();
    for var in rule.variables() {
        for joined_at in [Position::Subject, Position::Object] {
            let mut atom = Atom::new(fresh, relation_var, fresh);
            atom.set(joined_at, var);
            let query = with_atom(rule, atom);
            let counts = store.frequent_bindings_of(rule.functional(), relation_var, &query, &accept)?;
            for (relation, support) in ranked(counts, threshold) {
                let child = rule.add_dangling_atom(relation, var, joined_at, support);
                if !child.is_redundant() {
                    children.push(child);
                }
            }
        }
    }
    Ok(children)
}

pub fn closing(store: &FactStore, bias: &LanguageBias, rule: &Rule, threshold: u64) -> StoreResult<Vec<Rule>> {
    if rule.len() >= bias.max_len {
        return Ok(Vec::new());
    }
    let vars = rule.variables();
    if vars.len() < 2 {
        return Ok(Vec::new());
    }
    let open = rule.open_variables();
    let relation_var = rule.fresh_variable();
    let accept = |r: Term| accepts_body_relation(bias, rule, r);
    let mut children = Vec::new();
    for &subject in &vars {
        for &object in &vars {
            if subject == object {
                continue;
            }
            if !open.is_empty() && !open.contains(&subject) && !open.contains(&object) {
                continue;
            }
            let query = with_atom(rule, Atom::new(subject, relation_var, object));
            let counts = store.frequent_bindings_of(rule.functional(), relation_var, &query, &accept)?;
            for (relation, support) in ranked(counts, threshold) {
                let child = rule.add_closing_atom(Atom::new(subject, relation, object), support);
                if !child.is_redundant() {
                    children.push(child);
                }
            }
        }
    }
    Ok(children)
}

pub fn instantiated(store: &FactStore, bias: &LanguageBias, rule: &Rule, threshold: u64) -> StoreResult<Vec<Rule>> {
    if !bias.allows_constants() {
        return Ok(Vec::new());
    }
    let Some(fresh) = rule.fresh() else {
        return Ok(Vec::new());
    };
    let counts = store.frequent_bindings_of(rule.functional(), fresh, rule.atoms(), &|_| true)?;
    let mut children = Vec::new();
    for (value, support) in ranked(counts, threshold) {
        if let Some(child) = rule.instantiate_constant(value, support) {
            if !child.is_redundant() {
                children.push(child);
            }
        }
    }
    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::bias::{ConstantPolicy, PruningMetric};

    fn store() -> FactStore {
        FactStore::from_triples([
            ("ann", "livesIn", "paris"),
            ("bob", "livesIn", "paris"),
            ("carl", "livesIn", "rome"),
            ("dave", "livesIn", "rome"),
            ("ann", "citizenOf", "paris"),
            ("bob", "citizenOf", "paris"),
            ("carl", "citizenOf", "rome"),
            ("paris", "locatedIn", "france"),
            ("rome", "locatedIn", "italy"),
        ])
    }

    fn bias() -> LanguageBias {
        LanguageBias {
            pruning: PruningMetric::Support(1),
            ..LanguageBias::default()
        }
    }

    fn seed_for(store: &FactStore, relation: &str) -> Rule {
        let r = store.lookup(relation).unwrap();
        seed_atoms(store, &bias(), 0)
            .into_iter()
            .find(|s| s.head().predicate() == r)
            .unwrap()
    }

    #[test]
    fn seeds_cover_every_relation() {
        let store = store();
        let seeds = seed_atoms(&store, &bias(), 0);
        assert_eq!(seeds.len(), 3);
        let filtered = seed_atoms(&store, &bias(), 3);
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn functional_variable_follows_functionality() {
        let store = store();
        let lives = store.lookup("livesIn").unwrap();
        let head = Atom::new(Term::Var(0), lives, Term::Var(1));
        // 4 sujeitos distintos / 4 fatos contra 2 objetos distintos / 4
        assert_eq!(functional_variable(&store, &head), Term::Var(0));
        let paris = store.lookup("paris").unwrap();
        let bound = Atom::new(Term::Var(0), lives, paris);
        assert_eq!(functional_variable(&store, &bound), Term::Var(0));
    }

    #[test]
    fn closing_finds_the_implied_relation() {
        let store = store();
        let seed = seed_for(&store, "citizenOf");
        let children = closing(&store, &bias(), &seed, 1).unwrap();
        let lives = store.lookup("livesIn").unwrap();
        let child = children
            .iter()
            .find(|c| c.newest().predicate() == lives && c.newest().subject() == Term::Var(0))
            .unwrap();
        assert_eq!(child.support(), Some(3));
        assert!(child.is_closed());
        // suportes nunca crescem ao refinar
        assert!(children.iter().all(|c| c.support() <= seed.support()));
    }

    #[test]
    fn dangling_respects_threshold_and_order() {
        let store = store();
        let seed = seed_for(&store, "livesIn");
        let children = dangling(&store, &bias(), &seed, 2).unwrap();
        assert!(!children.is_empty());
        assert!(children.iter().all(|c| c.support().unwrap() >= 2));
        assert!(children.iter().all(|c| c.len() == 2 && c.fresh().is_some()));
        assert!(children.iter().all(|c| !c.is_redundant()));
    }

    #[test]
    fn no_dangling_atom_in_the_last_slot_without_constants() {
        let store = store();
        let seed = seed_for(&store, "livesIn");
        let strict = LanguageBias { max_len: 2, ..bias() };
        assert!(dangling(&store, &strict, &seed, 1).unwrap().is_empty());
        let relaxed = LanguageBias {
            max_len: 2,
            constants: ConstantPolicy::Allow,
            ..bias()
        };
        assert!(!dangling(&store, &relaxed, &seed, 1).unwrap().is_empty());
    }

    #[test]
    fn instantiation_binds_frequent_constants() {
        let store = store();
        let seed = seed_for(&store, "livesIn");
        let forbid = instantiated(&store, &bias(), &seed, 1).unwrap();
        assert!(forbid.is_empty());
        let allow = LanguageBias {
            constants: ConstantPolicy::Allow,
            ..bias()
        };
        let children = instantiated(&store, &allow, &seed, 2).unwrap();
        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|c| c.head().object().is_constant()));
    }

    #[test]
    fn recursion_limit_blocks_repeated_relations() {
        let store = store();
        let seed = seed_for(&store, "livesIn");
        let limited = LanguageBias {
            recursion_limit: 1,
            ..bias()
        };
        let lives = store.lookup("livesIn").unwrap();
        let children = closing(&store, &limited, &seed, 1).unwrap();
        assert!(children.iter().all(|c| c.newest().predicate() != lives));
    }
}
