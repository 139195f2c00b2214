//! # Consultas Conjuntivas — Planejador do Átomo Mais Restritivo
//!
//! Uma consulta é uma lista de átomos unidos por variáveis compartilhadas.
//! O planejador é guloso:
//!
//! ```text
//! enquanto houver átomos pendentes:
//!   escolhe o átomo com menor contagem exata (contadores de grau)
//!   para cada ligação desse átomo:
//!     substitui as variáveis ligadas em TODOS os átomos (Scoped)
//!     recursa sobre os átomos restantes
//!     restaura as variáveis (Drop do guard — inclusive em erro)
//! ```
//!
//! Os átomos ficam num único array compartilhado entre as chamadas
//! recursivas; quais ainda estão pendentes é indicado por uma máscara de
//! bits. A substituição é sempre desfeita pelo [`Scoped`] ao sair de escopo,
//! seja por retorno normal, seja por propagação de erro com `?`.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use super::{eval_pseudo, FactStore, StoreError, StoreResult, MAX_QUERY_ATOMS};
use crate::core::{Atom, Term};

/// Máscara dos átomos ainda pendentes.
type Mask = u64;

fn bit(i: usize) -> Mask {
    1 << i
}

fn full_mask(len: usize) -> Mask {
    if len == 0 {
        0
    } else {
        Mask::MAX >> (64 - len)
    }
}

fn indices(mask: Mask) -> impl Iterator<Item = usize> {
    (0..64).filter(move |i| mask & bit(*i) != 0)
}

/// Liga `var` a um valor em todo o array de átomos enquanto viver.
///
/// Guarda as posições sobrescritas e as restaura no `Drop`.
pub(crate) struct Scoped<'q> {
    atoms: &'q mut [Atom],
    var: Term,
    slots: Vec<(usize, usize)>,
}

impl<'q> Scoped<'q> {
    pub(crate) fn bind(atoms: &'q mut [Atom], var: Term, value: Term) -> Self {
        let mut slots = Vec::new();
        for (i, atom) in atoms.iter_mut().enumerate() {
            for (j, term) in atom.0.iter_mut().enumerate() {
                if *term == var {
                    *term = value;
                    slots.push((i, j));
                }
            }
        }
        Self { atoms, var, slots }
    }

    pub(crate) fn atoms(&mut self) -> &mut [Atom] {
        self.atoms
    }
}

impl Drop for Scoped<'_> {
    fn drop(&mut self) {
        for (i, j) in self.slots.drain(..) {
            self.atoms[i].0[j] = self.var;
        }
    }
}

fn accept_all(_: Term) -> bool {
    true
}

fn checked_copy(query: &[Atom]) -> StoreResult<Vec<Atom>> {
    if query.len() > MAX_QUERY_ATOMS {
        return Err(StoreError::TooManyAtoms(query.len()));
    }
    Ok(query.to_vec())
}

impl FactStore {
    // ─── API pública ────────────────────────────────────────────

    /// Valores distintos de `var` que satisfazem a consulta.
    #[allow(dead_code)] // consulta da API da base; o minerador só conta ligações
    pub fn select_distinct(&self, var: Term, query: &[Atom]) -> StoreResult<HashSet<Term>> {
        let mut atoms = checked_copy(query)?;
        let mask = full_mask(atoms.len());
        self.select_distinct_in(var, &mut atoms, mask, &accept_all)
    }

    /// Número de valores distintos de `var` que satisfazem a consulta.
    pub fn count_distinct(&self, var: Term, query: &[Atom]) -> StoreResult<u64> {
        self.count_distinct_bounded(var, query, None)
    }

    /// Como [`count_distinct`](Self::count_distinct), mas para assim que a
    /// contagem ultrapassa `limit` (retornando `limit + 1`).
    pub fn count_distinct_bounded(
        &self,
        var: Term,
        query: &[Atom],
        limit: Option<u64>,
    ) -> StoreResult<u64> {
        let mut atoms = checked_copy(query)?;
        let mask = full_mask(atoms.len());
        self.count_distinct_in(var, &mut atoms, mask, limit)
    }

    /// Para cada valor de `var1`, os valores de `var2` que completam a consulta.
    #[allow(dead_code)] // consulta da API da base; o minerador só conta ligações
    pub fn select_distinct_pairs(
        &self,
        var1: Term,
        var2: Term,
        query: &[Atom],
    ) -> StoreResult<HashMap<Term, HashSet<Term>>> {
        let mut atoms = checked_copy(query)?;
        let mask = full_mask(atoms.len());
        let firsts = self.select_distinct_in(var1, &mut atoms, mask, &accept_all)?;
        let mut out = HashMap::new();
        for v1 in firsts {
            let mut bound = Scoped::bind(&mut atoms, var1, v1);
            let seconds = self.select_distinct_in(var2, bound.atoms(), mask, &accept_all)?;
            if !seconds.is_empty() {
                out.insert(v1, seconds);
            }
        }
        Ok(out)
    }

    /// Número de pares distintos `(var1, var2)` que satisfazem a consulta.
    #[allow(dead_code)] // consulta da API da base; o minerador só conta ligações
    pub fn count_distinct_pairs(&self, var1: Term, var2: Term, query: &[Atom]) -> StoreResult<u64> {
        let mut atoms = checked_copy(query)?;
        let mask = full_mask(atoms.len());
        let firsts = self.select_distinct_in(var1, &mut atoms, mask, &accept_all)?;
        let mut total = 0u64;
        for v1 in firsts {
            let mut bound = Scoped::bind(&mut atoms, var1, v1);
            total += self.count_distinct_in(var2, bound.atoms(), mask, None)?;
        }
        Ok(total)
    }

    /// Para cada valor de `projection`, quantas ligações distintas de `var`
    /// satisfazem a consulta. Valores rejeitados por `accept` nunca são
    /// consultados.
    pub fn frequent_bindings_of(
        &self,
        var: Term,
        projection: Term,
        query: &[Atom],
        accept: &dyn Fn(Term) -> bool,
    ) -> StoreResult<HashMap<Term, u64>> {
        let started = Instant::now();
        let mut atoms = checked_copy(query)?;
        let mask = full_mask(atoms.len());
        let rest: Mask = indices(mask)
            .filter(|&i| !atoms[i].contains(projection))
            .fold(0, |m, i| m | bit(i));
        let var_in_rest = indices(rest).any(|i| atoms[i].contains(var));

        let mut counts: HashMap<Term, u64> = HashMap::new();
        if var_in_rest {
            // Enumera as ligações de `var` pelo corpo sem o átomo de projeção
            // e, para cada uma, os valores de projeção que a completam.
            let bindings = self.select_distinct_in(var, &mut atoms, rest, &accept_all)?;
            for value in bindings {
                let mut bound = Scoped::bind(&mut atoms, var, value);
                let projected = self.select_distinct_in(projection, bound.atoms(), mask, accept)?;
                for p in projected {
                    *counts.entry(p).or_insert(0) += 1;
                }
            }
        } else {
            let projected = self.select_distinct_in(projection, &mut atoms, mask, accept)?;
            for p in projected {
                let mut bound = Scoped::bind(&mut atoms, projection, p);
                let n = self.count_distinct_in(var, bound.atoms(), mask, None)?;
                if n > 0 {
                    counts.insert(p, n);
                }
            }
        }
        tracing::trace!(
            atoms = query.len(),
            values = counts.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "frequent_bindings_of"
        );
        Ok(counts)
    }

    // ─── Núcleo recursivo ───────────────────────────────────────

    /// Índice do átomo pendente (não pseudo) com menor estimativa,
    /// opcionalmente restrito aos que contêm `var`. Empates: menor índice.
    fn most_restrictive(&self, atoms: &[Atom], mask: Mask, var: Option<Term>) -> Option<(usize, u64)> {
        indices(mask)
            .filter(|&i| !atoms[i].is_pseudo())
            .filter(|&i| var.map_or(true, |v| atoms[i].contains(v)))
            .map(|i| (i, self.estimate(&atoms[i])))
            .min_by_key(|&(i, n)| (n, i))
    }

    pub(crate) fn exists_in(&self, atoms: &mut [Atom], mask: Mask) -> StoreResult<bool> {
        let mut mask = mask;
        if mask == 0 {
            return Ok(true);
        }

        // Pseudo-átomos: avalia os ground e propaga igualdades com um lado livre.
        for i in indices(mask) {
            let atom = atoms[i];
            if !atom.is_pseudo() {
                continue;
            }
            match eval_pseudo(&atom) {
                Some(false) => return Ok(false),
                Some(true) => mask &= !bit(i),
                None if atom.predicate() == Term::EQUALS => {
                    let (s, o) = (atom.subject(), atom.object());
                    let binding = match (s.is_variable(), o.is_variable()) {
                        (true, false) => Some((s, o)),
                        (false, true) => Some((o, s)),
                        _ => None,
                    };
                    if let Some((var, value)) = binding {
                        let mut bound = Scoped::bind(atoms, var, value);
                        return self.exists_in(bound.atoms(), mask & !bit(i));
                    }
                }
                None => {}
            }
        }
        if mask == 0 {
            return Ok(true);
        }

        let Some((best, estimate)) = self.most_restrictive(atoms, mask, None) else {
            return Err(StoreError::Unsupported(
                "only pseudo-atoms over unbound variables remain".into(),
            ));
        };
        if estimate == 0 {
            return Ok(false);
        }
        let atom = atoms[best];
        let rest = mask & !bit(best);
        let vars = atom.variables();
        match vars.as_slice() {
            [] => {
                if self.contains(&atom) {
                    self.exists_in(atoms, rest)
                } else {
                    Ok(false)
                }
            }
            [v] => self.try_for_each_value(&atom, *v, |value| {
                let mut bound = Scoped::bind(atoms, *v, value);
                self.exists_in(bound.atoms(), rest)
            }),
            [v1, v2] => self.try_for_each_pair(&atom, *v1, *v2, |a, b| {
                let mut first = Scoped::bind(atoms, *v1, a);
                let mut second = Scoped::bind(first.atoms(), *v2, b);
                self.exists_in(second.atoms(), rest)
            }),
            _ => {
                if rest == 0 {
                    Ok(self.size() > 0)
                } else {
                    Err(StoreError::Unsupported(
                        "three free variables in one atom joined with other atoms".into(),
                    ))
                }
            }
        }
    }

    pub(crate) fn select_distinct_in(
        &self,
        var: Term,
        atoms: &mut [Atom],
        mask: Mask,
        accept: &dyn Fn(Term) -> bool,
    ) -> StoreResult<HashSet<Term>> {
        let mut out = HashSet::new();
        self.for_each_distinct(var, atoms, mask, accept, |value| {
            out.insert(value);
            false
        })?;
        Ok(out)
    }

    pub(crate) fn count_distinct_in(
        &self,
        var: Term,
        atoms: &mut [Atom],
        mask: Mask,
        limit: Option<u64>,
    ) -> StoreResult<u64> {
        let mut count = 0u64;
        self.for_each_distinct(var, atoms, mask, &accept_all, |_| {
            count += 1;
            limit.is_some_and(|l| count > l)
        })?;
        Ok(count)
    }

    /// Visita cada valor distinto de `var` que satisfaz os átomos da máscara.
    /// `visit` retorna `true` para parar.
    fn for_each_distinct<V>(
        &self,
        var: Term,
        atoms: &mut [Atom],
        mask: Mask,
        accept: &dyn Fn(Term) -> bool,
        mut visit: V,
    ) -> StoreResult<()>
    where
        V: FnMut(Term) -> bool,
    {
        let Some((best, estimate)) = self.most_restrictive(atoms, mask, Some(var)) else {
            return Err(StoreError::Unsupported(format!(
                "variable {:?} does not occur in any resolvable atom",
                var
            )));
        };
        if estimate == 0 {
            return Ok(());
        }
        let atom = atoms[best];
        let alone = mask == bit(best);
        self.try_for_each_value(&atom, var, |value| {
            if !accept(value) {
                return Ok(false);
            }
            let holds = if alone {
                true
            } else {
                let mut bound = Scoped::bind(atoms, var, value);
                self.exists_in(bound.atoms(), mask)?
            };
            Ok(holds && visit(value))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(i: u32) -> Term {
        Term::Var(i)
    }

    fn family() -> FactStore {
        FactStore::from_triples([
            ("ann", "livesIn", "paris"),
            ("bob", "livesIn", "paris"),
            ("carl", "livesIn", "rome"),
            ("paris", "locatedIn", "france"),
            ("rome", "locatedIn", "italy"),
            ("ann", "nationality", "france"),
            ("carl", "nationality", "spain"),
        ])
    }

    #[test]
    fn round_trip_on_a_chain() {
        let store = FactStore::from_triples([("a", "r", "b"), ("b", "r", "c"), ("c", "r", "d")]);
        let r = store.lookup("r").unwrap();
        let query = [Atom::new(var(0), r, var(1))];
        let subjects = store.select_distinct(var(0), &query).unwrap();
        let expected: HashSet<Term> = ["a", "b", "c"]
            .iter()
            .map(|n| store.lookup(n).unwrap())
            .collect();
        assert_eq!(subjects, expected);
        assert_eq!(store.count(&query[0]), Ok(3));
    }

    #[test]
    fn join_through_shared_variable() {
        let store = family();
        let lives = store.lookup("livesIn").unwrap();
        let located = store.lookup("locatedIn").unwrap();
        let nationality = store.lookup("nationality").unwrap();
        // ?a livesIn ?c, ?c locatedIn ?b, ?a nationality ?b
        let query = [
            Atom::new(var(0), lives, var(2)),
            Atom::new(var(2), located, var(1)),
            Atom::new(var(0), nationality, var(1)),
        ];
        assert_eq!(store.count_distinct(var(0), &query), Ok(1));
        assert_eq!(store.count_distinct(var(0), &query[..2]), Ok(3));
        assert_eq!(store.count_distinct_pairs(var(0), var(1), &query[..2]), Ok(3));
    }

    #[test]
    fn substitution_is_restored_after_query() {
        let store = family();
        let lives = store.lookup("livesIn").unwrap();
        let located = store.lookup("locatedIn").unwrap();
        let mut atoms = vec![
            Atom::new(var(0), lives, var(2)),
            Atom::new(var(2), located, var(1)),
        ];
        let before = atoms.clone();
        let found = store.exists_in(&mut atoms, full_mask(2)).unwrap();
        assert!(found);
        assert_eq!(atoms, before);
    }

    #[test]
    fn substitution_is_restored_on_error() {
        let store = family();
        let lives = store.lookup("livesIn").unwrap();
        let mut atoms = vec![
            Atom::new(var(0), lives, var(2)),
            Atom::new(var(3), var(4), var(5)),
            Atom::new(var(3), var(6), var(7)),
        ];
        let before = atoms.clone();
        let result = store.exists_in(&mut atoms, full_mask(3));
        assert!(matches!(result, Err(StoreError::Unsupported(_))));
        assert_eq!(atoms, before);
    }

    #[test]
    fn bounded_count_stops_early() {
        let store = family();
        let lives = store.lookup("livesIn").unwrap();
        let query = [Atom::new(var(0), lives, var(1))];
        assert_eq!(store.count_distinct_bounded(var(0), &query, Some(1)), Ok(2));
        assert_eq!(store.count_distinct_bounded(var(0), &query, None), Ok(3));
    }

    #[test]
    fn frequent_bindings_counts_per_relation() {
        let store = family();
        let lives = store.lookup("livesIn").unwrap();
        let nationality = store.lookup("nationality").unwrap();
        // ?a livesIn ?b, ?a ?p ?c: para cada ?p, quantos ?a distintos
        let query = [
            Atom::new(var(0), lives, var(1)),
            Atom::new(var(0), var(9), var(2)),
        ];
        let counts = store
            .frequent_bindings_of(var(0), var(9), &query, &|_| true)
            .unwrap();
        assert_eq!(counts.get(&lives), Some(&3));
        assert_eq!(counts.get(&nationality), Some(&2));
        let filtered = store
            .frequent_bindings_of(var(0), var(9), &query, &|r| r != lives)
            .unwrap();
        assert!(!filtered.contains_key(&lives));
    }

    #[test]
    fn pairs_group_by_first_variable() {
        let store = family();
        let lives = store.lookup("livesIn").unwrap();
        let query = [Atom::new(var(0), lives, var(1))];
        let pairs = store.select_distinct_pairs(var(1), var(0), &query).unwrap();
        let paris = store.lookup("paris").unwrap();
        assert_eq!(pairs.get(&paris).map(|s| s.len()), Some(2));
    }

    #[test]
    fn inequality_filters_bindings() {
        let store = family();
        let lives = store.lookup("livesIn").unwrap();
        // ?a livesIn ?c, ?b livesIn ?c, ?a differentFrom ?b
        let query = [
            Atom::new(var(0), lives, var(2)),
            Atom::new(var(1), lives, var(2)),
            Atom::new(var(0), Term::DIFFERENT_FROM, var(1)),
        ];
        assert_eq!(store.count_distinct(var(0), &query), Ok(2));
    }
}
