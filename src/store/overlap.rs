//! # Tabelas de Sobreposição entre Relações
//!
//! Para cada par de relações `(r1, r2)` guarda o tamanho da interseção
//! entre suas colunas:
//!
//! | Tipo | Interseção | Simétrica? |
//! |------|-----------|-----------|
//! | `SubjectSubject` | sujeitos(r1) ∩ sujeitos(r2) | sim |
//! | `SubjectObject` | sujeitos(r1) ∩ objetos(r2) | não |
//! | `ObjectObject` | objetos(r1) ∩ objetos(r2) | sim |
//!
//! Construídas uma única vez após a carga (custo ~ O(relações² × coluna)),
//! em paralelo com rayon, uma tarefa por relação.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::index::Indexes;
use crate::core::{Position, Term};

/// Par de colunas comparado.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverlapKind {
    SubjectSubject,
    SubjectObject,
    ObjectObject,
}

#[derive(Debug, Default)]
pub struct OverlapTables {
    subject_subject: HashMap<(Term, Term), u64>,
    subject_object: HashMap<(Term, Term), u64>,
    object_object: HashMap<(Term, Term), u64>,
}

fn symmetric_key(r1: Term, r2: Term) -> (Term, Term) {
    if r1 <= r2 {
        (r1, r2)
    } else {
        (r2, r1)
    }
}

fn intersection(a: &HashSet<Term>, b: &HashSet<Term>) -> u64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small.iter().filter(|t| large.contains(t)).count() as u64
}

/// Entradas calculadas por uma tarefa (uma relação `r1`).
type Partial = Vec<(OverlapKind, (Term, Term), u64)>;

impl OverlapTables {
    pub fn build(indexes: &Indexes) -> Self {
        let relations = indexes.relations();
        let column = |r: Term, p: Position| -> HashSet<Term> {
            indexes
                .column(r, p)
                .map(|m| m.keys().copied().collect())
                .unwrap_or_default()
        };
        let subjects: HashMap<Term, HashSet<Term>> = relations
            .iter()
            .map(|&r| (r, column(r, Position::Subject)))
            .collect();
        let objects: HashMap<Term, HashSet<Term>> = relations
            .iter()
            .map(|&r| (r, column(r, Position::Object)))
            .collect();
        let empty = HashSet::new();

        let partials: Vec<Partial> = relations
            .par_iter()
            .enumerate()
            .map(|(i, &r1)| {
                let s1 = subjects.get(&r1).unwrap_or(&empty);
                let o1 = objects.get(&r1).unwrap_or(&empty);
                let mut out = Vec::new();
                for (j, &r2) in relations.iter().enumerate() {
                    let s2 = subjects.get(&r2).unwrap_or(&empty);
                    let o2 = objects.get(&r2).unwrap_or(&empty);
                    if j >= i {
                        let ss = intersection(s1, s2);
                        if ss > 0 {
                            out.push((OverlapKind::SubjectSubject, (r1, r2), ss));
                        }
                        let oo = intersection(o1, o2);
                        if oo > 0 {
                            out.push((OverlapKind::ObjectObject, (r1, r2), oo));
                        }
                    }
                    let so = intersection(s1, o2);
                    if so > 0 {
                        out.push((OverlapKind::SubjectObject, (r1, r2), so));
                    }
                }
                out
            })
            .collect();

        let mut tables = OverlapTables::default();
        for (kind, key, value) in partials.into_iter().flatten() {
            tables.table_mut(kind).insert(key, value);
        }
        tracing::debug!(
            relations = relations.len(),
            ss = tables.subject_subject.len(),
            so = tables.subject_object.len(),
            oo = tables.object_object.len(),
            "Tabelas de sobreposição construídas"
        );
        tables
    }

    fn table_mut(&mut self, kind: OverlapKind) -> &mut HashMap<(Term, Term), u64> {
        match kind {
            OverlapKind::SubjectSubject => &mut self.subject_subject,
            OverlapKind::SubjectObject => &mut self.subject_object,
            OverlapKind::ObjectObject => &mut self.object_object,
        }
    }

    /// Tamanho da interseção; 0 se as colunas são disjuntas.
    pub fn get(&self, r1: Term, r2: Term, kind: OverlapKind) -> u64 {
        let found = match kind {
            OverlapKind::SubjectSubject => self.subject_subject.get(&symmetric_key(r1, r2)),
            OverlapKind::ObjectObject => self.object_object.get(&symmetric_key(r1, r2)),
            OverlapKind::SubjectObject => self.subject_object.get(&(r1, r2)),
        };
        found.copied().unwrap_or(0)
    }

    /// Interseção entre a coluna `c1` de `r1` e a coluna `c2` de `r2`.
    /// `None` se alguma das posições for o predicado.
    pub fn between_columns(&self, r1: Term, c1: Position, r2: Term, c2: Position) -> Option<u64> {
        use Position::*;
        match (c1, c2) {
            (Subject, Subject) => Some(self.get(r1, r2, OverlapKind::SubjectSubject)),
            (Object, Object) => Some(self.get(r1, r2, OverlapKind::ObjectObject)),
            (Subject, Object) => Some(self.get(r1, r2, OverlapKind::SubjectObject)),
            (Object, Subject) => Some(self.get(r2, r1, OverlapKind::SubjectObject)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::store::FactStore;

    use super::*;

    fn store() -> FactStore {
        FactStore::from_triples([
            ("ann", "livesIn", "paris"),
            ("bob", "livesIn", "rome"),
            ("ann", "bornIn", "paris"),
            ("paris", "locatedIn", "france"),
        ])
    }

    #[test]
    fn symmetric_kinds_ignore_argument_order() {
        let store = store();
        let lives = store.lookup("livesIn").unwrap();
        let born = store.lookup("bornIn").unwrap();
        assert_eq!(store.overlap(lives, born, OverlapKind::SubjectSubject), Some(1));
        assert_eq!(store.overlap(born, lives, OverlapKind::SubjectSubject), Some(1));
        assert_eq!(store.overlap(born, lives, OverlapKind::ObjectObject), Some(1));
    }

    #[test]
    fn subject_object_is_directional() {
        let store = store();
        let lives = store.lookup("livesIn").unwrap();
        let located = store.lookup("locatedIn").unwrap();
        // sujeitos de locatedIn ∩ objetos de livesIn = {paris}
        assert_eq!(store.overlap(located, lives, OverlapKind::SubjectObject), Some(1));
        assert_eq!(store.overlap(lives, located, OverlapKind::SubjectObject), Some(0));
        assert_eq!(
            store.column_overlap(lives, Position::Object, located, Position::Subject),
            Some(1)
        );
    }

    #[test]
    fn self_overlap_is_column_size() {
        let store = store();
        let lives = store.lookup("livesIn").unwrap();
        assert_eq!(
            store.overlap(lives, lives, OverlapKind::SubjectSubject),
            Some(store.relation_column_size(lives, Position::Subject))
        );
    }
}
