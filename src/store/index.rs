//! # Índices de Permutação
//!
//! Cada fato `(s, p, o)` é registrado em **seis** índices, um por ordem
//! de permutação, mais três contadores de grau:
//!
//! ```text
//! spo: s → p → {o}      pso: p → s → {o}      osp: o → s → {p}
//! sop: s → o → {p}      pos: p → o → {s}      ops: o → p → {s}
//!
//! subject_size[s]   = nº de fatos com sujeito s
//! relation_size[p]  = nº de fatos da relação p
//! object_size[o]    = nº de fatos com objeto o
//! ```
//!
//! O conjunto final de cada par de chaves carrega a frequência do par
//! (seu tamanho), o que permite ao planejador conhecer o número exato de
//! candidatos de um átomo sem materializar nada.

use std::collections::{HashMap, HashSet};

use crate::core::{Atom, Position, Term};

/// Mapa de duas chaves para o conjunto de valores da terceira posição.
pub type TripleIndex = HashMap<Term, HashMap<Term, HashSet<Term>>>;

/// Os seis índices e os contadores de grau, atualizados como uma unidade.
#[derive(Debug, Default)]
pub struct Indexes {
    spo: TripleIndex,
    sop: TripleIndex,
    pso: TripleIndex,
    pos: TripleIndex,
    osp: TripleIndex,
    ops: TripleIndex,
    subject_size: HashMap<Term, u64>,
    relation_size: HashMap<Term, u64>,
    object_size: HashMap<Term, u64>,
    size: u64,
}

fn insert_into(index: &mut TripleIndex, a: Term, b: Term, c: Term) {
    index.entry(a).or_default().entry(b).or_default().insert(c);
}

impl Indexes {
    /// Insere um fato ground. Retorna `false` se ele já existia
    /// (semântica de conjunto: nenhum índice nem contador muda).
    pub fn insert(&mut self, fact: &Atom) -> bool {
        let (s, p, o) = (fact.subject(), fact.predicate(), fact.object());
        if self.contains(s, p, o) {
            return false;
        }
        insert_into(&mut self.spo, s, p, o);
        insert_into(&mut self.sop, s, o, p);
        insert_into(&mut self.pso, p, s, o);
        insert_into(&mut self.pos, p, o, s);
        insert_into(&mut self.osp, o, s, p);
        insert_into(&mut self.ops, o, p, s);
        *self.subject_size.entry(s).or_insert(0) += 1;
        *self.relation_size.entry(p).or_insert(0) += 1;
        *self.object_size.entry(o).or_insert(0) += 1;
        self.size += 1;
        true
    }

    pub fn contains(&self, s: Term, p: Term, o: Term) -> bool {
        self.spo
            .get(&s)
            .and_then(|m| m.get(&p))
            .is_some_and(|set| set.contains(&o))
    }

    /// Índice cujas chaves são, nesta ordem, as posições `first` e `second`.
    pub fn by(&self, first: Position, second: Position) -> &TripleIndex {
        use Position::*;
        match (first, second) {
            (Subject, Predicate) => &self.spo,
            (Subject, Object) => &self.sop,
            (Predicate, Subject) => &self.pso,
            (Predicate, Object) => &self.pos,
            (Object, Subject) => &self.osp,
            (Object, Predicate) => &self.ops,
            _ => unreachable!("index keys must be two distinct positions"),
        }
    }

    /// Chaves de primeiro nível de um índice que começa por `position`.
    pub fn leading(&self, position: Position) -> &TripleIndex {
        match position {
            Position::Subject => &self.spo,
            Position::Predicate => &self.pso,
            Position::Object => &self.osp,
        }
    }

    /// Conjunto da terceira posição dado um par de chaves constantes.
    pub fn third(
        &self,
        first: Position,
        first_key: Term,
        second: Position,
        second_key: Term,
    ) -> Option<&HashSet<Term>> {
        self.by(first, second)
            .get(&first_key)
            .and_then(|m| m.get(&second_key))
    }

    /// Número de fatos com `key` na posição `position`.
    pub fn degree(&self, position: Position, key: Term) -> u64 {
        let counter = match position {
            Position::Subject => &self.subject_size,
            Position::Predicate => &self.relation_size,
            Position::Object => &self.object_size,
        };
        counter.get(&key).copied().unwrap_or(0)
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Relações presentes, em ordem de id (determinística).
    pub fn relations(&self) -> Vec<Term> {
        let mut relations: Vec<Term> = self.relation_size.keys().copied().collect();
        relations.sort();
        relations
    }

    /// Valores distintos da coluna `position` (sujeito ou objeto) de `relation`.
    pub fn column(&self, relation: Term, position: Position) -> Option<&HashMap<Term, HashSet<Term>>> {
        match position {
            Position::Subject => self.pso.get(&relation),
            Position::Object => self.pos.get(&relation),
            Position::Predicate => None,
        }
    }
}
