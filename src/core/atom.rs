//! # Atom — Padrão de Tripla
//!
//! Um [`Atom`] é uma tripla `(sujeito, predicado, objeto)` em que qualquer
//! posição pode ser uma variável. Um átomo sem variáveis é um **fato**.
//!
//! ```text
//! (?a, livesIn, ?b)          padrão com duas variáveis
//! (Paris, locatedIn, France) fato (ground)
//! (?a, differentFrom, ?b)    pseudo-átomo de desigualdade
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use super::term::{Interner, Term};

/// Posição de um termo dentro de um átomo.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Position {
    Subject,
    Predicate,
    Object,
}

impl Position {
    pub const ALL: [Position; 3] = [Position::Subject, Position::Predicate, Position::Object];

    pub fn index(self) -> usize {
        match self {
            Position::Subject => 0,
            Position::Predicate => 1,
            Position::Object => 2,
        }
    }

    /// Extremidade oposta de uma relação binária (sujeito ↔ objeto).
    pub fn opposite(self) -> Position {
        match self {
            Position::Subject => Position::Object,
            Position::Object => Position::Subject,
            Position::Predicate => Position::Predicate,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Position::Subject => "subject",
            Position::Predicate => "predicate",
            Position::Object => "object",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Padrão de tripla `(s, p, o)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom(pub [Term; 3]);

impl Atom {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Atom([subject, predicate, object])
    }

    pub fn subject(&self) -> Term {
        self.0[0]
    }

    pub fn predicate(&self) -> Term {
        self.0[1]
    }

    pub fn object(&self) -> Term {
        self.0[2]
    }

    pub fn get(&self, position: Position) -> Term {
        self.0[position.index()]
    }

    pub fn set(&mut self, position: Position, term: Term) {
        self.0[position.index()] = term;
    }

    /// `true` para `differentFrom` e `equals`, que não são resolvíveis pelos índices.
    pub fn is_pseudo(&self) -> bool {
        self.predicate().is_pseudo_predicate()
    }

    pub fn is_ground(&self) -> bool {
        self.0.iter().all(|t| t.is_constant())
    }

    pub fn contains(&self, term: Term) -> bool {
        self.0.contains(&term)
    }

    /// Variáveis distintas, na ordem sujeito → predicado → objeto.
    pub fn variables(&self) -> Vec<Term> {
        let mut vars = Vec::with_capacity(3);
        for &t in &self.0 {
            if t.is_variable() && !vars.contains(&t) {
                vars.push(t);
            }
        }
        vars
    }

    /// Número de variáveis **distintas** (`(?x, r, ?x)` tem uma).
    pub fn num_variables(&self) -> usize {
        self.variables().len()
    }

    pub fn positions_of(&self, term: Term) -> Vec<Position> {
        Position::ALL
            .into_iter()
            .filter(|p| self.get(*p) == term)
            .collect()
    }

    /// Cópia com todas as ocorrências de `var` trocadas por `value`.
    pub fn substitute(&self, var: Term, value: Term) -> Atom {
        let mut out = *self;
        for t in out.0.iter_mut() {
            if *t == var {
                *t = value;
            }
        }
        out
    }

    pub fn display<'a>(&'a self, interner: &'a Interner) -> AtomDisplay<'a> {
        AtomDisplay {
            atom: self,
            interner,
        }
    }
}

/// Exibe um átomo no formato `sujeito  predicado  objeto`.
pub struct AtomDisplay<'a> {
    atom: &'a Atom,
    interner: &'a Interner,
}

impl fmt::Display for AtomDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}  {}  {}",
            self.interner.display(self.atom.subject()),
            self.interner.display(self.atom.predicate()),
            self.interner.display(self.atom.object())
        )
    }
}
