//! # Fact Store — Base de Fatos Multi-indexada
//!
//! O [`FactStore`] guarda o **conjunto** (não multiconjunto) de fatos ground
//! e responde às consultas de contagem do minerador:
//!
//! - existência de uma ligação para um padrão conjuntivo
//! - contagem de ligações distintas de uma variável (ou de pares)
//! - projeções por frequência, usadas pelos operadores de refinamento
//! - funcionalidade e sobreposição de relações, usadas pelas aproximações
//!
//! ## Ciclo de Vida
//!
//! ```text
//! FactStoreBuilder (mutável, atrás de um Mutex durante a carga)
//!   ├── add(s, p, o) × N      — uma tarefa por fonte (rayon)
//!   └── finish(overlaps)      — opcionalmente constrói as tabelas de sobreposição
//!         ↓
//! FactStore (imutável, compartilhado via Arc, sem locks nas leituras)
//! ```
//!
//! Depois de `finish()` nenhuma escrita é possível: a API de consulta só
//! recebe `&self`.
//!
//! ## Sub-módulos
//!
//! | Módulo | Responsabilidade |
//! |--------|-----------------|
//! | [`index`] | seis índices de permutação e contadores de grau |
//! | [`query`] | planejador e consultas conjuntivas |
//! | [`hard_shape`] | detecção de formas difíceis e reescrita |
//! | [`overlap`] | tabelas de sobreposição entre relações |

pub mod hard_shape;
pub mod index;
pub mod overlap;
pub mod query;

pub use hard_shape::{detect_hard_shape, rewrite_for_counting};
pub use overlap::{OverlapKind, OverlapTables};

use std::collections::HashSet;

use thiserror::Error;

use crate::core::{Atom, Interner, Position, Term};
use index::Indexes;

/// Número máximo de átomos de uma consulta (máscara de 64 bits).
pub const MAX_QUERY_ATOMS: usize = 63;

/// Erros do motor de consultas.
///
/// Formas não suportadas são um limite documentado da implementação,
/// nunca um erro do usuário: o chamador decide se descarta o candidato.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("unsupported query shape: {0}")]
    Unsupported(String),

    #[error("query has {0} atoms, the limit is {MAX_QUERY_ATOMS}")]
    TooManyAtoms(usize),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Acumulador mutável usado durante a carga.
#[derive(Debug, Default)]
pub struct FactStoreBuilder {
    interner: Interner,
    indexes: Indexes,
}

impl FactStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interna e insere `(subject, predicate, object)`.
    ///
    /// Retorna `false` se o fato já existia. Fatos cujo predicado é um
    /// pseudo-predicado reservado também retornam `false` e não entram na base.
    pub fn add(&mut self, subject: &str, predicate: &str, object: &str) -> bool {
        let p = self.interner.intern(predicate);
        if p.is_pseudo_predicate() {
            tracing::warn!(predicate, "Fato com pseudo-predicado reservado ignorado");
            return false;
        }
        let s = self.interner.intern(subject);
        let o = self.interner.intern(object);
        self.indexes.insert(&Atom::new(s, p, o))
    }

    pub fn len(&self) -> u64 {
        self.indexes.size()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.size() == 0
    }

    /// Publica a base como somente leitura.
    pub fn finish(self, build_overlaps: bool) -> FactStore {
        let overlaps = if build_overlaps {
            Some(OverlapTables::build(&self.indexes))
        } else {
            None
        };
        tracing::info!(
            facts = self.indexes.size(),
            relations = self.indexes.relations().len(),
            overlaps = build_overlaps,
            "Base de fatos publicada"
        );
        FactStore {
            interner: self.interner,
            indexes: self.indexes,
            overlaps,
        }
    }
}

/// Base de fatos imutável.
#[derive(Debug)]
pub struct FactStore {
    interner: Interner,
    indexes: Indexes,
    overlaps: Option<OverlapTables>,
}

impl FactStore {
    /// Atalho para testes: base em memória com tabelas de sobreposição.
    #[cfg(test)]
    pub fn from_triples<'a, I>(triples: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str, &'a str)>,
    {
        let mut builder = FactStoreBuilder::new();
        for (s, p, o) in triples {
            builder.add(s, p, o);
        }
        builder.finish(true)
    }

    pub fn interner(&self) -> &Interner {
        &self.interner
    }

    /// Id de uma constante conhecida.
    pub fn lookup(&self, name: &str) -> Option<Term> {
        self.interner.lookup(name)
    }

    /// Número total de fatos.
    pub fn size(&self) -> u64 {
        self.indexes.size()
    }

    pub fn relations(&self) -> Vec<Term> {
        self.indexes.relations()
    }

    pub fn relation_size(&self, relation: Term) -> u64 {
        self.indexes.degree(Position::Predicate, relation)
    }

    pub fn has_overlaps(&self) -> bool {
        self.overlaps.is_some()
    }

    pub fn overlaps(&self) -> Option<&OverlapTables> {
        self.overlaps.as_ref()
    }

    /// `true` se o fato ground está na base. Pseudo-átomos ground são avaliados.
    pub fn contains(&self, fact: &Atom) -> bool {
        if fact.is_pseudo() {
            return eval_pseudo(fact).unwrap_or(false);
        }
        self.indexes
            .contains(fact.subject(), fact.predicate(), fact.object())
    }

    /// Número exato de fatos que casam com um único padrão.
    ///
    /// Padrões com três variáveis distintas retornam o total de fatos.
    pub fn count(&self, atom: &Atom) -> StoreResult<u64> {
        if atom.is_pseudo() {
            return match eval_pseudo(atom) {
                Some(true) => Ok(1),
                Some(false) => Ok(0),
                None => Err(StoreError::Unsupported(
                    "pseudo-atom with free variables has no degree count".into(),
                )),
            };
        }
        let repeated = atom.num_variables() != atom.0.iter().filter(|t| t.is_variable()).count();
        if repeated {
            return Ok(self.matches(atom).len() as u64);
        }
        Ok(self.estimate(atom))
    }

    /// Número de candidatos de um átomo a partir dos contadores, sem
    /// materializar. Ignora variáveis repetidas (é então um limite superior).
    /// Pseudo-átomos nunca são escolhidos pelo planejador.
    pub fn estimate(&self, atom: &Atom) -> u64 {
        if atom.is_pseudo() {
            return u64::MAX;
        }
        let consts: Vec<Position> = Position::ALL
            .into_iter()
            .filter(|p| atom.get(*p).is_constant())
            .collect();
        match consts.as_slice() {
            [] => self.indexes.size(),
            [p] => self.indexes.degree(*p, atom.get(*p)),
            [p, q] => self
                .indexes
                .third(*p, atom.get(*p), *q, atom.get(*q))
                .map_or(0, |set| set.len() as u64),
            _ => u64::from(self.contains(atom)),
        }
    }

    /// Todos os fatos que casam com `atom`, respeitando variáveis repetidas.
    pub fn matches(&self, atom: &Atom) -> Vec<Atom> {
        let mut out = Vec::new();
        let consts: Vec<Position> = Position::ALL
            .into_iter()
            .filter(|p| atom.get(*p).is_constant())
            .collect();
        let build = |assign: &[(Position, Term)]| {
            let mut fact = *atom;
            for &(p, t) in assign {
                fact.set(p, t);
            }
            fact
        };
        match consts.as_slice() {
            [] => {
                for (s, by_p) in self.indexes.by(Position::Subject, Position::Predicate) {
                    for (p, objects) in by_p {
                        for o in objects {
                            out.push(Atom::new(*s, *p, *o));
                        }
                    }
                }
            }
            [q] => {
                let (a, b) = other_positions(*q);
                if let Some(by_a) = self.indexes.by(*q, a).get(&atom.get(*q)) {
                    for (va, set) in by_a {
                        for vb in set {
                            out.push(build(&[(a, *va), (b, *vb)]));
                        }
                    }
                }
            }
            [q, r] => {
                let p = missing_position(*q, *r);
                if let Some(set) = self.indexes.third(*q, atom.get(*q), *r, atom.get(*r)) {
                    for v in set {
                        out.push(build(&[(p, *v)]));
                    }
                }
            }
            _ => {
                if self.contains(atom) {
                    out.push(*atom);
                }
            }
        }
        out.retain(|fact| consistent_with(atom, fact));
        out
    }

    /// Percorre os valores distintos de `var` em `atom` (demais variáveis livres).
    /// `visit` retorna `Ok(true)` para interromper; o resultado indica interrupção.
    pub(crate) fn try_for_each_value<F>(&self, atom: &Atom, var: Term, mut visit: F) -> StoreResult<bool>
    where
        F: FnMut(Term) -> StoreResult<bool>,
    {
        let positions = atom.positions_of(var);
        if positions.len() == 1 {
            let p = positions[0];
            let (q, r) = other_positions(p);
            let (tq, tr) = (atom.get(q), atom.get(r));
            match (tq.is_constant(), tr.is_constant()) {
                (true, true) => {
                    if let Some(set) = self.indexes.third(q, tq, r, tr) {
                        for &v in set {
                            if visit(v)? {
                                return Ok(true);
                            }
                        }
                    }
                    return Ok(false);
                }
                (true, false) => {
                    if let Some(by_p) = self.indexes.by(q, p).get(&tq) {
                        for &v in by_p.keys() {
                            if visit(v)? {
                                return Ok(true);
                            }
                        }
                    }
                    return Ok(false);
                }
                (false, true) => {
                    if let Some(by_p) = self.indexes.by(r, p).get(&tr) {
                        for &v in by_p.keys() {
                            if visit(v)? {
                                return Ok(true);
                            }
                        }
                    }
                    return Ok(false);
                }
                (false, false) if tq != tr => {
                    for &v in self.indexes.leading(p).keys() {
                        if visit(v)? {
                            return Ok(true);
                        }
                    }
                    return Ok(false);
                }
                _ => {}
            }
        }
        let Some(&first) = positions.first() else {
            return Ok(false);
        };
        let mut seen = HashSet::new();
        for fact in self.matches(atom) {
            let v = fact.get(first);
            if seen.insert(v) && visit(v)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Percorre os pares distintos `(v1, v2)` de um átomo com duas variáveis.
    pub(crate) fn try_for_each_pair<F>(
        &self,
        atom: &Atom,
        v1: Term,
        v2: Term,
        mut visit: F,
    ) -> StoreResult<bool>
    where
        F: FnMut(Term, Term) -> StoreResult<bool>,
    {
        let p1 = atom.positions_of(v1);
        let p2 = atom.positions_of(v2);
        if let ([a], [b]) = (p1.as_slice(), p2.as_slice()) {
            let c = missing_position(*a, *b);
            if atom.get(c).is_constant() {
                if let Some(by_a) = self.indexes.by(c, *a).get(&atom.get(c)) {
                    for (&va, set) in by_a {
                        for &vb in set {
                            if visit(va, vb)? {
                                return Ok(true);
                            }
                        }
                    }
                }
                return Ok(false);
            }
        }
        let (Some(&a), Some(&b)) = (p1.first(), p2.first()) else {
            return Ok(false);
        };
        let mut seen = HashSet::new();
        for fact in self.matches(atom) {
            let pair = (fact.get(a), fact.get(b));
            if seen.insert(pair) && visit(pair.0, pair.1)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Razão entre sujeitos distintos e fatos da relação (0 se desconhecida).
    pub fn functionality(&self, relation: Term) -> f64 {
        self.column_ratio(relation, Position::Subject)
    }

    /// Razão entre objetos distintos e fatos da relação.
    pub fn inverse_functionality(&self, relation: Term) -> f64 {
        self.column_ratio(relation, Position::Object)
    }

    /// `true` se a relação é mais funcional no sentido sujeito → objeto.
    pub fn is_functional(&self, relation: Term) -> bool {
        self.functionality(relation) >= self.inverse_functionality(relation)
    }

    fn column_ratio(&self, relation: Term, position: Position) -> f64 {
        let size = self.relation_size(relation);
        if size == 0 {
            return 0.0;
        }
        self.relation_column_size(relation, position) as f64 / size as f64
    }

    /// Número de valores distintos na coluna sujeito ou objeto da relação.
    pub fn relation_column_size(&self, relation: Term, position: Position) -> u64 {
        self.indexes
            .column(relation, position)
            .map_or(0, |m| m.len() as u64)
    }

    /// Sobreposição entre colunas de duas relações, se as tabelas existirem.
    pub fn overlap(&self, r1: Term, r2: Term, kind: OverlapKind) -> Option<u64> {
        self.overlaps.as_ref().map(|t| t.get(r1, r2, kind))
    }

    /// Sobreposição entre a coluna `c1` de `r1` e a coluna `c2` de `r2`.
    pub fn column_overlap(&self, r1: Term, c1: Position, r2: Term, c2: Position) -> Option<u64> {
        self.overlaps
            .as_ref()
            .and_then(|t| t.between_columns(r1, c1, r2, c2))
    }
}

/// Avalia um pseudo-átomo ground. `None` se houver variáveis.
pub(crate) fn eval_pseudo(atom: &Atom) -> Option<bool> {
    if !atom.is_ground() {
        return None;
    }
    if atom.predicate() == Term::EQUALS {
        Some(atom.subject() == atom.object())
    } else {
        Some(atom.subject() != atom.object())
    }
}

/// As duas posições diferentes de `p`, em ordem.
pub(crate) fn other_positions(p: Position) -> (Position, Position) {
    match p {
        Position::Subject => (Position::Predicate, Position::Object),
        Position::Predicate => (Position::Subject, Position::Object),
        Position::Object => (Position::Subject, Position::Predicate),
    }
}

fn missing_position(a: Position, b: Position) -> Position {
    Position::ALL
        .into_iter()
        .find(|p| *p != a && *p != b)
        .unwrap_or(Position::Predicate)
}

/// Um fato respeita o padrão se cada variável repetida recebe o mesmo valor.
fn consistent_with(pattern: &Atom, fact: &Atom) -> bool {
    for i in 0..3 {
        for j in (i + 1)..3 {
            if pattern.0[i].is_variable() && pattern.0[i] == pattern.0[j] && fact.0[i] != fact.0[j] {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_store() -> FactStore {
        FactStore::from_triples([("a", "r", "b"), ("b", "r", "c"), ("c", "r", "d")])
    }

    #[test]
    fn set_semantics_on_insert() {
        let mut builder = FactStoreBuilder::new();
        assert!(builder.add("Paris", "locatedIn", "France"));
        assert!(!builder.add("Paris", "locatedIn", "France"));
        let store = builder.finish(false);
        let fact = Atom::new(
            store.lookup("Paris").unwrap(),
            store.lookup("locatedIn").unwrap(),
            store.lookup("France").unwrap(),
        );
        assert_eq!(store.count(&fact), Ok(1));
        assert_eq!(store.size(), 1);
    }

    #[test]
    fn counts_by_number_of_variables() {
        let store = chain_store();
        let r = store.lookup("r").unwrap();
        let a = store.lookup("a").unwrap();
        assert_eq!(store.count(&Atom::new(Term::Var(0), r, Term::Var(1))), Ok(3));
        assert_eq!(store.count(&Atom::new(a, r, Term::Var(1))), Ok(1));
        assert_eq!(
            store.count(&Atom::new(Term::Var(0), Term::Var(1), Term::Var(2))),
            Ok(3)
        );
        assert_eq!(store.count(&Atom::new(Term::Var(0), r, Term::Var(0))), Ok(0));
    }

    #[test]
    fn functionality_of_a_chain() {
        let store = chain_store();
        let r = store.lookup("r").unwrap();
        assert!((store.functionality(r) - 1.0).abs() < 1e-9);
        assert!((store.inverse_functionality(r) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn reflexive_pattern_uses_matching() {
        let store = FactStore::from_triples([("a", "knows", "a"), ("a", "knows", "b")]);
        let knows = store.lookup("knows").unwrap();
        assert_eq!(
            store.count(&Atom::new(Term::Var(0), knows, Term::Var(0))),
            Ok(1)
        );
    }

    #[test]
    fn reserved_predicates_are_not_stored() {
        let mut builder = FactStoreBuilder::new();
        assert!(!builder.add("a", "equals", "b"));
        assert!(builder.is_empty());
    }

    #[test]
    fn free_pseudo_atom_has_no_count() {
        let store = chain_store();
        let atom = Atom::new(Term::Var(0), Term::DIFFERENT_FROM, Term::Var(1));
        assert!(matches!(store.count(&atom), Err(StoreError::Unsupported(_))));
    }
}
