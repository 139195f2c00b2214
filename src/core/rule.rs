//! # Rule — Regra de Horn (Consulta)
//!
//! Uma [`Rule`] é uma sequência ordenada de átomos: o átomo 0 é a
//! **cabeça**, os demais formam o **corpo**.
//!
//! ```text
//! ?a  livesIn  ?b   ?b  locatedIn  ?c    =>  ?a  nationality  ?c
//! └──────────── corpo ──────────────┘        └───── cabeça ─────┘
//! ```
//!
//! ## Imutabilidade
//!
//! Regras nunca são alteradas depois de criadas. Cada operador de
//! refinamento ([`add_dangling_atom`](Rule::add_dangling_atom),
//! [`add_closing_atom`](Rule::add_closing_atom),
//! [`instantiate_constant`](Rule::instantiate_constant)) copia a lista de
//! átomos e devolve uma regra **nova**. As métricas são preenchidas uma única
//! vez em caches `OnceLock`, o que permite compartilhar regras via `Arc`
//! entre threads sem locks.
//!
//! ## Identidade Estrutural
//!
//! Duas regras alcançadas por ordens de refinamento diferentes são a mesma
//! regra. A igualdade e o hash usam a [`CanonicalKey`]: variáveis
//! renomeadas por ordem de primeira ocorrência sobre a cabeça seguida da
//! permutação do corpo que dá a menor codificação lexicográfica.
//!
//! ## Ancestrais
//!
//! Os pais de uma regra são as regras obtidas removendo um átomo do corpo
//! sem desconectar o grafo de variáveis. O conjunto é puramente estrutural
//! e não depende da ordem de descoberta.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use super::atom::{Atom, Position};
use super::term::{Interner, Term};
use crate::store::detect_hard_shape;

/// Métrica usada para o filtro skyline e para o relatório.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ConfidenceMetric {
    Pca,
    Standard,
}

/// Métricas de uma regra pontuada.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Scores {
    pub support: u64,
    /// Suporte dividido pelos valores distintos da variável funcional na cabeça.
    pub support_ratio: f64,
    pub head_coverage: f64,
    pub body_size: u64,
    pub pca_body_size: u64,
    pub std_confidence: f64,
    pub pca_confidence: f64,
    pub std_upper_bound: Option<f64>,
    pub pca_upper_bound: Option<f64>,
    pub pca_estimate: Option<f64>,
    /// A contagem do corpo PCA parou antes do fim (estratégia preguiçosa).
    pub truncated: bool,
    pub elapsed_ms: f64,
}

impl Scores {
    pub fn confidence(&self, metric: ConfidenceMetric) -> f64 {
        match metric {
            ConfidenceMetric::Pca => self.pca_confidence,
            ConfidenceMetric::Standard => self.std_confidence,
        }
    }
}

/// Codificação canônica de uma regra (invariante a renomeação e à ordem do corpo).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalKey(Box<[Atom]>);

/// Relação da cabeça mais suas constantes: o balde do índice de resultados.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeadKey {
    pub relation: Term,
    pub subject: Option<Term>,
    pub object: Option<Term>,
}

/// Aresta de um caminho simples entre as variáveis da cabeça.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathEdge {
    pub relation: Term,
    /// Posição pela qual o caminho entra no átomo.
    pub entry: Position,
    /// Posição pela qual o caminho sai do átomo.
    pub exit: Position,
}

/// Marcador da variável recém-criada na chave de expansão.
const MARKED: Term = Term::Var(u32::MAX);

#[derive(Debug, Clone)]
pub struct Rule {
    atoms: Vec<Atom>,
    functional: Term,
    /// Variável criada pelo átomo mais recente, candidata à instanciação.
    fresh: Option<Term>,
    next_var: u32,
    support: OnceLock<u64>,
    scores: OnceLock<Scores>,
    canonical: OnceLock<CanonicalKey>,
    expansion: OnceLock<CanonicalKey>,
}

impl Rule {
    /// Regra a partir de átomos (cabeça primeiro) e da variável funcional.
    pub fn new(atoms: Vec<Atom>, functional: Term) -> Self {
        let next_var = atoms
            .iter()
            .flat_map(|a| a.0)
            .filter_map(|t| t.var_index())
            .max()
            .map_or(0, |m| m + 1);
        Self {
            atoms,
            functional,
            fresh: None,
            next_var,
            support: OnceLock::new(),
            scores: OnceLock::new(),
            canonical: OnceLock::new(),
            expansion: OnceLock::new(),
        }
    }

    /// Regra de um átomo só. A variável não funcional da cabeça fica
    /// disponível para instanciação.
    pub fn seed(head: Atom, functional: Term, support: u64) -> Self {
        let mut rule = Self::new(vec![head], functional);
        rule.fresh = [head.subject(), head.object()]
            .into_iter()
            .find(|t| t.is_variable() && *t != functional);
        rule.with_support(support)
    }

    fn derived(&self, atoms: Vec<Atom>, fresh: Option<Term>, support: u64) -> Self {
        let mut rule = Self::new(atoms, self.functional);
        rule.fresh = fresh;
        rule.next_var = rule.next_var.max(self.next_var);
        rule.with_support(support)
    }

    fn with_support(self, support: u64) -> Self {
        let _ = self.support.set(support);
        self
    }

    // ─── Acesso ─────────────────────────────────────────────────

    pub fn head(&self) -> &Atom {
        &self.atoms[0]
    }

    pub fn body(&self) -> &[Atom] {
        &self.atoms[1..]
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn newest(&self) -> &Atom {
        &self.atoms[self.atoms.len() - 1]
    }

    pub fn functional(&self) -> Term {
        self.functional
    }

    /// O outro argumento da cabeça, se for variável.
    pub fn non_functional(&self) -> Option<Term> {
        let head = self.head();
        [head.subject(), head.object()]
            .into_iter()
            .find(|t| t.is_variable() && *t != self.functional)
    }

    pub fn fresh(&self) -> Option<Term> {
        self.fresh
    }

    /// Próxima variável livre para um átomo pendente.
    pub fn fresh_variable(&self) -> Term {
        Term::Var(self.next_var)
    }

    pub fn support(&self) -> Option<u64> {
        self.support.get().copied()
    }

    pub fn record_support(&self, support: u64) -> u64 {
        *self.support.get_or_init(|| support)
    }

    pub fn scores(&self) -> Option<&Scores> {
        self.scores.get()
    }

    /// Registra as métricas (a primeira gravação vence).
    pub fn record_scores(&self, scores: Scores) -> &Scores {
        self.scores.get_or_init(|| scores)
    }

    // ─── Variáveis ──────────────────────────────────────────────

    /// Variáveis distintas, em ordem de primeira ocorrência.
    pub fn variables(&self) -> Vec<Term> {
        let mut vars = Vec::new();
        for atom in &self.atoms {
            for v in atom.variables() {
                if !vars.contains(&v) {
                    vars.push(v);
                }
            }
        }
        vars
    }

    /// Número de átomos (não pseudo) em que `var` aparece.
    pub fn atoms_containing(&self, var: Term) -> usize {
        self.atoms
            .iter()
            .filter(|a| !a.is_pseudo() && a.contains(var))
            .count()
    }

    /// Variáveis que aparecem em um único átomo.
    pub fn open_variables(&self) -> Vec<Term> {
        self.variables()
            .into_iter()
            .filter(|v| self.atoms_containing(*v) < 2)
            .collect()
    }

    /// Toda variável aparece em pelo menos dois átomos não pseudo.
    pub fn is_closed(&self) -> bool {
        self.variables()
            .into_iter()
            .all(|v| self.atoms_containing(v) >= 2)
    }

    pub fn relation_count(&self, relation: Term) -> usize {
        self.atoms.iter().filter(|a| a.predicate() == relation).count()
    }

    /// `true` se alguma constante ocupa posição de sujeito ou objeto.
    pub fn has_constants(&self) -> bool {
        self.atoms
            .iter()
            .filter(|a| !a.is_pseudo())
            .any(|a| a.subject().is_constant() || a.object().is_constant())
    }

    // ─── Refinamento ────────────────────────────────────────────

    /// Acrescenta `relation` ligando `joined` na posição `joined_at` a uma
    /// variável nova na posição oposta.
    pub fn add_dangling_atom(&self, relation: Term, joined: Term, joined_at: Position, support: u64) -> Rule {
        let fresh = self.fresh_variable();
        let mut atom = Atom::new(fresh, relation, fresh);
        atom.set(joined_at, joined);
        let mut atoms = self.atoms.clone();
        atoms.push(atom);
        self.derived(atoms, Some(fresh), support)
    }

    /// Acrescenta um átomo que só usa variáveis já presentes.
    pub fn add_closing_atom(&self, atom: Atom, support: u64) -> Rule {
        let mut atoms = self.atoms.clone();
        atoms.push(atom);
        self.derived(atoms, None, support)
    }

    /// Liga a variável recém-criada a `value`. `None` se não houver uma.
    pub fn instantiate_constant(&self, value: Term, support: u64) -> Option<Rule> {
        let fresh = self.fresh?;
        let atoms = self.atoms.iter().map(|a| a.substitute(fresh, value)).collect();
        Some(self.derived(atoms, None, support))
    }

    // ─── Predicados estruturais ─────────────────────────────────

    /// O átomo mais recente é implicado por um átomo anterior do corpo:
    /// mesma relação e mesmos termos, exceto onde ele tem variáveis que só
    /// aparecem nele. Contra a cabeça, só a cópia exata conta, pois a cabeça
    /// é a conclusão e não implica nenhum átomo do corpo.
    pub fn is_redundant(&self) -> bool {
        let n = self.atoms.len();
        if n < 2 {
            return false;
        }
        let newest = *self.newest();
        if newest.is_pseudo() {
            return false;
        }
        if newest == self.atoms[0] {
            return true;
        }
        let earlier = &self.atoms[..n - 1];
        let private = |t: Term| t.is_variable() && !earlier.iter().any(|a| a.contains(t));
        self.atoms[1..n - 1].iter().any(|e| {
            e.predicate() == newest.predicate()
                && Position::ALL
                    .into_iter()
                    .all(|p| e.get(p) == newest.get(p) || private(newest.get(p)))
        })
    }

    pub fn contains_hard_shape(&self) -> bool {
        detect_hard_shape(self.body()).is_some()
    }

    /// Regra fechada, de tamanho par ≥ 4, em que cada relação aparece
    /// exatamente duas vezes.
    pub fn has_duplicated_relation_shape(&self) -> bool {
        let n = self.atoms.len();
        if n < 4 || n % 2 != 0 || !self.is_closed() {
            return false;
        }
        let mut counts: HashMap<Term, usize> = HashMap::new();
        for atom in &self.atoms {
            *counts.entry(atom.predicate()).or_insert(0) += 1;
        }
        counts.values().all(|&c| c == 2)
    }

    pub fn is_single_path(&self) -> bool {
        self.canonical_path().is_some()
    }

    /// Caminho do corpo da variável funcional até a outra variável da
    /// cabeça, quando o corpo é uma cadeia simples (cada variável interna
    /// toca exatamente dois átomos).
    pub fn canonical_path(&self) -> Option<Vec<PathEdge>> {
        if self.atoms.len() < 3 {
            return None;
        }
        let start = self.functional;
        let end = self.non_functional()?;
        let body = self.body();
        let binary = |a: &Atom| {
            !a.is_pseudo()
                && a.predicate().is_constant()
                && a.subject().is_variable()
                && a.object().is_variable()
                && a.subject() != a.object()
        };
        if !body.iter().all(binary) {
            return None;
        }
        for var in self.variables() {
            let degree = body.iter().filter(|a| a.contains(var)).count();
            let expected = if var == start || var == end { 1 } else { 2 };
            if degree != expected {
                return None;
            }
        }

        let mut used = vec![false; body.len()];
        let mut edges = Vec::with_capacity(body.len());
        let mut current = start;
        while current != end {
            let mut next = body
                .iter()
                .enumerate()
                .filter(|(i, a)| !used[*i] && a.contains(current));
            let (i, atom) = next.next()?;
            if next.next().is_some() {
                return None;
            }
            used[i] = true;
            let entry = if atom.subject() == current {
                Position::Subject
            } else {
                Position::Object
            };
            edges.push(PathEdge {
                relation: atom.predicate(),
                entry,
                exit: entry.opposite(),
            });
            current = atom.get(entry.opposite());
        }
        used.iter().all(|u| *u).then_some(edges)
    }

    // ─── Ancestrais ─────────────────────────────────────────────

    /// Regras obtidas removendo um átomo do corpo, mantendo o corpo não vazio
    /// e o grafo de variáveis conexo.
    pub fn ancestors(&self) -> Vec<Rule> {
        if self.atoms.len() < 3 {
            return Vec::new();
        }
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for skip in 1..self.atoms.len() {
            let atoms: Vec<Atom> = self
                .atoms
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != skip)
                .map(|(_, a)| *a)
                .collect();
            if !is_connected(&atoms) {
                continue;
            }
            let parent = Rule::new(atoms, self.functional);
            if seen.insert(parent.canonical_key().clone()) {
                out.push(parent);
            }
        }
        out
    }

    /// Fecho transitivo de [`ancestors`](Self::ancestors), sem repetições.
    pub fn all_ancestors(&self) -> Vec<Rule> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut queue: VecDeque<Rule> = self.ancestors().into();
        while let Some(rule) = queue.pop_front() {
            if !seen.insert(rule.canonical_key().clone()) {
                continue;
            }
            queue.extend(rule.ancestors());
            out.push(rule);
        }
        out
    }

    // ─── Chaves ─────────────────────────────────────────────────

    pub fn canonical_key(&self) -> &CanonicalKey {
        self.canonical.get_or_init(|| canonical_encoding(&self.atoms, None))
    }

    /// Chave canônica que também distingue qual variável é a recém-criada.
    pub fn expansion_key(&self) -> &CanonicalKey {
        self.expansion
            .get_or_init(|| canonical_encoding(&self.atoms, self.fresh))
    }

    pub fn head_key(&self) -> HeadKey {
        let head = self.head();
        HeadKey {
            relation: head.predicate(),
            subject: Some(head.subject()).filter(|t| t.is_constant()),
            object: Some(head.object()).filter(|t| t.is_constant()),
        }
    }

    pub fn display<'a>(&'a self, interner: &'a Interner) -> RuleDisplay<'a> {
        RuleDisplay {
            rule: self,
            interner,
        }
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_key() == other.canonical_key()
    }
}

impl Eq for Rule {}

impl Hash for Rule {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical_key().hash(state);
    }
}

/// Todos os átomos alcançáveis uns dos outros por variáveis compartilhadas.
fn is_connected(atoms: &[Atom]) -> bool {
    if atoms.is_empty() {
        return true;
    }
    let mut reached = vec![false; atoms.len()];
    reached[0] = true;
    let mut stack = vec![0usize];
    while let Some(i) = stack.pop() {
        for v in atoms[i].variables() {
            for (j, other) in atoms.iter().enumerate() {
                if !reached[j] && other.contains(v) {
                    reached[j] = true;
                    stack.push(j);
                }
            }
        }
    }
    reached.into_iter().all(|r| r)
}

fn encode_atom(atom: &Atom, renaming: &mut HashMap<Term, u32>, marked: Option<Term>) -> Atom {
    let mut out = *atom;
    for t in out.0.iter_mut() {
        if !t.is_variable() {
            continue;
        }
        if Some(*t) == marked {
            *t = MARKED;
            continue;
        }
        let next = renaming.len() as u32;
        *t = Term::Var(*renaming.entry(*t).or_insert(next));
    }
    out
}

/// Menor codificação lexicográfica sobre as permutações do corpo.
///
/// Em cada passo só os átomos cuja codificação é mínima são expandidos,
/// o que dá o mínimo exato sem enumerar todas as permutações.
fn canonical_encoding(atoms: &[Atom], marked: Option<Term>) -> CanonicalKey {
    let Some((head, body)) = atoms.split_first() else {
        return CanonicalKey(Box::new([]));
    };
    let mut renaming = HashMap::new();
    let mut prefix = vec![encode_atom(head, &mut renaming, marked)];
    let mut used = vec![false; body.len()];
    let mut best: Option<Vec<Atom>> = None;
    search_min(body, &mut used, &mut prefix, &renaming, marked, &mut best);
    CanonicalKey(best.unwrap_or(prefix).into_boxed_slice())
}

fn search_min(
    body: &[Atom],
    used: &mut [bool],
    prefix: &mut Vec<Atom>,
    renaming: &HashMap<Term, u32>,
    marked: Option<Term>,
    best: &mut Option<Vec<Atom>>,
) {
    if let Some(b) = best.as_ref() {
        if prefix.as_slice() > &b[..prefix.len()] {
            return;
        }
    }
    if used.iter().all(|u| *u) {
        if best.as_ref().map_or(true, |b| prefix.as_slice() < b.as_slice()) {
            *best = Some(prefix.clone());
        }
        return;
    }
    let candidates: Vec<(usize, Atom, HashMap<Term, u32>)> = (0..body.len())
        .filter(|i| !used[*i])
        .map(|i| {
            let mut local = renaming.clone();
            let encoded = encode_atom(&body[i], &mut local, marked);
            (i, encoded, local)
        })
        .collect();
    let Some(min) = candidates.iter().map(|(_, e, _)| *e).min() else {
        return;
    };
    for (i, encoded, local) in candidates {
        if encoded != min {
            continue;
        }
        used[i] = true;
        prefix.push(encoded);
        search_min(body, used, prefix, &local, marked, best);
        prefix.pop();
        used[i] = false;
    }
}

/// Exibe a regra como `corpo   => cabeça`.
pub struct RuleDisplay<'a> {
    rule: &'a Rule,
    interner: &'a Interner,
}

impl fmt::Display for RuleDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for atom in self.rule.body() {
            write!(f, "{}  ", atom.display(self.interner))?;
        }
        write!(f, " => {}", self.rule.head().display(self.interner))
    }
}
