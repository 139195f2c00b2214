//! # Formas Difíceis — Detecção e Reescrita
//!
//! Uma consulta é **difícil (tipo I)** quando dois átomos da mesma relação
//! convergem no objeto e divergem no sujeito:
//!
//! ```text
//! r(?x, ?z)  r(?y, ?z)        compartilhado: objeto   divergente: sujeito
//! ```
//!
//! Contar pares `(?x, ?y)` nessa forma é quadrático no grau de `?z`.
//! Quando a variável divergente de um dos átomos não aparece em nenhum
//! outro lugar da consulta (e não é a variável contada), o átomo é
//! redundante para a contagem: o outro átomo já testemunha sua existência
//! (basta tomar `?y = ?x`). A reescrita remove esse átomo e a contagem
//! continua exata.

use std::borrow::Cow;

use crate::core::{Atom, Position, Term};

/// Par de átomos em colisão detectado numa consulta.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HardShape {
    /// Posição em que os dois átomos compartilham a variável.
    pub shared: Position,
    /// Posição em que os dois átomos têm variáveis diferentes.
    pub differing: Position,
    /// Índices dos dois átomos na consulta (`first < second`).
    pub first: usize,
    pub second: usize,
}

fn is_binary_pattern(atom: &Atom) -> bool {
    !atom.is_pseudo()
        && atom.predicate().is_constant()
        && atom.subject().is_variable()
        && atom.object().is_variable()
        && atom.subject() != atom.object()
}

/// Todos os pares tipo I, em ordem de índice.
pub fn detect_hard_shapes(atoms: &[Atom]) -> Vec<HardShape> {
    let mut shapes = Vec::new();
    for i in 0..atoms.len() {
        if !is_binary_pattern(&atoms[i]) {
            continue;
        }
        for j in (i + 1)..atoms.len() {
            let (a, b) = (&atoms[i], &atoms[j]);
            if !is_binary_pattern(b) || a.predicate() != b.predicate() {
                continue;
            }
            if a.object() == b.object() && a.subject() != b.subject() {
                shapes.push(HardShape {
                    shared: Position::Object,
                    differing: Position::Subject,
                    first: i,
                    second: j,
                });
            }
        }
    }
    shapes
}

/// Primeiro par tipo I, se houver.
pub fn detect_hard_shape(atoms: &[Atom]) -> Option<HardShape> {
    detect_hard_shapes(atoms).into_iter().next()
}

fn occurrences(atoms: &[Atom], term: Term) -> usize {
    atoms
        .iter()
        .map(|a| a.0.iter().filter(|t| **t == term).count())
        .sum()
}

/// Índice de um átomo do par que pode ser removido sem alterar a contagem
/// de `counted`, se houver. Prefere o átomo de índice maior.
pub fn eliminable_atom(atoms: &[Atom], shape: &HardShape, counted: Term) -> Option<usize> {
    [shape.second, shape.first].into_iter().find(|&idx| {
        let var = atoms[idx].get(shape.differing);
        var != counted && occurrences(atoms, var) == 1
    })
}

/// Remove átomos colidentes redundantes até não restar nenhum removível.
///
/// Retorna a consulta original (emprestada) se nada mudou.
pub fn rewrite_for_counting(query: &[Atom], counted: Term) -> Cow<'_, [Atom]> {
    let mut current: Cow<'_, [Atom]> = Cow::Borrowed(query);
    loop {
        let removable = detect_hard_shapes(&current)
            .iter()
            .find_map(|shape| eliminable_atom(&current, shape, counted));
        match removable {
            Some(idx) => {
                let mut atoms = current.into_owned();
                atoms.remove(idx);
                current = Cow::Owned(atoms);
            }
            None => return current,
        }
    }
}
