//! # Registro de Cardinalidades de Relações
//!
//! Mapa `relação → número de fatos`, compartilhado por referência entre
//! todos os workers. É povoado no início com as relações de cabeça
//! permitidas e completado sob demanda quando uma relação nova aparece
//! como cabeça (ex.: ao pontuar regras lidas de um arquivo).
//!
//! Único estado mutável compartilhado do assistente: leituras usam o
//! `RwLock` em modo compartilhado; a inserção é *insert-if-absent*
//! (a primeira escrita vence).

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::core::Term;
use crate::store::FactStore;

#[derive(Debug, Default)]
pub struct RelationRegistry {
    sizes: RwLock<HashMap<Term, u64>>,
}

impl RelationRegistry {
    /// Registro pré-carregado com as relações aceitas por `filter`.
    pub fn populate(store: &FactStore, filter: impl Fn(Term) -> bool) -> Self {
        let sizes = store
            .relations()
            .into_iter()
            .filter(|r| filter(*r))
            .map(|r| (r, store.relation_size(r)))
            .collect();
        Self {
            sizes: RwLock::new(sizes),
        }
    }

    pub fn get(&self, relation: Term) -> Option<u64> {
        self.sizes.read().get(&relation).copied()
    }

    /// Tamanho registrado, ou calculado e inserido se ausente.
    pub fn get_or_insert_with(&self, relation: Term, compute: impl FnOnce() -> u64) -> u64 {
        if let Some(size) = self.get(relation) {
            return size;
        }
        let size = compute();
        *self.sizes.write().entry(relation).or_insert(size)
    }

    /// Atalho: tamanho da relação segundo a base.
    pub fn relation_size(&self, store: &FactStore, relation: Term) -> u64 {
        self.get_or_insert_with(relation, || store.relation_size(relation))
    }

    pub fn len(&self) -> usize {
        self.sizes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn first_insert_wins() {
        let registry = RelationRegistry::default();
        let r = Term::Const(10);
        assert_eq!(registry.get_or_insert_with(r, || 5), 5);
        assert_eq!(registry.get_or_insert_with(r, || 9), 5);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn concurrent_insert_if_absent() {
        let registry = Arc::new(RelationRegistry::default());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.get_or_insert_with(Term::Const(3), || 100 + i))
            })
            .collect();
        let seen: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let stored = registry.get(Term::Const(3)).unwrap();
        assert!((100..108).contains(&stored));
        assert!(seen.iter().all(|v| *v == stored));
    }

    #[test]
    fn populate_respects_filter() {
        let store = FactStore::from_triples([("a", "r", "b"), ("a", "s", "b"), ("c", "s", "d")]);
        let r = store.lookup("r").unwrap();
        let s = store.lookup("s").unwrap();
        let registry = RelationRegistry::populate(&store, |rel| rel == s);
        assert_eq!(registry.get(s), Some(2));
        assert_eq!(registry.get(r), None);
        assert_eq!(registry.relation_size(&store, r), 1);
    }
}
