//! # Coleção de Resultados
//!
//! Lista de regras aceitas com índice secundário por [`HeadKey`]. Lista,
//! índice e a condição do consumidor ficam sob **um único** mutex: inserir
//! e acordar o consumidor é uma operação atômica.
//!
//! ```text
//! workers ──insert()──▶ [ rules | by_head ] ──notify──▶ consume()
//!                              │
//!                        finish() encerra o consumidor
//! ```

use std::collections::HashMap;

use parking_lot::{Condvar, Mutex};

use crate::core::{HeadKey, Rule};

#[derive(Default)]
struct Collected {
    rules: Vec<Rule>,
    by_head: HashMap<HeadKey, Vec<usize>>,
    finished: bool,
}

#[derive(Default)]
pub struct ResultSet {
    inner: Mutex<Collected>,
    arrived: Condvar,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insere a regra se nenhuma estruturalmente igual já estiver presente.
    pub fn insert(&self, rule: Rule) -> bool {
        let mut inner = self.inner.lock();
        let key = rule.head_key();
        let duplicate = inner
            .by_head
            .get(&key)
            .is_some_and(|bucket| bucket.iter().any(|&i| inner.rules[i] == rule));
        if duplicate {
            return false;
        }
        let index = inner.rules.len();
        inner.rules.push(rule);
        inner.by_head.entry(key).or_default().push(index);
        self.arrived.notify_all();
        true
    }

    /// Marca o fim da busca e acorda o consumidor.
    pub fn finish(&self) {
        self.inner.lock().finished = true;
        self.arrived.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entrega cada regra na ordem de chegada, bloqueando na condição até
    /// haver novas regras. Retorna quando [`finish`](Self::finish) foi
    /// chamado e tudo foi entregue.
    pub fn consume(&self, mut sink: impl FnMut(&Rule)) {
        let mut delivered = 0;
        loop {
            let batch: Vec<Rule> = {
                let mut inner = self.inner.lock();
                while inner.rules.len() == delivered && !inner.finished {
                    self.arrived.wait(&mut inner);
                }
                if inner.rules.len() == delivered {
                    return;
                }
                inner.rules[delivered..].to_vec()
            };
            delivered += batch.len();
            for rule in &batch {
                sink(rule);
            }
        }
    }

    /// Regras em ordem canônica (cabeça, depois forma), independente da
    /// ordem de descoberta.
    pub fn sorted(&self) -> Vec<Rule> {
        let mut rules = self.inner.lock().rules.clone();
        rules.sort_by(|a, b| {
            a.head_key()
                .cmp(&b.head_key())
                .then_with(|| a.canonical_key().cmp(b.canonical_key()))
        });
        rules
    }
}
