//! # Pool Compartilhado
//!
//! Todos os workers drenam uma única fila protegida por mutex. O término é
//! detectado pelo contador atômico de workers ativos: quem o leva a zero
//! encontrou a fila vazia com todos os outros ociosos, então não há mais
//! trabalho possível.
//!
//! ```text
//! pop ──▶ process ──▶ push filhos ──▶ pop ...
//!  │ vazio
//!  └──▶ active -= 1 ── zero? ──▶ done, acorda todos
//!                      └── não: espera na condição
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::core::Rule;

use super::Exploration;

struct Pool {
    queue: VecDeque<Rule>,
    done: bool,
}

struct SharedPool<'a> {
    exploration: &'a Exploration,
    pool: Mutex<Pool>,
    work: Condvar,
    /// Workers não ociosos. Só muda com o mutex da fila em mãos.
    active: AtomicUsize,
}

impl SharedPool<'_> {
    fn worker(&self, id: usize) {
        let mut processed = 0u64;
        let mut pool = self.pool.lock();
        loop {
            if let Some(rule) = pool.queue.pop_front() {
                drop(pool);
                let children = self.exploration.process(&rule);
                processed += 1;
                pool = self.pool.lock();
                if !children.is_empty() {
                    pool.queue.extend(children);
                    self.work.notify_all();
                }
                continue;
            }
            if self.active.fetch_sub(1, Ordering::AcqRel) == 1 {
                pool.done = true;
                self.work.notify_all();
                break;
            }
            while pool.queue.is_empty() && !pool.done {
                self.work.wait(&mut pool);
            }
            if pool.done {
                break;
            }
            self.active.fetch_add(1, Ordering::AcqRel);
        }
        tracing::debug!(worker = id, processed, "Worker encerrado");
    }
}

/// Executa a busca com `threads` workers sobre uma fila única.
pub fn run(exploration: &Exploration, seeds: Vec<Rule>, threads: usize) {
    let shared = SharedPool {
        exploration,
        pool: Mutex::new(Pool {
            queue: seeds.into(),
            done: false,
        }),
        work: Condvar::new(),
        active: AtomicUsize::new(threads),
    };
    std::thread::scope(|scope| {
        for id in 0..threads {
            let shared = &shared;
            scope.spawn(move || shared.worker(id));
        }
    });
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::inference::bias::{LanguageBias, PruningMetric};
    use crate::inference::{AssistantContext, StandardAssistant};
    use crate::metrics::RunMetrics;
    use crate::orchestrator::ResultSet;
    use crate::store::FactStore;

    fn exploration(store: FactStore) -> Exploration {
        let bias = LanguageBias {
            pruning: PruningMetric::Support(1),
            ..LanguageBias::default()
        };
        let context = AssistantContext::new(Arc::new(store), bias, Arc::new(RunMetrics::new()));
        Exploration::new(Arc::new(StandardAssistant::new(context)), Arc::new(ResultSet::new()))
    }

    #[test]
    fn terminates_without_seeds() {
        let exploration = exploration(FactStore::from_triples([("a", "r", "b")]));
        run(&exploration, Vec::new(), 4);
        assert!(exploration.results.is_empty());
    }

    #[test]
    fn more_threads_than_work_still_terminates() {
        let exploration = exploration(FactStore::from_triples([("a", "r", "b"), ("a", "s", "b")]));
        let seeds = exploration.admit(exploration.assistant.seed_atoms(0));
        run(&exploration, seeds, 16);
        let candidates = exploration.assistant.context().metrics.snapshot().candidates;
        assert!(candidates >= 2);
        assert!(!exploration.results.is_empty());
    }
}
