//! # Filas por Semente com Roubo de Trabalho
//!
//! Cada semente vira uma [`SeedTask`]: um canal `crossbeam` com os
//! candidatos da subárvore e um contador de pendências. O worker que
//! reivindica a semente fica com ela até a subárvore acabar; depois pega a
//! próxima semente livre ou ajuda uma tarefa em andamento escolhida ao acaso.
//!
//! ## Término
//!
//! `pending` conta candidatos enviados e ainda não processados. Os filhos
//! são somados **antes** de o candidato pai ser descontado, então o
//! contador só chega a zero quando a subárvore acabou de fato. Quem o zera
//! descarta o `Sender` de `done`; todos os workers da tarefa, bloqueados em
//! `select!`, veem o canal desconectado e saem.
//!
//! Uma tarefa reivindicada sempre tem o dono ligado a ela até terminar.
//! Assim, um worker que não encontra semente livre nem tarefa em andamento
//! pode sair: não existe trabalho que ainda possa aparecer.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_channel::{select, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use rand::seq::SliceRandom;

use crate::core::Rule;

use super::Exploration;

struct SeedTask {
    rules_tx: Sender<Rule>,
    rules_rx: Receiver<Rule>,
    pending: AtomicUsize,
    done_tx: Mutex<Option<Sender<()>>>,
    done_rx: Receiver<()>,
    finished: AtomicBool,
}

impl SeedTask {
    fn new(seed: Rule) -> Self {
        let (rules_tx, rules_rx) = unbounded();
        let (done_tx, done_rx) = unbounded();
        let task = Self {
            rules_tx,
            rules_rx,
            pending: AtomicUsize::new(1),
            done_tx: Mutex::new(Some(done_tx)),
            done_rx,
            finished: AtomicBool::new(false),
        };
        // o receptor vive na própria tarefa: o envio não falha
        let _ = task.rules_tx.send(seed);
        task
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    fn complete_one(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.finished.store(true, Ordering::Release);
            self.done_tx.lock().take();
        }
    }

    /// Trabalha na tarefa até a subárvore acabar.
    fn drain(&self, exploration: &Exploration) -> u64 {
        let mut processed = 0;
        loop {
            select! {
                recv(self.rules_rx) -> msg => {
                    let Ok(rule) = msg else { return processed };
                    let children = exploration.process(&rule);
                    self.pending.fetch_add(children.len(), Ordering::AcqRel);
                    for child in children {
                        let _ = self.rules_tx.send(child);
                    }
                    processed += 1;
                    self.complete_one();
                }
                recv(self.done_rx) -> _ => return processed,
            }
        }
    }
}

struct Stealing<'a> {
    exploration: &'a Exploration,
    tasks: Vec<SeedTask>,
    next_seed: AtomicUsize,
}

impl Stealing<'_> {
    fn claim_seed(&self) -> Option<&SeedTask> {
        let index = self.next_seed.fetch_add(1, Ordering::AcqRel);
        self.tasks.get(index)
    }

    fn pick_victim(&self) -> Option<&SeedTask> {
        let running: Vec<&SeedTask> = self.tasks[..self.claimed()]
            .iter()
            .filter(|t| !t.is_finished())
            .collect();
        running.choose(&mut rand::thread_rng()).copied()
    }

    fn claimed(&self) -> usize {
        self.next_seed.load(Ordering::Acquire).min(self.tasks.len())
    }

    fn worker(&self, id: usize) {
        let mut processed = 0;
        let mut stolen = 0u64;
        loop {
            if let Some(task) = self.claim_seed() {
                processed += task.drain(self.exploration);
                continue;
            }
            match self.pick_victim() {
                Some(task) => {
                    stolen += 1;
                    processed += task.drain(self.exploration);
                }
                None => break,
            }
        }
        tracing::debug!(worker = id, processed, stolen, "Worker encerrado");
    }
}

/// Executa a busca com uma fila por semente e roubo de trabalho.
pub fn run(exploration: &Exploration, seeds: Vec<Rule>, threads: usize) {
    let stealing = Stealing {
        exploration,
        tasks: seeds.into_iter().map(SeedTask::new).collect(),
        next_seed: AtomicUsize::new(0),
    };
    std::thread::scope(|scope| {
        for id in 0..threads {
            let stealing = &stealing;
            scope.spawn(move || stealing.worker(id));
        }
    });
    debug_assert!(stealing.tasks.iter().all(SeedTask::is_finished));
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
    fn seed_task_finishes_when_subtree_is_empty() {
        let exploration = exploration(FactStore::from_triples([("a", "r", "b")]));
        let seeds = exploration.admit(exploration.assistant.seed_atoms(0));
        let task = SeedTask::new(seeds[0].clone());
        task.drain(&exploration);
        assert!(task.is_finished());
        assert_eq!(task.pending.load(Ordering::Acquire), 0);
    }

    #[test]
    fn unbalanced_seeds_terminate_with_many_workers() {
        // `r` tem uma subárvore grande, `t` quase nenhuma
        let exploration = exploration(FactStore::from_triples([
            ("a", "r", "b"),
            ("b", "r", "c"),
            ("c", "r", "a"),
            ("a", "s", "b"),
            ("b", "s", "c"),
            ("c", "s", "a"),
            ("x", "t", "y"),
        ]));
        let seeds = exploration.admit(exploration.assistant.seed_atoms(0));
        assert_eq!(seeds.len(), 3);
        run(&exploration, seeds, 8);
        assert!(!exploration.results.is_empty());
    }

    #[test]
    fn no_seeds_no_work() {
        let exploration = exploration(FactStore::from_triples([("a", "r", "b")]));
        run(&exploration, Vec::new(), 3);
        assert!(exploration.results.is_empty());
    }
}
