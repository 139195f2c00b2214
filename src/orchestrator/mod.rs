//! # Orquestrador — A Busca por Níveis
//!
//! O [`Miner`] conduz a busca: parte das regras-semente do assistente,
//! processa cada candidato em um pool fixo de threads do sistema e coleta
//! as regras aceitas em um [`ResultSet`].
//!
//! ## Ciclo de um Candidato
//!
//! ```text
//! candidato
//!   │
//!   ├── fechado? ── prefilter ── score ── passes_thresholds ── ResultSet
//!   │
//!   └── perfeito? não → refine() → filhos inéditos → fila
//! ```
//!
//! ## Escalonadores
//!
//! | Variante | Fila | Término |
//! |----------|------|---------|
//! | [`SchedulerKind::SharedPool`] | uma fila compartilhada | contador atômico de workers ativos |
//! | [`SchedulerKind::WorkStealing`] | um canal por semente | pendências por semente + roubo aleatório |
//!
//! ## Deduplicação
//!
//! Cada filho é expandido no máximo uma vez: a chave de expansão (forma
//! canônica + variável recém-criada) entra em um conjunto compartilhado
//! antes de o filho ir para a fila. O conjunto de regras exploradas, e com
//! ele o conjunto de regras aceitas, não depende do número de threads.

pub mod results;
pub mod shared_pool;
pub mod work_stealing;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::{CanonicalKey, Rule};
use crate::inference::{MiningAssistant, Verdict};
use crate::metrics::Event;
use crate::store::{StoreError, StoreResult};

pub use results::ResultSet;

/// Variante de escalonamento dos workers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulerKind {
    SharedPool,
    WorkStealing,
}

/// Estado compartilhado por todos os workers de uma execução.
pub struct Exploration {
    assistant: Arc<dyn MiningAssistant>,
    results: Arc<ResultSet>,
    expanded: Mutex<HashSet<CanonicalKey>>,
}

impl Exploration {
    fn new(assistant: Arc<dyn MiningAssistant>, results: Arc<ResultSet>) -> Self {
        Self {
            assistant,
            results,
            expanded: Mutex::new(HashSet::new()),
        }
    }

    /// Registra a chave de expansão; `false` se a regra já foi vista.
    fn claim(&self, rule: &Rule) -> bool {
        self.expanded.lock().insert(rule.expansion_key().clone())
    }

    /// Mantém só as regras ainda não vistas.
    pub fn admit(&self, rules: Vec<Rule>) -> Vec<Rule> {
        let metrics = &self.assistant.context().metrics;
        rules
            .into_iter()
            .filter(|rule| {
                let fresh = self.claim(rule);
                if !fresh {
                    metrics.record(Event::Duplicate);
                }
                fresh
            })
            .collect()
    }

    /// Processa um candidato e devolve os filhos inéditos.
    ///
    /// Formas de consulta não suportadas são registradas e o candidato é
    /// descartado; nunca interrompem a execução.
    pub fn process(&self, rule: &Rule) -> Vec<Rule> {
        let context = self.assistant.context();
        context.metrics.record(Event::Candidate);
        match self.evaluate_and_refine(rule) {
            Ok(children) => self.admit(children),
            Err(StoreError::Unsupported(reason)) => {
                context.metrics.record(Event::Unsupported);
                tracing::warn!(
                    rule = %rule.display(context.store.interner()),
                    reason = %reason,
                    "Consulta não suportada, candidato descartado"
                );
                Vec::new()
            }
            Err(err) => {
                context.metrics.record(Event::Unsupported);
                tracing::warn!(
                    rule = %rule.display(context.store.interner()),
                    error = %err,
                    "Candidato descartado"
                );
                Vec::new()
            }
        }
    }

    fn evaluate_and_refine(&self, rule: &Rule) -> StoreResult<Vec<Rule>> {
        if rule.is_closed() {
            self.evaluate(rule)?;
        }
        if self.assistant.is_perfect(rule) {
            tracing::debug!(
                rule = %rule.display(self.assistant.context().store.interner()),
                "Regra perfeita, sem refinamento"
            );
            return Ok(Vec::new());
        }
        self.assistant.refine(rule)
    }

    fn evaluate(&self, rule: &Rule) -> StoreResult<()> {
        let context = self.assistant.context();
        let approximation = match self.assistant.prefilter(rule)? {
            Verdict::Keep(approximation) => approximation,
            Verdict::BelowUpperBound(bound) => {
                context.metrics.record(Event::PrunedByBound);
                tracing::debug!(bound, "Descartada pelo limite superior");
                return Ok(());
            }
            Verdict::BelowEstimate(estimate) => {
                context.metrics.record(Event::PrunedByEstimate);
                tracing::debug!(estimate, "Descartada pela estimativa de funcionalidade");
                return Ok(());
            }
        };
        self.assistant.score_annotated(rule, approximation)?;
        context.metrics.record(Event::Scored);
        if self.assistant.passes_thresholds(rule)? {
            if self.results.insert(rule.clone()) {
                context.metrics.record(Event::Accepted);
                tracing::debug!(rule = %rule.display(context.store.interner()), "Regra aceita");
            }
        } else {
            context.metrics.record(Event::Rejected);
        }
        Ok(())
    }
}

/// Resultado de uma execução completa.
pub struct MiningOutcome {
    /// Regras aceitas em ordem canônica.
    pub rules: Vec<Rule>,
    pub seeds: usize,
    pub elapsed: Duration,
}

/// Busca paralela de regras sobre um assistente já configurado.
pub struct Miner {
    assistant: Arc<dyn MiningAssistant>,
    scheduler: SchedulerKind,
    threads: usize,
}

impl Miner {
    pub fn new(assistant: Arc<dyn MiningAssistant>, scheduler: SchedulerKind, threads: usize) -> Self {
        Self {
            assistant,
            scheduler,
            threads: threads.max(1),
        }
    }

    pub fn assistant(&self) -> &Arc<dyn MiningAssistant> {
        &self.assistant
    }

    pub fn mine(&self) -> MiningOutcome {
        self.mine_streaming(|_| {})
    }

    /// Executa a busca; `sink` recebe cada regra aceita na ordem de chegada,
    /// em uma thread consumidora dedicada.
    pub fn mine_streaming(&self, sink: impl FnMut(&Rule) + Send) -> MiningOutcome {
        let started = Instant::now();
        let results = Arc::new(ResultSet::new());
        let exploration = Exploration::new(Arc::clone(&self.assistant), Arc::clone(&results));
        let min_support = self.assistant.context().bias.min_initial_support;
        let seeds = exploration.admit(self.assistant.seed_atoms(min_support));
        let seed_count = seeds.len();
        tracing::info!(
            assistant = self.assistant.name(),
            scheduler = ?self.scheduler,
            threads = self.threads,
            seeds = seed_count,
            "Iniciando mineração"
        );

        std::thread::scope(|scope| {
            let consumer = {
                let results = Arc::clone(&results);
                scope.spawn(move || results.consume(sink))
            };
            match self.scheduler {
                SchedulerKind::SharedPool => shared_pool::run(&exploration, seeds, self.threads),
                SchedulerKind::WorkStealing => work_stealing::run(&exploration, seeds, self.threads),
            }
            results.finish();
            if consumer.join().is_err() {
                tracing::error!("Consumidor de resultados terminou com pânico");
            }
        });

        let rules = results.sorted();
        let elapsed = started.elapsed();
        tracing::info!(
            rules = rules.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Mineração concluída"
        );
        MiningOutcome {
            rules,
            seeds: seed_count,
            elapsed,
        }
    }
}
