//! # Métricas da Execução
//!
//! Dois tipos de métrica:
//!
//! | Tipo | Conteúdo | Fonte |
//! |------|----------|-------|
//! | [`RunMetrics`] | contadores da busca (candidatos, podas, aceitas) | atômicos, incrementados pelos workers |
//! | [`MemorySnapshot`] | RAM do processo e do sistema | `sysinfo` |
//!
//! Os contadores usam `Ordering::Relaxed`: são apenas estatística, nunca
//! participam da detecção de término.
//!
//! ## Estado Persistente (System singleton)
//!
//! Mantemos uma única instância [`System`] via [`OnceLock`] + [`Mutex`],
//! reutilizada em todas as coletas.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use sysinfo::{Pid, ProcessesToUpdate, System};

static SYS: OnceLock<Mutex<System>> = OnceLock::new();

fn system() -> &'static Mutex<System> {
    SYS.get_or_init(|| Mutex::new(System::new()))
}

/// Contadores da busca, compartilhados via `Arc` entre os workers.
#[derive(Debug, Default)]
pub struct RunMetrics {
    candidates: AtomicU64,
    duplicates: AtomicU64,
    scored: AtomicU64,
    pruned_by_bound: AtomicU64,
    pruned_by_estimate: AtomicU64,
    rejected: AtomicU64,
    accepted: AtomicU64,
    unsupported: AtomicU64,
    slow_queries: AtomicU64,
}

/// Evento contado em [`RunMetrics`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    Candidate,
    Duplicate,
    Scored,
    PrunedByBound,
    PrunedByEstimate,
    Rejected,
    Accepted,
    Unsupported,
    SlowQuery,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, event: Event) -> &AtomicU64 {
        match event {
            Event::Candidate => &self.candidates,
            Event::Duplicate => &self.duplicates,
            Event::Scored => &self.scored,
            Event::PrunedByBound => &self.pruned_by_bound,
            Event::PrunedByEstimate => &self.pruned_by_estimate,
            Event::Rejected => &self.rejected,
            Event::Accepted => &self.accepted,
            Event::Unsupported => &self.unsupported,
            Event::SlowQuery => &self.slow_queries,
        }
    }

    pub fn record(&self, event: Event) {
        self.counter(event).fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, event: Event) -> u64 {
        self.counter(event).load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            candidates: self.get(Event::Candidate),
            duplicates: self.get(Event::Duplicate),
            scored: self.get(Event::Scored),
            pruned_by_bound: self.get(Event::PrunedByBound),
            pruned_by_estimate: self.get(Event::PrunedByEstimate),
            rejected: self.get(Event::Rejected),
            accepted: self.get(Event::Accepted),
            unsupported: self.get(Event::Unsupported),
            slow_queries: self.get(Event::SlowQuery),
        }
    }
}

/// Cópia serializável dos contadores.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub candidates: u64,
    pub duplicates: u64,
    pub scored: u64,
    pub pruned_by_bound: u64,
    pub pruned_by_estimate: u64,
    pub rejected: u64,
    pub accepted: u64,
    pub unsupported: u64,
    pub slow_queries: u64,
}

/// Uso de memória em um instante.
#[derive(Clone, Debug, Serialize)]
pub struct MemorySnapshot {
    pub taken_at: DateTime<Utc>,
    /// Memória RSS do processo em MB.
    pub process_mb: f64,
    /// Memória total do sistema em MB.
    pub total_mb: f64,
}

impl MemorySnapshot {
    pub fn summary_line(&self) -> String {
        format!("RAM {:.1} MB / {:.0} MB", self.process_mb, self.total_mb)
    }
}

pub fn memory_snapshot() -> MemorySnapshot {
    let pid = Pid::from_u32(std::process::id());
    let mut sys = system().lock();
    sys.refresh_memory();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), false);
    let process_mb = sys
        .process(pid)
        .map(|p| p.memory() as f64 / (1024.0 * 1024.0))
        .unwrap_or(0.0);
    let total_mb = sys.total_memory() as f64 / (1024.0 * 1024.0);
    MemorySnapshot {
        taken_at: Utc::now(),
        process_mb,
        total_mb,
    }
}
