//! # Persistência — Carga de Fatos a partir de Arquivos TSV
//!
//! Cada linha de uma fonte é um fato separado por tabulações:
//!
//! ```text
//! Paris<TAB>locatedIn<TAB>France
//! 42<TAB>Paris<TAB>locatedIn<TAB>France .     (4 colunas: id ignorado)
//! ```
//!
//! Um ponto final opcional é removido antes da separação. Linhas em branco
//! são ignoradas; linhas malformadas (inclusive UTF-8 inválido) geram um
//! `warn!` e a carga continua. A fonte é lida linha a linha, sem carregar o
//! arquivo inteiro na memória.
//! Termos são normalizados em NFC e aparados.
//!
//! ## Concorrência
//!
//! Uma tarefa rayon por fonte. O [`FactStoreBuilder`] fica atrás de um
//! `Mutex` adquirido **por fato**, de modo que as seis estruturas de índice
//! e os contadores são atualizados como uma unidade. Só depois de todas as
//! fontes terminarem a base é publicada como somente leitura.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::Serialize;
use unicode_normalization::UnicodeNormalization;

use crate::store::{FactStore, FactStoreBuilder};

/// Estatísticas de uma carga.
#[derive(Debug, Default, Clone, Serialize)]
pub struct LoadStats {
    pub sources: usize,
    pub lines: u64,
    pub inserted: u64,
    pub duplicates: u64,
    pub malformed: u64,
}

#[derive(Default)]
struct Counters {
    lines: AtomicU64,
    inserted: AtomicU64,
    duplicates: AtomicU64,
    malformed: AtomicU64,
}

fn normalize(term: &str) -> String {
    term.trim().nfc().collect()
}

/// Separa uma linha em `(sujeito, predicado, objeto)`.
///
/// `None` para linhas malformadas (número de colunas errado ou termo vazio).
pub fn parse_line(line: &str) -> Option<(String, String, String)> {
    let mut line = line.trim_end();
    if let Some(stripped) = line.strip_suffix('.') {
        line = stripped.trim_end();
    }
    let columns: Vec<&str> = line.split('\t').collect();
    let (s, p, o) = match columns.as_slice() {
        [s, p, o] => (*s, *p, *o),
        [_id, s, p, o] => (*s, *p, *o),
        _ => return None,
    };
    let (s, p, o) = (normalize(s), normalize(p), normalize(o));
    if s.is_empty() || p.is_empty() || o.is_empty() {
        return None;
    }
    Some((s, p, o))
}

fn load_source(path: &Path, builder: &Mutex<FactStoreBuilder>, counters: &Counters) -> Result<()> {
    let file = File::open(path).with_context(|| format!("Falha ao abrir {}", path.display()))?;
    for (number, bytes) in BufReader::new(file).split(b'\n').enumerate() {
        let mut bytes = bytes.with_context(|| format!("Falha ao ler {}", path.display()))?;
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        let line = match String::from_utf8(bytes) {
            Ok(line) => line,
            Err(_) => {
                counters.lines.fetch_add(1, Ordering::Relaxed);
                counters.malformed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(source = %path.display(), line = number + 1, "Linha com UTF-8 inválido ignorada");
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        counters.lines.fetch_add(1, Ordering::Relaxed);
        let Some((s, p, o)) = parse_line(&line) else {
            counters.malformed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(source = %path.display(), line = number + 1, "Linha malformada ignorada");
            continue;
        };
        let inserted = builder.lock().add(&s, &p, &o);
        let counter = if inserted {
            &counters.inserted
        } else {
            &counters.duplicates
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
    tracing::debug!(source = %path.display(), "Fonte carregada");
    Ok(())
}

/// Carrega todas as fontes em paralelo e publica a base.
///
/// # Erros
///
/// Retorna erro se alguma fonte não puder ser lida. Linhas malformadas
/// não são erro.
pub fn load_facts(sources: &[PathBuf], build_overlaps: bool) -> Result<(FactStore, LoadStats)> {
    let builder = Mutex::new(FactStoreBuilder::new());
    let counters = Counters::default();
    sources
        .par_iter()
        .map(|path| load_source(path, &builder, &counters))
        .collect::<Result<Vec<()>>>()?;

    let stats = LoadStats {
        sources: sources.len(),
        lines: counters.lines.load(Ordering::Relaxed),
        inserted: counters.inserted.load(Ordering::Relaxed),
        duplicates: counters.duplicates.load(Ordering::Relaxed),
        malformed: counters.malformed.load(Ordering::Relaxed),
    };
    tracing::info!(
        sources = stats.sources,
        facts = stats.inserted,
        duplicates = stats.duplicates,
        malformed = stats.malformed,
        "Fontes carregadas"
    );
    let store = builder.into_inner().finish(build_overlaps);
    Ok((store, stats))
}

/// Lê as regras de um arquivo texto, uma por linha (linhas vazias e
/// comentários `#` ignorados).
pub fn read_rule_lines(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Falha ao ler {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}
