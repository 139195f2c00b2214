#![allow(rustdoc::broken_intra_doc_links)]
//! # Horn Miner — Mineração de Regras de Horn
//!
//! **Ponto de entrada** do minerador. Carrega fatos `sujeito predicado
//! objeto` de arquivos TSV, busca regras `corpo => cabeça` em paralelo e
//! imprime uma linha de relatório por regra aceita.
//!
//! ## Fluxo de Execução
//!
//! ```text
//! main()
//!   ├── Configura tracing (stderr, RUST_LOG)
//!   ├── Lê a linha de comando (clap) → MiningConfig → validate()
//!   ├── Carrega as fontes (rayon, uma tarefa por arquivo)
//!   ├── Resolve o viés de linguagem contra a base
//!   ├── mine:  Miner (pool compartilhado ou roubo de trabalho)
//!   │   score: pontua as regras de um arquivo texto
//!   └── Relatório (TSV/JSON) em stdout + resumo JSON opcional
//! ```
//!
//! ## Exemplo de Uso
//!
//! ```bash
//! horn-miner mine --facts yago.tsv --min-pca-conf 0.5 --threads 8
//! RUST_LOG=debug horn-miner mine --facts a.tsv b.tsv --scheduler work-stealing
//! horn-miner score --facts yago.tsv --rules rules.txt
//! ```
//!
//! Códigos de saída: `0` sucesso, `1` configuração inválida ou falha de
//! E/S, `2` erro de linha de comando.

/// Módulo `config` — opções da linha de comando e validação.
mod config;

/// Módulo `core` — termos, átomos, regras e o parser de regras.
mod core;

/// Módulo `inference` — operadores de refinamento, pontuação e aceitação.
mod inference;

/// Módulo `metrics` — contadores da busca e memória do processo.
mod metrics;

/// Módulo `orchestrator` — workers, escalonadores e coleta de resultados.
mod orchestrator;

/// Módulo `persistence` — carga de fatos TSV.
mod persistence;

/// Módulo `report` — linhas de relatório TSV/JSON.
mod report;

/// Módulo `store` — base de fatos indexada e consultas conjuntivas.
mod store;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::config::{MiningArgs, MiningConfig};
use crate::core::{Rule, RuleParser};
use crate::inference::{build_assistant, operators, AssistantContext, LanguageBias};
use crate::metrics::{memory_snapshot, MemorySnapshot, MetricsSnapshot, RunMetrics};
use crate::orchestrator::Miner;
use crate::persistence::LoadStats;
use crate::report::{Columns, ReportFormat, Reporter};
use crate::store::FactStore;

#[derive(Parser)]
#[command(name = "horn-miner")]
#[command(author, version, about = "Mineração de regras de Horn sobre fatos sujeito-predicado-objeto")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Busca regras aceitas pelos limiares configurados.
    Mine {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        mining: MiningArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Pontua as regras de um arquivo texto (`corpo => cabeça` ou `cabeça :- corpo`).
    Score {
        #[command(flatten)]
        input: InputArgs,
        /// Arquivo com uma regra por linha.
        #[arg(long)]
        rules: PathBuf,
        #[command(flatten)]
        mining: MiningArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args, Debug, Clone)]
struct InputArgs {
    /// Arquivos TSV de fatos.
    #[arg(long, required = true, num_args = 1..)]
    facts: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct OutputArgs {
    /// Imprime cada regra assim que é aceita.
    #[arg(long)]
    stream: bool,

    #[arg(long, value_enum, default_value = "tsv")]
    format: ReportFormat,

    /// Inclui a coluna de tempo de pontuação.
    #[arg(long)]
    timing: bool,

    /// Grava um resumo JSON da execução.
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Imprime a configuração efetiva em JSON e sai.
    #[arg(long)]
    print_config: bool,
}

/// Resumo da execução gravado com `--summary`.
#[derive(Serialize)]
struct RunSummary {
    command: &'static str,
    config: MiningConfig,
    load: LoadStats,
    seeds: usize,
    rules: usize,
    counters: MetricsSnapshot,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    memory_after_load: MemorySnapshot,
    memory_after_run: MemorySnapshot,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // erros de linha de comando saem com código 2 pelo próprio clap
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Mine {
            input,
            mining,
            output,
        } => mine(input, mining.into_config(), output),
        Command::Score {
            input,
            rules,
            mining,
            output,
        } => score(input, rules, mining.into_config(), output),
    }
}

/// Valida a configuração, carrega a base e monta o contexto do assistente.
fn prepare(
    input: &InputArgs,
    config: &MiningConfig,
    output: &OutputArgs,
) -> Result<Option<(AssistantContext, LoadStats, MemorySnapshot)>> {
    config.validate().context("Configuração inválida")?;
    if output.print_config {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(None);
    }
    let build_overlaps = config.optimizations.functionality_heuristic;
    let (store, stats) = persistence::load_facts(&input.facts, build_overlaps)?;
    let memory = memory_snapshot();
    tracing::info!(facts = store.size(), memory = %memory.summary_line(), "Base publicada");
    let bias = LanguageBias::resolve(config, &store).context("Configuração inválida")?;
    let context = AssistantContext::new(Arc::new(store), bias, Arc::new(RunMetrics::new()));
    Ok(Some((context, stats, memory)))
}

fn reporter(config: &MiningConfig, output: &OutputArgs) -> Reporter {
    Reporter::new(
        output.format,
        Columns {
            upper_bounds: config.optimizations.confidence_bounds,
            estimate: config.optimizations.functionality_heuristic,
            timing: output.timing,
        },
    )
}

fn print_row(out: &mut impl Write, reporter: &Reporter, store: &FactStore, rule: &Rule) -> std::io::Result<()> {
    match rule.scores() {
        Some(scores) => writeln!(out, "{}", reporter.row(rule, scores, store.interner())),
        None => Ok(()),
    }
}

fn mine(input: InputArgs, config: MiningConfig, output: OutputArgs) -> Result<()> {
    let started_at = Utc::now();
    let Some((context, stats, memory_after_load)) = prepare(&input, &config, &output)? else {
        return Ok(());
    };
    let reporter = reporter(&config, &output);
    if let Some(header) = reporter.header() {
        println!("{header}");
    }

    let metrics = Arc::clone(&context.metrics);
    let store = Arc::clone(&context.store);
    let miner = Miner::new(build_assistant(config.assistant, context), config.scheduler, config.threads);
    let outcome = if output.stream {
        let store = Arc::clone(&store);
        miner.mine_streaming(move |rule| {
            let mut out = std::io::stdout().lock();
            if let Err(err) = print_row(&mut out, &reporter, &store, rule) {
                tracing::warn!(error = %err, "Falha ao escrever regra");
            }
        })
    } else {
        let outcome = miner.mine();
        let mut out = std::io::BufWriter::new(std::io::stdout().lock());
        for rule in &outcome.rules {
            print_row(&mut out, &reporter, &store, rule)?;
        }
        out.flush()?;
        outcome
    };

    let counters = metrics.snapshot();
    let memory_after_run = memory_snapshot();
    tracing::info!(
        rules = outcome.rules.len(),
        candidates = counters.candidates,
        scored = counters.scored,
        pruned_by_bound = counters.pruned_by_bound,
        pruned_by_estimate = counters.pruned_by_estimate,
        unsupported = counters.unsupported,
        memory = %memory_after_run.summary_line(),
        "Resumo"
    );
    if let Some(path) = &output.summary {
        let summary = RunSummary {
            command: "mine",
            config,
            load: stats,
            seeds: outcome.seeds,
            rules: outcome.rules.len(),
            counters,
            started_at,
            finished_at: Utc::now(),
            memory_after_load,
            memory_after_run,
        };
        write_summary(path, &summary)?;
    }
    Ok(())
}

fn score(input: InputArgs, rules: PathBuf, config: MiningConfig, output: OutputArgs) -> Result<()> {
    let started_at = Utc::now();
    let Some((context, stats, memory_after_load)) = prepare(&input, &config, &output)? else {
        return Ok(());
    };
    let lines = persistence::read_rule_lines(&rules)?;
    let parser = RuleParser::new()?;
    let reporter = reporter(&config, &output);
    let assistant = build_assistant(config.assistant, context);
    let store = Arc::clone(&assistant.context().store);

    let mut out = std::io::BufWriter::new(std::io::stdout().lock());
    if let Some(header) = reporter.header() {
        writeln!(out, "{header}")?;
    }
    let mut scored = 0;
    for line in &lines {
        let atoms = match parser.parse(line).and_then(|parsed| parsed.resolve(store.interner())) {
            Ok(atoms) => atoms,
            Err(err) => {
                tracing::warn!(rule = %line, error = %err, "Regra ignorada");
                continue;
            }
        };
        let functional = operators::functional_variable(&store, &atoms[0]);
        let rule = Rule::new(atoms, functional);
        match assistant.score(&rule) {
            Ok(_) => {
                print_row(&mut out, &reporter, &store, &rule)?;
                scored += 1;
            }
            Err(err) => tracing::warn!(rule = %line, error = %err, "Regra não pontuada"),
        }
    }
    out.flush()?;
    tracing::info!(rules = lines.len(), scored, "Pontuação concluída");

    if let Some(path) = &output.summary {
        let summary = RunSummary {
            command: "score",
            config,
            load: stats,
            seeds: 0,
            rules: scored,
            counters: assistant.context().metrics.snapshot(),
            started_at,
            finished_at: Utc::now(),
            memory_after_load,
            memory_after_run: memory_snapshot(),
        };
        write_summary(path, &summary)?;
    }
    Ok(())
}

fn write_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, json).with_context(|| format!("Falha ao gravar {}", path.display()))?;
    tracing::info!(path = %path.display(), "Resumo gravado");
    Ok(())
}
