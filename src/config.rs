//! # Configuração da Mineração
//!
//! [`MiningConfig`] é a forma serializável de todas as opções de uma
//! execução. Vem da linha de comando ([`MiningArgs`]) e é validada antes de
//! qualquer carregamento; `--print-config` a imprime como JSON.
//!
//! | Grupo | Campos |
//! |-------|--------|
//! | poda | `pruning`, `min_initial_support` |
//! | linguagem | `max_len`, `recursion_limit`, `constants`, listas de relações |
//! | aceitação | `min_std_confidence`, `min_pca_confidence`, `confidence_metric` |
//! | execução | `assistant`, `scheduler`, `threads` |
//! | ajuste fino | `optimizations`, `approximation_min_relation_size`, `slow_query_ms` |

use std::collections::HashSet;

use clap::Args;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::ConfidenceMetric;
use crate::inference::{AssistantKind, ConstantPolicy, Optimizations, PruningMetric};
use crate::orchestrator::SchedulerKind;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{name} deve estar em [0, 1], recebido {value}")]
    OutOfRange { name: &'static str, value: f64 },
    #[error("max-len deve ser ao menos 2, recebido {0}")]
    MaxLenTooSmall(usize),
    #[error("recursion-limit deve ser ao menos 1")]
    ZeroRecursionLimit,
    #[error("threads deve ser ao menos 1")]
    ZeroThreads,
    #[error("relação '{relation}' aparece em {scope}-targets e {scope}-excluded")]
    ConflictingRelation { relation: String, scope: &'static str },
}

fn default_threads() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    pub pruning: PruningMetric,
    pub min_initial_support: u64,
    pub max_len: usize,
    pub recursion_limit: usize,
    pub constants: ConstantPolicy,
    pub head_targets: Vec<String>,
    pub head_excluded: Vec<String>,
    pub body_targets: Vec<String>,
    pub body_excluded: Vec<String>,
    pub min_std_confidence: f64,
    pub min_pca_confidence: f64,
    pub confidence_metric: ConfidenceMetric,
    pub assistant: AssistantKind,
    pub scheduler: SchedulerKind,
    pub threads: usize,
    pub optimizations: Optimizations,
    pub approximation_min_relation_size: u64,
    pub slow_query_ms: u64,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            pruning: PruningMetric::HeadCoverage(0.01),
            min_initial_support: 0,
            max_len: 3,
            recursion_limit: 3,
            constants: ConstantPolicy::Forbid,
            head_targets: Vec::new(),
            head_excluded: Vec::new(),
            body_targets: Vec::new(),
            body_excluded: Vec::new(),
            min_std_confidence: 0.0,
            min_pca_confidence: 0.0,
            confidence_metric: ConfidenceMetric::Pca,
            assistant: AssistantKind::Standard,
            scheduler: SchedulerKind::SharedPool,
            threads: default_threads(),
            optimizations: Optimizations::default(),
            approximation_min_relation_size: 0,
            slow_query_ms: 1000,
        }
    }
}

fn check_ratio(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { name, value })
    }
}

fn check_disjoint(targets: &[String], excluded: &[String], scope: &'static str) -> Result<(), ConfigError> {
    let excluded: HashSet<&String> = excluded.iter().collect();
    match targets.iter().find(|t| excluded.contains(t)) {
        Some(relation) => Err(ConfigError::ConflictingRelation {
            relation: relation.clone(),
            scope,
        }),
        None => Ok(()),
    }
}

impl MiningConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let PruningMetric::HeadCoverage(min_hc) = self.pruning {
            check_ratio("min-hc", min_hc)?;
        }
        check_ratio("min-std-conf", self.min_std_confidence)?;
        check_ratio("min-pca-conf", self.min_pca_confidence)?;
        if self.max_len < 2 {
            return Err(ConfigError::MaxLenTooSmall(self.max_len));
        }
        if self.recursion_limit == 0 {
            return Err(ConfigError::ZeroRecursionLimit);
        }
        if self.threads == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        check_disjoint(&self.head_targets, &self.head_excluded, "head")?;
        check_disjoint(&self.body_targets, &self.body_excluded, "body")?;
        Ok(())
    }
}

/// Opções de mineração da linha de comando.
#[derive(Args, Debug, Clone)]
pub struct MiningArgs {
    /// Suporte absoluto mínimo (substitui a cobertura de cabeça).
    #[arg(long, conflicts_with = "min_hc")]
    pub min_support: Option<u64>,

    /// Cobertura de cabeça mínima.
    #[arg(long)]
    pub min_hc: Option<f64>,

    /// Relações com menos fatos não viram sementes.
    #[arg(long, default_value_t = 0)]
    pub min_initial_support: u64,

    /// Número máximo de átomos por regra, cabeça incluída.
    #[arg(long, default_value_t = 3)]
    pub max_len: usize,

    /// Repetições máximas de uma relação no corpo.
    #[arg(long, default_value_t = 3)]
    pub recursion_limit: usize,

    #[arg(long, value_enum, default_value = "forbid")]
    pub constants: ConstantPolicy,

    #[arg(long, value_delimiter = ',')]
    pub head_targets: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    pub head_excluded: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    pub body_targets: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    pub body_excluded: Vec<String>,

    #[arg(long, default_value_t = 0.0)]
    pub min_std_conf: f64,

    #[arg(long, default_value_t = 0.0)]
    pub min_pca_conf: f64,

    /// Métrica usada pelo filtro skyline.
    #[arg(long, value_enum, default_value = "pca")]
    pub confidence_metric: ConfidenceMetric,

    #[arg(long, value_enum, default_value = "standard")]
    pub assistant: AssistantKind,

    #[arg(long, value_enum, default_value = "shared-pool")]
    pub scheduler: SchedulerKind,

    /// Padrão: paralelismo disponível.
    #[arg(long)]
    pub threads: Option<usize>,

    #[arg(long)]
    pub no_rewriting: bool,

    #[arg(long)]
    pub no_confidence_bounds: bool,

    #[arg(long)]
    pub functionality_heuristic: bool,

    #[arg(long)]
    pub no_skyline: bool,

    #[arg(long)]
    pub no_perfect_pruning: bool,

    /// A estimativa por funcionalidade só vale para cabeças com ao menos N fatos.
    #[arg(long, default_value_t = 0)]
    pub approximation_min_relation_size: u64,

    /// Consultas acima deste tempo geram aviso.
    #[arg(long, default_value_t = 1000)]
    pub slow_query_ms: u64,
}

impl MiningArgs {
    pub fn into_config(self) -> MiningConfig {
        let pruning = match (self.min_support, self.min_hc) {
            (Some(min), _) => PruningMetric::Support(min),
            (None, Some(min_hc)) => PruningMetric::HeadCoverage(min_hc),
            (None, None) => PruningMetric::HeadCoverage(0.01),
        };
        MiningConfig {
            pruning,
            min_initial_support: self.min_initial_support,
            max_len: self.max_len,
            recursion_limit: self.recursion_limit,
            constants: self.constants,
            head_targets: self.head_targets,
            head_excluded: self.head_excluded,
            body_targets: self.body_targets,
            body_excluded: self.body_excluded,
            min_std_confidence: self.min_std_conf,
            min_pca_confidence: self.min_pca_conf,
            confidence_metric: self.confidence_metric,
            assistant: self.assistant,
            scheduler: self.scheduler,
            threads: self.threads.unwrap_or_else(default_threads),
            optimizations: Optimizations {
                rewriting: !self.no_rewriting,
                confidence_bounds: !self.no_confidence_bounds,
                functionality_heuristic: self.functionality_heuristic,
                skyline: !self.no_skyline,
                perfect_pruning: !self.no_perfect_pruning,
            },
            approximation_min_relation_size: self.approximation_min_relation_size,
            slow_query_ms: self.slow_query_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        mining: MiningArgs,
    }

    fn parse(args: &[&str]) -> MiningConfig {
        let mut argv = vec!["test"];
        argv.extend_from_slice(args);
        TestCli::parse_from(argv).mining.into_config()
    }

    #[test]
    fn defaults_are_valid() {
        let config = parse(&[]);
        assert_eq!(config.pruning, PruningMetric::HeadCoverage(0.01));
        assert_eq!(config.max_len, 3);
        assert!(config.optimizations.skyline);
        assert!(!config.optimizations.functionality_heuristic);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn flags_map_onto_the_config() {
        let config = parse(&[
            "--min-support",
            "5",
            "--max-len",
            "4",
            "--constants",
            "allow",
            "--head-targets",
            "livesIn,citizenOf",
            "--assistant",
            "lazy",
            "--scheduler",
            "work-stealing",
            "--threads",
            "2",
            "--no-skyline",
        ]);
        assert_eq!(config.pruning, PruningMetric::Support(5));
        assert_eq!(config.max_len, 4);
        assert_eq!(config.constants, ConstantPolicy::Allow);
        assert_eq!(config.head_targets, vec!["livesIn", "citizenOf"]);
        assert_eq!(config.assistant, AssistantKind::Lazy);
        assert_eq!(config.scheduler, SchedulerKind::WorkStealing);
        assert_eq!(config.threads, 2);
        assert!(!config.optimizations.skyline);
    }

    #[test]
    fn support_and_head_coverage_conflict() {
        let argv = ["test", "--min-support", "3", "--min-hc", "0.1"];
        assert!(TestCli::try_parse_from(argv).is_err());
    }

    #[test]
    fn invalid_values_fail_validation() {
        let config = MiningConfig {
            min_pca_confidence: 1.5,
            ..MiningConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::OutOfRange { .. })));

        let config = MiningConfig {
            max_len: 1,
            ..MiningConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::MaxLenTooSmall(1)));

        let config = MiningConfig {
            body_targets: vec!["r".into()],
            body_excluded: vec!["r".into()],
            ..MiningConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ConflictingRelation { scope: "body", .. })
        ));
    }

    #[test]
    fn config_serializes_for_print_config() {
        let json = serde_json::to_string(&MiningConfig::default()).unwrap();
        assert!(json.contains("\"pruning\":{\"metric\":\"head-coverage\",\"threshold\":0.01}"));
        let back: MiningConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, MiningConfig::default());
    }
}
