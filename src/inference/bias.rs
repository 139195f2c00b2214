//! # Viés de Linguagem
//!
//! O [`LanguageBias`] é a configuração imutável de uma execução, já
//! resolvida contra a base de fatos (nomes de relações → [`Term`]).
//! Os operadores o consultam **antes** de despachar qualquer contagem.
//!
//! | Restrição | Campo |
//! |-----------|-------|
//! | tamanho máximo da regra | `max_len` |
//! | repetições por relação | `recursion_limit` |
//! | uso de constantes | `constants` |
//! | relações de cabeça / corpo | `head_*`, `body_*` |
//! | camadas de otimização | `optimizations` |

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, MiningConfig};
use crate::core::{ConfidenceMetric, Term};
use crate::store::FactStore;

/// Política de uso de constantes nas regras.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ConstantPolicy {
    /// Nenhuma instanciação.
    Forbid,
    /// Instanciação permitida.
    Allow,
    /// Regras aceitas precisam conter ao menos uma constante.
    Require,
}

/// Métrica de poda por suporte e seu limiar.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "metric", content = "threshold")]
pub enum PruningMetric {
    /// Suporte absoluto mínimo.
    Support(u64),
    /// Cobertura de cabeça mínima, em `[0, 1]`.
    HeadCoverage(f64),
}

/// Liga/desliga de cada camada de otimização.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Optimizations {
    pub rewriting: bool,
    pub confidence_bounds: bool,
    pub functionality_heuristic: bool,
    pub skyline: bool,
    pub perfect_pruning: bool,
}

impl Default for Optimizations {
    fn default() -> Self {
        Self {
            rewriting: true,
            confidence_bounds: true,
            functionality_heuristic: false,
            skyline: true,
            perfect_pruning: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LanguageBias {
    pub max_len: usize,
    pub recursion_limit: usize,
    pub constants: ConstantPolicy,
    pub pruning: PruningMetric,
    pub min_initial_support: u64,
    pub min_std_confidence: f64,
    pub min_pca_confidence: f64,
    pub confidence_metric: ConfidenceMetric,
    pub head_targets: Option<HashSet<Term>>,
    pub head_excluded: HashSet<Term>,
    pub body_targets: Option<HashSet<Term>>,
    pub body_excluded: HashSet<Term>,
    pub optimizations: Optimizations,
    pub approximation_min_relation_size: u64,
    pub slow_query: Duration,
}

impl Default for LanguageBias {
    fn default() -> Self {
        Self {
            max_len: 3,
            recursion_limit: 3,
            constants: ConstantPolicy::Forbid,
            pruning: PruningMetric::HeadCoverage(0.01),
            min_initial_support: 0,
            min_std_confidence: 0.0,
            min_pca_confidence: 0.0,
            confidence_metric: ConfidenceMetric::Pca,
            head_targets: None,
            head_excluded: HashSet::new(),
            body_targets: None,
            body_excluded: HashSet::new(),
            optimizations: Optimizations::default(),
            approximation_min_relation_size: 0,
            slow_query: Duration::from_millis(1000),
        }
    }
}

/// Resolve nomes de relações; nomes desconhecidos geram aviso e são ignorados.
fn resolve_names(store: &FactStore, names: &[String], scope: &str) -> HashSet<Term> {
    names
        .iter()
        .filter_map(|name| {
            let term = store.lookup(name);
            if term.is_none() {
                tracing::warn!(relation = %name, scope, "Relação desconhecida no viés de linguagem");
            }
            term
        })
        .collect()
}

fn resolve_targets(store: &FactStore, names: &[String], scope: &str) -> Option<HashSet<Term>> {
    if names.is_empty() {
        None
    } else {
        Some(resolve_names(store, names, scope))
    }
}

impl LanguageBias {
    /// Valida a configuração e resolve as listas de relações.
    pub fn resolve(config: &MiningConfig, store: &FactStore) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            max_len: config.max_len,
            recursion_limit: config.recursion_limit,
            constants: config.constants,
            pruning: config.pruning,
            min_initial_support: config.min_initial_support,
            min_std_confidence: config.min_std_confidence,
            min_pca_confidence: config.min_pca_confidence,
            confidence_metric: config.confidence_metric,
            head_targets: resolve_targets(store, &config.head_targets, "head-targets"),
            head_excluded: resolve_names(store, &config.head_excluded, "head-excluded"),
            body_targets: resolve_targets(store, &config.body_targets, "body-targets"),
            body_excluded: resolve_names(store, &config.body_excluded, "body-excluded"),
            optimizations: config.optimizations,
            approximation_min_relation_size: config.approximation_min_relation_size,
            slow_query: Duration::from_millis(config.slow_query_ms),
        })
    }

    pub fn allows_head(&self, relation: Term) -> bool {
        !relation.is_pseudo_predicate()
            && !self.head_excluded.contains(&relation)
            && self.head_targets.as_ref().map_or(true, |t| t.contains(&relation))
    }

    pub fn allows_body(&self, relation: Term) -> bool {
        !relation.is_pseudo_predicate()
            && !self.body_excluded.contains(&relation)
            && self.body_targets.as_ref().map_or(true, |t| t.contains(&relation))
    }

    pub fn allows_constants(&self) -> bool {
        self.constants != ConstantPolicy::Forbid
    }

    /// Limiar de suporte absoluto para uma cabeça com `head_size` fatos.
    pub fn support_threshold(&self, head_size: u64) -> u64 {
        match self.pruning {
            PruningMetric::Support(min) => min,
            PruningMetric::HeadCoverage(min_hc) => {
                ((min_hc * head_size as f64).ceil() as u64).max(1)
            }
        }
    }
}
