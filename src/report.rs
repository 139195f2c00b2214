//! # Relatório de Regras
//!
//! Uma linha por regra aceita, em TSV (com cabeçalho) ou JSON por linha.
//!
//! | Coluna | Origem |
//! |--------|--------|
//! | `Rule` | texto `corpo => cabeça` |
//! | `Support ratio` | suporte ÷ valores da variável funcional na cabeça |
//! | `Head coverage` | suporte ÷ fatos da relação da cabeça |
//! | `Std confidence`, `PCA confidence` | confianças |
//! | `Support`, `Body size`, `PCA body size` | contagens absolutas |
//! | `Functional variable` | variável contada |
//!
//! As colunas de diagnóstico (limites superiores, estimativa, tempo) só
//! aparecem quando habilitadas em [`Columns`].

use std::fmt::Write as _;

use serde::Serialize;

use crate::core::{variable_name, Interner, Rule, Scores};

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    Tsv,
    Json,
}

/// Colunas de diagnóstico habilitadas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Columns {
    pub upper_bounds: bool,
    pub estimate: bool,
    pub timing: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportRow {
    pub rule: String,
    pub support_ratio: f64,
    pub head_coverage: f64,
    pub std_confidence: f64,
    pub pca_confidence: f64,
    pub support: u64,
    pub body_size: u64,
    pub pca_body_size: u64,
    pub functional_variable: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std_upper_bound: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pca_upper_bound: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pca_estimate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<f64>,
}

impl ReportRow {
    pub fn new(rule: &Rule, scores: &Scores, interner: &Interner, columns: Columns) -> Self {
        let functional_variable = match rule.functional().var_index() {
            Some(index) => variable_name(index),
            None => interner.display(rule.functional()).to_string(),
        };
        Self {
            rule: rule.display(interner).to_string(),
            support_ratio: scores.support_ratio,
            head_coverage: scores.head_coverage,
            std_confidence: scores.std_confidence,
            pca_confidence: scores.pca_confidence,
            support: scores.support,
            body_size: scores.body_size,
            pca_body_size: scores.pca_body_size,
            functional_variable,
            std_upper_bound: scores.std_upper_bound.filter(|_| columns.upper_bounds),
            pca_upper_bound: scores.pca_upper_bound.filter(|_| columns.upper_bounds),
            pca_estimate: scores.pca_estimate.filter(|_| columns.estimate),
            elapsed_ms: Some(scores.elapsed_ms).filter(|_| columns.timing),
        }
    }
}

fn optional(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.6}"))
}

/// Formata linhas no formato escolhido.
#[derive(Clone, Copy, Debug)]
pub struct Reporter {
    pub format: ReportFormat,
    pub columns: Columns,
}

impl Reporter {
    pub fn new(format: ReportFormat, columns: Columns) -> Self {
        Self { format, columns }
    }

    /// Cabeçalho TSV; `None` para JSON.
    pub fn header(&self) -> Option<String> {
        if self.format == ReportFormat::Json {
            return None;
        }
        let mut header = String::from(
            "Rule\tSupport ratio\tHead coverage\tStd confidence\tPCA confidence\t\
             Support\tBody size\tPCA body size\tFunctional variable",
        );
        if self.columns.upper_bounds {
            header.push_str("\tStd upper bound\tPCA upper bound");
        }
        if self.columns.estimate {
            header.push_str("\tPCA estimate");
        }
        if self.columns.timing {
            header.push_str("\tElapsed ms");
        }
        Some(header)
    }

    pub fn row(&self, rule: &Rule, scores: &Scores, interner: &Interner) -> String {
        let row = ReportRow::new(rule, scores, interner, self.columns);
        match self.format {
            ReportFormat::Json => serde_json::to_string(&row).unwrap_or_default(),
            ReportFormat::Tsv => self.tsv(&row),
        }
    }

    fn tsv(&self, row: &ReportRow) -> String {
        let mut line = String::new();
        let _ = write!(
            line,
            "{}\t{:.6}\t{:.6}\t{:.6}\t{:.6}\t{}\t{}\t{}\t{}",
            row.rule,
            row.support_ratio,
            row.head_coverage,
            row.std_confidence,
            row.pca_confidence,
            row.support,
            row.body_size,
            row.pca_body_size,
            row.functional_variable
        );
        if self.columns.upper_bounds {
            let _ = write!(line, "\t{}\t{}", optional(row.std_upper_bound), optional(row.pca_upper_bound));
        }
        if self.columns.estimate {
            let _ = write!(line, "\t{}", optional(row.pca_estimate));
        }
        if self.columns.timing {
            let _ = write!(line, "\t{}", optional(row.elapsed_ms));
        }
        line
    }
}
