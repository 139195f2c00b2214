//! # Módulo Core — Tipos Fundamentais do Domínio
//!
//! Este módulo agrupa os **tipos fundamentais** do minerador de regras.
//! Tudo gira em torno destes tipos:
//!
//! - [`Term`] — constante internada ou variável (`?a`, `?b`, ...)
//! - [`Interner`] — tabela bidirecional `string ↔ id` das constantes
//! - [`Atom`] — padrão de tripla `(sujeito, predicado, objeto)`
//! - [`Rule`] — regra de Horn: cabeça + corpo, com métricas em cache
//! - [`RuleParser`] — leitura da forma textual das regras
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use crate::core::{Atom, Interner, Rule, Term};
//!
//! let mut interner = Interner::new();
//! let lives = interner.intern("livesIn");
//! let nationality = interner.intern("nationality");
//!
//! // ?a livesIn ?b => ?a nationality ?b
//! let seed = Rule::seed(Atom::new(Term::Var(0), nationality, Term::Var(1)), Term::Var(0), 10);
//! let rule = seed.add_closing_atom(Atom::new(Term::Var(0), lives, Term::Var(1)), 4);
//! assert!(rule.is_closed());
//! ```

/// Sub-módulo com [`Term`] e [`Interner`].
pub mod term;

/// Sub-módulo com [`Atom`] e [`Position`].
pub mod atom;

/// Sub-módulo com [`Rule`], chaves canônicas e [`Scores`].
pub mod rule;

/// Sub-módulo com o parser da forma textual das regras.
pub mod syntax;

pub use atom::{Atom, Position};
pub use rule::{CanonicalKey, ConfidenceMetric, HeadKey, PathEdge, Rule, Scores};
pub use syntax::RuleParser;
pub use term::{variable_name, Interner, Term};
