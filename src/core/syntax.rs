//! # Sintaxe Textual de Regras
//!
//! Aceita as duas formas usadas por ferramentas de mineração de regras:
//!
//! ```text
//! ?a  livesIn  ?b   ?b  locatedIn  ?c   => ?a  nationality  ?c
//! nationality(?a, ?c) :- livesIn(?a, ?b), locatedIn(?b, ?c)
//! ```
//!
//! Cada átomo é `predicado(sujeito, objeto)` ou `sujeito predicado objeto`.
//! Variáveis começam com `?`; todo o resto é constante e precisa existir
//! na base de fatos.

use std::collections::HashMap;

use regex::Regex;
use thiserror::Error;

use super::atom::Atom;
use super::term::{Interner, Term};

#[derive(Debug, Error)]
pub enum SyntaxError {
    #[error("rule has no implication arrow (`=>` or `:-`): {0}")]
    MissingArrow(String),

    #[error("cannot split into atoms: {0}")]
    MalformedAtoms(String),

    #[error("rule has {0} head atoms, expected exactly one")]
    HeadArity(usize),

    #[error("constant `{0}` does not occur in the facts")]
    UnknownConstant(String),

    #[error(transparent)]
    Pattern(#[from] regex::Error),
}

/// Átomo ainda textual.
pub type RawAtom = [String; 3];

/// Regra ainda textual: cabeça e corpo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRule {
    pub head: RawAtom,
    pub body: Vec<RawAtom>,
}

pub struct RuleParser {
    /// `predicado(sujeito, objeto)`, opcionalmente seguido de vírgula.
    functional_re: Regex,
}

impl RuleParser {
    pub fn new() -> Result<Self, SyntaxError> {
        Ok(Self {
            functional_re: Regex::new(r"([^\s(),]+)\s*\(\s*([^,()]+?)\s*,\s*([^,()]+?)\s*\)\s*,?")?,
        })
    }

    pub fn parse(&self, text: &str) -> Result<ParsedRule, SyntaxError> {
        let text = text.trim();
        let (head_text, body_text) = if let Some((body, head)) = text.split_once("=>") {
            (head, body)
        } else if let Some((head, body)) = text.split_once(":-") {
            (head, body)
        } else {
            return Err(SyntaxError::MissingArrow(text.to_string()));
        };
        let mut head = self.parse_atoms(head_text)?;
        if head.len() != 1 {
            return Err(SyntaxError::HeadArity(head.len()));
        }
        let body = self.parse_atoms(body_text)?;
        Ok(ParsedRule {
            head: head.remove(0),
            body,
        })
    }

    fn parse_atoms(&self, text: &str) -> Result<Vec<RawAtom>, SyntaxError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        if text.contains('(') {
            let mut atoms = Vec::new();
            let mut consumed = 0;
            for caps in self.functional_re.captures_iter(text) {
                let Some(whole) = caps.get(0) else { continue };
                if !text[consumed..whole.start()].trim().is_empty() {
                    return Err(SyntaxError::MalformedAtoms(text.to_string()));
                }
                consumed = whole.end();
                atoms.push([caps[2].to_string(), caps[1].to_string(), caps[3].to_string()]);
            }
            if atoms.is_empty() || !text[consumed..].trim().is_empty() {
                return Err(SyntaxError::MalformedAtoms(text.to_string()));
            }
            return Ok(atoms);
        }
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.len() % 3 != 0 {
            return Err(SyntaxError::MalformedAtoms(text.to_string()));
        }
        Ok(tokens
            .chunks(3)
            .map(|c| [c[0].to_string(), c[1].to_string(), c[2].to_string()])
            .collect())
    }
}

impl ParsedRule {
    /// Converte para átomos internados, cabeça primeiro. Variáveis são
    /// numeradas por ordem de primeira ocorrência.
    pub fn resolve(&self, interner: &Interner) -> Result<Vec<Atom>, SyntaxError> {
        let mut vars: HashMap<String, u32> = HashMap::new();
        let mut resolve_term = |token: &str| -> Result<Term, SyntaxError> {
            if token.starts_with('?') {
                let next = vars.len() as u32;
                return Ok(Term::Var(*vars.entry(token.to_string()).or_insert(next)));
            }
            interner
                .lookup(token)
                .ok_or_else(|| SyntaxError::UnknownConstant(token.to_string()))
        };
        let mut atoms = Vec::with_capacity(self.body.len() + 1);
        for raw in std::iter::once(&self.head).chain(self.body.iter()) {
            atoms.push(Atom::new(
                resolve_term(&raw[0])?,
                resolve_term(&raw[1])?,
                resolve_term(&raw[2])?,
            ));
        }
        Ok(atoms)
    }
}
