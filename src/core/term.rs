//! # Term — Constantes Internadas e Variáveis
//!
//! Todo termo de um átomo é um [`Term`]: ou uma **variável** (`?a`, `?b`, ...)
//! ou uma **constante** internada (entidade ou relação da base de fatos).
//!
//! ## Por que internar?
//!
//! Os laços internos do minerador comparam termos milhões de vezes.
//! Com strings internadas, a comparação é uma comparação de inteiros — O(1).
//! O [`Interner`] mantém o mapeamento bidirecional `string ↔ id`.
//!
//! ## Pseudo-predicados Reservados
//!
//! Dois ids são reservados na criação do interner:
//!
//! | Id | Nome | Significado |
//! |----|------|-------------|
//! | 0 | `differentFrom` | sujeito difere do objeto |
//! | 1 | `equals` | sujeito e objeto denotam a mesma entidade |

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Nome textual do pseudo-predicado de desigualdade.
pub const DIFFERENT_FROM_NAME: &str = "differentFrom";

/// Nome textual do pseudo-predicado de identidade.
pub const EQUALS_NAME: &str = "equals";

/// Termo de um átomo: variável numerada ou constante internada.
///
/// A ordem derivada coloca todas as variáveis antes das constantes,
/// o que a forma canônica das regras usa como critério de desempate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    /// Variável identificada pelo seu índice (`0 → ?a`, `1 → ?b`, ...).
    Var(u32),
    /// Constante identificada pelo id atribuído pelo [`Interner`].
    Const(u32),
}

impl Term {
    /// Pseudo-predicado `differentFrom`.
    pub const DIFFERENT_FROM: Term = Term::Const(0);

    /// Pseudo-predicado `equals`.
    pub const EQUALS: Term = Term::Const(1);

    pub fn is_variable(self) -> bool {
        matches!(self, Term::Var(_))
    }

    pub fn is_constant(self) -> bool {
        matches!(self, Term::Const(_))
    }

    /// Retorna o índice se o termo for uma variável.
    pub fn var_index(self) -> Option<u32> {
        match self {
            Term::Var(i) => Some(i),
            Term::Const(_) => None,
        }
    }

    /// `true` para os dois pseudo-predicados reservados.
    pub fn is_pseudo_predicate(self) -> bool {
        self == Term::DIFFERENT_FROM || self == Term::EQUALS
    }
}

/// Nome legível de uma variável: `?a` … `?z`, depois `?a1` … `?z1`, etc.
pub fn variable_name(index: u32) -> String {
    let letter = (b'a' + (index % 26) as u8) as char;
    let round = index / 26;
    if round == 0 {
        format!("?{}", letter)
    } else {
        format!("?{}{}", letter, round)
    }
}

/// Tabela de internação `string ↔ id` das constantes.
///
/// Só é mutada durante a carga (dentro do [`FactStoreBuilder`](crate::store::FactStoreBuilder));
/// depois que a base é publicada, o interner é somente leitura.
#[derive(Debug)]
pub struct Interner {
    names: Vec<Arc<str>>,
    ids: HashMap<Arc<str>, u32>,
}

impl Interner {
    /// Cria um interner com os pseudo-predicados já reservados.
    pub fn new() -> Self {
        let mut interner = Self {
            names: Vec::new(),
            ids: HashMap::new(),
        };
        let different = interner.intern(DIFFERENT_FROM_NAME);
        let equals = interner.intern(EQUALS_NAME);
        debug_assert_eq!(different, Term::DIFFERENT_FROM);
        debug_assert_eq!(equals, Term::EQUALS);
        interner
    }

    /// Interna `name`, retornando o id existente se já conhecido.
    pub fn intern(&mut self, name: &str) -> Term {
        if let Some(&id) = self.ids.get(name) {
            return Term::Const(id);
        }
        let id = self.names.len() as u32;
        let shared: Arc<str> = Arc::from(name);
        self.names.push(shared.clone());
        self.ids.insert(shared, id);
        Term::Const(id)
    }

    /// Busca sem inserir.
    pub fn lookup(&self, name: &str) -> Option<Term> {
        self.ids.get(name).map(|&id| Term::Const(id))
    }

    /// Texto de uma constante. Variáveis retornam `None`.
    pub fn resolve(&self, term: Term) -> Option<&str> {
        match term {
            Term::Const(id) => self.names.get(id as usize).map(|s| &**s),
            Term::Var(_) => None,
        }
    }

    /// Número de constantes internadas (inclui os pseudo-predicados).
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Adaptador de exibição: variáveis como `?a`, constantes pelo nome.
    pub fn display(&self, term: Term) -> TermDisplay<'_> {
        TermDisplay {
            interner: self,
            term,
        }
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

/// Exibe um [`Term`] usando os nomes do [`Interner`].
pub struct TermDisplay<'a> {
    interner: &'a Interner,
    term: Term,
}

impl fmt::Display for TermDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.term {
            Term::Var(i) => f.write_str(&variable_name(i)),
            Term::Const(id) => match self.interner.resolve(self.term) {
                Some(name) => f.write_str(name),
                None => write!(f, "#{}", id),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_predicates_come_first() {
        let interner = Interner::new();
        assert_eq!(interner.lookup("differentFrom"), Some(Term::DIFFERENT_FROM));
        assert_eq!(interner.lookup("equals"), Some(Term::EQUALS));
        assert_eq!(interner.len(), 2);
    }

    #[test]
    fn interning_is_idempotent() {
        let mut interner = Interner::new();
        let a = interner.intern("livesIn");
        let b = interner.intern("livesIn");
        assert_eq!(a, b);
        assert_eq!(interner.resolve(a), Some("livesIn"));
        assert_eq!(interner.len(), 3);
    }

    #[test]
    fn variable_names_wrap_after_z() {
        assert_eq!(variable_name(0), "?a");
        assert_eq!(variable_name(25), "?z");
        assert_eq!(variable_name(26), "?a1");
    }

    #[test]
    fn variables_sort_before_constants() {
        assert!(Term::Var(100) < Term::Const(0));
    }
}
