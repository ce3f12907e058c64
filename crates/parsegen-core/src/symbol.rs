//! The symbol vocabulary shared by the grammar model, the LR-item graph,
//! and the table builder.

use parsegen_runtime::{IString, IStringStore};

/// A terminal or nonterminal appearing in a production's right-hand side.
/// A literal character terminal and a named terminal declared over the
/// same character are deliberately distinct here: every declared name --
/// literal or named -- gets its own [`IString`], and the grammar never
/// unifies them itself (see DESIGN.md).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Symbol {
  Terminal(IString),
  NonTerminal(IString),
}

impl Symbol {
  pub fn is_terminal(&self) -> bool {
    matches!(self, Symbol::Terminal(_))
  }

  pub fn name(&self) -> IString {
    match self {
      Symbol::Terminal(s) | Symbol::NonTerminal(s) => *s,
    }
  }

  pub fn to_string(&self, store: &IStringStore) -> String {
    self.name().to_string(store)
  }
}
