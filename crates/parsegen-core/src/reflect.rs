//! The reflection/bind layer boundary.
//!
//! The introspective mechanism for *discovering* rules from a user program
//! is out of scope here: this module does not inspect anything. It is the
//! thin, mechanical half of that boundary that *is* in scope -- turning an
//! already-materialized [`RuleSet`] / [`GrammarSpec`] into populated
//! grammar, lexer, and table machinery. A real surrounding program (one
//! that, say, scans a user's Python-style rule functions) would replace
//! only the *production* of those two structs; everything downstream of
//! them is unchanged.

use crate::{
  error::{GrammarConflict, RadlrResult},
  grammar::{Grammar, GrammarBuilder},
  items::ItemGraph,
  lexer::Lexer,
  spec::{GrammarSpec, RuleSet},
  symbol::Symbol,
  tables::{self, ParseTables},
};
use parsegen_runtime::{CachedString, IStringStore};

/// Builds [`Lexer`] from a [`RuleSet`]. A thin pass-through -- `Lexer::new`
/// already takes a `RuleSet` directly -- kept here so callers that bind
/// both halves of the external interface have one entry point.
pub fn build_lexer(rules: RuleSet, store: IStringStore) -> RadlrResult<Lexer> {
  Lexer::new(rules, store)
}

/// Everything construction of a parser produces from a [`GrammarSpec`]:
/// the frozen grammar, its LR-item graph, the LALR(1) tables, and any
/// conflict diagnostics collected while building them.
pub struct CompiledGrammar {
  pub grammar:   Grammar,
  pub items:     ItemGraph,
  pub tables:    ParseTables,
  pub conflicts: Vec<GrammarConflict>,
}

/// Builds a [`Grammar`], its [`ItemGraph`], and its [`ParseTables`] from a
/// [`GrammarSpec`]. Each rhs entry names either a declared terminal (from
/// `spec.tokens`) or a nonterminal (any other name); a quoted literal like
/// `"'+'"` used in `rhs` is treated as its own terminal distinct from any
/// same-character named token unless the caller declares it under the same
/// name in `tokens`.
pub fn compile_grammar(spec: GrammarSpec, store: IStringStore) -> RadlrResult<CompiledGrammar> {
  let mut builder = GrammarBuilder::new(store.clone());
  for token in &spec.tokens {
    builder.declare_terminal(token);
  }
  for (assoc, terms) in &spec.precedence {
    let refs: Vec<&str> = terms.iter().map(|s| s.as_str()).collect();
    builder.set_precedence_group(*assoc, &refs)?;
  }

  let terminal_names: std::collections::HashSet<&str> = spec.tokens.iter().map(|s| s.as_str()).collect();
  for prod in &spec.productions {
    let rhs: Vec<Symbol> = prod
      .rhs
      .iter()
      .map(|name| {
        if terminal_names.contains(name.as_str()) {
          Symbol::Terminal(name.to_token(&store))
        } else {
          Symbol::NonTerminal(name.to_token(&store))
        }
      })
      .collect();
    builder.add_production(
      &prod.lhs,
      rhs,
      prod.action.clone(),
      prod.prec_override.as_deref(),
      prod.source_location.clone(),
    )?;
  }

  if let Some(start) = &spec.start {
    builder.set_start(start);
  }

  let grammar = builder.build()?;
  for nt in grammar.unreachable() {
    tracing::warn!(nonterminal = %nt.to_string(&store), "unreachable nonterminal");
  }
  for t in grammar.unused_terminals() {
    tracing::warn!(terminal = %t.to_string(&store), "declared terminal never used in any production");
  }
  for t in grammar.unused_precedence() {
    tracing::warn!(terminal = %t.to_string(&store), "terminal has a declared precedence but never appears in any production");
  }

  let items = ItemGraph::build(&grammar);
  let (tables, conflicts) = tables::build(&grammar, &items);
  Ok(CompiledGrammar { grammar, items, tables, conflicts })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::spec::{Assoc, ProductionSpec};

  #[test]
  fn compile_grammar_warns_on_dead_terminal_and_dead_precedence_but_still_succeeds() {
    // `STRAY` is declared with a precedence level and never used in any
    // production; `compile_grammar` must still succeed, flagging it through
    // both `unused_terminals` and `unused_precedence`, not erroring out.
    let store = IStringStore::new();
    let spec = GrammarSpec {
      tokens:      vec!["NUM".into(), "STRAY".into()],
      start:       Some("S".into()),
      precedence:  vec![(Assoc::Left, vec!["STRAY".into()])],
      productions: vec![ProductionSpec {
        lhs:            "S".into(),
        rhs:            vec!["NUM".into()],
        action:         None,
        prec_override:  None,
        source_location: None,
      }],
    };
    let compiled = compile_grammar(spec, store.clone()).unwrap();
    let dead_terms: Vec<String> =
      compiled.grammar.unused_terminals().iter().map(|t| t.to_string(&store)).collect();
    let dead_prec: Vec<String> =
      compiled.grammar.unused_precedence().iter().map(|t| t.to_string(&store)).collect();
    assert!(dead_terms.contains(&"STRAY".to_string()));
    assert!(dead_prec.contains(&"STRAY".to_string()));
  }
}
