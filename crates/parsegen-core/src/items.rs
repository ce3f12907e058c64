//! The LR-item graph.
//!
//! Every production `A → α` gets one item per dot position, `A → •α`
//! through `A → α•`. The item graph is inherently cyclic in shape (an
//! item's `after` can point at productions that contain items pointing
//! back at the same chain), so items live in a flat arena and are
//! addressed by index rather than by pointer/`Rc` -- there is no cyclic
//! ownership to break.

use crate::{grammar::Grammar, symbol::Symbol};
use rustc_hash::FxHashMap;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ItemId(pub u32);

#[derive(Clone, Copy, Debug)]
struct ItemData {
  production: usize,
  dot:        usize,
}

/// The arena of every `(production, dot)` pair in the grammar, plus the
/// indices needed to answer `next`/`before`/`after` queries without
/// recomputing them per call.
pub struct ItemGraph {
  items:              Vec<ItemData>,
  by_production_dot:  FxHashMap<(usize, usize), ItemId>,
  /// production index -> item id of its dot-0 ("initial") item, used both
  /// to seed closures and by `after_productions`.
  initial_of:         FxHashMap<usize, ItemId>,
}

impl ItemGraph {
  /// Attaches LR-item linked lists to every production.
  pub fn build(grammar: &Grammar) -> Self {
    let mut items = Vec::new();
    let mut by_production_dot = FxHashMap::default();
    let mut initial_of = FxHashMap::default();

    for p in &grammar.productions {
      for dot in 0..=p.rhs.len() {
        let id = ItemId(items.len() as u32);
        items.push(ItemData { production: p.number, dot });
        by_production_dot.insert((p.number, dot), id);
        if dot == 0 {
          initial_of.insert(p.number, id);
        }
      }
    }

    Self { items, by_production_dot, initial_of }
  }

  pub fn initial_item(&self, production: usize) -> ItemId {
    self.initial_of[&production]
  }

  pub fn production_of(&self, item: ItemId) -> usize {
    self.items[item.0 as usize].production
  }

  pub fn dot_of(&self, item: ItemId) -> usize {
    self.items[item.0 as usize].dot
  }

  pub fn is_complete(&self, item: ItemId, grammar: &Grammar) -> bool {
    let data = self.items[item.0 as usize];
    data.dot == grammar.production(data.production).rhs.len()
  }

  /// The item with the dot advanced by one, if possible.
  pub fn next(&self, item: ItemId, grammar: &Grammar) -> Option<ItemId> {
    let data = self.items[item.0 as usize];
    if data.dot >= grammar.production(data.production).rhs.len() {
      return None;
    }
    self.by_production_dot.get(&(data.production, data.dot + 1)).copied()
  }

  /// The symbol immediately left of the dot, or `None` at dot position 0.
  pub fn before(&self, item: ItemId, grammar: &Grammar) -> Option<Symbol> {
    let data = self.items[item.0 as usize];
    if data.dot == 0 {
      return None;
    }
    grammar.production(data.production).rhs.get(data.dot - 1).copied()
  }

  /// The symbol immediately right of the dot, i.e. the symbol a shift/GOTO
  /// transition on this item consumes. `None` for a complete item.
  pub fn symbol_after_dot(&self, item: ItemId, grammar: &Grammar) -> Option<Symbol> {
    let data = self.items[item.0 as usize];
    grammar.production(data.production).rhs.get(data.dot).copied()
  }

  /// The list of productions that can appear immediately right of the dot
  /// -- only meaningful when `symbol_after_dot` is a nonterminal; used by
  /// the table builder's closure step.
  pub fn after_productions<'g>(&self, item: ItemId, grammar: &'g Grammar) -> Vec<usize> {
    match self.symbol_after_dot(item, grammar) {
      Some(Symbol::NonTerminal(nt)) => grammar.productions_of(nt).map(|p| p.number).collect(),
      _ => Vec::new(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::grammar::GrammarBuilder;
  use parsegen_runtime::{CachedString, IStringStore};

  fn build() -> (Grammar, ItemGraph) {
    let store = IStringStore::new();
    let mut g = GrammarBuilder::new(store.clone());
    g.declare_terminal("PLUS");
    g.declare_terminal("NUM");
    g.add_production("E", vec![Symbol::NonTerminal("E".to_token(&store)), Symbol::Terminal("PLUS".to_token(&store))], None, None, None)
      .unwrap();
    g.add_production("E", vec![Symbol::Terminal("NUM".to_token(&store))], None, None, None).unwrap();
    let grammar = g.build().unwrap();
    let items = ItemGraph::build(&grammar);
    (grammar, items)
  }

  #[test]
  fn initial_item_has_dot_zero() {
    let (grammar, items) = build();
    let initial = items.initial_item(1);
    assert_eq!(items.dot_of(initial), 0);
    assert!(!items.is_complete(initial, &grammar));
  }

  #[test]
  fn next_advances_dot_until_complete() {
    let (grammar, items) = build();
    let i0 = items.initial_item(1);
    let i1 = items.next(i0, &grammar).unwrap();
    assert_eq!(items.dot_of(i1), 1);
    let i2 = items.next(i1, &grammar).unwrap();
    assert_eq!(items.dot_of(i2), 2);
    assert!(items.is_complete(i2, &grammar));
    assert!(items.next(i2, &grammar).is_none());
  }

  #[test]
  fn after_productions_lists_nonterminal_alternatives() {
    let (grammar, items) = build();
    let augmented_initial = items.initial_item(0);
    let prods = items.after_productions(augmented_initial, &grammar);
    assert_eq!(prods, vec![1, 2]);
  }
}
