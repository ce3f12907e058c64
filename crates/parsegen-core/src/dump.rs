//! The human-readable "tables dump" artifact: a text-only diagnostic, no
//! defined binary format. Follows the classic yacc `y.output`/bison
//! `.output` shape: grammar listing, FIRST sets, per-state kernel+closure
//! item listing, per-state ACTION/GOTO lines, then a conflict summary.

use crate::{
  error::GrammarConflict,
  grammar::Grammar,
  items::ItemGraph,
  symbol::Symbol,
  tables::{ActionEntry, ParseTables},
};
use parsegen_runtime::IStringStore;
use std::fmt::{self, Write};

fn symbol_str(sym: Symbol, store: &IStringStore) -> String {
  match sym {
    Symbol::Terminal(t) => t.to_string(store),
    Symbol::NonTerminal(nt) => nt.to_string(store),
  }
}

fn production_str(grammar: &Grammar, number: usize) -> String {
  let p = grammar.production(number);
  let rhs = if p.rhs.is_empty() {
    "/* empty */".to_string()
  } else {
    p.rhs.iter().map(|s| symbol_str(*s, &grammar.store)).collect::<Vec<_>>().join(" ")
  };
  format!("{} -> {}", p.lhs.to_string(&grammar.store), rhs)
}

fn item_str(grammar: &Grammar, items: &ItemGraph, item: crate::items::ItemId) -> String {
  let prod = items.production_of(item);
  let dot = items.dot_of(item);
  let p = grammar.production(prod);
  let lhs = p.lhs.to_string(&grammar.store);
  let mut rhs: Vec<String> = p.rhs.iter().map(|s| symbol_str(*s, &grammar.store)).collect();
  rhs.insert(dot, "\u{2022}".to_string()); // •
  format!("{} -> {}", lhs, rhs.join(" "))
}

/// Write the full tables dump for `tables` to `out`.
pub fn write_tables_dump(
  grammar: &Grammar,
  items: &ItemGraph,
  tables: &ParseTables,
  conflicts: &[GrammarConflict],
  out: &mut impl Write,
) -> fmt::Result {
  writeln!(out, "Grammar")?;
  writeln!(out, "-------")?;
  for (n, _) in grammar.productions.iter().enumerate() {
    writeln!(out, "  {:>3}  {}", n, production_str(grammar, n))?;
  }
  writeln!(out)?;

  writeln!(out, "FIRST sets")?;
  writeln!(out, "----------")?;
  for nt in &grammar.nonterminals {
    let mut names: Vec<String> = grammar.first_of(*nt).iter().map(|t| t.to_string(&grammar.store)).collect();
    names.sort();
    let nullable = if grammar.is_nullable(*nt) { " (nullable)" } else { "" };
    writeln!(out, "  FIRST({}) = {{ {} }}{}", nt.to_string(&grammar.store), names.join(", "), nullable)?;
  }
  writeln!(out)?;

  writeln!(out, "States")?;
  writeln!(out, "------")?;
  for (s, state) in tables.states.iter().enumerate() {
    writeln!(out, "state {}", s)?;
    writeln!(out, "  kernel:")?;
    for &it in &state.kernel {
      writeln!(out, "    {}", item_str(grammar, items, it))?;
    }
    let closure_only: Vec<_> = state.closure.iter().filter(|it| !state.kernel.contains(it)).collect();
    if !closure_only.is_empty() {
      writeln!(out, "  closure:")?;
      for it in closure_only {
        writeln!(out, "    {}", item_str(grammar, items, *it))?;
      }
    }

    if let Some(p) = tables.defaulted_reduction(s) {
      writeln!(out, "  (defaulted) reduce {}  [{}]", p, production_str(grammar, p))?;
    } else {
      let mut action_lines: Vec<(String, String)> = tables
        .action
        .iter()
        .filter(|((st, _), _)| *st == s)
        .map(|((_, t), entry)| {
          let terminal = t.to_string(&grammar.store);
          let entry_str = match entry {
            ActionEntry::Shift(to) => format!("shift and go to state {to}"),
            ActionEntry::Reduce(p) => format!("reduce using rule {p}  [{}]", production_str(grammar, *p)),
            ActionEntry::Accept => "accept".to_string(),
            ActionEntry::Error => "error (nonassoc)".to_string(),
          };
          (terminal, entry_str)
        })
        .collect();
      action_lines.sort();
      if !action_lines.is_empty() {
        writeln!(out, "  actions:")?;
        for (terminal, entry) in action_lines {
          writeln!(out, "    {:<12} {}", terminal, entry)?;
        }
      }
    }

    let mut goto_lines: Vec<(String, usize)> = tables
      .goto
      .iter()
      .filter(|((st, _), _)| *st == s)
      .map(|((_, nt), to)| (nt.to_string(&grammar.store), *to))
      .collect();
    goto_lines.sort();
    if !goto_lines.is_empty() {
      writeln!(out, "  goto:")?;
      for (nt, to) in goto_lines {
        writeln!(out, "    {:<12} go to state {}", nt, to)?;
      }
    }
    writeln!(out)?;
  }

  writeln!(out, "Conflicts")?;
  writeln!(out, "---------")?;
  if conflicts.is_empty() {
    writeln!(out, "  (none)")?;
  } else {
    let shift_reduce = conflicts.iter().filter(|c| matches!(c, GrammarConflict::ShiftReduce { .. })).count();
    let reduce_reduce = conflicts.iter().filter(|c| matches!(c, GrammarConflict::ReduceReduce { .. })).count();
    writeln!(out, "  {shift_reduce} shift/reduce, {reduce_reduce} reduce/reduce")?;
    for c in conflicts {
      match c {
        GrammarConflict::ShiftReduce { state, terminal, shift_to, reduce_production, resolved_as_shift } => {
          let resolution = if *resolved_as_shift { format!("shift (go to {shift_to})") } else { format!("reduce {reduce_production}") };
          writeln!(out, "  state {state}: shift/reduce on `{terminal}` resolved as {resolution}")?;
        }
        GrammarConflict::ReduceReduce { state, terminal, kept_production, dropped_production } => {
          writeln!(
            out,
            "  state {state}: reduce/reduce on `{terminal}` between rule {kept_production} and rule {dropped_production}; kept rule {kept_production}"
          )?;
        }
        GrammarConflict::NonAssocError { state, terminal } => {
          writeln!(out, "  state {state}: `{terminal}` is %nonassoc; chained use is a syntax error")?;
        }
      }
    }
  }

  Ok(())
}
