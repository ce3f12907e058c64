//! The bundled demo grammar: a small arithmetic-expression language with
//! `+ - * /`, parenthesized grouping, and a `%prec`-annotated unary minus.
//!
//! This plays the reflection-layer role for demo purposes only: it
//! hand-builds a [`RuleSet`]/[`Grammar`] for one grammar rather than
//! discovering rules by introspecting a user program (that discovery step
//! lives outside this crate).

use parsegen_core::{
  error::{GrammarConflict, RadlrResult, UserActionError},
  grammar::GrammarBuilder,
  items::ItemGraph,
  spec::{Action, ActionResult, ActionSignal, Assoc, LexActionEffect, LexRule, RuleArgs, RuleSet},
  symbol::Symbol,
  tables::{self, ParseTables},
  Grammar, Lexer,
};
use parsegen_runtime::{CachedString, IStringStore, Value};
use std::sync::Arc;

pub struct Demo {
  pub store:     IStringStore,
  pub grammar:   Grammar,
  pub items:     ItemGraph,
  pub tables:    ParseTables,
  pub conflicts: Vec<GrammarConflict>,
}

fn term(store: &IStringStore, name: &str) -> Symbol {
  Symbol::Terminal(name.to_token(store))
}

fn binop(op: fn(i64, i64) -> ActionResultValue) -> Action {
  Arc::new(move |args: &mut dyn RuleArgs| -> ActionResult {
    let lhs = args.get(1).as_int().unwrap_or(0);
    let rhs = args.get(3).as_int().unwrap_or(0);
    args.set_result(Value::Int(op(lhs, rhs)?));
    Ok(ActionSignal::Done)
  })
}

type ActionResultValue = Result<i64, UserActionError>;

fn checked_div(a: i64, b: i64) -> ActionResultValue {
  if b == 0 {
    Err(UserActionError(Box::<dyn std::error::Error + Send + Sync>::from("division by zero")))
  } else {
    Ok(a / b)
  }
}

/// Builds the frozen [`Grammar`]/[`ItemGraph`]/[`ParseTables`] for:
///
/// ```text
/// E : E '+' E
///   | E '-' E
///   | E '*' E
///   | E '/' E
///   | '-' E            %prec UMINUS
///   | '(' E ')'
///   | NUM
/// ```
///
/// with `+`/`-` left-associative at the lowest level, `*`/`/` left-
/// associative one level higher, and unary minus at the highest level.
pub fn build() -> RadlrResult<Demo> {
  let store = IStringStore::new();
  let mut g = GrammarBuilder::new(store.clone());
  g.set_precedence_group(Assoc::Left, &["PLUS", "MINUS"])?;
  g.set_precedence_group(Assoc::Left, &["TIMES", "DIVIDE"])?;
  g.set_precedence_group(Assoc::Right, &["UMINUS"])?;
  g.declare_terminal("NUM");
  g.declare_terminal("LPAREN");
  g.declare_terminal("RPAREN");

  g.add_production(
    "E",
    vec![Symbol::NonTerminal("E".to_token(&store)), term(&store, "PLUS"), Symbol::NonTerminal("E".to_token(&store))],
    Some(binop(|a, b| Ok(a + b))),
    None,
    None,
  )?;
  g.add_production(
    "E",
    vec![Symbol::NonTerminal("E".to_token(&store)), term(&store, "MINUS"), Symbol::NonTerminal("E".to_token(&store))],
    Some(binop(|a, b| Ok(a - b))),
    None,
    None,
  )?;
  g.add_production(
    "E",
    vec![Symbol::NonTerminal("E".to_token(&store)), term(&store, "TIMES"), Symbol::NonTerminal("E".to_token(&store))],
    Some(binop(|a, b| Ok(a * b))),
    None,
    None,
  )?;
  g.add_production(
    "E",
    vec![Symbol::NonTerminal("E".to_token(&store)), term(&store, "DIVIDE"), Symbol::NonTerminal("E".to_token(&store))],
    Some(binop(checked_div)),
    None,
    None,
  )?;
  g.add_production(
    "E",
    vec![term(&store, "MINUS"), Symbol::NonTerminal("E".to_token(&store))],
    Some(Arc::new(|args: &mut dyn RuleArgs| -> ActionResult {
      let v = args.get(2).as_int().unwrap_or(0);
      args.set_result(Value::Int(-v));
      Ok(ActionSignal::Done)
    })),
    Some("UMINUS"),
    None,
  )?;
  g.add_production(
    "E",
    vec![term(&store, "LPAREN"), Symbol::NonTerminal("E".to_token(&store)), term(&store, "RPAREN")],
    Some(Arc::new(|args: &mut dyn RuleArgs| -> ActionResult {
      args.set_result(args.get(2).clone());
      Ok(ActionSignal::Done)
    })),
    None,
    None,
  )?;
  g.add_production(
    "E",
    vec![term(&store, "NUM")],
    Some(Arc::new(|args: &mut dyn RuleArgs| -> ActionResult {
      args.set_result(args.get(1).clone());
      Ok(ActionSignal::Done)
    })),
    None,
    None,
  )?;

  let grammar = g.build()?;
  let items = ItemGraph::build(&grammar);
  let (tables, conflicts) = tables::build(&grammar, &items);
  Ok(Demo { store, grammar, items, tables, conflicts })
}

/// The lexer [`RuleSet`] matching the terminals [`build`] declares.
pub fn ruleset() -> RuleSet {
  let num_action = Arc::new(|args: &mut parsegen_core::spec::LexActionArgs| {
    let n: i64 = args.text.parse().map_err(|e: std::num::ParseIntError| UserActionError(Box::new(e)))?;
    *args.value = Value::Int(n);
    Ok(LexActionEffect::Emit)
  });

  RuleSet {
    tokens:   vec![
      "NUM".into(),
      "PLUS".into(),
      "MINUS".into(),
      "TIMES".into(),
      "DIVIDE".into(),
      "LPAREN".into(),
      "RPAREN".into(),
    ],
    literals: vec![],
    rules:    vec![
      LexRule { kind: "NUM".into(), pattern: r"\d+".into(), action: Some(num_action), states: vec![] },
      LexRule { kind: "PLUS".into(), pattern: r"\+".into(), action: None, states: vec![] },
      LexRule { kind: "MINUS".into(), pattern: r"-".into(), action: None, states: vec![] },
      LexRule { kind: "TIMES".into(), pattern: r"\*".into(), action: None, states: vec![] },
      LexRule { kind: "DIVIDE".into(), pattern: r"/".into(), action: None, states: vec![] },
      LexRule { kind: "LPAREN".into(), pattern: r"\(".into(), action: None, states: vec![] },
      LexRule { kind: "RPAREN".into(), pattern: r"\)".into(), action: None, states: vec![] },
    ],
    ignore:   vec![("INITIAL".into(), " \t\r\n".into())],
    states:   vec![],
    flags:    Default::default(),
  }
}

pub fn build_lexer(store: IStringStore) -> RadlrResult<Lexer> {
  Lexer::new(ruleset(), store)
}
