//! Integration tests exercising the lexer and parser together, rather
//! than one component in isolation.

use parsegen_core::{
  error::{GrammarConflict, LexError},
  grammar::GrammarBuilder,
  items::ItemGraph,
  parser::RecoveryDirective,
  spec::{Action, ActionResult, ActionSignal, Assoc, LexActionEffect, LexRule, RuleArgs, RuleSet},
  symbol::Symbol,
  tables::{self, ParseTables},
  Grammar, Lexer, Parser,
};
use parsegen_runtime::{CachedString, IStringStore, Value};
use pretty_assertions::assert_eq;
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc, Mutex,
};

fn term(store: &IStringStore, name: &str) -> Symbol {
  Symbol::Terminal(name.to_token(store))
}
fn nt(store: &IStringStore, name: &str) -> Symbol {
  Symbol::NonTerminal(name.to_token(store))
}

fn binop(op: fn(i64, i64) -> i64) -> Action {
  Arc::new(move |args: &mut dyn RuleArgs| -> ActionResult {
    let lhs = args.get(1).as_int().unwrap_or(0);
    let rhs = args.get(3).as_int().unwrap_or(0);
    args.set_result(Value::Int(op(lhs, rhs)));
    Ok(ActionSignal::Done)
  })
}

fn passthrough() -> Action {
  Arc::new(|args: &mut dyn RuleArgs| -> ActionResult {
    args.set_result(args.get(1).clone());
    Ok(ActionSignal::Done)
  })
}

/// `E : E '+' T | T ; T : T '*' F | F ; F : NUM | '(' E ')'`.
fn build_expr_grammar() -> (IStringStore, Arc<Grammar>, Arc<ItemGraph>, Arc<ParseTables>, Vec<GrammarConflict>) {
  let store = IStringStore::new();
  let mut g = GrammarBuilder::new(store.clone());
  g.set_precedence_group(Assoc::Left, &["PLUS"]).unwrap();
  g.set_precedence_group(Assoc::Left, &["TIMES"]).unwrap();
  g.set_precedence_group(Assoc::Left, &["MINUS"]).unwrap();
  g.declare_terminal("NUM");
  g.declare_terminal("LPAREN");
  g.declare_terminal("RPAREN");

  g.add_production("E", vec![nt(&store, "E"), term(&store, "PLUS"), nt(&store, "T")], Some(binop(|a, b| a + b)), None, None)
    .unwrap();
  g.add_production("E", vec![nt(&store, "E"), term(&store, "MINUS"), nt(&store, "T")], Some(binop(|a, b| a - b)), None, None)
    .unwrap();
  g.add_production("E", vec![nt(&store, "T")], Some(passthrough()), None, None).unwrap();
  g.add_production("T", vec![nt(&store, "T"), term(&store, "TIMES"), nt(&store, "F")], Some(binop(|a, b| a * b)), None, None)
    .unwrap();
  g.add_production("T", vec![nt(&store, "F")], Some(passthrough()), None, None).unwrap();
  g.add_production("F", vec![term(&store, "NUM")], Some(passthrough()), None, None).unwrap();
  g.add_production(
    "F",
    vec![term(&store, "LPAREN"), nt(&store, "E"), term(&store, "RPAREN")],
    Some(Arc::new(|args: &mut dyn RuleArgs| -> ActionResult {
      args.set_result(args.get(2).clone());
      Ok(ActionSignal::Done)
    })),
    None,
    None,
  )
  .unwrap();

  let grammar = g.build().unwrap();
  let items = ItemGraph::build(&grammar);
  let (tables, conflicts) = tables::build(&grammar, &items);
  (store, Arc::new(grammar), Arc::new(items), Arc::new(tables), conflicts)
}

fn build_lexer(store: IStringStore) -> Lexer {
  let rules = RuleSet {
    tokens:   vec!["NUM".into(), "PLUS".into(), "MINUS".into(), "TIMES".into(), "LPAREN".into(), "RPAREN".into()],
    literals: vec![],
    rules:    vec![
      LexRule {
        kind:    "NUM".into(),
        pattern: r"\d+".into(),
        states:  vec![],
        action:  Some(Arc::new(|args: &mut parsegen_core::spec::LexActionArgs| {
          *args.value = Value::Int(args.text.parse().unwrap());
          Ok(LexActionEffect::Emit)
        })),
      },
      LexRule { kind: "PLUS".into(), pattern: r"\+".into(), action: None, states: vec![] },
      LexRule { kind: "MINUS".into(), pattern: r"-".into(), action: None, states: vec![] },
      LexRule { kind: "TIMES".into(), pattern: r"\*".into(), action: None, states: vec![] },
      LexRule { kind: "LPAREN".into(), pattern: r"\(".into(), action: None, states: vec![] },
      LexRule { kind: "RPAREN".into(), pattern: r"\)".into(), action: None, states: vec![] },
    ],
    ignore:   vec![("INITIAL".into(), " \t\n".into())],
    states:   vec![],
    flags:    Default::default(),
  };
  Lexer::new(rules, store).unwrap()
}

#[test]
fn scenario_2_full_expression_evaluates_with_precedence() {
  let (store, grammar, _items, tables, conflicts) = build_expr_grammar();
  assert!(conflicts.iter().all(|c| !matches!(c, GrammarConflict::ReduceReduce { .. })));
  let mut lexer = build_lexer(store);
  lexer.feed("2 * 3 + 4 * (5 - 10)");
  let mut parser = Parser::new(grammar, tables);
  let result = parser.parse(|| lexer.next()).unwrap();
  // 2*3 + 4*(5-10) = 6 + 4*(-5) = 6 - 20 = -34
  assert_eq!(result.as_int(), Some(-34));
}

#[test]
fn scenario_1_ill_formed_input_invokes_error_hook_and_fails() {
  let (store, grammar, _items, tables, _conflicts) = build_expr_grammar();
  let mut lexer = build_lexer(store);
  // A dangling, unmatched close paren makes this grammar reject the input;
  // there is no `error` production here, so recovery exhausts immediately
  // and the parse fails -- the installed hook still gets exactly one call.
  lexer.feed("2 * 3 + 4 * (5 - 10))");
  let calls = Arc::new(AtomicUsize::new(0));
  let calls_in_hook = calls.clone();
  let mut parser = Parser::new(grammar, tables).with_error_hook(Arc::new(move |_tok| {
    calls_in_hook.fetch_add(1, Ordering::SeqCst);
    None::<RecoveryDirective>
  }));
  let result = parser.parse(|| lexer.next());
  assert!(result.is_err());
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn empty_input_succeeds_only_if_grammar_allows_start_to_derive_epsilon() {
  let store = IStringStore::new();
  let mut g = GrammarBuilder::new(store.clone());
  g.declare_terminal("NUM");
  // `program : /* empty */ | program NUM` -- the start symbol can derive ε.
  g.add_production("program", vec![], Some(Arc::new(|args: &mut dyn RuleArgs| -> ActionResult {
    args.set_result(Value::Int(0));
    Ok(ActionSignal::Done)
  })), None, None)
  .unwrap();
  g.add_production(
    "program",
    vec![nt(&store, "program"), term(&store, "NUM")],
    Some(Arc::new(|args: &mut dyn RuleArgs| -> ActionResult {
      let acc = args.get(1).as_int().unwrap_or(0);
      let n = args.get(2).as_int().unwrap_or(0);
      args.set_result(Value::Int(acc + n));
      Ok(ActionSignal::Done)
    })),
    None,
    None,
  )
  .unwrap();
  g.set_start("program");
  let grammar = Arc::new(g.build().unwrap());
  let items = ItemGraph::build(&grammar);
  let (t, _) = tables::build(&grammar, &items);
  let tables = Arc::new(t);

  let rules = RuleSet {
    tokens:   vec!["NUM".into()],
    literals: vec![],
    rules:    vec![LexRule { kind: "NUM".into(), pattern: r"\d+".into(), action: None, states: vec![] }],
    ignore:   vec![("INITIAL".into(), " ".into())],
    states:   vec![],
    flags:    Default::default(),
  };
  let mut lexer = Lexer::new(rules, store).unwrap();

  // Empty input: the lexer returns null immediately, the parser sees $end
  // right away, and the grammar's ε-production lets it accept.
  lexer.feed("");
  assert!(lexer.next().unwrap().is_none());
  let mut parser = Parser::new(grammar.clone(), tables.clone());
  let result = parser.parse(|| lexer.next()).unwrap();
  assert_eq!(result.as_int(), Some(0));
}

#[test]
fn single_token_reduction_yields_the_tokens_own_value() {
  let store = IStringStore::new();
  let mut g = GrammarBuilder::new(store.clone());
  g.declare_terminal("NUMBER");
  g.add_production("expression", vec![term(&store, "NUMBER")], Some(passthrough()), None, None).unwrap();
  let grammar = Arc::new(g.build().unwrap());
  let items = ItemGraph::build(&grammar);
  let (t, _) = tables::build(&grammar, &items);
  let tables = Arc::new(t);

  let rules = RuleSet {
    tokens:   vec!["NUMBER".into()],
    literals: vec![],
    rules:    vec![LexRule {
      kind:    "NUMBER".into(),
      pattern: r"\d+".into(),
      states:  vec![],
      action:  Some(Arc::new(|args: &mut parsegen_core::spec::LexActionArgs| {
        *args.value = Value::Int(args.text.parse().unwrap());
        Ok(LexActionEffect::Emit)
      })),
    }],
    ignore:   vec![],
    states:   vec![],
    flags:    Default::default(),
  };
  let mut lexer = Lexer::new(rules, store).unwrap();
  lexer.feed("42");
  let mut parser = Parser::new(grammar, tables);
  let result = parser.parse(|| lexer.next()).unwrap();
  assert_eq!(result.as_int(), Some(42));
}

#[test]
fn lex_error_hook_is_invoked_and_cursor_still_advances() {
  let store = IStringStore::new();
  let rules = RuleSet {
    tokens:   vec!["NUM".into()],
    literals: vec![],
    rules:    vec![LexRule { kind: "NUM".into(), pattern: r"\d+".into(), action: None, states: vec![] }],
    ignore:   vec![],
    states:   vec![],
    flags:    Default::default(),
  };
  let mut lexer = Lexer::new(rules, store).unwrap();
  let seen: Arc<Mutex<Vec<LexError>>> = Arc::new(Mutex::new(Vec::new()));
  let seen_in_hook = seen.clone();
  let mut lexer = lexer.with_error_hook(Arc::new(move |args: &mut parsegen_core::spec::LexErrorArgs| {
    seen_in_hook.lock().unwrap().push(args.error.clone());
  }));
  lexer.feed("1 # 2");
  let t1 = lexer.next().unwrap().unwrap();
  assert_eq!(t1.lexeme, "1");
  let t2 = lexer.next().unwrap().unwrap();
  assert_eq!(t2.lexeme, "2");
  assert_eq!(seen.lock().unwrap().len(), 1);
}
