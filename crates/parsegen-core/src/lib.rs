//! `parsegen_core`: the LALR(1) table constructor, regex-driven lexer
//! runtime, and shift-reduce parse engine at the core of a lex/yacc-style
//! parser-construction toolkit.
//!
//! Module map:
//!
//! | Component | Module |
//! |---|---|
//! | Regex master assembler | [`regex_assembler`] |
//! | Lexer runtime | [`lexer`] |
//! | Grammar model | [`grammar`] |
//! | LR-item graph | [`items`] |
//! | LALR table builder | [`tables`] |
//! | Parse engine | [`parser`] |
//! | Reflection/bind (external boundary) | [`reflect`] |
//!
//! [`dump`] holds the human-readable "tables dump" artifact.

pub mod dump;
pub mod error;
pub mod grammar;
pub mod items;
pub mod lexer;
pub mod parser;
pub mod reflect;
pub mod regex_assembler;
pub mod spec;
pub mod symbol;
pub mod tables;

pub use dump::write_tables_dump;
pub use error::{ConfigError, EngineError, GrammarConflict, LexError, ParseError, RadlrResult, UserActionError};
pub use grammar::{Grammar, GrammarBuilder};
pub use items::ItemGraph;
pub use lexer::Lexer;
pub use parser::{Parser, RecoveryDirective};
pub use reflect::{build_lexer, compile_grammar, CompiledGrammar};
pub use spec::{Assoc, GrammarSpec, RuleSet};
pub use symbol::Symbol;
pub use tables::{ActionEntry, ParseTables};
