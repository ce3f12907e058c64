//! Runtime types shared between the parsegen core (grammar, lexer, tables,
//! parse engine) and anything driving it: the [`Token`] record, the
//! [`Value`] action-result payload, the [`Span`] position-tracking record,
//! and the [`IString`]/[`IStringStore`] interner.
//!
//! Kept in its own crate, underneath the grammar/table-construction
//! machinery: this is the vocabulary a generated/hand-written action
//! callable needs, without pulling in the heavier layers above it.

mod istring;
mod span;
mod token;
mod value;

pub use istring::{CachedString, IString, IStringStore};
pub use span::Span;
pub use token::{Token, EOF_KIND, ERROR_KIND};
pub use value::Value;
