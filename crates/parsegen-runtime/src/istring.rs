use rustc_hash::FxHashMap;
use std::sync::{Arc, RwLock};

/// Interned string handle. Cheap to copy, compare, and hash; resolve back to
/// text with [`IString::to_str`] against the [`IStringStore`] that produced
/// it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct IString(u32);

impl Default for IString {
  fn default() -> Self {
    Self(u32::MAX)
  }
}

impl IString {
  /// `true` for the handle produced by interning the empty string, or for a
  /// default-constructed handle that was never looked up.
  pub fn is_empty(&self, store: &IStringStore) -> bool {
    self.0 == u32::MAX || self.to_string(store).is_empty()
  }

  pub fn to_string(&self, store: &IStringStore) -> String {
    store.resolve(*self).to_string()
  }
}

/// Global string interner shared by a grammar, its lexer rules, and the
/// tables built from them. Cloning an [`IStringStore`] clones the `Arc`, not
/// the underlying table, so a frozen [`Grammar`](crate::Grammar) and the
/// [`Lexer`](crate::Lexer) built alongside it can share one store.
#[derive(Clone, Default, Debug)]
pub struct IStringStore(Arc<RwLock<Inner>>);

#[derive(Default, Debug)]
struct Inner {
  strings: Vec<Box<str>>,
  lookup:  FxHashMap<Box<str>, u32>,
}

impl IStringStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn intern(&self, s: &str) -> IString {
    if let Some(id) = self.0.read().unwrap().lookup.get(s) {
      return IString(*id);
    }
    let mut inner = self.0.write().unwrap();
    if let Some(id) = inner.lookup.get(s) {
      return IString(*id);
    }
    let id = inner.strings.len() as u32;
    inner.strings.push(s.into());
    inner.lookup.insert(s.into(), id);
    IString(id)
  }

  pub fn resolve(&self, s: IString) -> String {
    self.0.read().unwrap().strings.get(s.0 as usize).map(|s| s.to_string()).unwrap_or_default()
  }
}

/// Convenience trait for turning borrowed text into an interned handle
/// without threading an [`IStringStore`] explicitly through every call site
/// that already has access to one via `self`.
pub trait CachedString {
  fn to_token(&self, store: &IStringStore) -> IString;
}

impl CachedString for str {
  fn to_token(&self, store: &IStringStore) -> IString {
    store.intern(self)
  }
}

impl CachedString for String {
  fn to_token(&self, store: &IStringStore) -> IString {
    store.intern(self)
  }
}
