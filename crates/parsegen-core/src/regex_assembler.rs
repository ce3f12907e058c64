//! The regex master assembler.
//!
//! Combines every lexer rule active in a given lexer state into one
//! compiled [`regex::Regex`], wrapping each rule's pattern in a named
//! capture group keyed by token kind so a single `captures()` call both
//! locates the next token and identifies it by whichever group matched.
//!
//! Rust's `regex` crate resolves alternation with "leftmost-first" semantics
//! at a given start position: among alternatives that all start there, the
//! one written earliest in the pattern wins, never the longest. That is
//! exactly the ordering discipline this module wants, so the assembler's
//! whole job is choosing *source order* for the alternatives; the crate
//! does the rest.

use crate::error::{ConfigError, RadlrResult};
use crate::spec::LexRule;
use regex::{Regex, RegexBuilder};
use rustc_hash::FxHashMap;

/// Compile-time flags threaded from [`crate::spec::RuleSet`] into the
/// `regex::RegexBuilder` used for both the master pattern and the
/// per-rule empty-match probe. `verbose` defaults to `true` (master
/// patterns are built from individually-readable rule patterns joined by
/// `|`, so ignoring insignificant whitespace/comments in the *source*
/// patterns is the useful default); a caller overriding these flags
/// replaces the whole set; re-enable `verbose` explicitly if that
/// whitespace-insensitivity is still wanted alongside the override.
#[derive(Clone, Copy, Debug)]
pub struct RegexFlags {
  pub verbose:              bool,
  pub case_insensitive:     bool,
  pub multi_line:           bool,
  pub dot_matches_new_line: bool,
  /// Unicode-aware character classes (`\w`, `\d`, case folding); off by
  /// default.
  pub unicode:              bool,
}

impl Default for RegexFlags {
  fn default() -> Self {
    Self { verbose: true, case_insensitive: false, multi_line: false, dot_matches_new_line: false, unicode: false }
  }
}

fn configured_builder(source: &str, flags: RegexFlags) -> RegexBuilder {
  let mut builder = RegexBuilder::new(source);
  builder
    .ignore_whitespace(flags.verbose)
    .case_insensitive(flags.case_insensitive)
    .multi_line(flags.multi_line)
    .dot_matches_new_line(flags.dot_matches_new_line)
    .unicode(flags.unicode);
  builder
}

/// `regex`'s own errors don't distinguish "too many capture groups" from
/// any other compiled-program-too-large failure; `CompiledTooBig` is the
/// only variant that can result from the program growing with the rule
/// count (as opposed to `Syntax`, which is a malformed single pattern),
/// so that's the one mapped to [`ConfigError::TooManyGroups`].
fn classify_build_error(source: regex::Error, kind: &str, group_count: usize) -> ConfigError {
  match source {
    regex::Error::CompiledTooBig(_) => ConfigError::TooManyGroups(group_count),
    other => ConfigError::BadPattern { kind: kind.to_string(), source: other },
  }
}

/// Synthetic capture-group name for the `n`th literal character rule.
/// Regex group names must be `[A-Za-z_][A-Za-z0-9_]*`, which a bare literal
/// like `+` is not, so literals get a synthesized name and are mapped back
/// to their source character via [`MasterPattern::kind_of`].
fn literal_group_name(index: usize) -> String {
  format!("__lit_{index}")
}

/// One compiled alternation for a single lexer state, plus the table needed
/// to turn a winning group name back into the token kind it represents.
pub struct MasterPattern {
  regex:       Regex,
  /// group name -> token kind (identical to the group name for named rules;
  /// resolved back to the literal character for `__lit_N` groups).
  kind_of:     FxHashMap<String, String>,
  group_order: Vec<String>,
}

impl MasterPattern {
  /// Attempt a single match of the master pattern anchored at the start of
  /// `text`. Returns the winning token kind and the match length.
  pub fn match_at<'t>(&self, text: &'t str) -> Option<(&str, usize)> {
    let caps = self.regex.captures(text)?;
    for name in &self.group_order {
      if let Some(m) = caps.name(name) {
        if m.start() == 0 {
          return Some((self.kind_of.get(name).map(|s| s.as_str()).unwrap_or(name), m.end()));
        }
      }
    }
    None
  }
}

/// Build one [`MasterPattern`] from the rules applicable to a single lexer
/// state, applying a three-step ordering discipline:
///
/// 1. rules with an action, in declaration order;
/// 2. rules without an action, by decreasing pattern source length;
/// 3. single-character literals.
pub fn build_master_pattern(rules: &[&LexRule], literals: &[char], flags: RegexFlags) -> RadlrResult<MasterPattern> {
  let mut actioned: Vec<&LexRule> = rules.iter().copied().filter(|r| r.action.is_some()).collect();
  let mut plain: Vec<&LexRule> = rules.iter().copied().filter(|r| r.action.is_none()).collect();
  // `actioned` is already in declaration order (the order the caller handed
  // us the slice in); `plain` needs a stable sort by decreasing length so
  // ties keep declaration order too.
  plain.sort_by(|a, b| b.pattern.len().cmp(&a.pattern.len()));
  actioned.append(&mut plain);
  let ordered = actioned;

  let mut seen_kinds = std::collections::HashSet::new();
  let mut alternatives = Vec::with_capacity(ordered.len() + literals.len());
  let mut kind_of = FxHashMap::default();
  let mut group_order = Vec::with_capacity(ordered.len() + literals.len());

  for rule in &ordered {
    if !seen_kinds.insert(rule.kind.clone()) {
      return Err(ConfigError::DuplicateTokenKind(rule.kind.clone()));
    }
    validate_group_name(&rule.kind)?;
    alternatives.push(format!("(?P<{}>{})", rule.kind, rule.pattern));
    kind_of.insert(rule.kind.clone(), rule.kind.clone());
    group_order.push(rule.kind.clone());
  }

  for (i, lit) in literals.iter().enumerate() {
    let name = literal_group_name(i);
    alternatives.push(format!("(?P<{}>{})", name, regex::escape(&lit.to_string())));
    kind_of.insert(name.clone(), lit.to_string());
    group_order.push(name);
  }

  let group_count = alternatives.len();
  let source = format!(r"\A(?:{})", alternatives.join("|"));
  let regex = configured_builder(&source, flags)
    .build()
    .map_err(|source| classify_build_error(source, "<master pattern>", group_count))?;

  // An empty-match check: probe each individual rule pattern (compiled
  // with the same flags as the master) against the empty string.
  for rule in &ordered {
    let individual = configured_builder(&rule.pattern, flags)
      .build()
      .map_err(|source| classify_build_error(source, &rule.kind, group_count))?;
    if individual.is_match("") {
      return Err(ConfigError::EmptyMatchPattern(rule.kind.clone()));
    }
  }

  Ok(MasterPattern { regex, kind_of, group_order })
}

/// Regex named-capture-group identifiers are restricted to
/// `[A-Za-z_][A-Za-z0-9_]*`; surface that as a `ConfigError` up front rather
/// than as an opaque `regex::Error` pointing into a synthesized pattern the
/// caller never wrote.
fn validate_group_name(name: &str) -> RadlrResult<()> {
  let mut chars = name.chars();
  let ok_start = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
  let ok_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
  if ok_start && ok_rest {
    Ok(())
  } else {
    Err(ConfigError::BadPattern {
      kind:   name.to_string(),
      source: regex::Error::Syntax(format!("`{name}` is not a valid token kind for a named capture group")),
    })
  }
}
