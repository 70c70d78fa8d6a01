//! Placeholder assembly.
//!
//! Compiled and raw SQL both use canonical placeholders: a prefix character
//! (`@`, `:` or `?`) followed by an identifier. Assembly rewrites them into
//! the dialect's parameter style and produces the ordered parameter list
//! handed to the driver.
//!
//! The scanner skips string literals, quoted identifiers (`"x"`, `` `x` ``,
//! `[x]`) and comments. `@@name` system variables and `::` casts are left
//! alone, and a prefix character directly after an identifier character is
//! not a placeholder.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tessera_core::{TesseraError, TesseraResult};

use crate::value::Value;

/// How the driver expects parameters to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterStyle {
    /// `<prefix>name`, bound by name.
    Named(char),
    /// `?`, bound by position.
    Positional,
}

impl ParameterStyle {
    /// The placeholder text for a parameter name.
    pub fn placeholder(self, name: &str) -> String {
        match self {
            Self::Named(prefix) => format!("{prefix}{name}"),
            Self::Positional => "?".to_string(),
        }
    }
}

impl fmt::Display for ParameterStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(prefix) => write!(f, "named ({prefix}name)"),
            Self::Positional => f.write_str("positional (?)"),
        }
    }
}

/// The compiled form of a command, ready for a driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmittedCommand {
    pub sql: String,
    /// Parameter names without their prefix, in binding order. Under the
    /// positional style a name repeats once per occurrence.
    pub parameters: Vec<(String, Value)>,
    /// Table aliases introduced by the compiler, `(alias, table)`.
    pub aliases: Vec<(String, String)>,
    pub timeout_seconds: Option<u32>,
    pub style: ParameterStyle,
}

impl EmittedCommand {
    /// The value bound to `name`.
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        let name = strip_prefix(name);
        self.parameters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// The parameter values in binding order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.parameters.iter().map(|(_, v)| v)
    }
}

fn strip_prefix(name: &str) -> &str {
    name.trim_start_matches(['@', ':', '?'])
}

const fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

const fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Rewrites canonical placeholders into `style`.
///
/// Every placeholder must have a bound parameter and every parameter must be
/// referenced at least once.
pub fn assemble(
    sql: &str,
    params: &[(String, Value)],
    style: ParameterStyle,
) -> TesseraResult<(String, Vec<(String, Value)>)> {
    let mut bound: HashMap<&str, &Value> = HashMap::with_capacity(params.len());
    for (name, value) in params {
        let name = strip_prefix(name);
        if name.is_empty() || !name.chars().next().is_some_and(is_ident_start) {
            return Err(TesseraError::InvalidCommand(format!(
                "'{name}' is not a valid parameter name"
            )));
        }
        if bound.insert(name, value).is_some() {
            return Err(TesseraError::InvalidCommand(format!(
                "parameter '{name}' is bound twice"
            )));
        }
    }

    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut used: HashSet<&str> = HashSet::new();
    let mut positional: Vec<(String, Value)> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            '\'' | '"' | '`' | '[' => {
                let close = if c == '[' { ']' } else { c };
                i = copy_quoted(&chars, i, close, &mut out);
            }
            '-' if next == Some('-') => {
                i = copy_until(&chars, i, "\n", &mut out);
            }
            '/' if next == Some('*') => {
                i = copy_until(&chars, i, "*/", &mut out);
            }
            '@' | ':' | '?' if next == Some(c) => {
                out.push(c);
                out.push(c);
                i += 2;
                // Swallow the rest of `@@identity` so it is not rescanned.
                while let Some(&n) = chars.get(i) {
                    if !is_ident_char(n) {
                        break;
                    }
                    out.push(n);
                    i += 1;
                }
            }
            '@' | ':' | '?'
                if next.is_some_and(is_ident_start)
                    && !(i > 0 && is_ident_char(chars[i - 1])) =>
            {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && is_ident_char(chars[end]) {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                let (key, value) = bound.get_key_value(name.as_str()).ok_or_else(|| {
                    TesseraError::InvalidCommand(format!(
                        "placeholder '{c}{name}' has no bound parameter"
                    ))
                })?;
                used.insert(*key);
                match style {
                    ParameterStyle::Named(prefix) => {
                        out.push(prefix);
                        out.push_str(&name);
                    }
                    ParameterStyle::Positional => {
                        out.push('?');
                        positional.push((name, (*value).clone()));
                    }
                }
                i = end;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    if let Some((unused, _)) = params
        .iter()
        .find(|(name, _)| !used.contains(strip_prefix(name)))
    {
        return Err(TesseraError::InvalidCommand(format!(
            "parameter '{}' is never referenced",
            strip_prefix(unused)
        )));
    }

    let parameters = match style {
        ParameterStyle::Named(_) => params
            .iter()
            .map(|(n, v)| (strip_prefix(n).to_string(), v.clone()))
            .collect(),
        ParameterStyle::Positional => positional,
    };
    Ok((out, parameters))
}

/// Copies a quoted run starting at `start`; a doubled `close` is an escape.
fn copy_quoted(chars: &[char], start: usize, close: char, out: &mut String) -> usize {
    out.push(chars[start]);
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        out.push(c);
        i += 1;
        if c == close {
            if chars.get(i) == Some(&close) {
                out.push(close);
                i += 1;
            } else {
                return i;
            }
        }
    }
    i
}

/// Copies from `start` through the end of `terminator`, or to the end.
fn copy_until(chars: &[char], start: usize, terminator: &str, out: &mut String) -> usize {
    let term: Vec<char> = terminator.chars().collect();
    // Start past the opening marker so `/*/` is not read as open-and-close.
    let mut i = start + 2;
    out.extend(&chars[start..i.min(chars.len())]);
    while i < chars.len() {
        if chars[i..].starts_with(&term) {
            out.extend(&term);
            return i + term.len();
        }
        out.push(chars[i]);
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(name: &str, v: impl Into<Value>) -> (String, Value) {
        (name.to_string(), v.into())
    }

    // ── named ───────────────────────────────────────────────────────

    #[test]
    fn test_named_rewrite_keeps_order() {
        let (sql, params) = assemble(
            "SELECT * FROM t WHERE a = @p0 AND b = @p1",
            &[p("p0", 1), p("@p1", "x")],
            ParameterStyle::Named(':'),
        )
        .unwrap();
        assert_eq!(sql, "SELECT * FROM t WHERE a = :p0 AND b = :p1");
        assert_eq!(params, vec![p("p0", 1), p("p1", "x")]);
    }

    #[test]
    fn test_any_canonical_prefix_is_accepted() {
        let (sql, _) = assemble("x = :id OR y = ?id", &[p("id", 1)], ParameterStyle::Named('@')).unwrap();
        assert_eq!(sql, "x = @id OR y = @id");
    }

    // ── positional ──────────────────────────────────────────────────

    #[test]
    fn test_positional_duplicates_by_occurrence() {
        let (sql, params) = assemble(
            "a = @b OR c = @a OR d = @b",
            &[p("a", 1), p("b", 2)],
            ParameterStyle::Positional,
        )
        .unwrap();
        assert_eq!(sql, "a = ? OR c = ? OR d = ?");
        assert_eq!(params, vec![p("b", 2), p("a", 1), p("b", 2)]);
    }

    // ── skipping ────────────────────────────────────────────────────

    #[test]
    fn test_literals_identifiers_and_comments_are_skipped() {
        let sql = "SELECT '@a', \"@a\", `@a`, [@a], 'it''s @a' -- @a\n/* @a */ FROM t WHERE x = @a";
        let (out, params) = assemble(sql, &[p("a", 1)], ParameterStyle::Named('?')).unwrap();
        assert_eq!(
            out,
            "SELECT '@a', \"@a\", `@a`, [@a], 'it''s @a' -- @a\n/* @a */ FROM t WHERE x = ?a"
        );
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_system_variables_and_casts_are_not_placeholders() {
        let (out, _) = assemble(
            "SELECT @@IDENTITY, x::text, y = @v",
            &[p("v", 1)],
            ParameterStyle::Named(':'),
        )
        .unwrap();
        assert_eq!(out, "SELECT @@IDENTITY, x::text, y = :v");
    }

    #[test]
    fn test_prefix_inside_identifier_is_not_placeholder() {
        let (out, _) = assemble("SELECT a@b, c = @d", &[p("d", 1)], ParameterStyle::Positional).unwrap();
        assert_eq!(out, "SELECT a@b, c = ?");
    }

    // ── errors ──────────────────────────────────────────────────────

    #[test]
    fn test_unbound_placeholder() {
        let err = assemble("x = @missing", &[], ParameterStyle::Positional).unwrap_err();
        assert_eq!(err.code(), "invalid_command");
        assert!(err.to_string().contains("@missing"));
    }

    #[test]
    fn test_unused_parameter() {
        let err = assemble("SELECT 1", &[p("a", 1)], ParameterStyle::Positional).unwrap_err();
        assert!(err.to_string().contains("never referenced"));
    }

    #[test]
    fn test_duplicate_binding() {
        let err = assemble("x = @a", &[p("a", 1), p("@a", 2)], ParameterStyle::Positional).unwrap_err();
        assert!(err.to_string().contains("bound twice"));
    }

    #[test]
    fn test_emitted_command_lookup() {
        let cmd = EmittedCommand {
            sql: "x = @p0".into(),
            parameters: vec![p("p0", 9)],
            aliases: vec![],
            timeout_seconds: None,
            style: ParameterStyle::Named('@'),
        };
        assert_eq!(cmd.parameter("@p0"), Some(&Value::Int(9)));
        assert_eq!(cmd.values().count(), 1);
    }
}
