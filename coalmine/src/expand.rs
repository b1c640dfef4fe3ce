//! Series name expansion.
//!
//! A compact pattern denotes many series names. Two passes are applied:
//!
//! 1. `{{ name }}` placeholders are replaced from a variable map. Unknown
//!    names stay in the output verbatim.
//! 2. Shell-style brace expansion: `{a,b,c}` enumerates alternatives,
//!    `{1..10}` / `{01..10}` / `{a..e}` enumerate ranges (an optional third
//!    operand sets the increment), and several groups multiply out
//!    left-to-right.
//!
//! # Example
//!
//! ```rust
//! use coalmine::expand::expand_braces;
//!
//! let names = expand_braces("server{01..02}.cpu{0,1}");
//! assert_eq!(
//!     names,
//!     ["server01.cpu0", "server01.cpu1", "server02.cpu0", "server02.cpu1"]
//! );
//! ```

use std::borrow::Cow;
use std::collections::HashMap;

/// Expands `pattern` into the ordered list of concrete series names.
///
/// Variables are substituted first, then braces are expanded. An empty
/// pattern yields an empty list, which callers treat as a group with no
/// members rather than an error.
pub fn expand(pattern: &str, vars: &HashMap<String, String>) -> Vec<String> {
    let substituted = substitute(pattern, vars);
    expand_braces(&substituted)
}

/// Replaces `{{ name }}` placeholders with values from `vars`.
///
/// Whitespace inside the placeholder is ignored. Placeholders without a
/// matching variable, and an unterminated `{{`, are kept as literal text.
pub fn substitute<'a>(pattern: &'a str, vars: &HashMap<String, String>) -> Cow<'a, str> {
    if vars.is_empty() || !pattern.contains("{{") {
        return Cow::Borrowed(pattern);
    }

    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            out.push_str(&rest[open..]);
            return Cow::Owned(out);
        };
        let key = after[..close].trim();
        match vars.get(key) {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[open..open + 2 + close + 2]),
        }
        rest = &after[close + 2..];
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Applies brace expansion to `pattern` without variable substitution.
pub fn expand_braces(pattern: &str) -> Vec<String> {
    if pattern.is_empty() {
        return Vec::new();
    }
    expand_from(pattern)
        .into_iter()
        .filter(|name| !name.is_empty())
        .collect()
}

/// Recursive worker: expands the first valid brace group and multiplies it
/// with the expansion of everything after it.
fn expand_from(s: &str) -> Vec<String> {
    let mut search_from = 0;
    loop {
        let Some(rel) = s[search_from..].find('{') else {
            return vec![s.to_string()];
        };
        let open = search_from + rel;
        let Some(close) = matching_close(s, open) else {
            search_from = open + 1;
            continue;
        };

        let body = &s[open + 1..close];
        let Some(alternatives) = expand_group(body) else {
            // `{x}`, `{}` and friends are literal; look for a group further on.
            search_from = open + 1;
            continue;
        };

        let prefix = &s[..open];
        let suffixes = expand_from(&s[close + 1..]);
        let mut names = Vec::with_capacity(alternatives.len() * suffixes.len());
        for alternative in &alternatives {
            for suffix in &suffixes {
                let mut name =
                    String::with_capacity(prefix.len() + alternative.len() + suffix.len());
                name.push_str(prefix);
                name.push_str(alternative);
                name.push_str(suffix);
                names.push(name);
            }
        }
        return names;
    }
}

/// Expands the body of one brace group, or `None` if it is not expandable.
fn expand_group(body: &str) -> Option<Vec<String>> {
    let commas = top_level_commas(body);
    if !commas.is_empty() {
        let mut names = Vec::new();
        let mut start = 0;
        for comma in commas.into_iter().chain(std::iter::once(body.len())) {
            names.extend(expand_from(&body[start..comma]));
            start = comma + 1;
        }
        return Some(names);
    }
    expand_range(body)
}

/// Finds the `}` closing the `{` at `open`, honoring nesting.
fn matching_close(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in s.bytes().enumerate().skip(open) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Byte offsets of commas not nested inside inner braces.
fn top_level_commas(body: &str) -> Vec<usize> {
    let mut depth = 0usize;
    let mut commas = Vec::new();
    for (i, b) in body.bytes().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => commas.push(i),
            _ => {}
        }
    }
    commas
}

/// Expands `m..n` or `m..n..inc` as a numeric or single-character range.
fn expand_range(body: &str) -> Option<Vec<String>> {
    let mut parts = body.split("..");
    let from = parts.next()?;
    let to = parts.next()?;
    let increment = match parts.next() {
        Some(inc) => inc.parse::<i64>().ok()?.unsigned_abs().max(1),
        None => 1,
    };
    if parts.next().is_some() {
        return None;
    }

    if let (Ok(a), Ok(b)) = (from.parse::<i64>(), to.parse::<i64>()) {
        let width = if is_zero_padded(from) || is_zero_padded(to) {
            from.len().max(to.len())
        } else {
            0
        };
        return Some(
            numeric_steps(a, b, increment)
                .map(|n| format!("{n:0width$}"))
                .collect(),
        );
    }

    let (a, b) = (single_char(from)?, single_char(to)?);
    Some(
        numeric_steps(i64::from(a), i64::from(b), increment)
            .filter_map(|n| u8::try_from(n).ok())
            .map(|c| char::from(c).to_string())
            .collect(),
    )
}

/// Inclusive walk from `a` towards `b` in steps of `increment`.
fn numeric_steps(a: i64, b: i64, increment: u64) -> impl Iterator<Item = i64> {
    let step = i64::try_from(increment).unwrap_or(i64::MAX);
    let ascending = a <= b;
    let mut next = Some(a);
    std::iter::from_fn(move || {
        let current = next?;
        next = if ascending {
            current.checked_add(step).filter(|n| *n <= b)
        } else {
            current.checked_sub(step).filter(|n| *n >= b)
        };
        Some(current)
    })
}

fn is_zero_padded(operand: &str) -> bool {
    let digits = operand.strip_prefix('-').unwrap_or(operand);
    digits.len() > 1 && digits.starts_with('0')
}

fn single_char(operand: &str) -> Option<u8> {
    match operand.as_bytes() {
        [c] if c.is_ascii_alphabetic() => Some(*c),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_numeric_range() {
        assert_eq!(expand_braces("name{1..3}"), ["name1", "name2", "name3"]);
    }

    #[test]
    fn test_cartesian_product_order() {
        assert_eq!(expand_braces("{a,b}{1..2}"), ["a1", "a2", "b1", "b2"]);
        assert_eq!(expand_braces("{metric,name}{1..2}{a..b}").len(), 8);
    }

    #[test]
    fn test_empty_pattern() {
        assert!(expand_braces("").is_empty());
        assert!(expand("", &HashMap::new()).is_empty());
    }

    #[test]
    fn test_plain_name() {
        assert_eq!(expand_braces("metric.name"), ["metric.name"]);
    }

    #[test]
    fn test_zero_padding() {
        assert_eq!(
            expand_braces("node{08..11}"),
            ["node08", "node09", "node10", "node11"]
        );
        assert_eq!(expand_braces("n{1..010..4}"), ["n001", "n005", "n009"]);
    }

    #[test]
    fn test_descending_and_alpha_ranges() {
        assert_eq!(expand_braces("{3..1}"), ["3", "2", "1"]);
        assert_eq!(expand_braces("x{c..a}"), ["xc", "xb", "xa"]);
        assert_eq!(expand_braces("{1..9..3}"), ["1", "4", "7"]);
    }

    #[test]
    fn test_nested_alternatives() {
        assert_eq!(
            expand_braces("metric.random.example{1,{2..5},.subdir}"),
            [
                "metric.random.example1",
                "metric.random.example2",
                "metric.random.example3",
                "metric.random.example4",
                "metric.random.example5",
                "metric.random.example.subdir",
            ]
        );
    }

    #[test]
    fn test_literal_braces() {
        assert_eq!(expand_braces("a{b}c"), ["a{b}c"]);
        assert_eq!(expand_braces("a{}c"), ["a{}c"]);
        assert_eq!(expand_braces("a{b"), ["a{b"]);
        assert_eq!(expand_braces("{x}{1,2}"), ["{x}1", "{x}2"]);
        assert_eq!(expand_braces("{a{1,2}"), ["{a1", "{a2"]);
        assert_eq!(expand_braces("{1..b}"), ["{1..b}"]);
    }

    #[test]
    fn test_empty_alternative() {
        assert_eq!(expand_braces("x{a,}"), ["xa", "x"]);
    }

    #[test]
    fn test_substitute_variables() {
        let v = vars(&[("env", "prod"), ("dc", "{eu,us}")]);
        assert_eq!(substitute("app.{{ env }}.cpu", &v), "app.prod.cpu");
        assert_eq!(
            expand("app.{{env}}.{{dc}}", &v),
            ["app.prod.eu", "app.prod.us"]
        );
    }

    #[test]
    fn test_unknown_variable_kept() {
        let v = vars(&[("env", "prod")]);
        assert_eq!(substitute("a.{{missing}}.{{env}}", &v), "a.{{missing}}.prod");
        assert_eq!(substitute("a.{{env", &v), "a.{{env");
    }

    #[test]
    fn test_no_variables_leaves_placeholders() {
        assert_eq!(expand("a.{{env}}", &HashMap::new()), ["a.{{env}}"]);
    }
}
