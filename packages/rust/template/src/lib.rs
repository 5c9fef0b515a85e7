//! Prompt template substitution and the injected template registry.
//!
//! Syntax:
//! - `{name}` is replaced by the value of `name`; unknown names stay literal.
//! - `{if:name:content}` keeps `content` when `name` is set and non-empty,
//!   and disappears entirely otherwise. `如果` is accepted in place of `if`.
//!
//! Conditional content may hold plain `{name}` references but no other
//! braces, and cannot span lines in the template. Nested blocks are not
//! supported: in `{if:a:x{if:b:y}z}` only the inner block is resolved.
//! Substitution never fails; malformed syntax is left as literal text.

mod registry;

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

pub use registry::{
    TemplateEngine, TemplateEntry, TemplateOrigin, TemplateRegistry, TemplateSource,
    load_user_library,
};

/// Variable name → value for one row.
pub type VariableSet = HashMap<String, String>;

/// Name of the variable holding the synthesized `column: value` block.
pub const REFERENCE_VAR: &str = "reference";

/// Legacy alias of [`REFERENCE_VAR`] used by older template libraries.
pub const REFERENCE_VAR_ALIAS: &str = "引用内容";

static SIMPLE_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}:\n]+)\}").expect("valid regex"));

static CONDITIONAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{(?:if|如果):([^{}:\n]+):((?:[^{}\n]|\{[^{}:\n]+\})*)\}").expect("valid regex")
});

/// Conditional blocks and simple references, matched in one scan.
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\{(?:if|如果):(?P<cond>[^{}:\n]+):(?P<body>(?:[^{}\n]|\{[^{}:\n]+\})*)\}",
        r"|\{(?P<name>[^{}:\n]+)\}",
    ))
    .expect("valid regex")
});

/// Render `template` against `variables`.
///
/// Each conditional block is decided on the template text, then the kept
/// content and the remaining simple references are filled in the same pass.
/// Inserted values are never re-scanned.
pub fn substitute(template: &str, variables: &VariableSet) -> String {
    TOKEN_RE
        .replace_all(template, |caps: &Captures| {
            if let Some(name) = caps.name("name") {
                return match variables.get(name.as_str()) {
                    Some(value) => value.clone(),
                    None => caps[0].to_string(),
                };
            }
            match variables.get(&caps["cond"]) {
                Some(value) if !value.is_empty() => fill_references(&caps["body"], variables),
                _ => String::new(),
            }
        })
        .into_owned()
}

fn fill_references(text: &str, variables: &VariableSet) -> String {
    SIMPLE_REF_RE
        .replace_all(text, |caps: &Captures| match variables.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Distinct variable names a template refers to, in first-seen order.
pub fn variables(template: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = SIMPLE_REF_RE
        .captures_iter(template)
        .chain(CONDITIONAL_RE.captures_iter(template))
        .filter_map(|caps| {
            let m = caps.get(1)?;
            Some((m.start(), m.as_str().to_string()))
        })
        .collect();
    found.sort_by_key(|(pos, _)| *pos);

    let mut names: Vec<String> = Vec::new();
    for (_, name) in found {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> VariableSet {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn replaces_every_occurrence() {
        let out = substitute("{a} and {a} then {b}", &vars(&[("a", "x"), ("b", "y")]));
        assert_eq!(out, "x and x then y");
    }

    #[test]
    fn unknown_references_stay_literal() {
        let out = substitute("Hello {name}, see {missing}", &vars(&[("name", "Ann")]));
        assert_eq!(out, "Hello Ann, see {missing}");
    }

    #[test]
    fn conditional_kept_when_set() {
        assert_eq!(substitute("A{if:X:B}C", &vars(&[("X", "v")])), "ABC");
    }

    #[test]
    fn conditional_removed_when_empty_or_absent() {
        assert_eq!(substitute("A{if:X:B}C", &vars(&[("X", "")])), "AC");
        assert_eq!(substitute("A{if:X:B}C", &vars(&[])), "AC");
    }

    #[test]
    fn conditional_content_gets_substituted() {
        let out = substitute(
            "Answer.{if:question: Q: {question}}\n{reference}",
            &vars(&[("question", "why?"), ("reference", "r")]),
        );
        assert_eq!(out, "Answer. Q: why?\nr");
    }

    #[test]
    fn legacy_conditional_keyword() {
        let out = substitute("{如果:问题:问: {问题}}", &vars(&[("问题", "几点")]));
        assert_eq!(out, "问: 几点");
    }

    #[test]
    fn absent_conditional_with_reference_is_removed_whole() {
        assert_eq!(substitute("A{if:q: Q: {q}}B", &vars(&[])), "AB");
        assert_eq!(substitute("A{if:q: Q: {q}}B", &vars(&[("q", "")])), "AB");
    }

    #[test]
    fn multi_line_value_inside_conditional() {
        let out = substitute(
            "A{if:question: Q: {question}}B",
            &vars(&[("question", "one\ntwo")]),
        );
        assert_eq!(out, "A Q: one\ntwoB");
    }

    #[test]
    fn brace_in_value_does_not_cut_the_block() {
        let out = substitute("A{if:q: Q: {q}!}B", &vars(&[("q", "a}b{c")]));
        assert_eq!(out, "A Q: a}b{c!B");
    }

    #[test]
    fn unknown_reference_inside_kept_conditional_stays_literal() {
        let out = substitute("{if:a:x {other}}", &vars(&[("a", "1")]));
        assert_eq!(out, "x {other}");
    }

    #[test]
    fn nested_conditionals_resolve_inner_block_only() {
        let out = substitute("{if:a:x{if:b:y}z}", &vars(&[("a", "1"), ("b", "1")]));
        assert_eq!(out, "{if:a:xyz}");
    }

    #[test]
    fn conditional_does_not_span_lines() {
        let template = "{if:X:line one\nline two}";
        assert_eq!(substitute(template, &vars(&[("X", "v")])), template);
    }

    #[test]
    fn substitution_is_idempotent_without_conditionals() {
        let template = "Summarize:\n{reference}\n(keep {missing} as is)";
        let v = vars(&[("reference", "note: fever")]);
        let once = substitute(template, &v);
        assert_eq!(substitute(&once, &v), once);
    }

    #[test]
    fn inserted_values_are_not_rescanned() {
        let out = substitute("{a}", &vars(&[("a", "{b}"), ("b", "nope")]));
        assert_eq!(out, "{b}");
    }

    #[test]
    fn malformed_syntax_degrades_to_literal() {
        let v = vars(&[("a", "x")]);
        assert_eq!(substitute("{a", &v), "{a");
        assert_eq!(substitute("{if:a}", &v), "{if:a}");
        assert_eq!(substitute("{}", &v), "{}");
    }

    #[test]
    fn lists_variables_in_order() {
        let names = variables("{if:question:Q: {question}} {reference} {question} {如果:extra:x}");
        assert_eq!(names, vec!["question", "reference", "extra"]);
    }
}
