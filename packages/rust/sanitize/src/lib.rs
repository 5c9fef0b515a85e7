//! Output cleanup for generated cell values.
//!
//! Raw model output runs through an ordered list of [`SanitizeRule`]s. A rule
//! either hands rewritten text to the next rule or finishes the pipeline with
//! a final value. Sanitizing never fails; a rule that finds nothing to do
//! passes its input through untouched.

use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

use colgen_shared::clinical::{canonical_blood_pressure, mentions_blood_pressure};

/// Result of applying one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    /// Keep going with this text.
    Continue(String),
    /// Stop here; this is the cell value.
    Finish(String),
}

/// One cleanup step.
pub trait SanitizeRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Rewrite `text`. `prompt` is the rendered prompt that produced it.
    fn apply(&self, text: String, prompt: &str) -> RuleOutcome;
}

/// An ordered rule pipeline.
pub struct Sanitizer {
    rules: Vec<Box<dyn SanitizeRule>>,
}

impl Sanitizer {
    /// A pipeline with no rules (returns input unchanged).
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// The default pipeline.
    pub fn standard() -> Self {
        Self::empty()
            .with_rule(CanonicalBloodPressure)
            .with_rule(StripReasoning)
            .with_rule(StripPreamble)
            .with_rule(StripTrailingNotes)
            .with_rule(CollapseBlankLines)
            .with_rule(Trim)
    }

    /// Append a rule at the end of the pipeline.
    pub fn with_rule(mut self, rule: impl SanitizeRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn sanitize(&self, raw: &str, prompt: &str) -> String {
        let mut text = raw.to_string();
        for rule in &self.rules {
            match rule.apply(text, prompt) {
                RuleOutcome::Continue(next) => text = next,
                RuleOutcome::Finish(done) => {
                    trace!(rule = rule.name(), "sanitizer finished early");
                    return done;
                }
            }
        }
        text
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for Sanitizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sanitizer")
            .field("rules", &self.rule_names())
            .finish()
    }
}

static STANDARD: LazyLock<Sanitizer> = LazyLock::new(Sanitizer::standard);

/// Clean `raw` with the standard pipeline.
pub fn sanitize(raw: &str, prompt: &str) -> String {
    STANDARD.sanitize(raw, prompt)
}

// ---------------------------------------------------------------------------
// Rule 1: Blood pressure
// ---------------------------------------------------------------------------

/// For blood-pressure prompts, reduce the output to `血压S/DmmHg`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalBloodPressure;

static BP_READING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{2,3}/\d{2,3})\s*(?:(?i:mmhg)|毫米汞柱)").expect("valid regex")
});

impl SanitizeRule for CanonicalBloodPressure {
    fn name(&self) -> &'static str {
        "canonical-blood-pressure"
    }

    fn apply(&self, text: String, prompt: &str) -> RuleOutcome {
        if !mentions_blood_pressure(prompt) {
            return RuleOutcome::Continue(text);
        }
        match BP_READING_RE.captures(&text) {
            Some(caps) => RuleOutcome::Finish(canonical_blood_pressure(&caps[1])),
            None => RuleOutcome::Continue(text),
        }
    }
}

// ---------------------------------------------------------------------------
// Rule 2: Reasoning blocks
// ---------------------------------------------------------------------------

/// Drop `<think>...</think>` spans.
#[derive(Debug, Clone, Copy, Default)]
pub struct StripReasoning;

static THINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"));

impl SanitizeRule for StripReasoning {
    fn name(&self) -> &'static str {
        "strip-reasoning"
    }

    fn apply(&self, text: String, _prompt: &str) -> RuleOutcome {
        if !text.contains("<think>") {
            return RuleOutcome::Continue(text);
        }
        RuleOutcome::Continue(THINK_RE.replace_all(&text, "").into_owned())
    }
}

// ---------------------------------------------------------------------------
// Rule 3: Preamble
// ---------------------------------------------------------------------------

const PREAMBLE_MARKERS: &[&str] = &[
    "好的", "嗯", "我来", "让我", "首先", "思考", "理解中", "分析中", "处理中", "这是", "以下是",
    "根据", "分析", "结果如下", "sure", "okay", "certainly", "here is", "here's", "let me",
    "based on",
];

/// Drop leading filler lines ("好的，…", "Sure, here is…").
///
/// The last remaining line is always kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct StripPreamble;

impl SanitizeRule for StripPreamble {
    fn name(&self) -> &'static str {
        "strip-preamble"
    }

    fn apply(&self, text: String, _prompt: &str) -> RuleOutcome {
        let lines: Vec<&str> = text.lines().collect();
        let mut start = 0;
        while start + 1 < lines.len() {
            let line = lines[start];
            if line.trim().is_empty() || starts_with_marker(line, PREAMBLE_MARKERS) {
                start += 1;
            } else {
                break;
            }
        }
        if start == 0 {
            return RuleOutcome::Continue(text);
        }
        RuleOutcome::Continue(lines[start..].join("\n"))
    }
}

// ---------------------------------------------------------------------------
// Rule 4: Trailing notes
// ---------------------------------------------------------------------------

const TRAILING_MARKERS: &[&str] = &[
    "根据提供的", "参考文献", "引用来源", "注意事项", "补充说明", "note:", "references", "sources",
];

/// Drop trailing footnote/reference lines and trailing blank lines.
///
/// The first line is always kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct StripTrailingNotes;

impl SanitizeRule for StripTrailingNotes {
    fn name(&self) -> &'static str {
        "strip-trailing-notes"
    }

    fn apply(&self, text: String, _prompt: &str) -> RuleOutcome {
        let lines: Vec<&str> = text.lines().collect();
        let mut end = lines.len();
        while end > 1 {
            let line = lines[end - 1];
            if line.trim().is_empty() || starts_with_marker(line, TRAILING_MARKERS) {
                end -= 1;
            } else {
                break;
            }
        }
        if end == lines.len() {
            return RuleOutcome::Continue(text);
        }
        RuleOutcome::Continue(lines[..end].join("\n"))
    }
}

// ---------------------------------------------------------------------------
// Rule 5: Blank lines
// ---------------------------------------------------------------------------

/// Collapse runs of blank lines to a single blank line.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollapseBlankLines;

static BLANK_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

impl SanitizeRule for CollapseBlankLines {
    fn name(&self) -> &'static str {
        "collapse-blank-lines"
    }

    fn apply(&self, text: String, _prompt: &str) -> RuleOutcome {
        RuleOutcome::Continue(BLANK_RUN_RE.replace_all(&text, "\n\n").into_owned())
    }
}

// ---------------------------------------------------------------------------
// Rule 6: Trim
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct Trim;

impl SanitizeRule for Trim {
    fn name(&self) -> &'static str {
        "trim"
    }

    fn apply(&self, text: String, _prompt: &str) -> RuleOutcome {
        RuleOutcome::Continue(text.trim().to_string())
    }
}

fn starts_with_marker(line: &str, markers: &[&str]) -> bool {
    let lowered = line.trim_start().to_lowercase();
    markers.iter().any(|m| lowered.starts_with(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blood_pressure_is_canonicalized() {
        let out = sanitize(
            "Looking at the notes, the reading was 128/82 mmHg today, which is fine.",
            "请提取血压",
        );
        assert_eq!(out, "血压128/82mmHg");
    }

    #[test]
    fn blood_pressure_accepts_chinese_unit_and_case() {
        assert_eq!(sanitize("血压为135/90毫米汞柱", "血压是多少"), "血压135/90mmHg");
        assert_eq!(sanitize("BP 120/80MMHG", "systolic and diastolic"), "血压120/80mmHg");
    }

    #[test]
    fn blood_pressure_needs_both_prompt_and_unit() {
        assert_eq!(sanitize("128/82 mmHg", "Summarize"), "128/82 mmHg");
        assert_eq!(sanitize("ratio 128/82", "血压"), "ratio 128/82");
    }

    #[test]
    fn reasoning_blocks_are_removed() {
        let raw = "<think>\nThe user wants a summary.\n</think>\n\nFever for two days.";
        assert_eq!(sanitize(raw, "Summarize"), "Fever for two days.");
    }

    #[test]
    fn preamble_lines_are_removed() {
        let raw = "好的，我来总结一下。\n以下是结果：\n患者发热两天。";
        assert_eq!(sanitize(raw, "总结"), "患者发热两天。");

        let raw = "Sure! Here is the summary:\n\nFever for two days.";
        assert_eq!(sanitize(raw, "Summarize"), "Fever for two days.");
    }

    #[test]
    fn preamble_never_removes_last_line() {
        assert_eq!(sanitize("以下是唯一的一行", "x"), "以下是唯一的一行");
        assert_eq!(sanitize("好的\n根据记录", "x"), "根据记录");
    }

    #[test]
    fn preamble_only_strips_leading_lines() {
        let raw = "Fever.\nBased on labs, no infection.";
        assert_eq!(sanitize(raw, "x"), raw);
    }

    #[test]
    fn trailing_notes_are_removed() {
        let raw = "Fever for two days.\n\nNote: this is not medical advice.\n参考文献：无\n\n";
        assert_eq!(sanitize(raw, "Summarize"), "Fever for two days.");
    }

    #[test]
    fn blank_runs_collapse_to_one_blank_line() {
        let raw = "a\n\n\n\nb\n\nc";
        assert_eq!(sanitize(raw, "x"), "a\n\nb\n\nc");
    }

    #[test]
    fn clean_text_passes_through() {
        assert_eq!(sanitize("  plain answer \n", "x"), "plain answer");
        assert_eq!(sanitize("", "x"), "");
    }

    #[test]
    fn custom_pipeline_runs_in_order() {
        struct Upper;
        impl SanitizeRule for Upper {
            fn name(&self) -> &'static str {
                "upper"
            }
            fn apply(&self, text: String, _prompt: &str) -> RuleOutcome {
                RuleOutcome::Finish(text.to_uppercase())
            }
        }

        let sanitizer = Sanitizer::empty().with_rule(Trim).with_rule(Upper).with_rule(Trim);
        assert_eq!(sanitizer.sanitize("  ab  ", ""), "AB");
        assert_eq!(sanitizer.rule_names(), vec!["trim", "upper", "trim"]);
        assert_eq!(
            Sanitizer::standard().rule_names().first(),
            Some(&"canonical-blood-pressure")
        );
    }
}
