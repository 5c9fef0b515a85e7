//! Immutable template registry and the engine that renders from it.
//!
//! The registry is built once (built-in presets plus an optional read-only
//! user library) and handed to a [`TemplateEngine`]; nothing is global.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use colgen_shared::{ColgenError, Result};

use crate::{VariableSet, substitute};

/// Built-in presets as `(name, description, content)`.
const PRESETS: &[(&str, &str, &str)] = &[
    (
        "summary",
        "Concise summary",
        "Write a concise summary of the following content:\n\n{reference}",
    ),
    (
        "translate",
        "Translate into English",
        "Translate the following content into English:\n\n{reference}",
    ),
    (
        "sentiment",
        "Sentiment with a short reason",
        "Classify the sentiment of the following content as positive, negative or neutral, \
         and give a one-sentence reason:\n\n{reference}",
    ),
    (
        "keywords",
        "Five key phrases",
        "Extract the 5 most important keywords or phrases from the following content:\n\n{reference}",
    ),
    (
        "classify",
        "Topic category",
        "Assign the following content to the most fitting category \
         (e.g. technology, health, education, entertainment) and explain why:\n\n{reference}",
    ),
    (
        "viewpoints",
        "Main arguments",
        "List the main viewpoints and arguments in the following content:\n\n{reference}",
    ),
    (
        "qa",
        "Answer a question from a `question` column",
        "Answer using only the reference below.{if:question: Question: {question}}\n\nReference:\n{reference}",
    ),
    (
        "numbers",
        "Numeric facts grouped by category",
        "Extract every numeric fact from the following text and group them by category:\n\n{reference}",
    ),
    (
        "blurb",
        "Product or service blurb",
        "Write a professional introduction of the product or service described below, \
         highlighting its main features and value:\n\n{reference}",
    ),
    (
        "medical-report",
        "Key indicators of a medical report",
        "Analyze the following medical report, extract the key indicators and explain what they mean:\n\n{reference}",
    ),
    (
        "plain-language",
        "Technical text for non-experts",
        "Rewrite the following technical content in language an ordinary user can understand:\n\n{reference}",
    ),
    (
        "abstract",
        "Academic abstract",
        "Write an abstract of the following academic content covering purpose, method, results and conclusion:\n\n{reference}",
    ),
    (
        "blood-pressure",
        "Blood pressure (血压) as 血压X/YmmHg",
        "Extract the patient's blood pressure (血压) from the following medical record. \
         Return only the value, formatted as '血压X/YmmHg':\n\n{reference}",
    ),
];

/// Where a template came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateOrigin {
    Preset,
    User,
}

/// One named template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateEntry {
    pub name: String,
    pub content: String,
    pub description: Option<String>,
    pub origin: TemplateOrigin,
}

/// Named templates, fixed after construction.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    entries: Vec<TemplateEntry>,
    by_name: HashMap<String, usize>,
}

impl TemplateRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry holding only the built-in presets.
    pub fn presets() -> Self {
        let mut registry = Self::empty();
        for (name, description, content) in PRESETS {
            registry.insert(TemplateEntry {
                name: (*name).to_string(),
                content: (*content).to_string(),
                description: Some((*description).to_string()),
                origin: TemplateOrigin::Preset,
            });
        }
        registry
    }

    /// Add user entries. A user entry never shadows an existing name.
    pub fn with_entries(mut self, entries: impl IntoIterator<Item = TemplateEntry>) -> Self {
        for entry in entries {
            if self.by_name.contains_key(&entry.name) {
                warn!(name = %entry.name, "template name already taken, skipping user entry");
                continue;
            }
            self.insert(entry);
        }
        self
    }

    fn insert(&mut self, entry: TemplateEntry) {
        self.by_name.insert(entry.name.clone(), self.entries.len());
        self.entries.push(entry);
    }

    pub fn get(&self, name: &str) -> Option<&TemplateEntry> {
        self.by_name.get(name).map(|&i| &self.entries[i])
    }

    /// Entries in registration order (presets first).
    pub fn iter(&self) -> impl Iterator<Item = &TemplateEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Value shape accepted in a user library file.
#[derive(Deserialize)]
#[serde(untagged)]
enum LibraryValue {
    Plain(String),
    Detailed {
        content: String,
        #[serde(default)]
        description: Option<String>,
    },
}

/// Read a user library: a JSON object mapping names to either a template
/// string or `{ "content": ..., "description": ... }`.
pub fn load_user_library(path: &Path) -> Result<Vec<TemplateEntry>> {
    let raw = std::fs::read_to_string(path).map_err(|e| ColgenError::io(path, e))?;
    let parsed: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&raw)
        .map_err(|e| {
            ColgenError::Template(format!("failed to parse {}: {e}", path.display()))
        })?;

    let mut entries = Vec::with_capacity(parsed.len());
    for (name, value) in parsed {
        let value: LibraryValue = serde_json::from_value(value).map_err(|_| {
            ColgenError::Template(format!(
                "template '{name}' must be a string or an object with a 'content' field"
            ))
        })?;
        let (content, description) = match value {
            LibraryValue::Plain(content) => (content, None),
            LibraryValue::Detailed {
                content,
                description,
            } => (content, description),
        };
        entries.push(TemplateEntry {
            name,
            content,
            description,
            origin: TemplateOrigin::User,
        });
    }

    debug!(path = %path.display(), count = entries.len(), "user templates loaded");
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Where a run's template text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    /// Look the template up in the registry.
    Named(String),
    /// Use this text verbatim.
    Inline(String),
}

/// Resolves templates against an injected registry and renders them.
#[derive(Debug, Clone)]
pub struct TemplateEngine {
    registry: Arc<TemplateRegistry>,
}

impl TemplateEngine {
    pub fn new(registry: Arc<TemplateRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    /// The raw template text for `source`.
    pub fn resolve(&self, source: &TemplateSource) -> Result<String> {
        match source {
            TemplateSource::Inline(text) => Ok(text.clone()),
            TemplateSource::Named(name) => self
                .registry
                .get(name)
                .map(|entry| entry.content.clone())
                .ok_or_else(|| ColgenError::Template(format!("unknown template '{name}'"))),
        }
    }

    /// Resolve and substitute in one step.
    pub fn render(&self, source: &TemplateSource, variables: &VariableSet) -> Result<String> {
        Ok(substitute(&self.resolve(source)?, variables))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_entry(name: &str, content: &str) -> TemplateEntry {
        TemplateEntry {
            name: name.into(),
            content: content.into(),
            description: None,
            origin: TemplateOrigin::User,
        }
    }

    #[test]
    fn presets_use_reference_variable() {
        let registry = TemplateRegistry::presets();
        assert_eq!(registry.len(), PRESETS.len());
        for entry in registry.iter() {
            assert!(
                entry.content.contains("{reference}"),
                "preset {} lacks {{reference}}",
                entry.name
            );
        }
    }

    #[test]
    fn blood_pressure_preset_triggers_clinical_policy() {
        let registry = TemplateRegistry::presets();
        let entry = registry.get("blood-pressure").unwrap();
        assert!(colgen_shared::clinical::mentions_blood_pressure(&entry.content));
    }

    #[test]
    fn user_entries_do_not_shadow_presets() {
        let registry = TemplateRegistry::presets().with_entries([
            user_entry("summary", "hijacked"),
            user_entry("mine", "Mine: {reference}"),
        ]);
        assert_ne!(registry.get("summary").unwrap().content, "hijacked");
        assert_eq!(registry.get("mine").unwrap().origin, TemplateOrigin::User);
        assert_eq!(registry.iter().last().unwrap().name, "mine");
    }

    #[test]
    fn qa_preset_renders_with_and_without_question() {
        let engine = TemplateEngine::new(Arc::new(TemplateRegistry::presets()));
        let qa = TemplateSource::Named("qa".into());
        let mut vars: VariableSet =
            [("reference".to_string(), "note: fever".to_string())].into_iter().collect();

        assert_eq!(
            engine.render(&qa, &vars).unwrap(),
            "Answer using only the reference below.\n\nReference:\nnote: fever"
        );

        vars.insert("question".into(), "Is there a fever?".into());
        assert_eq!(
            engine.render(&qa, &vars).unwrap(),
            "Answer using only the reference below. Question: Is there a fever?\n\nReference:\nnote: fever"
        );
    }

    #[test]
    fn engine_resolves_named_and_inline() {
        let registry = TemplateRegistry::empty().with_entries([user_entry("t", "T: {x}")]);
        let engine = TemplateEngine::new(Arc::new(registry));
        let vars: VariableSet = [("x".to_string(), "1".to_string())].into_iter().collect();

        assert_eq!(engine.render(&TemplateSource::Named("t".into()), &vars).unwrap(), "T: 1");
        assert_eq!(
            engine.render(&TemplateSource::Inline("I: {x}".into()), &vars).unwrap(),
            "I: 1"
        );
        let err = engine.resolve(&TemplateSource::Named("nope".into())).unwrap_err();
        assert!(err.to_string().contains("unknown template 'nope'"));
    }

    #[test]
    fn loads_both_library_shapes() {
        let dir = std::env::temp_dir().join(format!("colgen-tpl-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("templates.json");
        std::fs::write(
            &path,
            r#"{
                "plain": "P: {reference}",
                "detailed": {"content": "D: {reference}", "description": "d", "imported": true}
            }"#,
        )
        .unwrap();

        let entries = load_user_library(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "plain");
        assert_eq!(entries[0].content, "P: {reference}");
        assert_eq!(entries[1].description.as_deref(), Some("d"));

        std::fs::write(&path, r#"{"bad": 3}"#).unwrap();
        assert!(load_user_library(&path).is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
